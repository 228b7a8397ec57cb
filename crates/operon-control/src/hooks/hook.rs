use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::events::{HookContext, HookEvent, HookResult};

pub const MIN_PRIORITY: u8 = 0;
pub const MAX_PRIORITY: u8 = 100;

/// Handler invoked when a hook fires
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handle event, return result (can transform input/output or abort)
    async fn handle(&self, ctx: HookContext) -> Result<HookResult>;
}

/// Adapter turning an async closure into a [`HookHandler`]
pub struct FnHandler<F>(F);

/// Wrap `f` as a hook handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HookResult>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> HookHandler for FnHandler<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HookResult>> + Send + 'static,
{
    async fn handle(&self, ctx: HookContext) -> Result<HookResult> {
        (self.0)(ctx).await
    }
}

/// A registered lifecycle hook.
///
/// Lower priority runs first; equal priorities keep registration order.
#[derive(Clone)]
pub struct Hook {
    pub id: String,
    pub event: HookEvent,
    pub priority: u8,
    pub enabled: bool,
    /// Overrides the execution timeout for this hook only
    pub timeout: Option<Duration>,
    pub handler: Arc<dyn HookHandler>,
}

impl Hook {
    pub fn new(
        id: impl Into<String>,
        event: HookEvent,
        priority: u8,
        handler: impl HookHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            event,
            priority,
            enabled: true,
            timeout: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
