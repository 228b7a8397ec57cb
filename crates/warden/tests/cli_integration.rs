use std::process::Command;

fn warden() -> Command {
    Command::new(env!("CARGO_BIN_EXE_warden"))
}

#[test]
fn test_warden_version() {
    let output = warden().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_warden_help() {
    let output = warden().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("simulate"));
    assert!(stdout.contains("admit"));
}

#[test]
fn test_warden_init_then_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");

    let output = warden().arg("init").arg(&path).output().unwrap();
    assert!(output.status.success());
    assert!(path.exists());

    let output = warden()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["budgets"].as_array().unwrap().len(), 2);
    assert_eq!(report["rate_limits"][0]["scope"], "global");
}

#[test]
fn test_warden_simulate_hits_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tight.toml");
    std::fs::write(
        &path,
        r#"
[[budgets]]
scope = "agent:sim"
type = "calls"
limit = 3
period = "hour"
"#,
    )
    .unwrap();

    let output = warden()
        .args(["--config"])
        .arg(&path)
        .args(["simulate", "--scope", "agent:sim", "--calls", "5"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let outcomes: Vec<String> = stdout
        .lines()
        .filter(|line| line.starts_with('{') && line.contains("\"call\""))
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["outcome"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        outcomes,
        vec!["completed", "completed", "completed", "denied", "denied"]
    );
}

#[test]
fn test_warden_admit_rejects_bad_scope() {
    let output = warden()
        .args(["admit", "--scope", "team:x"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
