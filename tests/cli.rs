use std::process::Command;

fn tether() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tether"))
}

#[test]
fn missing_argument_prints_usage() {
    let output = tether().output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage:"), "{stderr}");
    assert!(stderr.contains("<script.js>"), "{stderr}");
}

#[test]
fn unreadable_file_fails() {
    let output = tether().arg("/nonexistent/script.js").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn runs_script_with_host_api() {
    let path = std::env::temp_dir().join(format!("tether-cli-{}.js", std::process::id()));
    std::fs::write(
        &path,
        "let c = new Counter(10); c.inc(); let s = hostAdd(2, 3); [c.inc(), s]",
    )
    .unwrap();
    let output = tether().arg(&path).output().unwrap();
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "run returned: 12,5");
}
