use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    if let Some(path) = env::var_os("CARGO_BIN_EXE_treedown-cli") {
        return PathBuf::from(path);
    }
    if let Some(path) = env::var_os("CARGO_BIN_EXE_treedown_cli") {
        return PathBuf::from(path);
    }
    let exe = env::current_exe().expect("current exe");
    let mut debug_dir = exe.as_path();
    while let Some(parent) = debug_dir.parent() {
        if parent.file_name().and_then(|name| name.to_str()) == Some("debug") {
            let candidate = parent.join("treedown-cli");
            if candidate.exists() {
                return candidate;
            }
        }
        debug_dir = parent;
    }
    panic!("binary path missing");
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("time");
    let file_name = format!(
        "treedown_cli_{}_{}_{}.md",
        name,
        now.as_secs(),
        now.subsec_nanos()
    );
    path.push(file_name);
    fs::write(&path, contents).expect("write temp file");
    path
}

#[test]
fn renders_fragment_html() {
    let input = temp_file("render", "# Title\n\nParagraph.\n");
    let output = Command::new(bin_path())
        .args([input.to_str().expect("path")])
        .output()
        .expect("run");

    assert!(output.status.success(), "expected success exit code");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<h1 id=\"title\">Title</h1>"));
    assert!(stdout.contains("<p>Paragraph.</p>"));
}

#[test]
fn diagnostics_json_reports_unresolved_reference() {
    let input = temp_file("unresolved", "[text][missing]\n");
    let output = Command::new(bin_path())
        .args(["--diagnostics", "json", input.to_str().expect("path")])
        .output()
        .expect("run");

    assert!(output.status.success(), "warnings keep the zero exit code");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("\"code\": \"W_REF_UNRESOLVED\""),
        "expected W_REF_UNRESOLVED in stderr"
    );
}

#[test]
fn diagnostics_pretty_reports_blocked_url() {
    let input = temp_file("blocked", "[x](javascript:alert(1))\n");
    let output = Command::new(bin_path())
        .args(["--diagnostics", "pretty", input.to_str().expect("path")])
        .output()
        .expect("run");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("W_URL_BLOCKED"),
        "expected W_URL_BLOCKED in stderr"
    );
}

#[test]
fn sanitized_strips_raw_html() {
    let input = temp_file("sanitized", "before <script>alert(1)</script> after\n");
    let output = Command::new(bin_path())
        .args(["--sanitized", input.to_str().expect("path")])
        .output()
        .expect("run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("<script"), "expected script tag stripped");
    assert!(stdout.contains("before"));
}

#[test]
fn ast_mode_prints_node_tree() {
    let input = temp_file("ast", "plain text\n");
    let output = Command::new(bin_path())
        .args(["--ast", input.to_str().expect("path")])
        .output()
        .expect("run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"type\": \"root\""));
    assert!(stdout.contains("\"type\": \"paragraph\""));
}

#[test]
fn conflicting_force_modes_exit_with_usage_error() {
    let input = temp_file("conflict", "text\n");
    let output = Command::new(bin_path())
        .args([
            "--force-block",
            "--force-inline",
            input.to_str().expect("path"),
        ])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(2));
}
