use std::io::Write;
use std::process::{Command, Output};

fn pixform() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pixform"))
}

fn run(args: &[&str]) -> Output {
    pixform().args(args).output().expect("failed to run pixform")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

// --- Evaluation at a position ---

#[test]
fn inline_scalar() {
    let out = run(&["1+2*3"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "7");
}

#[test]
fn inline_vector() {
    let out = run(&["[1,2]+0.5"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "[1.5,2.5]");
}

#[test]
fn position_sets_the_coordinates() {
    let out = run(&["--at", "3,2", "x*10+y"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "32");
}

#[test]
fn values_bind_an_input_row() {
    let out = run(&["--values", "1,-2,3", "--at", "1", "i*10"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "-20");

    let out = run(&["--values", "1,-2,3", "w+iM"]);
    assert_eq!(stdout(&out), "6");
}

#[test]
fn json_result() {
    let out = run(&["--json", "1+1"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(v["kind"], "scalar");
    assert_eq!(v["value"], 2.0);

    let out = run(&["--json", "[1,2]"]);
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(v["kind"], "vector");
    assert_eq!(v["value"][1], 2.0);
}

#[test]
fn break_is_reported() {
    let out = run(&["break()"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "break");
}

// --- Fill ---

#[test]
fn fill_prints_rows() {
    let out = run(&["--size", "3x2", "--fill", "x+10*y"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "0 1 2\n10 11 12");
}

#[test]
fn fill_json() {
    let out = run(&["--values", "1,2", "--fill", "--json", "i+1"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(v["data"], serde_json::json!([2.0, 3.0]));
    assert_eq!(v["dims"], serde_json::json!([2, 1, 1, 1]));
    assert_eq!(v["stats"]["pixels"], 2);
}

#[test]
fn fill_needs_an_image() {
    let out = run(&["--fill", "x"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("--fill needs"), "got: {}", stderr(&out));
}

#[test]
fn values_must_match_size() {
    let out = run(&["--size", "2x2", "--values", "1,2,3", "--fill", "i"]);
    assert_eq!(out.status.code(), Some(2));
}

// --- Input sources ---

#[test]
fn formula_from_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "sq(v) = v*v;\nsq(3) + 1").unwrap();
    let out = run(&["--file", f.path().to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "10");
}

#[test]
fn settings_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, r#"{{"boundary": "neumann"}}"#).unwrap();
    let out = run(&["--config", f.path().to_str().unwrap(), "--values", "1,2,3", "i(10)"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "3");

    let out = run(&["--values", "1,2,3", "i(10)"]);
    assert_eq!(stdout(&out), "0");
}

#[test]
fn invalid_settings_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "{{not json").unwrap();
    let out = run(&["--config", f.path().to_str().unwrap(), "1"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("invalid config"), "got: {}", stderr(&out));
}

#[test]
fn seeded_runs_repeat() {
    let a = run(&["--seed", "11", "u(100)"]);
    let b = run(&["--seed", "11", "u(100)"]);
    assert!(a.status.success(), "stderr: {}", stderr(&a));
    assert_eq!(stdout(&a), stdout(&b));
}

#[test]
fn missing_formula_is_a_usage_error() {
    let out = run(&[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("expected a formula"), "got: {}", stderr(&out));
}

// --- Diagnostics ---

#[test]
fn compile_error_points_at_the_problem() {
    let out = run(&["1+foo"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[PXF-R001]"), "got: {err}");
    assert!(err.contains("--> 1:3"), "got: {err}");
    assert!(err.contains("^^^"), "got: {err}");
    assert!(stdout(&out).is_empty());
}

#[test]
fn compile_error_as_json() {
    let out = run(&["--json", "[1,2]+[1,2,3]"]);
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_str(stderr(&out).trim()).expect("valid JSON");
    assert_eq!(v["code"], "PXF-T002");
    assert_eq!(v["severity"], "error");
    assert_eq!(v["labels"][0]["col"], 1);
}

#[test]
fn macro_errors_name_the_macro() {
    let out = run(&["f(v)=v+q; f(1)"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("note: in macro 'f'"), "got: {}", stderr(&out));
}

#[test]
fn explain_known_code() {
    let out = run(&["--explain", "PXF-S007"]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("## PXF-S007"), "got: {}", stdout(&out));
}

#[test]
fn explain_unknown_code() {
    let out = run(&["--explain", "PXF-Z000"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown error code"));
}

// --- Logging and output side channels ---

#[test]
fn verbose_logs_go_to_stderr() {
    let out = run(&["-v", "x+1"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "1");
    assert!(stderr(&out).contains("compiled"), "got: {}", stderr(&out));
}

#[test]
fn print_writes_to_stderr() {
    let out = run(&["print(2*3)+1"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "7");
    assert!(stderr(&out).contains("6"), "got: {}", stderr(&out));
}
