use std::process::{Command, Output};

fn map_metabolites(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_map-metabolites"))
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_no_arguments_prints_usage_and_succeeds() {
    let output = map_metabolites(&[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

#[test]
fn test_invalid_option_value_fails() {
    let output = map_metabolites(&["--tie-break", "bogus", "results.csv"]);
    assert!(!output.status.success());
}

#[test]
fn test_failure_reported_once() {
    let output = map_metabolites(&["/nonexistent/results.csv"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Failed to open input file").count(), 1);
}
