use std::collections::HashMap;
use std::path::PathBuf;

use builder::config::NetConfig;
use builder::{Builder, BuilderConfig, BuilderError};

fn config_with_root(root: PathBuf) -> BuilderConfig {
    BuilderConfig {
        search_roots: vec![root],
        ..BuilderConfig::default()
    }
}

fn write(dir: &std::path::Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn plain_text_with_no_directives_round_trips_exactly() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let input = "just some text\nwith multiple lines\n";
    let out = builder.execute("t.txt", input, HashMap::new()).unwrap();
    assert_eq!(out, input);
}

#[test]
fn include_once_emits_each_distinct_file_a_single_time_in_first_seen_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a", "a\n");
    write(dir.path(), "b", "b\n");
    write(dir.path(), "c", "c\n");

    let mut builder = Builder::new(config_with_root(dir.path().to_path_buf())).unwrap();
    let source = "@include \"a\"\n@include once \"b\"\n@include once \"a\"\n@include once \"b\"\n@include once \"c\"\n";
    let out = builder.execute("main.txt", source, HashMap::new()).unwrap();
    assert_eq!(out, "a\nb\nc\n");
}

#[test]
fn expression_arithmetic_matches_the_documented_results() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    assert_eq!(builder.execute("t.txt", "@{156*4+3}", HashMap::new()).unwrap(), "627");
    assert_eq!(builder.execute("t.txt", "@{(256-128)/2}", HashMap::new()).unwrap(), "64");
    assert_eq!(
        builder.execute("t.txt", "@{true || false && false}", HashMap::new()).unwrap(),
        "true"
    );
}

#[test]
fn ternary_short_circuits_the_untaken_branch() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let out = builder.execute("t.txt", "@{1 ? 100 : undefinedVar}", HashMap::new()).unwrap();
    assert_eq!(out, "100");
}

#[test]
fn macro_redeclaration_cites_both_origin_sites() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder
        .execute("t.txt", "@macro FOO()\n@end\n@macro FOO()\n@end\n", HashMap::new())
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("already declared"));
    assert!(msg.contains("FOO"));
}

#[test]
fn mutual_include_cycle_fails_with_depth_error_not_a_stack_overflow() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "@include \"b.txt\"\n");
    write(dir.path(), "b.txt", "@include \"a.txt\"\n");

    let mut config = config_with_root(dir.path().to_path_buf());
    config.max_execution_depth = 64;
    let mut builder = Builder::new(config).unwrap();
    let err = builder.execute("a.txt", "@include \"b.txt\"\n", HashMap::new()).unwrap_err();
    assert!(matches!(err, BuilderError::MaxExecutionDepthReached { .. }));
}

#[test]
fn line_control_marks_file_boundaries_and_escapes_quotes_in_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("with \"quote\"");
    std::fs::create_dir_all(&sub).unwrap();
    write(&sub, "inc.txt", "included\n");

    let mut config = config_with_root(dir.path().to_path_buf());
    config.generate_line_control_statements = true;
    let mut builder = Builder::new(config).unwrap();
    let source = "before\n@include \"with \\\"quote\\\"/inc.txt\"\nafter\n";
    let out = builder.execute("main.txt", source, HashMap::new()).unwrap();
    assert!(out.contains("#line"));
    assert!(out.contains("\\\""));
}

#[test]
fn division_by_zero_reports_the_documented_message() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder.execute("t.txt", "@{1/0}", HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("Division by zero"));
}

#[test]
fn min_with_no_arguments_reports_the_documented_message() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder.execute("t.txt", "@{min()}", HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("Wrong number of arguments for min()"));
}

#[test]
fn defined_behaves_per_the_documented_cases() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    assert_eq!(builder.execute("t.txt", "@{defined(undef)}", HashMap::new()).unwrap(), "false");
    assert_eq!(
        builder
            .execute("t.txt", "@set known = 1\n@{defined(known)}", HashMap::new())
            .unwrap(),
        "1"
    );
    assert!(builder.execute("t.txt", "@{defined(\"str\")}", HashMap::new()).is_err());
}

#[test]
fn backtick_strings_and_this_keyword_report_their_documented_errors() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder.execute("t.txt", "@{`abc`}", HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("Unexpected \"`\""));

    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder.execute("t.txt", "@{this}", HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("`this` keyword is not supported"));
}

#[test]
fn network_disabled_by_default_rejects_http_includes() {
    let mut builder = Builder::new(BuilderConfig::default()).unwrap();
    let err = builder
        .execute("t.txt", "@include \"https://example.com/a.txt\"\n", HashMap::new())
        .unwrap_err();
    assert!(err.to_string().contains("network access is disabled") || err.to_string().contains("NetworkDisabled"));
}

#[test]
fn network_allowlist_is_consulted_before_any_request_is_attempted() {
    let mut config = BuilderConfig::default();
    config.net = NetConfig {
        enabled: true,
        allowed_addresses: vec!["good.example".to_string()],
    };
    let mut builder = Builder::new(config).unwrap();
    let err = builder
        .execute("t.txt", "@include \"https://evil.example/a.txt\"\n", HashMap::new())
        .unwrap_err();
    assert!(err.to_string().contains("not in the network allowlist"));
}
