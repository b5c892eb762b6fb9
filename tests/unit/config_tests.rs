use std::time::Duration;

use nbcollect::{config::GlobalConfig, AppError};

fn toml_escape(path: &std::path::Path) -> String {
    path.display().to_string().replace('\\', "\\\\")
}

fn full_toml(dir: &str) -> String {
    format!(
        r#"
default_kernel = "ir"
kernel_dirs = ['{dir}']
working_directory = '{dir}'
runtime_dir = '{dir}'

[timeouts]
start_poll_ms = 25
probe_interval_ms = 100
probe_max_attempts = 40
connect_max_attempts = 10
startup_seconds = 30
cell_seconds = 120
drain_ms = 250
kill_grace_ms = 500
"#
    )
}

#[test]
fn empty_document_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.default_kernel, "python3");
    assert_eq!(config.timeouts.start_poll_interval(), Duration::from_millis(60));
    assert_eq!(config.timeouts.probe_interval(), Duration::from_millis(60));
    assert_eq!(config.timeouts.kill_grace(), Duration::from_secs(2));
}

#[test]
fn zero_limits_mean_unbounded() {
    let config = GlobalConfig::default();

    assert_eq!(config.timeouts.probe_max_attempts(), None);
    assert_eq!(config.timeouts.connect_max_attempts(), None);
    assert_eq!(config.timeouts.startup_timeout(), None);
    assert_eq!(config.timeouts.cell_timeout(), None);
    assert_eq!(config.timeouts.drain_delay(), None);
}

#[test]
fn full_document_parses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let escaped = toml_escape(dir.path());
    let config = GlobalConfig::from_toml_str(&full_toml(&escaped)).expect("valid config");

    assert_eq!(config.default_kernel, "ir");
    assert_eq!(config.kernel_search_path(), vec![dir.path().to_path_buf()]);
    assert_eq!(config.working_directory, dir.path());
    assert_eq!(config.timeouts.start_poll_interval(), Duration::from_millis(25));
    assert_eq!(config.timeouts.probe_max_attempts(), Some(40));
    assert_eq!(config.timeouts.connect_max_attempts(), Some(10));
    assert_eq!(config.timeouts.startup_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.timeouts.cell_timeout(), Some(Duration::from_secs(120)));
    assert_eq!(config.timeouts.drain_delay(), Some(Duration::from_millis(250)));
    assert_eq!(config.timeouts.kill_grace(), Duration::from_millis(500));
}

#[test]
fn partial_timeouts_table_keeps_other_defaults() {
    let config = GlobalConfig::from_toml_str("[timeouts]\ncell_seconds = 5\n").expect("valid");

    assert_eq!(config.timeouts.cell_timeout(), Some(Duration::from_secs(5)));
    assert_eq!(config.timeouts.probe_interval(), Duration::from_millis(60));
}

#[test]
fn empty_kernel_dirs_use_jupyter_search_path() {
    let config = GlobalConfig::default();
    let path = config.kernel_search_path();

    assert!(
        path.iter().any(|p| p.ends_with("share/jupyter/kernels")),
        "search path must include a system kernel dir, got: {path:?}"
    );
}

#[test]
fn blank_default_kernel_is_rejected() {
    let result = GlobalConfig::from_toml_str("default_kernel = \"  \"\n");
    assert!(matches!(result, Err(AppError::Config(_))), "got: {result:?}");
}

#[test]
fn zero_poll_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str("[timeouts]\nstart_poll_ms = 0\n");
    match result {
        Err(AppError::Config(msg)) => assert!(msg.contains("start_poll_ms"), "got: {msg}"),
        other => panic!("expected AppError::Config, got: {other:?}"),
    }
}

#[test]
fn zero_probe_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str("[timeouts]\nprobe_interval_ms = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))), "got: {result:?}");
}

#[test]
fn missing_working_directory_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = toml_escape(&dir.path().join("missing"));
    let result = GlobalConfig::from_toml_str(&format!("working_directory = '{missing}'\n"));

    match result {
        Err(AppError::Config(msg)) => assert!(msg.contains("working_directory"), "got: {msg}"),
        other => panic!("expected AppError::Config, got: {other:?}"),
    }
}

#[test]
fn invalid_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("default_kernel = [");
    assert!(matches!(result, Err(AppError::Config(_))), "got: {result:?}");
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nbcollect.toml");
    std::fs::write(&path, "default_kernel = \"julia-1.10\"\n").expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("valid config");
    assert_eq!(config.default_kernel, "julia-1.10");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))), "got: {result:?}");
}
