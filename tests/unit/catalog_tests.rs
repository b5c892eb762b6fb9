//! Unit tests for on-disk kernel discovery.

use std::fs;
use std::path::Path;

use nbcollect::kernel::catalog::{DirectoryDiscovery, KernelDiscovery};

fn install(dir: &Path, name: &str, json: &str) {
    let kernel_dir = dir.join(name);
    fs::create_dir_all(&kernel_dir).expect("create kernel dir");
    fs::write(kernel_dir.join("kernel.json"), json).expect("write kernel.json");
}

/// Every `<name>/kernel.json` is loaded under its directory name.
#[test]
fn discovers_installed_kernels() {
    let dir = tempfile::tempdir().expect("tempdir");
    install(
        dir.path(),
        "python3",
        r#"{"argv":["python3","-m","ipykernel_launcher","-f","{connection_file}"],
            "display_name":"Python 3","language":"python"}"#,
    );
    install(
        dir.path(),
        "ir",
        r#"{"argv":["R","--slave","-e","IRkernel::main()","--args","{connection_file}"],
            "display_name":"R","language":"R","env":{"R_LIBS":"/opt/r"}}"#,
    );

    let catalog = DirectoryDiscovery::new(vec![dir.path().to_path_buf()])
        .find_all()
        .expect("discovery must succeed");

    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["ir", "python3"]);
    let ir = &catalog["ir"];
    assert_eq!(ir.language(), "R");
    assert_eq!(ir.spec.env.get("R_LIBS").map(String::as_str), Some("/opt/r"));
    assert_eq!(ir.resource_dir, dir.path().join("ir"));
}

/// A kernel in an earlier directory shadows one with the same name later on.
#[test]
fn earlier_directories_shadow_later_ones() {
    let user = tempfile::tempdir().expect("tempdir");
    let system = tempfile::tempdir().expect("tempdir");
    install(user.path(), "python3", r#"{"argv":["user-python"],"language":"python"}"#);
    install(system.path(), "python3", r#"{"argv":["system-python"],"language":"python"}"#);
    install(system.path(), "julia", r#"{"argv":["julia"],"language":"julia"}"#);

    let catalog =
        DirectoryDiscovery::new(vec![user.path().to_path_buf(), system.path().to_path_buf()])
            .find_all()
            .expect("discovery must succeed");

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog["python3"].spec.argv, vec!["user-python"]);
}

/// Invalid specs and directories without `kernel.json` are skipped.
#[test]
fn invalid_entries_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    install(dir.path(), "broken", "{ not json");
    install(dir.path(), "empty-argv", r#"{"argv":[],"language":"python"}"#);
    fs::create_dir_all(dir.path().join("no-spec")).expect("create dir");
    install(dir.path(), "good", r#"{"argv":["good"],"language":"python"}"#);

    let catalog = DirectoryDiscovery::new(vec![dir.path().to_path_buf()])
        .find_all()
        .expect("discovery must succeed");

    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["good"]);
}

/// Missing directories are not an error.
#[test]
fn missing_directories_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = DirectoryDiscovery::new(vec![dir.path().join("nope")])
        .find_all()
        .expect("discovery must succeed");
    assert!(catalog.is_empty());
}

/// Entries that cannot be read as kernels are skipped without ending discovery.
#[test]
fn unreadable_entries_do_not_abort_discovery() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("README"), "stray file").expect("write stray file");
    fs::create_dir_all(dir.path().join("odd").join("kernel.json")).expect("create dir");
    install(dir.path(), "good", r#"{"argv":["good"],"language":"python"}"#);

    let catalog = DirectoryDiscovery::new(vec![dir.path().to_path_buf()])
        .find_all()
        .expect("discovery must succeed");

    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["good"]);
}

/// Launch-descriptor keys this tool has no use for are ignored.
#[test]
fn unused_descriptor_keys_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    install(
        dir.path(),
        "python3",
        r#"{"argv":["python3"],"language":"python","interrupt_mode":"message",
            "metadata":{"debugger":true}}"#,
    );

    let catalog = DirectoryDiscovery::new(vec![dir.path().to_path_buf()])
        .find_all()
        .expect("discovery must succeed");

    assert_eq!(catalog["python3"].spec.argv, vec!["python3"]);
}
