//! Exit status and output of the `smdp` binary

use std::process::{Command, Output};

use assertables::assert_contains;

fn smdp(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smdp"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

#[test]
fn help() {
    let out = smdp(&["--help"]);
    assert!(out.status.success());
    assert_contains!(stdout(&out), "--add-directory");
}

#[test]
fn no_mode_is_an_error() {
    let out = smdp(&[]);
    assert!(!out.status.success());
}

#[test]
fn unknown_flag_is_an_error() {
    let out = smdp(&["--frobnicate"]);
    assert!(!out.status.success());
    assert_contains!(stderr(&out), "frobnicate");
}

#[test]
fn extension_needs_add_directory() {
    let out = smdp(&["--server", "--extension", "ogg"]);
    assert!(!out.status.success());
    assert_contains!(stderr(&out), "--add-directory");
}

#[test]
fn config_files() {
    let out = smdp(&["--config-files"]);
    assert!(out.status.success());
    assert_contains!(stdout(&out), "smdp.toml");
}

#[test]
fn show_config_names_sources() {
    let out = smdp(&["--show-config", "--idle-timeout", "42"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert_contains!(text, "42");
    assert_contains!(text, "--idle-timeout");
}

#[test]
fn invalid_configuration_is_refused() {
    let out = smdp(&["--server", "--idle-timeout", "0", "-p", "1"]);
    assert!(!out.status.success());
    assert_contains!(stderr(&out), "idle timeout");
}

#[test]
fn admin_modes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("catalog.db");
    let db = db.to_str().unwrap();

    let out = smdp(&["--add-user", "alice", "s3cret", "--database", db]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_contains!(stdout(&out), "alice");

    let music = dir.path().join("music");
    std::fs::create_dir(&music).unwrap();
    std::fs::write(music.join("one.ogg"), b"1").unwrap();
    let out = smdp(&[
        "--add-directory",
        music.to_str().unwrap(),
        "--extension",
        "ogg",
        "--database",
        db,
    ]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_contains!(stdout(&out), "one");
}

#[test]
fn unreachable_server() {
    // Find a port with nothing listening on it
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let out = smdp(&["127.0.0.1", "-p", &port.to_string()]);
    assert!(!out.status.success());
    assert_contains!(stderr(&out), "Could not connect");
}
