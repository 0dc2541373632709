use predicates::prelude::*;
use std::io::Write;

fn yaml(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[allow(deprecated)]
#[test]
fn config_hash_is_independent_of_key_order() {
    let a = yaml("store:\n  timeout_ms: 750\n  read_retries: 2\n");
    let b = yaml("store:\n  read_retries: 2\n  timeout_ms: 750\n");

    let out_a = assert_cmd::Command::cargo_bin("mkt")
        .unwrap()
        .args(["config-hash", a.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="))
        .get_output()
        .stdout
        .clone();
    let out_b = assert_cmd::Command::cargo_bin("mkt")
        .unwrap()
        .args(["config-hash", b.path().to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(out_a, out_b);
}

#[allow(deprecated)]
#[test]
fn secret_literal_in_config_is_refused() {
    let f = yaml("store:\n  database_url_env: \"postgres://user:pw@host/db\"\n");
    assert_cmd::Command::cargo_bin("mkt")
        .unwrap()
        .args(["config-hash", f.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
}

#[allow(deprecated)]
#[test]
fn db_commands_need_a_database_url() {
    let f = yaml("store:\n  database_url_env: MKT_CLI_TEST_UNSET_URL\n");
    assert_cmd::Command::cargo_bin("mkt")
        .unwrap()
        .env_remove("MKT_CLI_TEST_UNSET_URL")
        .args(["--config", f.path().to_str().unwrap(), "db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MKT_CLI_TEST_UNSET_URL"));
}
