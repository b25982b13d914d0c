use std::io::Write;
use std::time::Duration;

use clap::Parser;
use hyperjson_client::ClientBuilder;
use hyperjson_client::config::{self, CliArgs, LoadError, LogFormat};
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn args(file: &NamedTempFile, extra: &[&str]) -> CliArgs {
    let path = file.path().to_str().expect("utf-8 temp path");
    let mut argv = vec!["hyperjson", "--config-file", path];
    argv.extend_from_slice(extra);
    argv.push("root");
    CliArgs::parse_from(argv)
}

#[test]
#[serial]
fn file_values_are_loaded() {
    let file = config_file(
        r#"
[client]
api_root = "https://api.example.com/v1/"
max_size = 25
timeout_seconds = 3
user = "svc"
password = "pw"

[client.headers]
accept = "application/json"

[chaos]
enabled = true
weight = 0.25

[logging]
level = "debug"
json = true
"#,
    );

    let settings = config::load(&args(&file, &[])).expect("settings load");

    assert_eq!(settings.client.api_root.as_str(), "https://api.example.com/v1/");
    assert_eq!(settings.client.max_size.get(), 25);
    assert_eq!(settings.client.timeout, Duration::from_secs(3));
    assert_eq!(
        settings.client.credentials,
        Some(("svc".to_string(), "pw".to_string()))
    );
    assert_eq!(
        settings.client.headers,
        vec![("accept".to_string(), "application/json".to_string())]
    );
    assert!(settings.chaos.enabled);
    assert_eq!(settings.chaos.weight, 0.25);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
#[serial]
fn environment_overrides_file_and_cli_overrides_environment() {
    let file = config_file(
        r#"
[client]
api_root = "https://file.example.com/"
max_size = 10
"#,
    );

    // SAFETY: serialized with every other test that touches the environment.
    unsafe {
        std::env::set_var("HYPERJSON__CLIENT__MAX_SIZE", "20");
        std::env::set_var("HYPERJSON__CLIENT__API_ROOT", "https://env.example.com/");
    }
    let from_env = config::load(&args(&file, &[]));
    let from_cli = config::load(&args(&file, &["--max-size", "30"]));
    unsafe {
        std::env::remove_var("HYPERJSON__CLIENT__MAX_SIZE");
        std::env::remove_var("HYPERJSON__CLIENT__API_ROOT");
    }

    let from_env = from_env.expect("env settings load");
    assert_eq!(from_env.client.max_size.get(), 20);
    assert_eq!(from_env.client.api_root.as_str(), "https://env.example.com/");

    assert_eq!(from_cli.expect("cli settings load").client.max_size.get(), 30);
}

#[test]
#[serial]
fn invalid_values_name_their_key() {
    let file = config_file(
        r#"
[client]
api_root = "https://api.example.com/"

[logging]
level = "loud"
"#,
    );

    let err = config::load(&args(&file, &[])).expect_err("bad level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    let args = CliArgs::parse_from([
        "hyperjson",
        "--config-file",
        "/nonexistent/hyperjson.toml",
        "root",
    ]);
    assert!(matches!(config::load(&args), Err(LoadError::Build(_))));
}

#[tokio::test]
#[serial]
async fn settings_build_a_client() {
    let file = config_file(
        r#"
[client]
api_root = "https://api.example.com/v1/"
max_size = 2

[chaos]
enabled = true
"#,
    );
    let settings = config::load(&args(&file, &[])).expect("settings load");

    let client = ClientBuilder::from_settings(&settings)
        .expect("builder from settings")
        .build()
        .expect("client builds");

    assert_eq!(client.api_root().as_str(), "https://api.example.com/v1/");
    assert_eq!(client.cache().capacity(), 2);
}
