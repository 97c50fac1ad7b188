use qbo_connector::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const KEY_B64: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for key in [
            "QBO_PROFILE",
            "QBO_API_BIND_ADDR",
            "QBO_LOG_LEVEL",
            "QBO_CRYPTO_KEY",
            "QBO_OPERATOR_TOKEN",
            "QBO_OPERATOR_TOKENS",
            "QBO_API_BASE_URL",
            "QBO_MINOR_VERSION",
            "QBO_SCHEDULER_ENABLED",
            "QBO_SCHEDULER_TICK_SECONDS",
        ] {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_only_secrets_present() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_CRYPTO_KEY", KEY_B64);
        env::set_var("QBO_OPERATOR_TOKEN", "op-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader(&temp_dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.qbo.minor_version, "8");
    assert_eq!(cfg.qbo.export_minor_version, "12");
    assert!(cfg.qbo.api_base_url.ends_with('/'));
    assert!(!cfg.scheduler.enabled);
    assert_eq!(cfg.operator_tokens, vec!["op-token".to_string()]);
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "QBO_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(&temp_dir, ".env.test", "QBO_API_BIND_ADDR=192.168.0.10:5000\n");
    write_env_file(&temp_dir, ".env.test.local", "QBO_API_BIND_ADDR=10.0.0.5:6000\n");
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!(
            "QBO_PROFILE=test\nQBO_API_BIND_ADDR=127.0.0.1:4000\nQBO_CRYPTO_KEY={}\n",
            KEY_B64
        ),
    );

    let cfg = loader(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert!(cfg.operator_tokens.is_empty());
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "QBO_API_BIND_ADDR=127.0.0.1:3000\nQBO_OPERATOR_TOKENS=a, b ,,c\nQBO_MINOR_VERSION=40\n",
    );

    unsafe {
        env::set_var("QBO_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("QBO_CRYPTO_KEY", KEY_B64);
        env::set_var("QBO_SCHEDULER_ENABLED", "true");
        env::set_var("QBO_SCHEDULER_TICK_SECONDS", "60");
    }

    let cfg = loader(&temp_dir).load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.operator_tokens, vec!["a", "b", "c"]);
    assert_eq!(cfg.qbo.minor_version, "40");
    assert!(cfg.scheduler.enabled);
    assert_eq!(cfg.scheduler.tick_seconds, 60);

    clear_env();
}

#[test]
fn missing_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_OPERATOR_TOKEN", "op-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCryptoKey));
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_API_BIND_ADDR", "not-an-address");
        env::set_var("QBO_CRYPTO_KEY", KEY_B64);
        env::set_var("QBO_OPERATOR_TOKEN", "op-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
    clear_env();
}

#[test]
fn api_base_without_trailing_slash_fails_to_load() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_CRYPTO_KEY", KEY_B64);
        env::set_var("QBO_OPERATOR_TOKEN", "op-token");
        env::set_var("QBO_API_BASE_URL", "https://quickbooks.api.intuit.com/v3/company");
    }

    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::ApiBaseWithoutTrailingSlash { .. }));
    clear_env();
}
