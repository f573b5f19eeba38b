//! Integration tests for configuration loading from disk

use std::fs;
use std::path::Path;
use vault_cert_agent::loader::{ConfigLoader, EnvSource};
use vault_cert_agent::ConfigError;

const WEB_YAML: &str = r#"
vault:
  addr: https://vault.example.com:8200
  auth:
    method: approle
    role_id: web-role
pki:
  path: pki_int
  role: web
  common_name: web.example.com
output:
  dir: /etc/ssl/web
daemon:
  check_interval: 30m
hooks:
  post_issue:
    - systemctl reload nginx
    - cmd: systemctl restart haproxy
      run_after: "02:00"
      run_before: "04:00"
"#;

const API_JSON: &str = r#"{
  "vault": { "addr": "https://vault.example.com:8200", "auth": { "method": "token" } },
  "pki": { "path": "pki_int", "role": "api", "common_name": "api.example.com" },
  "output": { "dir": "/etc/ssl/api" }
}"#;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn secrets() -> EnvSource {
    EnvSource::fixed([
        ("VAULT_AUTH_TOKEN", "s.env-token"),
        ("VAULT_AUTH_SECRET_ID", "env-secret"),
    ])
}

#[test]
fn test_directory_loading() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web.yaml", WEB_YAML);
    write(dir.path(), "api.json", API_JSON);
    write(dir.path(), "README.md", "not a config");
    fs::create_dir(dir.path().join("archive.yaml")).unwrap();

    let configs = ConfigLoader::new()
        .with_dir(dir.path())
        .with_env(secrets())
        .load()
        .expect("load failed");

    let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["api", "web"]);

    let web = &configs[1];
    assert_eq!(web.vault.auth.role_id.as_deref(), Some("web-role"));
    assert_eq!(web.vault.auth.secret_id.as_deref(), Some("env-secret"));
    assert_eq!(web.hooks.post_issue.len(), 2);
    assert!(web.hooks.post_issue[0].run_after.is_none());
    assert!(web.hooks.post_issue[1].run_after.is_some());
    assert_eq!(web.daemon.check_interval(), std::time::Duration::from_secs(1800));

    let api = &configs[0];
    assert_eq!(api.vault.auth.token.as_deref(), Some("s.env-token"));
}

#[test]
fn test_single_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web.yml", WEB_YAML);

    let configs = ConfigLoader::new()
        .with_file(dir.path().join("web.yml"))
        .with_env(EnvSource::fixed([
            ("VAULT_ADDR", "https://other:8200"),
            ("VAULT_AUTH_SECRET_ID", "s"),
        ]))
        .load()
        .unwrap();

    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].name, "web");
    assert_eq!(configs[0].vault.addr, "https://other:8200");
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.txt", "nothing here");

    let err = ConfigLoader::new().with_dir(dir.path()).load().unwrap_err();
    assert!(matches!(err, ConfigError::NoTenants));
}

#[test]
fn test_duplicate_stem() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web.json", API_JSON);
    write(dir.path(), "web.yaml", WEB_YAML);

    let err = ConfigLoader::new()
        .with_dir(dir.path())
        .with_env(secrets())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateTenant(name) if name == "web"));
}

#[test]
fn test_validation_collects_every_tenant() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web.yaml", &WEB_YAML.replace("method: approle", "method: ldap"));
    write(dir.path(), "api.json", API_JSON);

    // No token in the environment for api, and web uses an unknown method.
    let err = ConfigLoader::new()
        .with_dir(dir.path())
        .with_env(EnvSource::fixed::<String, String>([]))
        .load()
        .unwrap_err();

    match err {
        ConfigError::Invalid(problems) => {
            assert!(problems.iter().any(|p| p.starts_with("[api]") && p.contains("vault.auth.token")));
            assert!(problems.iter().any(|p| p.starts_with("[web]") && p.contains("ldap")));
        }
        other => panic!("Expected Invalid, got {other:?}"),
    }
}

#[test]
fn test_validation_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "api.json", API_JSON);

    let configs = ConfigLoader::new()
        .with_dir(dir.path())
        .with_env(EnvSource::fixed::<String, String>([]))
        .with_validate(false)
        .load()
        .unwrap();
    assert_eq!(configs[0].vault.auth.token, None);
}

#[test]
fn test_parse_error_names_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bad.yaml", "vault: [unterminated");

    let err = ConfigLoader::new().with_dir(dir.path()).load().unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert!(path.ends_with("bad.yaml")),
        other => panic!("Expected Parse, got {other:?}"),
    }
}

#[test]
fn test_invalid_hook_time_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "web.yaml", &WEB_YAML.replace("\"04:00\"", "\"25:00\""));

    let err = ConfigLoader::new()
        .with_dir(dir.path())
        .with_env(secrets())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
