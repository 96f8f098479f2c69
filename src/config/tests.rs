//! Configuration Module Tests

use pretty_assertions::assert_eq;

use super::*;

const COMPLETE: &str = r#"
[bridge]
name = "orders"

[rabbitmq]
host = "mq.example.com"
port = 5672
vhost = "/"
exchange = "ex1"
exchange_type = "direct"
username = "guest"
password = "guest"

[postgres]
host = "db.example.com"
port = 5432
database = "shop"
channel = "orders_events"
username = "shop"
password = "secret"
"#;

#[test]
fn test_parse_complete_config() {
    let config = BridgeConfig::parse(COMPLETE).unwrap();
    assert_eq!(config.name, "orders");
    assert_eq!(config.rabbitmq.host, "mq.example.com");
    assert_eq!(config.rabbitmq.port, 5672);
    assert_eq!(config.rabbitmq.vhost, "/");
    assert_eq!(config.rabbitmq.exchange, "ex1");
    assert_eq!(config.rabbitmq.exchange_type, "direct");
    assert_eq!(config.rabbitmq.queue, None);
    assert_eq!(config.postgres.port, 5432);
    assert_eq!(config.postgres.channel, "orders_events");
}

#[test]
fn test_optional_queue() {
    let content = COMPLETE.replace("exchange = \"ex1\"", "exchange = \"ex1\"\nqueue = \"work\"");
    let config = BridgeConfig::parse(&content).unwrap();
    assert_eq!(config.rabbitmq.queue.as_deref(), Some("work"));
}

#[test]
fn test_empty_exchange_is_allowed() {
    // An empty exchange value targets the broker's default exchange; only
    // the key itself is required.
    let content = COMPLETE.replace("exchange = \"ex1\"", "exchange = \"\"");
    let config = BridgeConfig::parse(&content).unwrap();
    assert_eq!(config.rabbitmq.exchange, "");
}

#[test]
fn test_missing_keys_are_enumerated() {
    let content = r#"
[bridge]
name = "partial"

[rabbitmq]
host = "mq.example.com"

[postgres]
host = "db.example.com"
"#;
    let err = BridgeConfig::parse(content).unwrap_err();
    match err {
        ConfigError::MissingKeys { keys, .. } => {
            assert!(keys.contains(&"rabbitmq.port"));
            assert!(keys.contains(&"rabbitmq.vhost"));
            assert!(keys.contains(&"rabbitmq.exchange"));
            assert!(keys.contains(&"rabbitmq.exchange_type"));
            assert!(keys.contains(&"rabbitmq.username"));
            assert!(keys.contains(&"rabbitmq.password"));
            assert!(keys.contains(&"postgres.port"));
            assert!(keys.contains(&"postgres.database"));
            assert!(keys.contains(&"postgres.channel"));
            assert!(keys.contains(&"postgres.username"));
            assert!(keys.contains(&"postgres.password"));
            assert!(!keys.contains(&"bridge.name"));
            assert!(!keys.contains(&"rabbitmq.host"));
            assert!(!keys.contains(&"postgres.host"));
        }
        other => panic!("expected MissingKeys, got {:?}", other),
    }
}

#[test]
fn test_empty_value_counts_as_missing() {
    let content = COMPLETE.replace("name = \"orders\"", "name = \"\"");
    let err = BridgeConfig::parse(&content).unwrap_err();
    match err {
        ConfigError::MissingKeys { keys, .. } => assert_eq!(keys, vec!["bridge.name"]),
        other => panic!("expected MissingKeys, got {:?}", other),
    }
}

#[test]
fn test_channel_must_be_identifier() {
    let content = COMPLETE.replace(
        "channel = \"orders_events\"",
        "channel = \"orders; DROP TABLE x\"",
    );
    let err = BridgeConfig::parse(&content).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_sql_identifier_rules() {
    assert!(is_sql_identifier("orders_events"));
    assert!(is_sql_identifier("_private"));
    assert!(is_sql_identifier("c42"));
    assert!(!is_sql_identifier("42c"));
    assert!(!is_sql_identifier("with space"));
    assert!(!is_sql_identifier("with\"quote"));
    assert!(!is_sql_identifier(""));
}

#[test]
fn test_env_var_substitution() {
    std::env::set_var("PGRELAY_TEST_PASSWORD", "s3cret");
    let result = substitute_env_vars("password = \"${PGRELAY_TEST_PASSWORD}\"");
    assert_eq!(result, "password = \"s3cret\"");

    let result = substitute_env_vars("host = \"${PGRELAY_TEST_UNSET:-localhost}\"");
    assert_eq!(result, "host = \"localhost\"");
}

#[test]
fn test_load_all_from_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.toml"), COMPLETE).unwrap();
    std::fs::write(
        dir.path().join("b.toml"),
        COMPLETE.replace("name = \"orders\"", "name = \"invoices\""),
    )
    .unwrap();

    let pattern = format!("{}/*.toml", dir.path().display());
    let configs = load_all(&[pattern]).unwrap();
    assert_eq!(configs.len(), 2);
    let mut names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["invoices", "orders"]);
}

#[test]
fn test_load_all_rejects_duplicate_names() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.toml"), COMPLETE).unwrap();
    std::fs::write(dir.path().join("b.toml"), COMPLETE).unwrap();

    let pattern = format!("{}/*.toml", dir.path().display());
    let err = load_all(&[pattern]).unwrap_err();
    match err {
        ConfigError::DuplicateName(name) => assert_eq!(name, "orders"),
        other => panic!("expected DuplicateName, got {:?}", other),
    }
}

#[test]
fn test_unmatched_pattern_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/missing-*.toml", dir.path().display());
    let err = load_all(&[pattern.clone()]).unwrap_err();
    assert!(matches!(err, ConfigError::NoMatches(p) if p == pattern));
}
