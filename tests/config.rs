use livetodo::{
    config::{AppConfig, ConfigError, ConnectionConfig},
    plan::reorder::Placement,
};

#[test]
fn defaults_are_valid_and_in_memory() {
    let config = AppConfig::default();
    config.validate().expect("default config");
    assert_eq!(config.journal_path, None);
    assert_eq!(config.placement, Placement::Top);
    assert_eq!(config.connection.namespace(), "livetodo-local/todos");
}

#[test]
fn json_overrides_only_what_it_names() {
    let raw = r#"{
        "connection": {
            "project_id": "demo",
            "api_key": "k",
            "endpoint": "https://example.invalid"
        },
        "placement": "bottom",
        "runtime": { "batch_max_ops": 8 }
    }"#;

    let config = AppConfig::from_json_str(raw).expect("parse");
    assert_eq!(config.connection.collection, "todos");
    assert_eq!(config.connection.namespace(), "demo/todos");
    assert_eq!(config.placement, Placement::Bottom);
    assert_eq!(config.runtime.batch_max_ops, 8);
    assert_eq!(config.runtime.persist_queue_bound, 64);
}

#[test]
fn invalid_configs_are_rejected() {
    assert!(matches!(
        AppConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));

    let blank_project = AppConfig {
        connection: ConnectionConfig {
            project_id: "  ".to_string(),
            ..ConnectionConfig::default()
        },
        ..AppConfig::default()
    };
    assert!(matches!(
        blank_project.validate(),
        Err(ConfigError::Empty { field: "project_id" })
    ));

    let raw = r#"{ "runtime": { "persist_queue_bound": 0 } }"#;
    assert!(matches!(
        AppConfig::from_json_str(raw),
        Err(ConfigError::ZeroQueueBound)
    ));
}
