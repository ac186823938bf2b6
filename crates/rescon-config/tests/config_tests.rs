// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for container configuration and descriptor loading.

use std::io::Write;
use std::time::Duration;

use rescon_config::diagnostic::{ConfigError, suggest_key};
use rescon_config::model::ContainerConfig;
use rescon_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_str, load_descriptors,
};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_container_config() {
    let toml = r#"
[container]
log_level = "debug"
descriptor_path = "/etc/rescon/bundles.toml"

[dispatch]
timeout_ms = 2500

[discovery]
event_buffer = 64
update_buffer = 8

[bundles]
default_interface = "oic.if.s"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.container.log_level, "debug");
    assert_eq!(
        config.container.descriptor_path.as_deref(),
        Some(std::path::Path::new("/etc/rescon/bundles.toml"))
    );
    assert_eq!(config.dispatch.timeout(), Duration::from_millis(2500));
    assert_eq!(config.discovery.event_buffer, 64);
    assert_eq!(config.discovery.update_buffer, 8);
    assert_eq!(config.bundles.default_interface, "oic.if.s");
}

/// Missing sections fall back to compiled defaults.
#[test]
fn serialized_defaults_are_sensible() {
    let config = load_config_from_str("").expect("empty config should load");
    assert_eq!(config, ContainerConfig::default());
    assert_eq!(config.container.log_level, "info");
    assert_eq!(config.dispatch.timeout_ms, 10_000);
    assert_eq!(config.bundles.default_interface, "oic.if.baseline");
    assert!(config.container.descriptor_path.is_none());
}

/// Dotted overrides reach underscore-containing keys (what the env mapping produces).
#[test]
fn dotted_override_sets_timeout() {
    use figment::{Figment, providers::Serialized};

    let config: ContainerConfig = Figment::new()
        .merge(Serialized::defaults(ContainerConfig::default()))
        .merge(("dispatch.timeout_ms", 42))
        .extract()
        .expect("should merge override");

    assert_eq!(config.dispatch.timeout_ms, 42);
}

#[test]
fn unknown_field_in_dispatch_produces_error() {
    let err = load_config_from_str("[dispatch]\ntimout_ms = 5\n").expect_err("should reject");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("timout_ms"),
        "got: {err_str}"
    );
}

#[test]
fn diagnostic_error_suggests_known_key() {
    let errors = load_and_validate_str("[dispatch]\ntimout_ms = 5\n").unwrap_err();
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, .. }
            if key == "timout_ms" && suggestion.as_deref() == Some("timeout_ms"))
    });
    assert!(found, "expected a suggestion, got {errors:?}");
}

#[test]
fn diagnostic_invalid_type_message() {
    let errors = load_and_validate_str("[dispatch]\ntimeout_ms = \"soon\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "{errors:?}"
    );
}

#[test]
fn suggest_key_handles_section_names() {
    assert_eq!(
        suggest_key("discovry", &["container", "dispatch", "discovery", "bundles"]),
        Some("discovery".to_string())
    );
}

#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let error = ConfigError::UnknownKey {
        key: "timout_ms".to_string(),
        suggestion: Some("timeout_ms".to_string()),
        valid_keys: "timeout_ms".to_string(),
        span: None,
        src: None,
    };

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("timout_ms"));
}

#[test]
fn load_and_validate_rejects_zero_timeout() {
    let errors = load_and_validate_str("[dispatch]\ntimeout_ms = 0\n").unwrap_err();
    assert_eq!(errors.len(), 1);
}

#[test]
fn load_and_validate_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[dispatch]\ntimeout_ms = 750").unwrap();
    let config = load_and_validate_path(file.path()).expect("file should load");
    assert_eq!(config.dispatch.timeout_ms, 750);
}

#[test]
fn descriptors_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundles.toml");
    std::fs::write(
        &path,
        r#"
[[bundle]]
id = "b1"
path = "./b1.so"
activator = "b1::Activator"

[[bundle.resource]]
uri = "/res/temp"
resource_type = "oic.r.temperature"
"#,
    )
    .unwrap();

    let descriptors = load_descriptors(&path).expect("descriptor file should load");
    assert_eq!(descriptors.source(), Some(path.as_path()));
    assert_eq!(descriptors.bundles().len(), 1);
    assert_eq!(descriptors.bundles()[0].resources[0].uri, "/res/temp");
}

#[test]
fn missing_descriptor_file_is_a_descriptor_error() {
    let errors = load_descriptors(std::path::Path::new("/nonexistent/bundles.toml")).unwrap_err();
    assert!(matches!(errors[0], ConfigError::Descriptor { .. }));
}
