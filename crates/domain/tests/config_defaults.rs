use rr_domain::config::RelayConfig;

#[test]
fn default_tool_iteration_cap() {
    let config = RelayConfig::default();
    assert_eq!(config.queues.max_tool_iterations, 25);
    assert_eq!(config.queues.usage_events_per_iteration, 4);
}

#[test]
fn billing_capacity_covers_a_full_run() {
    let config = RelayConfig::default();
    assert_eq!(config.queues.billing_capacity(), 100);
}

#[test]
fn explicit_queue_sizes_parse() {
    let toml_str = r#"
[queues]
max_tool_iterations = 10
usage_events_per_iteration = 2
history_capacity = 32
"#;
    let config: RelayConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.queues.billing_capacity(), 20);
    assert_eq!(config.queues.history_capacity, 32);
    // Unset fields keep their defaults.
    assert_eq!(config.queues.ui_capacity, 128);
}

#[test]
fn masking_patterns_default_empty() {
    let config = RelayConfig::default();
    assert!(config.masking.extra_patterns.is_empty());
}

#[test]
fn masking_extra_patterns_parse() {
    let toml_str = r#"
[masking]
extra_patterns = ["internal-[a-z0-9]{16}"]
"#;
    let config: RelayConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.masking.extra_patterns.len(), 1);
}
