#[cfg(test)]
mod tests {
    use harbor_config::schema::*;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.retention_max_age_days, 30);
        assert_eq!(config.retention_interval_secs, 86_400);
        assert_eq!(config.retention_batch_size, 500);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_index_config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.ef_construction, 100);
        assert_eq!(config.ef_search, 64);
    }

    #[test]
    fn test_policy_config_defaults() {
        let config = PolicyConfig::default();
        assert_eq!(config.stressor_threshold, 5);
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.generation_attempts, 3);
        assert_eq!(config.retry_backoff_ms, 500);
        assert!(!config.queue_turns);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    // ── TOML roundtrip tests ───────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = HarborConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: HarborConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            restored.memory.retention_max_age_days,
            config.memory.retention_max_age_days
        );
        assert_eq!(restored.memory.index.ef_search, config.memory.index.ef_search);
        assert_eq!(restored.pipeline.queue_turns, config.pipeline.queue_turns);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[memory]
retention_max_age_days = 14

[pipeline]
queue_turns = true
"#;
        let config: HarborConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.retention_max_age_days, 14);
        assert!(config.pipeline.queue_turns);
        // Defaults should fill in
        assert_eq!(config.memory.retention_batch_size, 500);
        assert_eq!(config.policy.stressor_threshold, 5);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_defaults_clean() {
        let config = HarborConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = HarborConfig::default();
        config.memory.retention_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ef_search() {
        let mut config = HarborConfig::default();
        config.memory.index.ef_search = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_retention() {
        let mut config = HarborConfig::default();
        config.memory.retention_max_age_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_short_interval() {
        let mut config = HarborConfig::default();
        config.memory.retention_interval_secs = 5;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    // ── Loader tests ───────────────────────────────────────────

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harbor.toml");
        std::fs::write(
            &path,
            r#"
[memory]
retention_max_age_days = 7

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let loader = harbor_config::ConfigLoader::load(Some(&path)).unwrap();
        let config = loader.get();
        assert_eq!(config.memory.retention_max_age_days, 7);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep defaults
        assert_eq!(config.pipeline.generation_attempts, 3);
        assert_eq!(loader.path(), path);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");

        let loader = harbor_config::ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().memory.retention_max_age_days, 30);
    }

    #[test]
    fn test_load_rejects_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harbor.toml");
        std::fs::write(
            &path,
            r#"
[memory]
retention_max_age_days = 0
"#,
        )
        .unwrap();

        assert!(harbor_config::ConfigLoader::load(Some(&path)).is_err());
    }
}
