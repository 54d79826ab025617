//! Configuration Loader
//!
//! Layered experiment configuration: the serialized defaults form the base,
//! YAML files are merged over it in order, then dotted `key.path=value`
//! overrides are applied. The result is deserialized back into
//! [`ExperimentConfig`] and validated.

use super::error::{ConfigResult, ConfigurationError};
use super::ExperimentConfig;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit

/// Builder collecting configuration layers
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    documents: Vec<(String, String)>,
    overrides: Vec<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a YAML file over the defaults
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.files.push(path.into());
        self
    }

    /// Merge an in-memory YAML document, merged after all files
    pub fn with_yaml<N: Into<String>, Y: Into<String>>(mut self, source_name: N, yaml: Y) -> Self {
        self.documents.push((source_name.into(), yaml.into()));
        self
    }

    /// Apply a `key.path=value` override after every document
    pub fn with_override<S: Into<String>>(mut self, override_text: S) -> Self {
        self.overrides.push(override_text.into());
        self
    }

    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.extend(overrides.into_iter().map(Into::into));
        self
    }

    /// Merge every layer and return the validated configuration
    pub fn load(&self) -> ConfigResult<ExperimentConfig> {
        let mut merged = serde_yaml::to_value(ExperimentConfig::default())
            .map_err(ConfigurationError::serialization_error)?;

        for path in &self.files {
            let content = read_config_file_safely(path)?;
            let layer = parse_layer(&path.display().to_string(), &content)?;
            debug!(file = %path.display(), "Merging configuration file");
            merge_yaml_values(&mut merged, layer, "")?;
        }

        for (source_name, yaml) in &self.documents {
            let layer = parse_layer(source_name, yaml)?;
            debug!(source = %source_name, "Merging configuration document");
            merge_yaml_values(&mut merged, layer, "")?;
        }

        for override_text in &self.overrides {
            apply_override(&mut merged, override_text)?;
        }

        let config: ExperimentConfig = serde_yaml::from_value(merged).map_err(|e| {
            ConfigurationError::invalid_yaml(
                "<merged>",
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;
        config.validate()?;

        crate::log_config!(debug, "Experiment configuration loaded",
            files: self.files.len(),
            overrides: self.overrides.len()
        );

        Ok(config)
    }
}

/// Load the defaults, optionally merged with one YAML file and overrides
pub fn load_experiment_config(
    path: Option<&Path>,
    overrides: &[String],
) -> ConfigResult<ExperimentConfig> {
    let mut loader = ConfigLoader::new().with_overrides(overrides.iter().cloned());
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load()
}

/// Set the value at a dotted key path, e.g. `solver_args.max_epochs=2`.
///
/// The right-hand side is parsed as a YAML scalar or flow collection, so
/// `[1, 2]`, `true` and `''` behave as they would in a file. Every key on
/// the path must already exist.
pub fn apply_override(target: &mut YamlValue, override_text: &str) -> ConfigResult<()> {
    let (key_path, raw_value) = override_text.split_once('=').ok_or_else(|| {
        ConfigurationError::invalid_override(override_text, "expected key.path=value")
    })?;
    let key_path = key_path.trim();
    if key_path.is_empty() {
        return Err(ConfigurationError::invalid_override(
            override_text,
            "empty key path",
        ));
    }

    let value: YamlValue = if raw_value.trim().is_empty() {
        YamlValue::String(String::new())
    } else {
        serde_yaml::from_str(raw_value)
            .map_err(|e| ConfigurationError::invalid_override(override_text, e.to_string()))?
    };

    let mut current = target;
    let segments: Vec<&str> = key_path.split('.').collect();
    for (depth, segment) in segments.iter().enumerate() {
        let visited = segments[..=depth].join(".");
        let map = match current {
            YamlValue::Mapping(map) => map,
            _ => {
                return Err(ConfigurationError::invalid_override(
                    override_text,
                    format!("'{}' is not a mapping", segments[..depth].join(".")),
                ))
            }
        };
        current = map
            .get_mut(YamlValue::String((*segment).to_string()))
            .ok_or_else(|| ConfigurationError::unknown_field(visited))?;
    }

    debug!(key = %key_path, "Applying configuration override");
    *current = value;
    Ok(())
}

/// Read a configuration file with a size limit
fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigurationError::config_file_not_found(vec![path.to_path_buf()])
        } else {
            ConfigurationError::file_read_error(path.display().to_string(), e)
        }
    })?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigurationError::invalid_value(
            "file_size",
            metadata.len().to_string(),
            format!(
                "Configuration file too large ({}MB > {}MB limit)",
                metadata.len() / (1024 * 1024),
                MAX_CONFIG_FILE_SIZE / (1024 * 1024)
            ),
        ));
    }

    if !metadata.is_file() {
        return Err(ConfigurationError::invalid_value(
            "file_type",
            "directory or special file".to_string(),
            "Configuration path must point to a regular file",
        ));
    }

    std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
}

fn parse_layer(source_name: &str, content: &str) -> ConfigResult<YamlValue> {
    let value: YamlValue = serde_yaml::from_str(content)
        .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;
    match value {
        // an empty document leaves the base untouched
        YamlValue::Null => Ok(YamlValue::Mapping(Default::default())),
        YamlValue::Mapping(_) => Ok(value),
        _ => Err(ConfigurationError::invalid_yaml(
            source_name,
            "top level must be a mapping",
        )),
    }
}

/// Recursively merge `override_value` into `base`. Keys absent from `base`
/// are unknown fields.
fn merge_yaml_values(
    base: &mut YamlValue,
    override_value: YamlValue,
    path: &str,
) -> ConfigResult<()> {
    match (&mut *base, override_value) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
            for (key, value) in override_map {
                let key_name = match &key {
                    YamlValue::String(s) => s.clone(),
                    other => {
                        return Err(ConfigurationError::merge_error(format!(
                            "non-string key {other:?} under '{path}'"
                        )))
                    }
                };
                let child_path = if path.is_empty() {
                    key_name
                } else {
                    format!("{path}.{key_name}")
                };
                match base_map.get_mut(&key) {
                    Some(existing_value) => merge_yaml_values(existing_value, value, &child_path)?,
                    None => return Err(ConfigurationError::unknown_field(child_path)),
                }
            }
        }
        // `section:` with no body leaves the section as it was
        (YamlValue::Mapping(_), YamlValue::Null) => {}
        (YamlValue::Mapping(_), _) => {
            return Err(ConfigurationError::merge_error(format!(
                "cannot replace mapping '{path}' with a scalar"
            )));
        }
        (base_ref, override_val) => {
            // Non-mapping values are replaced wholesale
            *base_ref = override_val;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PARTIAL_CONFIG: &str = r#"
# Only the values that differ from the defaults
data_source_args:
  dataset_map_provider_class_type: JsonIndexDatasetMapProvider
  dataset_map_provider_JsonIndexDatasetMapProvider_args:
    category: teddybear
    limit_sequences_to: 3
solver_args:
  milestones: [100, 200]
  max_epochs: 300
exp_dir: /tmp/teddybear
"#;

    fn setup_test_config_file() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("experiment.yaml");
        fs::write(&config_file, PARTIAL_CONFIG).unwrap();
        (temp_dir, config_file)
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let (_temp_dir, config_file) = setup_test_config_file();

        let config = ConfigLoader::new().with_file(&config_file).load().unwrap();

        let dataset_args = &config.data_source_args.dataset_map_provider_json_index_args;
        assert_eq!(dataset_args.category, "teddybear");
        assert_eq!(dataset_args.limit_sequences_to, 3);
        // untouched defaults survive
        assert_eq!(dataset_args.task_str, "singlesequence");
        assert_eq!(config.solver_args.milestones, vec![100, 200]);
        assert_eq!(config.solver_args.max_epochs, 300);
        assert_eq!(config.solver_args.breed, "Adam");
        assert_eq!(config.exp_dir, "/tmp/teddybear");
    }

    #[test]
    fn test_overrides_apply_after_files() {
        let (_temp_dir, config_file) = setup_test_config_file();

        let config = load_experiment_config(
            Some(&config_file),
            &[
                "solver_args.max_epochs=2".to_string(),
                "data_source_args.data_loader_map_provider_SequenceDataLoaderMapProvider_args.dataset_len=1".to_string(),
                "model_args.scene_center_init=[1.0, 2.0, 3.0]".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(config.solver_args.max_epochs, 2);
        assert_eq!(
            config
                .data_source_args
                .data_loader_map_provider_sequence_args
                .dataset_len,
            1
        );
        assert_eq!(config.model_args.scene_center_init, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unknown_field_in_file_is_rejected() {
        let result = ConfigLoader::new()
            .with_yaml("inline", "solver_args:\n  learning_rate: 0.1\n")
            .load();

        match result {
            Err(ConfigurationError::UnknownField { field }) => {
                assert_eq!(field, "solver_args.learning_rate");
            }
            other => panic!("Expected UnknownField error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_override_forms() {
        let mut value = serde_yaml::to_value(ExperimentConfig::default()).unwrap();

        assert!(matches!(
            apply_override(&mut value, "solver_args.max_epochs"),
            Err(ConfigurationError::InvalidOverride { .. })
        ));
        assert!(matches!(
            apply_override(&mut value, "solver_args.nope=1"),
            Err(ConfigurationError::UnknownField { .. })
        ));
        assert!(matches!(
            apply_override(&mut value, "solver_args.lr.inner=1"),
            Err(ConfigurationError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn test_empty_override_value_is_empty_string() {
        let config = ConfigLoader::new()
            .with_override("data_source_args.dataset_map_provider_JsonIndexDatasetMapProvider_args.category=")
            .load()
            .unwrap();
        assert_eq!(
            config.data_source_args.dataset_map_provider_json_index_args.category,
            ""
        );
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let result = ConfigLoader::new()
            .with_override("solver_args.max_epochs=lots")
            .load();
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        let result = ConfigLoader::new().with_file(&missing).load();
        match result {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                assert_eq!(searched_paths, vec![missing]);
            }
            other => panic!("Expected ConfigFileNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let result = ConfigLoader::new()
            .with_override("solver_args.lr=-0.5")
            .load();
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_document_keeps_defaults() {
        let config = ConfigLoader::new().with_yaml("empty", "").load().unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }
}
