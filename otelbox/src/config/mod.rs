//! Configuration compiler: document → raw model → expansion → resolution.

pub mod expand;
pub mod export;
pub mod iterator;
pub mod raw;
pub mod resolve;
pub mod settings;
pub mod types;

pub use expand::ExpansionError;
pub use export::{ExportConfig, PullConfig, PushConfig, Transport};
pub use raw::RawConfig;
pub use resolve::{ResolveContext, ResolveError};
pub use settings::{InternalMetricsConfig, InternalMetricsFormat, SettingsConfig};
pub use types::{
    ClockConfig, Config, InstanceRegistry, MetricConfig, MetricKind, MetricNames, ResetConfig,
    SourceConfig, TransformConfig, ValueConfig,
};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Syntax { message: String },

    #[error("Expansion failed: {0}")]
    Expansion(#[from] ExpansionError),

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolveError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl Format {
    /// `.toml` files are TOML; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Parses a document into the raw model and runs the structural checks.
pub fn parse_str(text: &str, format: Format) -> ConfigResult<RawConfig> {
    let raw: RawConfig = match format {
        Format::Yaml => serde_yaml::from_str(text)?,
        Format::Toml => toml::from_str(text)?,
    };
    raw::validate_raw(&raw).map_err(|message| ConfigError::Syntax { message })?;
    Ok(raw)
}

/// Expands and resolves a parsed document.
pub fn compile(mut raw: RawConfig) -> ConfigResult<Config> {
    debug!("Expanding iterators");
    expand::expand(&mut raw)?;
    debug!(metrics = raw.metrics.len(), "Expansion complete");

    Ok(resolve::resolve(&raw)?)
}

pub fn from_str(text: &str, format: Format) -> ConfigResult<Config> {
    compile(parse_str(text, format)?)
}

/// Reads, expands and resolves the document at `path`.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = from_str(&text, Format::from_path(path))?;
    info!(path = %path.display(), metrics = config.metrics.len(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("box.toml")), Format::Toml);
        assert_eq!(Format::from_path(Path::new("box.TOML")), Format::Toml);
        assert_eq!(Format::from_path(Path::new("box.yaml")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("box")), Format::Yaml);
    }

    #[test]
    fn test_error_taxonomy() {
        let syntax = from_str("metrics: [{name: x, colour: red}]", Format::Yaml).unwrap_err();
        assert!(matches!(syntax, ConfigError::Yaml(_)));

        let empty = from_str("metrics: []", Format::Yaml).unwrap_err();
        assert!(matches!(empty, ConfigError::Syntax { .. }));

        let expansion = from_str(
            "metrics: [{name: 'x_{zone}', type: gauge, description: d}]",
            Format::Yaml,
        )
        .unwrap_err();
        assert!(matches!(expansion, ConfigError::Expansion(_)));

        let resolution =
            from_str("metrics: [{name: x, type: gauge, description: d}]", Format::Yaml)
                .unwrap_err();
        assert!(matches!(resolution, ConfigError::Resolution(_)));
    }

    #[test]
    fn test_toml_document() {
        let config = from_str(
            r#"
[[instances.clocks]]
name = "c1"
type = "periodic"
interval = "1s"

[[metrics]]
name = "jobs_total"
type = "counter"
description = "Jobs"
value = { source = { type = "random_int", min = 0, max = 3, clock = { instance = "c1" } }, transforms = ["accumulate"] }

[export.otel]
transport = "http"
"#,
            Format::Toml,
        )
        .unwrap();

        assert_eq!(config.metrics[0].value.source.clock_ref.as_deref(), Some("c1"));
        assert!(matches!(config.export, ExportConfig::Push(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load("/nonexistent/otelbox.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/otelbox.yaml"));
    }
}
