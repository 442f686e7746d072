use serde::Serialize;

use super::raw::RawSettings;
use super::resolve::{ResolveContext, ResolveResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalMetricsFormat {
    #[default]
    Prometheus,
    Otel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InternalMetricsConfig {
    pub enabled: bool,
    pub format: InternalMetricsFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsConfig {
    /// Master seed; `None` seeds from the wall clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub internal_metrics: InternalMetricsConfig,
}

pub fn resolve_settings(raw: &RawSettings) -> ResolveResult<SettingsConfig> {
    let format = match raw.internal_metrics.format.as_deref() {
        None | Some("prometheus") => InternalMetricsFormat::Prometheus,
        Some("otel") => InternalMetricsFormat::Otel,
        Some(other) => {
            return Err(ResolveContext::root()
                .push("settings", "internal_metrics")
                .error(format!(
                    "invalid format {other:?} (must be prometheus or otel)"
                )))
        }
    };

    Ok(SettingsConfig {
        seed: raw.seed,
        internal_metrics: InternalMetricsConfig {
            enabled: raw.internal_metrics.enabled,
            format,
        },
    })
}
