//! Exporter selection: a pull endpoint or a push collector, never both.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::raw::{RawExport, RawInterval, RawOtelExport, RawPrometheusExport};
use super::resolve::{ResolveContext, ResolveResult};

pub const DEFAULT_PULL_PORT: u16 = 9090;
pub const DEFAULT_PULL_PATH: &str = "/metrics";
pub const DEFAULT_PUSH_HOST: &str = "localhost";
pub const DEFAULT_GRPC_PORT: u16 = 4317;
pub const DEFAULT_HTTP_PORT: u16 = 4318;
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SERVICE_NAME: &str = "otelbox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExportConfig {
    Pull(PullConfig),
    Push(PushConfig),
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::Pull(PullConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullConfig {
    pub port: u16,
    pub path: String,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PULL_PORT,
            path: DEFAULT_PULL_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Grpc,
    Http,
}

impl Transport {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Grpc => DEFAULT_GRPC_PORT,
            Self::Http => DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushConfig {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub read_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub push_interval: Duration,
    pub resource: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl PushConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn resolve_export(raw: &RawExport) -> ResolveResult<ExportConfig> {
    let pull = raw
        .prometheus
        .as_ref()
        .filter(|section| section.enabled.unwrap_or(true));
    let push = raw
        .otel
        .as_ref()
        .filter(|section| section.enabled.unwrap_or(true));

    match (pull, push) {
        (Some(_), Some(_)) => Err(ResolveContext::root()
            .push("export", "prometheus")
            .error("only one exporter can be enabled at a time (prometheus or otel)")),
        (Some(pull), None) => resolve_pull(pull).map(ExportConfig::Pull),
        (None, Some(push)) => resolve_push(push).map(ExportConfig::Push),
        (None, None) => Ok(ExportConfig::default()),
    }
}

fn port(value: Option<i64>, default: u16, ctx: &ResolveContext) -> ResolveResult<u16> {
    match value {
        None => Ok(default),
        Some(port) => u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| ctx.error(format!("invalid port {port} (must be 1-65535)"))),
    }
}

fn resolve_pull(raw: &RawPrometheusExport) -> ResolveResult<PullConfig> {
    let ctx = ResolveContext::root().push("export", "prometheus");
    let port = port(raw.port, DEFAULT_PULL_PORT, &ctx)?;
    let path = raw
        .path
        .clone()
        .unwrap_or_else(|| DEFAULT_PULL_PATH.to_string());
    if !path.starts_with('/') {
        return Err(ctx.error(format!("invalid path {path:?} (must start with /)")));
    }
    Ok(PullConfig { port, path })
}

fn resolve_push(raw: &RawOtelExport) -> ResolveResult<PushConfig> {
    let ctx = ResolveContext::root().push("export", "otel");

    let transport = match raw.transport.as_deref() {
        None | Some("grpc") => Transport::Grpc,
        Some("http") => Transport::Http,
        Some(other) => {
            return Err(ctx.error(format!(
                "invalid transport {other:?} (must be grpc or http)"
            )))
        }
    };

    let host = raw
        .host
        .clone()
        .unwrap_or_else(|| DEFAULT_PUSH_HOST.to_string());
    if host.is_empty() {
        return Err(ctx.error("host cannot be empty"));
    }
    let port = port(raw.port, transport.default_port(), &ctx)?;

    let (read, push) = match &raw.interval {
        None => (None, None),
        Some(RawInterval::Simple(interval)) => (Some(*interval), Some(*interval)),
        Some(RawInterval::Detailed(forms)) => (forms.read, forms.push),
    };
    let read_interval = read.unwrap_or(DEFAULT_PUSH_INTERVAL);
    let push_interval = push.unwrap_or(DEFAULT_PUSH_INTERVAL);
    if read_interval.is_zero() || push_interval.is_zero() {
        return Err(ctx.error("interval must be greater than 0"));
    }

    let mut resource: BTreeMap<String, String> = raw
        .resource
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    resource
        .entry("service.name".to_string())
        .or_insert_with(|| DEFAULT_SERVICE_NAME.to_string());
    resource
        .entry("service.version".to_string())
        .or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());

    let headers = raw
        .headers
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(PushConfig {
        transport,
        host,
        port,
        read_interval,
        push_interval,
        resource,
        headers,
    })
}
