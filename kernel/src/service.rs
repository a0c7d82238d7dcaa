use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which requests analytics metrics are aggregated for.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricsLevel {
    #[default]
    Disabled,
    Service,
    ServiceAndApi,
}

impl std::fmt::Display for MetricsLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetricsLevel::Disabled => "DISABLED",
            MetricsLevel::Service => "SERVICE",
            MetricsLevel::ServiceAndApi => "SERVICE_AND_API",
        };
        f.write_str(s)
    }
}

/// Settings of one metrics aggregation window.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct MetricsProperties {
    /// Analytics schema version
    pub version: String,
    /// Aggregation level
    pub level: MetricsLevel,
    /// Days to keep the metrics, forever when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

impl Default for MetricsProperties {
    fn default() -> Self {
        Self {
            version: "1.0".to_owned(),
            level: MetricsLevel::Disabled,
            retention_days: None,
        }
    }
}

/// Account level settings of the file service.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceProperties {
    /// Hourly aggregated metrics
    #[serde(default)]
    pub hour_metrics: MetricsProperties,
    /// Per minute aggregated metrics
    #[serde(default)]
    pub minute_metrics: MetricsProperties,
}
