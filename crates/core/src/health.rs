use serde::{Deserialize, Serialize};

/// Health codes. Declaration order doubles as severity, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatusCode {
    Healthy,
    Suspended,
    Progressing,
    Degraded,
    Missing,
    Unknown,
}

const HEALTH_ORDER: [HealthStatusCode; 6] = [
    HealthStatusCode::Healthy,
    HealthStatusCode::Suspended,
    HealthStatusCode::Progressing,
    HealthStatusCode::Degraded,
    HealthStatusCode::Missing,
    HealthStatusCode::Unknown,
];

impl HealthStatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Suspended => "Suspended",
            Self::Progressing => "Progressing",
            Self::Degraded => "Degraded",
            Self::Missing => "Missing",
            Self::Unknown => "Unknown",
        }
    }

    pub fn rank(self) -> usize {
        HEALTH_ORDER.iter().position(|c| *c == self).unwrap_or(HEALTH_ORDER.len())
    }
}

impl std::fmt::Display for HealthStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid health status: {0:?}")]
pub struct InvalidHealthStatus(pub String);

impl std::str::FromStr for HealthStatusCode {
    type Err = InvalidHealthStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HEALTH_ORDER.iter().copied().find(|c| c.as_str() == s).ok_or_else(|| InvalidHealthStatus(s.to_string()))
    }
}

/// True when `new` ranks strictly worse than `current`.
pub fn is_worse(current: HealthStatusCode, new: HealthStatusCode) -> bool {
    new.rank() > current.rank()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthStatusCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl HealthStatus {
    pub fn new(status: HealthStatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn healthy() -> Self { Self::new(HealthStatusCode::Healthy, "") }
    pub fn progressing(message: impl Into<String>) -> Self { Self::new(HealthStatusCode::Progressing, message) }
    pub fn degraded(message: impl Into<String>) -> Self { Self::new(HealthStatusCode::Degraded, message) }
}

/// Per-resource entry of an application's status list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub hook: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
}
