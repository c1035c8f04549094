use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission level of a challenge participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Role::Member),
            "moderator" => Ok(Role::Moderator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Stable identifier of a measurement, generated at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementId(pub String);

impl MeasurementId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded weight for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub username: String,
    pub recorded_at: DateTime<Utc>,
    pub weight_kg: f64,
    pub photo_ref: Option<String>,
}

/// A measurement that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub username: String,
    pub recorded_at: DateTime<Utc>,
    pub weight_kg: f64,
    pub photo_ref: Option<String>,
}

impl NewMeasurement {
    pub fn into_measurement(self, id: MeasurementId) -> Measurement {
        Measurement {
            id,
            username: self.username,
            recorded_at: self.recorded_at,
            weight_kg: self.weight_kg,
            photo_ref: self.photo_ref,
        }
    }
}
