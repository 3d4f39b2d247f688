use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesChannel {
    Direct,
    Distributor,
    Online,
    Spot,
}

impl std::str::FromStr for SalesChannel {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "distributor" => Ok(Self::Distributor),
            "online" => Ok(Self::Online),
            "spot" => Ok(Self::Spot),
            other => Err(EngineError::validation(format!(
                "unsupported sales channel `{other}` (expected direct|distributor|online|spot)"
            ))),
        }
    }
}

/// Half-open validity window: a date is covered when
/// `valid_from <= at` and `at < valid_to` (no upper bound when `valid_to`
/// is absent).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn open_from(valid_from: DateTime<Utc>) -> Self {
        Self { valid_from, valid_to: None }
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |until| at < until)
    }

    pub fn validate(&self, context: &str) -> Result<(), EngineError> {
        if let Some(valid_to) = self.valid_to {
            if valid_to <= self.valid_from {
                return Err(EngineError::validation(format!(
                    "{context}: valid_to must be after valid_from"
                )));
            }
        }
        Ok(())
    }
}

/// Channel gating shared by price lists and condition sets: an entity without
/// a channel matches any request, an entity with a channel matches only
/// requests on that channel.
pub fn channel_matches(entity: Option<SalesChannel>, requested: Option<SalesChannel>) -> bool {
    match entity {
        None => true,
        Some(channel) => requested == Some(channel),
    }
}
