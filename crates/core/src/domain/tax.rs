use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::common::{TenantId, ValidityWindow};
use crate::errors::EngineError;

/// How a tax/charge entry prices: a percentage of the net total (a Tax
/// component, excluded from the net) or a flat per-quote amount (a Charge
/// component, included in the net).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxChargeMethod {
    RatePct { rate: Decimal },
    Amount { amount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxChargeScope {
    Sku { sku: String },
    Commodity { commodity: String },
    All,
}

impl TaxChargeScope {
    pub fn matches(&self, sku: &str, commodity: Option<&str>) -> bool {
        match self {
            Self::Sku { sku: scoped } => scoped == sku,
            Self::Commodity { commodity: scoped } => Some(scoped.as_str()) == commodity,
            Self::All => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCharge {
    pub key: String,
    pub tenant: TenantId,
    #[serde(default = "TaxChargeScope::all")]
    pub scope: TaxChargeScope,
    /// Region gate; an entry without a region applies everywhere.
    #[serde(default)]
    pub region: Option<String>,
    pub method: TaxChargeMethod,
    pub window: ValidityWindow,
}

impl TaxChargeScope {
    fn all() -> Self {
        Self::All
    }
}

impl TaxCharge {
    pub fn applies_to_region(&self, region: Option<&str>) -> bool {
        match &self.region {
            None => true,
            Some(scoped) => Some(scoped.as_str()) == region,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::validation("tax/charge key must not be empty"));
        }
        match &self.method {
            TaxChargeMethod::RatePct { rate } => {
                if *rate < Decimal::ZERO || *rate > Decimal::ONE_HUNDRED {
                    return Err(EngineError::validation(format!(
                        "tax/charge `{}`: rate must be between 0 and 100",
                        self.key
                    )));
                }
            }
            TaxChargeMethod::Amount { amount } => {
                if *amount <= Decimal::ZERO {
                    return Err(EngineError::validation(format!(
                        "tax/charge `{}`: flat amount must be positive",
                        self.key
                    )));
                }
            }
        }
        self.window.validate(&format!("tax/charge `{}`", self.key))
    }
}
