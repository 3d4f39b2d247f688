use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::common::{SalesChannel, TenantId, ValidityWindow};
use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Discount,
    Markup,
    Rebate,
    Surcharge,
}

impl RuleType {
    /// Discounts and rebates reduce the price; markups and surcharges
    /// increase it.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Discount | Self::Rebate => Decimal::NEGATIVE_ONE,
            Self::Markup | Self::Surcharge => Decimal::ONE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentMethod {
    /// Absolute amount per unit, scaled by quantity.
    Abs,
    /// Percentage of the running subtotal (5 means 5%).
    Pct,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Sku { sku: String },
    Commodity { commodity: String },
    All,
}

impl RuleScope {
    pub fn matches(&self, sku: &str, commodity: Option<&str>) -> bool {
        match self {
            Self::Sku { sku: scoped } => scoped == sku,
            Self::Commodity { commodity: scoped } => Some(scoped.as_str()) == commodity,
            Self::All => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub key: String,
    pub rule_type: RuleType,
    pub method: AdjustmentMethod,
    pub value: Decimal,
    #[serde(default = "RuleScope::all")]
    pub scope: RuleScope,
    #[serde(default)]
    pub min_qty: Option<u32>,
    #[serde(default)]
    pub max_qty: Option<u32>,
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub priority: i32,
    pub window: ValidityWindow,
}

impl RuleScope {
    fn all() -> Self {
        Self::All
    }
}

impl ConditionRule {
    pub fn quantity_in_band(&self, quantity: u32) -> bool {
        self.min_qty.map_or(true, |min| quantity >= min)
            && self.max_qty.map_or(true, |max| quantity < max)
    }

    pub fn validate(&self, set_key: &str) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "condition set `{set_key}`: rule key must not be empty"
            )));
        }
        if self.value <= Decimal::ZERO {
            return Err(EngineError::validation(format!(
                "condition rule `{set_key}:{}`: value must be positive (direction comes from the rule type)",
                self.key
            )));
        }
        if self.method == AdjustmentMethod::Pct && self.value >= Decimal::ONE_HUNDRED {
            return Err(EngineError::validation(format!(
                "condition rule `{set_key}:{}`: percentage value must be below 100",
                self.key
            )));
        }
        if let (Some(min), Some(max)) = (self.min_qty, self.max_qty) {
            if max <= min {
                return Err(EngineError::validation(format!(
                    "condition rule `{set_key}:{}`: quantity band [{min}, {max}) is empty",
                    self.key
                )));
            }
        }
        self.window.validate(&format!("condition rule `{set_key}:{}`", self.key))
    }
}

/// How mutually exclusive (non-stackable) matching rules inside one set are
/// reduced to a single winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    FirstWins,
    LastWins,
    MaxWins,
    MinWins,
    Stack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKeyType {
    Customer,
    Segment,
    Region,
    PaymentTerm,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub key: String,
    pub tenant: TenantId,
    pub key_type: ConditionKeyType,
    pub key_value: String,
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    pub strategy: ConflictStrategy,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub window: ValidityWindow,
    pub rules: Vec<ConditionRule>,
}

fn default_active() -> bool {
    true
}

impl ConditionSet {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::validation("condition set key must not be empty"));
        }
        if self.key_value.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "condition set `{}`: key_value must not be empty",
                self.key
            )));
        }
        self.window.validate(&format!("condition set `{}`", self.key))?;
        if self.rules.is_empty() {
            return Err(EngineError::validation(format!(
                "condition set `{}` must contain at least one rule",
                self.key
            )));
        }
        for rule in &self.rules {
            rule.validate(&self.key)?;
        }
        Ok(())
    }
}
