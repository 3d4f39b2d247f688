use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::common::{TenantId, ValidityWindow};
use crate::errors::EngineError;
use crate::expr;

/// Where a formula input's number comes from. The four market sources resolve
/// through the market-data lookup; `Custom` and `Static` read the request
/// context first and fall back to the declared fallback value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Index,
    Futures,
    Basis,
    Fx,
    Custom,
    Static,
}

impl InputSource {
    pub fn is_market(&self) -> bool {
        matches!(self, Self::Index | Self::Futures | Self::Basis | Self::Fx)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Futures => "futures",
            Self::Basis => "basis",
            Self::Fx => "fx",
            Self::Custom => "custom",
            Self::Static => "static",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaInput {
    pub name: String,
    pub source: InputSource,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub fallback: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    Up,
    Down,
    Nearest,
}

/// Round to a multiple of `step`: `down` floors, `up` ceils, `nearest` rounds
/// midpoints away from zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRounding {
    pub step: Decimal,
    pub mode: RoundingMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCaps {
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
}

impl PriceCaps {
    /// Clamped value plus the pre-clamp value when clamping fired.
    pub fn clamp(&self, value: Decimal) -> (Decimal, Option<Decimal>) {
        let mut clamped = value;
        if let Some(min) = self.min {
            if clamped < min {
                clamped = min;
            }
        }
        if let Some(max) = self.max {
            if clamped > max {
                clamped = max;
            }
        }
        if clamped == value {
            (value, None)
        } else {
            (clamped, Some(value))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaScope {
    Sku { sku: String },
    Commodity { commodity: String },
    All,
}

impl FormulaScope {
    pub fn matches(&self, sku: &str, commodity: Option<&str>) -> bool {
        match self {
            Self::Sku { sku: scoped } => scoped == sku,
            Self::Commodity { commodity: scoped } => Some(scoped.as_str()) == commodity,
            Self::All => true,
        }
    }

    /// Specificity rank used when several formulas match: SKU beats
    /// commodity beats catch-all.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Sku { .. } => 2,
            Self::Commodity { .. } => 1,
            Self::All => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFormula {
    pub key: String,
    pub tenant: TenantId,
    pub scope: FormulaScope,
    pub expression: String,
    pub inputs: Vec<FormulaInput>,
    #[serde(default)]
    pub rounding: Option<StepRounding>,
    #[serde(default)]
    pub caps: Option<PriceCaps>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub window: ValidityWindow,
}

fn default_active() -> bool {
    true
}

impl DynamicFormula {
    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|input| input.name.clone()).collect()
    }

    /// Structural validation plus a full compile of the expression against
    /// the declared input names.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::validation("formula key must not be empty"));
        }
        self.window.validate(&format!("formula `{}`", self.key))?;

        if self.inputs.is_empty() {
            return Err(EngineError::validation(format!(
                "formula `{}` must declare at least one input",
                self.key
            )));
        }
        let mut names: Vec<&str> = self.inputs.iter().map(|input| input.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.inputs.len() {
            return Err(EngineError::validation(format!(
                "formula `{}` declares duplicate input names",
                self.key
            )));
        }
        for input in &self.inputs {
            if input.name.trim().is_empty() {
                return Err(EngineError::validation(format!(
                    "formula `{}`: input names must not be empty",
                    self.key
                )));
            }
            if input.source.is_market() && input.source_ref.is_none() {
                return Err(EngineError::validation(format!(
                    "formula `{}` input `{}`: {} source requires a source_ref",
                    self.key,
                    input.name,
                    input.source.as_str()
                )));
            }
        }

        if let Some(rounding) = &self.rounding {
            if rounding.step <= Decimal::ZERO {
                return Err(EngineError::validation(format!(
                    "formula `{}`: rounding step must be positive",
                    self.key
                )));
            }
        }
        if let Some(caps) = &self.caps {
            if let (Some(min), Some(max)) = (caps.min, caps.max) {
                if min > max {
                    return Err(EngineError::validation(format!(
                        "formula `{}`: caps.min must not exceed caps.max",
                        self.key
                    )));
                }
            }
        }

        expr::compile(&self.expression, &self.input_names()).map_err(|error| {
            EngineError::validation(format!("formula `{}`: {error}", self.key))
        })?;
        Ok(())
    }
}
