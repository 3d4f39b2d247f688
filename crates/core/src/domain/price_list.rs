use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::common::{SalesChannel, TenantId, ValidityWindow};
use crate::errors::EngineError;

/// A quantity band with its own unit price. Bands are half-open:
/// `[min_qty, max_qty)`, open-ended when `max_qty` is absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBreak {
    pub min_qty: u32,
    pub max_qty: Option<u32>,
    pub unit_price: Decimal,
}

impl TierBreak {
    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min_qty && self.max_qty.map_or(true, |max| quantity < max)
    }
}

/// What a price list line sells. SKU lines may also declare the commodity the
/// SKU belongs to; commodity lines act as a fallback for every SKU of that
/// commodity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSelector {
    Sku { sku: String, commodity: Option<String> },
    Commodity { commodity: String },
}

impl LineSelector {
    pub fn describe(&self) -> String {
        match self {
            Self::Sku { sku, .. } => format!("sku:{sku}"),
            Self::Commodity { commodity } => format!("commodity:{commodity}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListLine {
    pub selector: LineSelector,
    pub uom: String,
    /// Flat unit price used when no tier break covers the quantity.
    pub base_price: Decimal,
    #[serde(default)]
    pub tiers: Vec<TierBreak>,
}

impl PriceListLine {
    /// Unit price for a quantity: the covering tier's price, else the flat
    /// base price.
    pub fn unit_price_for(&self, quantity: u32) -> Decimal {
        self.tiers
            .iter()
            .find(|tier| tier.contains(quantity))
            .map(|tier| tier.unit_price)
            .unwrap_or(self.base_price)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let selector = self.selector.describe();
        if self.base_price <= Decimal::ZERO {
            return Err(EngineError::validation(format!(
                "price list line {selector}: base_price must be positive"
            )));
        }

        let mut previous_end: Option<u32> = None;
        let mut previous_min: Option<u32> = None;
        for tier in &self.tiers {
            if tier.unit_price <= Decimal::ZERO {
                return Err(EngineError::validation(format!(
                    "price list line {selector}: tier at qty {} has non-positive price",
                    tier.min_qty
                )));
            }
            if let Some(max) = tier.max_qty {
                if max <= tier.min_qty {
                    return Err(EngineError::validation(format!(
                        "price list line {selector}: tier [{}, {max}) is empty",
                        tier.min_qty
                    )));
                }
            }
            if let Some(min) = previous_min {
                if tier.min_qty <= min {
                    return Err(EngineError::validation(format!(
                        "price list line {selector}: tiers must be ordered by min_qty"
                    )));
                }
            }
            if let Some(end) = previous_end {
                if tier.min_qty < end {
                    return Err(EngineError::validation(format!(
                        "price list line {selector}: tier at qty {} overlaps the previous tier",
                        tier.min_qty
                    )));
                }
            } else if previous_min.is_some() {
                // A previous open-ended tier swallows every larger quantity.
                return Err(EngineError::validation(format!(
                    "price list line {selector}: only the last tier may be open-ended"
                )));
            }
            previous_end = tier.max_qty;
            previous_min = Some(tier.min_qty);
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub id: String,
    pub tenant: TenantId,
    pub currency: String,
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    #[serde(default)]
    pub priority: i32,
    pub window: ValidityWindow,
    pub lines: Vec<PriceListLine>,
}

impl PriceList {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("price list id must not be empty"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(EngineError::validation(format!(
                "price list `{}`: currency must be a 3-letter uppercase code",
                self.id
            )));
        }
        self.window.validate(&format!("price list `{}`", self.id))?;
        if self.lines.is_empty() {
            return Err(EngineError::validation(format!(
                "price list `{}` must contain at least one line",
                self.id
            )));
        }
        for line in &self.lines {
            line.validate()?;
        }
        Ok(())
    }
}
