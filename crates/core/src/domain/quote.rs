use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::common::{CustomerId, QuoteId, SalesChannel, TenantId};
use crate::errors::EngineError;

/// A pricing request as submitted by a caller. Only `customer_id` is carried;
/// segment, region, and payment term are resolved from the customer master.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub tenant: TenantId,
    pub customer_id: CustomerId,
    pub sku: String,
    pub quantity: u32,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    /// Pricing date; defaults to the calculation time when absent.
    #[serde(default)]
    pub price_date: Option<DateTime<Utc>>,
    /// Caller-supplied values for `custom`/`static` formula inputs.
    #[serde(default)]
    pub context: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl QuoteRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tenant.0.trim().is_empty() {
            return Err(EngineError::validation("tenant must not be empty"));
        }
        if self.customer_id.0.trim().is_empty() {
            return Err(EngineError::validation("customer_id must not be empty"));
        }
        if self.sku.trim().is_empty() {
            return Err(EngineError::validation("sku must not be empty"));
        }
        if self.quantity == 0 {
            return Err(EngineError::validation("quantity must be at least 1"));
        }
        Ok(())
    }
}

/// The condition keys a customer resolves to. An absent key matches no
/// condition set of that type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerKeys {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub payment_term: Option<String>,
}

impl CustomerKeys {
    pub fn unresolved(customer_id: CustomerId) -> Self {
        Self { customer_id, segment: None, region: None, payment_term: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Base,
    Condition,
    Dynamic,
    Charge,
    Tax,
}

/// One priced line of a quote. `amount` is the signed contribution to the
/// total; `basis` is what a rate was applied to (subtotal for percentages,
/// quantity for per-unit amounts, raw formula result for dynamic pricing).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteComponent {
    pub key: String,
    pub kind: ComponentKind,
    pub description: String,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub basis: Option<Decimal>,
    pub amount: Decimal,
    #[serde(default)]
    pub calculated_from: Option<String>,
    /// Pre-clamp value, recorded only when caps changed the result.
    #[serde(default)]
    pub capped_value: Option<Decimal>,
}

/// Echo of everything the calculation depended on, bound into the signature
/// so a redeemed quote can be checked against what was actually priced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteInputs {
    pub customer: CustomerKeys,
    pub sku: String,
    pub quantity: u32,
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    pub price_date: DateTime<Utc>,
    #[serde(default)]
    pub context: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

/// An immutable, signed, time-limited price quote. Created only by the
/// engine; a changed price requires a new quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub id: QuoteId,
    pub tenant: TenantId,
    pub inputs: QuoteInputs,
    pub components: Vec<QuoteComponent>,
    pub currency: String,
    pub total_net: Decimal,
    pub total_gross: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl PriceQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn base_component(&self) -> Option<&QuoteComponent> {
        self.components.iter().find(|component| component.kind == ComponentKind::Base)
    }

    pub fn tax_total(&self) -> Decimal {
        self.components
            .iter()
            .filter(|component| component.kind == ComponentKind::Tax)
            .map(|component| component.amount)
            .sum()
    }

    /// Structural invariants: exactly one Base component, net equals the sum
    /// of non-Tax components, gross equals net plus tax, expiry after
    /// creation.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let base_count = self
            .components
            .iter()
            .filter(|component| component.kind == ComponentKind::Base)
            .count();
        if base_count != 1 {
            return Err(EngineError::validation(format!(
                "quote `{}` must carry exactly one base component, found {base_count}",
                self.id.0
            )));
        }

        let net: Decimal = self
            .components
            .iter()
            .filter(|component| component.kind != ComponentKind::Tax)
            .map(|component| component.amount)
            .sum();
        if net != self.total_net {
            return Err(EngineError::validation(format!(
                "quote `{}` total_net {} does not match component sum {net}",
                self.id.0, self.total_net
            )));
        }
        if self.total_net + self.tax_total() != self.total_gross {
            return Err(EngineError::validation(format!(
                "quote `{}` total_gross does not equal total_net plus tax",
                self.id.0
            )));
        }
        if self.expires_at <= self.created_at {
            return Err(EngineError::validation(format!(
                "quote `{}` expires_at must be after created_at",
                self.id.0
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        ComponentKind, CustomerKeys, PriceQuote, QuoteComponent, QuoteInputs, QuoteRequest,
    };
    use crate::domain::common::{CustomerId, QuoteId, TenantId};

    fn component(key: &str, kind: ComponentKind, amount: Decimal) -> QuoteComponent {
        QuoteComponent {
            key: key.to_string(),
            kind,
            description: key.to_string(),
            rate: None,
            basis: None,
            amount,
            calculated_from: None,
            capped_value: None,
        }
    }

    fn quote_fixture() -> PriceQuote {
        let created_at = Utc::now();
        PriceQuote {
            id: QuoteId("q-1".to_string()),
            tenant: TenantId("acme".to_string()),
            inputs: QuoteInputs {
                customer: CustomerKeys::unresolved(CustomerId("cust-1".to_string())),
                sku: "STL-COIL".to_string(),
                quantity: 50,
                channel: None,
                price_date: created_at,
                context: BTreeMap::new(),
                requested_by: None,
            },
            components: vec![
                component("base", ComponentKind::Base, Decimal::new(4_750, 0)),
                component("condition:cs:vip", ComponentKind::Condition, Decimal::new(-23_750, 2)),
                component("tax:vat", ComponentKind::Tax, Decimal::new(857_375, 3)),
            ],
            currency: "EUR".to_string(),
            total_net: Decimal::new(451_250, 2),
            total_gross: Decimal::new(5_369_875, 3),
            created_at,
            expires_at: created_at + Duration::minutes(15),
            signature: "unsigned".to_string(),
        }
    }

    #[test]
    fn request_rejects_zero_quantity() {
        let request = QuoteRequest {
            tenant: TenantId("acme".to_string()),
            customer_id: CustomerId("cust-1".to_string()),
            sku: "STL-COIL".to_string(),
            quantity: 0,
            uom: None,
            channel: None,
            price_date: None,
            context: BTreeMap::new(),
            requested_by: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn invariants_hold_for_consistent_quote() {
        assert!(quote_fixture().check_invariants().is_ok());
    }

    #[test]
    fn net_must_equal_non_tax_component_sum() {
        let mut quote = quote_fixture();
        quote.total_net += Decimal::ONE;
        assert!(quote.check_invariants().is_err());
    }

    #[test]
    fn gross_must_equal_net_plus_tax() {
        let mut quote = quote_fixture();
        quote.total_gross += Decimal::ONE;
        assert!(quote.check_invariants().is_err());
    }

    #[test]
    fn exactly_one_base_component_is_required() {
        let mut quote = quote_fixture();
        quote.components.push(component("base2", ComponentKind::Base, Decimal::ONE));
        assert!(quote.check_invariants().is_err());
    }

    #[test]
    fn expiry_must_be_after_creation() {
        let mut quote = quote_fixture();
        quote.expires_at = quote.created_at;
        assert!(quote.check_invariants().is_err());
    }

    #[test]
    fn expiry_check_is_inclusive_of_the_deadline() {
        let quote = quote_fixture();
        assert!(!quote.is_expired(quote.created_at));
        assert!(quote.is_expired(quote.expires_at));
    }
}
