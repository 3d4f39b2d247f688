//! Deterministic demo dataset backing the `demo` CLI command and the
//! engine's own scenario tests. One tenant, two SKUs: a tiered steel coil
//! and an aluminium sheet priced by a market-indexed formula.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::common::{TenantId, ValidityWindow};
use crate::domain::condition::{
    AdjustmentMethod, ConditionKeyType, ConditionRule, ConditionSet, ConflictStrategy, RuleScope,
    RuleType,
};
use crate::domain::formula::{
    DynamicFormula, FormulaInput, FormulaScope, InputSource, PriceCaps, RoundingMode, StepRounding,
};
use crate::domain::price_list::{LineSelector, PriceList, PriceListLine, TierBreak};
use crate::domain::quote::CustomerKeys;
use crate::domain::tax::{TaxCharge, TaxChargeMethod, TaxChargeScope};
use crate::lookups::memory::{
    InMemoryConditionSetLookup, InMemoryCustomerKeysLookup, InMemoryFormulaLookup,
    InMemoryMarketDataLookup, InMemoryPriceListLookup, InMemoryTaxChargeLookup, MarketObservation,
};
use crate::lookups::Lookups;

pub const DEMO_TENANT: &str = "demo-metals";
pub const DEMO_CUSTOMER: &str = "cust-acme";
pub const STEEL_SKU: &str = "STEEL-COIL-S235";
pub const ALUMINIUM_SKU: &str = "ALU-SHEET-5754";

fn tenant() -> TenantId {
    TenantId(DEMO_TENANT.to_string())
}

fn last_year() -> ValidityWindow {
    ValidityWindow::open_from(Utc::now() - Duration::days(365))
}

pub fn demo_price_lists() -> Vec<PriceList> {
    vec![PriceList {
        id: "pl-demo-metals".to_string(),
        tenant: tenant(),
        currency: "EUR".to_string(),
        channel: None,
        priority: 10,
        window: last_year(),
        lines: vec![
            PriceListLine {
                selector: LineSelector::Sku {
                    sku: STEEL_SKU.to_string(),
                    commodity: Some("steel".to_string()),
                },
                uom: "t".to_string(),
                base_price: Decimal::new(100, 0),
                tiers: vec![
                    TierBreak {
                        min_qty: 10,
                        max_qty: Some(50),
                        unit_price: Decimal::new(98, 0),
                    },
                    TierBreak { min_qty: 50, max_qty: None, unit_price: Decimal::new(95, 0) },
                ],
            },
            PriceListLine {
                selector: LineSelector::Sku {
                    sku: ALUMINIUM_SKU.to_string(),
                    commodity: Some("aluminium".to_string()),
                },
                uom: "t".to_string(),
                base_price: Decimal::new(30, 0),
                tiers: Vec::new(),
            },
        ],
    }]
}

pub fn demo_condition_sets() -> Vec<ConditionSet> {
    vec![ConditionSet {
        key: "cs-acme-loyalty".to_string(),
        tenant: tenant(),
        key_type: ConditionKeyType::Customer,
        key_value: DEMO_CUSTOMER.to_string(),
        channel: None,
        strategy: ConflictStrategy::Stack,
        priority: 0,
        active: true,
        window: last_year(),
        rules: vec![ConditionRule {
            key: "loyalty-5pct".to_string(),
            rule_type: RuleType::Discount,
            method: AdjustmentMethod::Pct,
            value: Decimal::new(5, 0),
            scope: RuleScope::All,
            min_qty: None,
            max_qty: None,
            channel: None,
            stackable: false,
            priority: 0,
            window: last_year(),
        }],
    }]
}

/// Aluminium sheet sells at an LME-indexed conversion price. The fallback
/// values keep the formula usable when the feed is down.
pub fn demo_formulas() -> Vec<DynamicFormula> {
    vec![DynamicFormula {
        key: "alu-lme-conversion".to_string(),
        tenant: tenant(),
        scope: FormulaScope::Sku { sku: ALUMINIUM_SKU.to_string() },
        expression: "(lme + premium) / 200".to_string(),
        inputs: vec![
            FormulaInput {
                name: "lme".to_string(),
                source: InputSource::Futures,
                source_ref: Some("LME-AL-3M".to_string()),
                fallback: Some(Decimal::new(2_300, 0)),
            },
            FormulaInput {
                name: "premium".to_string(),
                source: InputSource::Static,
                source_ref: None,
                fallback: Some(Decimal::new(50, 0)),
            },
        ],
        rounding: Some(StepRounding { step: Decimal::new(5, 2), mode: RoundingMode::Nearest }),
        caps: Some(PriceCaps { min: Some(Decimal::new(5, 0)), max: Some(Decimal::new(100, 0)) }),
        active: true,
        window: last_year(),
    }]
}

pub fn demo_market_observations() -> Vec<MarketObservation> {
    vec![MarketObservation {
        source: InputSource::Futures,
        source_ref: "LME-AL-3M".to_string(),
        observed_at: Utc::now() - Duration::hours(1),
        value: Decimal::new(2_410, 0),
    }]
}

pub fn demo_tax_charges() -> Vec<TaxCharge> {
    vec![TaxCharge {
        key: "de-vat".to_string(),
        tenant: tenant(),
        scope: TaxChargeScope::All,
        region: Some("DE".to_string()),
        method: TaxChargeMethod::RatePct { rate: Decimal::new(19, 0) },
        window: last_year(),
    }]
}

pub fn demo_customer_keys() -> Vec<(TenantId, CustomerKeys)> {
    vec![(
        tenant(),
        CustomerKeys {
            customer_id: crate::domain::common::CustomerId(DEMO_CUSTOMER.to_string()),
            segment: Some("industrial".to_string()),
            region: Some("DE".to_string()),
            payment_term: Some("net30".to_string()),
        },
    )]
}

/// The full demo dataset bundled as lookup collaborators.
pub fn demo_lookups() -> Lookups {
    Lookups {
        price_lists: Arc::new(InMemoryPriceListLookup::new(demo_price_lists())),
        condition_sets: Arc::new(InMemoryConditionSetLookup::new(demo_condition_sets())),
        formulas: Arc::new(InMemoryFormulaLookup::new(demo_formulas())),
        market_data: Arc::new(InMemoryMarketDataLookup::new(demo_market_observations())),
        tax_charges: Arc::new(InMemoryTaxChargeLookup::new(demo_tax_charges())),
        customer_keys: Arc::new(InMemoryCustomerKeysLookup::new(demo_customer_keys())),
    }
}
