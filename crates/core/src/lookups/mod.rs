//! Injected data collaborators. Implementations may do I/O; every call made
//! by the engine is bounded by the configured lookup timeout.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::common::{CustomerId, TenantId};
use crate::domain::condition::ConditionSet;
use crate::domain::formula::{DynamicFormula, InputSource};
use crate::domain::price_list::PriceList;
use crate::domain::quote::CustomerKeys;
use crate::domain::tax::TaxCharge;
use crate::errors::LookupError;

#[async_trait]
pub trait PriceListLookup: Send + Sync {
    async fn active_price_lists(&self, tenant: &TenantId) -> Result<Vec<PriceList>, LookupError>;
}

#[async_trait]
pub trait ConditionSetLookup: Send + Sync {
    async fn condition_sets(&self, tenant: &TenantId) -> Result<Vec<ConditionSet>, LookupError>;
}

#[async_trait]
pub trait FormulaLookup: Send + Sync {
    async fn formulas(&self, tenant: &TenantId) -> Result<Vec<DynamicFormula>, LookupError>;
}

#[async_trait]
pub trait MarketDataLookup: Send + Sync {
    /// Most recent observation at or before `at`, or `None` when the feed
    /// has no data for the reference.
    async fn observe(
        &self,
        source: InputSource,
        source_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LookupError>;
}

#[async_trait]
pub trait TaxChargeLookup: Send + Sync {
    async fn charges(
        &self,
        tenant: &TenantId,
        sku: &str,
        commodity: Option<&str>,
        region: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vec<TaxCharge>, LookupError>;
}

#[async_trait]
pub trait CustomerKeysLookup: Send + Sync {
    async fn customer_keys(
        &self,
        tenant: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerKeys>, LookupError>;
}

/// The full bundle of collaborators a [`crate::pricing::QuoteService`] needs,
/// passed in explicitly at construction time.
#[derive(Clone)]
pub struct Lookups {
    pub price_lists: Arc<dyn PriceListLookup>,
    pub condition_sets: Arc<dyn ConditionSetLookup>,
    pub formulas: Arc<dyn FormulaLookup>,
    pub market_data: Arc<dyn MarketDataLookup>,
    pub tax_charges: Arc<dyn TaxChargeLookup>,
    pub customer_keys: Arc<dyn CustomerKeysLookup>,
}
