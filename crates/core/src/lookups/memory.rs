//! In-memory lookup implementations backing tests, fixtures, and the CLI.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::common::{CustomerId, TenantId};
use crate::domain::condition::ConditionSet;
use crate::domain::formula::{DynamicFormula, InputSource};
use crate::domain::price_list::PriceList;
use crate::domain::quote::CustomerKeys;
use crate::domain::tax::TaxCharge;
use crate::errors::LookupError;

use super::{
    ConditionSetLookup, CustomerKeysLookup, FormulaLookup, MarketDataLookup, PriceListLookup,
    TaxChargeLookup,
};

#[derive(Default)]
pub struct InMemoryPriceListLookup {
    lists: RwLock<Vec<PriceList>>,
}

impl InMemoryPriceListLookup {
    pub fn new(lists: Vec<PriceList>) -> Self {
        Self { lists: RwLock::new(lists) }
    }

    pub async fn insert(&self, list: PriceList) {
        self.lists.write().await.push(list);
    }
}

#[async_trait]
impl PriceListLookup for InMemoryPriceListLookup {
    async fn active_price_lists(&self, tenant: &TenantId) -> Result<Vec<PriceList>, LookupError> {
        let lists = self.lists.read().await;
        Ok(lists.iter().filter(|list| &list.tenant == tenant).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryConditionSetLookup {
    sets: RwLock<Vec<ConditionSet>>,
}

impl InMemoryConditionSetLookup {
    pub fn new(sets: Vec<ConditionSet>) -> Self {
        Self { sets: RwLock::new(sets) }
    }

    pub async fn insert(&self, set: ConditionSet) {
        self.sets.write().await.push(set);
    }
}

#[async_trait]
impl ConditionSetLookup for InMemoryConditionSetLookup {
    async fn condition_sets(&self, tenant: &TenantId) -> Result<Vec<ConditionSet>, LookupError> {
        let sets = self.sets.read().await;
        Ok(sets.iter().filter(|set| &set.tenant == tenant).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryFormulaLookup {
    formulas: RwLock<Vec<DynamicFormula>>,
}

impl InMemoryFormulaLookup {
    pub fn new(formulas: Vec<DynamicFormula>) -> Self {
        Self { formulas: RwLock::new(formulas) }
    }

    pub async fn insert(&self, formula: DynamicFormula) {
        self.formulas.write().await.push(formula);
    }
}

#[async_trait]
impl FormulaLookup for InMemoryFormulaLookup {
    async fn formulas(&self, tenant: &TenantId) -> Result<Vec<DynamicFormula>, LookupError> {
        let formulas = self.formulas.read().await;
        Ok(formulas.iter().filter(|formula| &formula.tenant == tenant).cloned().collect())
    }
}

/// One published market number for a `(source, source_ref)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub source: InputSource,
    pub source_ref: String,
    pub observed_at: DateTime<Utc>,
    pub value: Decimal,
}

#[derive(Default)]
pub struct InMemoryMarketDataLookup {
    observations: RwLock<Vec<MarketObservation>>,
}

impl InMemoryMarketDataLookup {
    pub fn new(observations: Vec<MarketObservation>) -> Self {
        Self { observations: RwLock::new(observations) }
    }

    pub async fn insert(&self, observation: MarketObservation) {
        self.observations.write().await.push(observation);
    }
}

#[async_trait]
impl MarketDataLookup for InMemoryMarketDataLookup {
    async fn observe(
        &self,
        source: InputSource,
        source_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LookupError> {
        let observations = self.observations.read().await;
        Ok(observations
            .iter()
            .filter(|obs| {
                obs.source == source && obs.source_ref == source_ref && obs.observed_at <= at
            })
            .max_by_key(|obs| obs.observed_at)
            .map(|obs| obs.value))
    }
}

#[derive(Default)]
pub struct InMemoryTaxChargeLookup {
    entries: RwLock<Vec<TaxCharge>>,
}

impl InMemoryTaxChargeLookup {
    pub fn new(entries: Vec<TaxCharge>) -> Self {
        Self { entries: RwLock::new(entries) }
    }

    pub async fn insert(&self, entry: TaxCharge) {
        self.entries.write().await.push(entry);
    }
}

#[async_trait]
impl TaxChargeLookup for InMemoryTaxChargeLookup {
    async fn charges(
        &self,
        tenant: &TenantId,
        sku: &str,
        commodity: Option<&str>,
        region: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vec<TaxCharge>, LookupError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| {
                &entry.tenant == tenant
                    && entry.scope.matches(sku, commodity)
                    && entry.applies_to_region(region)
                    && entry.window.covers(at)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerKeysLookup {
    customers: RwLock<HashMap<(String, String), CustomerKeys>>,
}

impl InMemoryCustomerKeysLookup {
    pub fn new(entries: Vec<(TenantId, CustomerKeys)>) -> Self {
        let customers = entries
            .into_iter()
            .map(|(tenant, keys)| ((tenant.0, keys.customer_id.0.clone()), keys))
            .collect();
        Self { customers: RwLock::new(customers) }
    }

    pub async fn insert(&self, tenant: TenantId, keys: CustomerKeys) {
        self.customers.write().await.insert((tenant.0, keys.customer_id.0.clone()), keys);
    }
}

#[async_trait]
impl CustomerKeysLookup for InMemoryCustomerKeysLookup {
    async fn customer_keys(
        &self,
        tenant: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerKeys>, LookupError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&(tenant.0.clone(), customer_id.0.clone())).cloned())
    }
}
