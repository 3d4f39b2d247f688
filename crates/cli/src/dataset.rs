//! TOML dataset loading for `pricekit calculate --dataset`. Every record is
//! validated with the same rules the engine applies to its own collaborators,
//! so a broken dataset fails before any pricing starts.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use pricekit_core::domain::common::TenantId;
use pricekit_core::domain::quote::CustomerKeys;
use pricekit_core::lookups::memory::{
    InMemoryConditionSetLookup, InMemoryCustomerKeysLookup, InMemoryFormulaLookup,
    InMemoryMarketDataLookup, InMemoryPriceListLookup, InMemoryTaxChargeLookup, MarketObservation,
};
use pricekit_core::lookups::Lookups;
use pricekit_core::{ConditionSet, DynamicFormula, PriceList, TaxCharge};

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    price_lists: Vec<PriceList>,
    #[serde(default)]
    condition_sets: Vec<ConditionSet>,
    #[serde(default)]
    formulas: Vec<DynamicFormula>,
    #[serde(default)]
    market_observations: Vec<MarketObservation>,
    #[serde(default)]
    tax_charges: Vec<TaxCharge>,
    #[serde(default)]
    customers: Vec<DatasetCustomer>,
}

#[derive(Debug, Deserialize)]
struct DatasetCustomer {
    tenant: TenantId,
    #[serde(flatten)]
    keys: CustomerKeys,
}

pub fn load(path: &Path) -> Result<Lookups> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read dataset file `{}`", path.display()))?;
    let dataset: Dataset = toml::from_str(&raw)
        .with_context(|| format!("could not parse dataset file `{}`", path.display()))?;

    if dataset.price_lists.is_empty() {
        bail!("dataset `{}` declares no price lists", path.display());
    }

    for list in &dataset.price_lists {
        list.validate().with_context(|| format!("price list `{}`", list.id))?;
    }
    for set in &dataset.condition_sets {
        set.validate().with_context(|| format!("condition set `{}`", set.key))?;
    }
    for formula in &dataset.formulas {
        formula.validate().with_context(|| format!("formula `{}`", formula.key))?;
    }
    for charge in &dataset.tax_charges {
        charge.validate().with_context(|| format!("tax charge `{}`", charge.key))?;
    }

    Ok(Lookups {
        price_lists: Arc::new(InMemoryPriceListLookup::new(dataset.price_lists)),
        condition_sets: Arc::new(InMemoryConditionSetLookup::new(dataset.condition_sets)),
        formulas: Arc::new(InMemoryFormulaLookup::new(dataset.formulas)),
        market_data: Arc::new(InMemoryMarketDataLookup::new(dataset.market_observations)),
        tax_charges: Arc::new(InMemoryTaxChargeLookup::new(dataset.tax_charges)),
        customer_keys: Arc::new(InMemoryCustomerKeysLookup::new(
            dataset.customers.into_iter().map(|entry| (entry.tenant, entry.keys)).collect(),
        )),
    })
}
