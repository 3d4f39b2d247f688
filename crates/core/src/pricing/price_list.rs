use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::common::channel_matches;
use crate::domain::price_list::{LineSelector, PriceList, PriceListLine};
use crate::domain::quote::{ComponentKind, QuoteComponent, QuoteRequest};
use crate::errors::EngineError;

/// Outcome of base price resolution. Carries the matched line's currency,
/// unit-of-measure, and commodity so the later stages (conditions, formula,
/// tax) can scope against them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseResolution {
    pub component: QuoteComponent,
    pub price_list_id: String,
    pub currency: String,
    pub uom: String,
    pub commodity: Option<String>,
    pub unit_price: Decimal,
}

/// Finds the applicable base price for a SKU/quantity at a date across the
/// tenant's price lists.
pub struct PriceListResolver;

impl PriceListResolver {
    pub fn resolve(
        request: &QuoteRequest,
        price_lists: &[PriceList],
        price_date: DateTime<Utc>,
    ) -> Result<BaseResolution, EngineError> {
        let mut candidates: Vec<&PriceList> = price_lists
            .iter()
            .filter(|list| {
                list.window.covers(price_date) && channel_matches(list.channel, request.channel)
            })
            .collect();
        // Highest priority first; ties broken by latest valid_from, then id,
        // so resolution is deterministic.
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.window.valid_from.cmp(&a.window.valid_from))
                .then_with(|| a.id.cmp(&b.id))
        });

        // A SKU line anywhere in the candidate set establishes the SKU's
        // commodity; commodity lines then act as a fallback for it.
        let commodity = candidates.iter().find_map(|list| {
            list.lines.iter().find_map(|line| match &line.selector {
                LineSelector::Sku { sku, commodity } if sku == &request.sku => commodity.clone(),
                _ => None,
            })
        });

        for list in &candidates {
            if let Some(line) = Self::match_line(list, &request.sku, commodity.as_deref()) {
                let unit_price = line.unit_price_for(request.quantity);
                let quantity = Decimal::from(request.quantity);
                debug!(
                    price_list = %list.id,
                    line = %line.selector.describe(),
                    unit_price = %unit_price,
                    quantity = request.quantity,
                    "base price resolved"
                );
                return Ok(BaseResolution {
                    component: QuoteComponent {
                        key: "base".to_string(),
                        kind: ComponentKind::Base,
                        description: format!(
                            "base price from `{}` ({})",
                            list.id,
                            line.selector.describe()
                        ),
                        rate: Some(unit_price),
                        basis: Some(quantity),
                        amount: unit_price * quantity,
                        calculated_from: None,
                        capped_value: None,
                    },
                    price_list_id: list.id.clone(),
                    currency: list.currency.clone(),
                    uom: line.uom.clone(),
                    commodity: commodity.clone(),
                    unit_price,
                });
            }
        }

        Err(EngineError::not_found(
            "price list line",
            format!(
                "tenant={} sku={} channel={:?} date={}",
                request.tenant.0,
                request.sku,
                request.channel,
                price_date.to_rfc3339()
            ),
        ))
    }

    fn match_line<'a>(
        list: &'a PriceList,
        sku: &str,
        commodity: Option<&str>,
    ) -> Option<&'a PriceListLine> {
        list.lines
            .iter()
            .find(|line| {
                matches!(&line.selector, LineSelector::Sku { sku: scoped, .. } if scoped == sku)
            })
            .or_else(|| {
                let commodity = commodity?;
                list.lines.iter().find(|line| {
                    matches!(
                        &line.selector,
                        LineSelector::Commodity { commodity: scoped } if scoped == commodity
                    )
                })
            })
    }
}
