//! Final assembly: charges and taxes on the priced subtotal, totals, a fresh
//! quote identity, and the integrity signature.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::common::QuoteId;
use crate::domain::quote::{
    ComponentKind, CustomerKeys, PriceQuote, QuoteComponent, QuoteInputs, QuoteRequest,
};
use crate::domain::tax::{TaxCharge, TaxChargeMethod};
use crate::errors::EngineError;
use crate::signature::QuoteSigner;

pub struct QuoteComposer<'a> {
    signer: &'a QuoteSigner,
    quote_ttl: Duration,
}

impl<'a> QuoteComposer<'a> {
    pub fn new(signer: &'a QuoteSigner, quote_ttl: Duration) -> Self {
        Self { signer, quote_ttl }
    }

    /// Builds the final quote from the priced components. Flat charges land
    /// in the net total first, percentage taxes are computed on that charged
    /// net, and the whole document is signed before it leaves this function.
    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        &self,
        request: QuoteRequest,
        keys: CustomerKeys,
        currency: String,
        mut components: Vec<QuoteComponent>,
        subtotal: Decimal,
        charges: &[TaxCharge],
        created_at: DateTime<Utc>,
    ) -> Result<PriceQuote, EngineError> {
        let net = Self::apply_flat_charges(charges, subtotal, &mut components);
        let tax = Self::apply_taxes(charges, net, &mut components);

        let ttl = chrono::Duration::from_std(self.quote_ttl)
            .map_err(|_| EngineError::validation("quote ttl is out of range"))?;

        let inputs = QuoteInputs {
            customer: keys,
            sku: request.sku,
            quantity: request.quantity,
            channel: request.channel,
            price_date: request.price_date.unwrap_or(created_at),
            context: request.context,
            requested_by: request.requested_by,
        };

        let mut quote = PriceQuote {
            id: QuoteId(Uuid::new_v4().to_string()),
            tenant: request.tenant,
            inputs,
            components,
            currency,
            total_net: net,
            total_gross: net + tax,
            created_at,
            expires_at: created_at + ttl,
            signature: String::new(),
        };
        quote.signature = self.signer.sign(&quote)?;
        quote.check_invariants()?;

        Ok(quote)
    }

    /// Flat charges (freight, handling) are part of the taxable net.
    fn apply_flat_charges(
        charges: &[TaxCharge],
        mut net: Decimal,
        components: &mut Vec<QuoteComponent>,
    ) -> Decimal {
        for charge in charges {
            let TaxChargeMethod::Amount { amount } = charge.method else {
                continue;
            };
            components.push(QuoteComponent {
                key: format!("charge:{}", charge.key),
                kind: ComponentKind::Charge,
                description: format!("flat charge {}", charge.key),
                rate: None,
                basis: None,
                amount,
                calculated_from: None,
                capped_value: None,
            });
            net += amount;
        }
        net
    }

    fn apply_taxes(
        charges: &[TaxCharge],
        net: Decimal,
        components: &mut Vec<QuoteComponent>,
    ) -> Decimal {
        let mut tax_total = Decimal::ZERO;
        for charge in charges {
            let TaxChargeMethod::RatePct { rate } = charge.method else {
                continue;
            };
            let amount = net * rate / Decimal::ONE_HUNDRED;
            components.push(QuoteComponent {
                key: format!("tax:{}", charge.key),
                kind: ComponentKind::Tax,
                description: format!("tax {} at {rate}%", charge.key),
                rate: Some(rate),
                basis: Some(net),
                amount,
                calculated_from: None,
                capped_value: None,
            });
            tax_total += amount;
        }
        tax_total
    }
}
