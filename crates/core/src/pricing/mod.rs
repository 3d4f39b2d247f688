//! The calculation pipeline: base price, conditions, dynamic formula,
//! charges and taxes, then a signed immutable quote.

pub mod composer;
pub mod conditions;
pub mod formula;
pub mod price_list;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::domain::common::{QuoteId, TenantId};
use crate::domain::quote::{CustomerKeys, PriceQuote, QuoteRequest};
use crate::errors::{EngineError, LookupError};
use crate::lookups::Lookups;
use crate::signature::QuoteSigner;
use crate::store::QuoteStore;

use composer::QuoteComposer;
use conditions::ConditionEngine;
use formula::FormulaEvaluator;
use price_list::PriceListResolver;

/// Facade over the full pricing pipeline. All collaborators are injected at
/// construction; the service owns only the quote store and the signer.
pub struct QuoteService {
    lookups: Lookups,
    store: Arc<QuoteStore>,
    signer: QuoteSigner,
    quote_ttl: Duration,
    lookup_timeout: Duration,
}

impl QuoteService {
    pub fn new(config: &EngineConfig, lookups: Lookups) -> Self {
        Self::with_signing_key(
            lookups,
            config.quote.signing_key.clone(),
            Duration::from_secs(config.quote.ttl_secs),
            Duration::from_millis(config.lookups.timeout_ms),
        )
    }

    pub fn with_signing_key(
        lookups: Lookups,
        signing_key: SecretString,
        quote_ttl: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            lookups,
            store: Arc::new(QuoteStore::new()),
            signer: QuoteSigner::new(signing_key),
            quote_ttl,
            lookup_timeout,
        }
    }

    pub fn store(&self) -> &QuoteStore {
        &self.store
    }

    /// Runs the pipeline for one request and stores the signed result.
    /// Any failure along the way yields an error and no quote; partial
    /// quotes are never stored.
    pub async fn calculate(&self, request: QuoteRequest) -> Result<PriceQuote, EngineError> {
        request.validate()?;

        let created_at = Utc::now();
        let price_date = request.price_date.unwrap_or(created_at);

        let keys = self.resolve_customer_keys(&request).await?;

        let price_lists = self
            .bounded("price_list", self.lookups.price_lists.active_price_lists(&request.tenant))
            .await?;
        let base = PriceListResolver::resolve(&request, &price_lists, price_date)?;
        debug!(
            sku = %request.sku,
            price_list = %base.price_list_id,
            unit_price = %base.unit_price,
            "base price resolved"
        );

        let sets = self
            .bounded("condition_set", self.lookups.condition_sets.condition_sets(&request.tenant))
            .await?;
        let outcome = ConditionEngine::apply(
            &request,
            &keys,
            &sets,
            base.component.amount,
            base.commodity.as_deref(),
            price_date,
        )?;

        let mut components = Vec::with_capacity(outcome.components.len() + 4);
        components.push(base.component.clone());
        components.extend(outcome.components);
        let mut net = outcome.subtotal;

        let formulas =
            self.bounded("formula", self.lookups.formulas.formulas(&request.tenant)).await?;
        if let Some(formula) = FormulaEvaluator::select(
            &formulas,
            &request.sku,
            base.commodity.as_deref(),
            price_date,
        ) {
            let component = FormulaEvaluator::evaluate(
                formula,
                &request,
                self.lookups.market_data.as_ref(),
                self.lookup_timeout,
                price_date,
            )
            .await?;
            net += component.amount;
            components.push(component);
        }

        if net <= Decimal::ZERO {
            return Err(EngineError::validation(format!(
                "net total {net} is not positive after dynamic pricing"
            )));
        }

        let charges = self
            .bounded(
                "tax_charge",
                self.lookups.tax_charges.charges(
                    &request.tenant,
                    &request.sku,
                    base.commodity.as_deref(),
                    keys.region.as_deref(),
                    price_date,
                ),
            )
            .await?;

        let quote = QuoteComposer::new(&self.signer, self.quote_ttl).compose(
            request,
            keys,
            base.currency,
            components,
            net,
            &charges,
            created_at,
        )?;
        self.store.put(quote.clone()).await?;

        info!(
            quote_id = %quote.id.0,
            tenant = %quote.tenant.0,
            total_net = %quote.total_net,
            total_gross = %quote.total_gross,
            expires_at = %quote.expires_at,
            "quote issued"
        );
        Ok(quote)
    }

    pub async fn get_quote(&self, tenant: &TenantId, id: &QuoteId) -> Option<PriceQuote> {
        self.store.get(tenant, id, Utc::now()).await
    }

    /// Fetch-and-verify for a caller about to act on a quote. The presented
    /// signature must match the stored payload.
    pub async fn redeem(
        &self,
        tenant: &TenantId,
        id: &QuoteId,
        presented_signature: &str,
    ) -> Result<PriceQuote, EngineError> {
        self.store.redeem(tenant, id, presented_signature, &self.signer, Utc::now()).await
    }

    pub fn verify_signature(&self, quote: &PriceQuote) -> Result<(), EngineError> {
        self.signer.verify(quote, &quote.signature)
    }

    pub async fn sweep_expired(&self) -> usize {
        let removed = self.store.sweep_expired(Utc::now()).await;
        if removed > 0 {
            debug!(removed, "expired quotes swept");
        }
        removed
    }

    async fn resolve_customer_keys(
        &self,
        request: &QuoteRequest,
    ) -> Result<CustomerKeys, EngineError> {
        let found = self
            .bounded(
                "customer_keys",
                self.lookups.customer_keys.customer_keys(&request.tenant, &request.customer_id),
            )
            .await?;
        // An unknown customer still gets base pricing; keyed conditions and
        // regional taxes simply find nothing to match.
        Ok(found.unwrap_or_else(|| CustomerKeys::unresolved(request.customer_id.clone())))
    }

    /// Wraps a collaborator call with the configured timeout and maps its
    /// failure modes onto engine errors.
    async fn bounded<T>(
        &self,
        lookup: &'static str,
        call: impl Future<Output = Result<T, LookupError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.lookup_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                warn!(lookup, error = %source, "lookup failed");
                Err(EngineError::LookupFailed { lookup, source })
            }
            Err(_) => {
                warn!(lookup, timeout_ms = self.lookup_timeout.as_millis() as u64, "lookup timed out");
                Err(EngineError::LookupTimeout { lookup })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use crate::domain::common::{CustomerId, QuoteId, TenantId};
    use crate::domain::formula::InputSource;
    use crate::domain::quote::{ComponentKind, QuoteRequest};
    use crate::errors::{EngineError, LookupError};
    use crate::fixtures;
    use crate::lookups::{Lookups, MarketDataLookup};
    use crate::pricing::QuoteService;

    fn service() -> QuoteService {
        QuoteService::with_signing_key(
            fixtures::demo_lookups(),
            "unit-test-signing-key-0123456789".to_string().into(),
            Duration::from_secs(900),
            Duration::from_millis(2_000),
        )
    }

    fn steel_request() -> QuoteRequest {
        QuoteRequest {
            tenant: TenantId(fixtures::DEMO_TENANT.to_string()),
            customer_id: CustomerId(fixtures::DEMO_CUSTOMER.to_string()),
            sku: fixtures::STEEL_SKU.to_string(),
            quantity: 50,
            uom: None,
            channel: None,
            price_date: None,
            context: BTreeMap::new(),
            requested_by: Some("unit-test".to_string()),
        }
    }

    #[tokio::test]
    async fn steel_scenario_produces_reference_totals() {
        let service = service();
        let quote = service.calculate(steel_request()).await.unwrap();

        let base = quote.base_component().unwrap();
        assert_eq!(base.amount, Decimal::new(4_750, 0));

        let discount = quote
            .components
            .iter()
            .find(|component| component.kind == ComponentKind::Condition)
            .unwrap();
        assert_eq!(discount.amount, Decimal::new(-2_375, 1));

        assert_eq!(quote.total_net, Decimal::new(45_125, 1));
        assert_eq!(quote.tax_total(), Decimal::new(857_375, 3));
        assert_eq!(quote.total_gross, Decimal::new(5_369_875, 3));
        assert_eq!(quote.currency, "EUR");
        assert!(quote.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn identical_requests_reprice_identically_with_fresh_identity() {
        let service = service();
        let first = service.calculate(steel_request()).await.unwrap();
        let second = service.calculate(steel_request()).await.unwrap();

        assert_eq!(first.total_net, second.total_net);
        assert_eq!(first.total_gross, second.total_gross);
        assert_ne!(first.id, second.id);
        assert_ne!(first.signature, second.signature);
    }

    #[tokio::test]
    async fn issued_quote_can_be_redeemed_with_its_signature() {
        let service = service();
        let quote = service.calculate(steel_request()).await.unwrap();

        let redeemed =
            service.redeem(&quote.tenant, &quote.id, &quote.signature).await.unwrap();
        assert_eq!(redeemed.total_gross, quote.total_gross);

        let tampered = service.redeem(&quote.tenant, &quote.id, "deadbeef").await;
        assert!(matches!(tampered, Err(EngineError::SignatureMismatch { .. })));
    }

    #[tokio::test]
    async fn unknown_quote_id_is_not_found() {
        let service = service();
        let missing = service
            .redeem(
                &TenantId(fixtures::DEMO_TENANT.to_string()),
                &QuoteId("no-such-quote".to_string()),
                "deadbeef",
            )
            .await;
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unknown_sku_yields_not_found_and_stores_nothing() {
        let service = service();
        let mut request = steel_request();
        request.sku = "NO-SUCH-SKU".to_string();

        let result = service.calculate(request).await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
        assert!(service.store().is_empty().await);
    }

    struct SlowMarketData;

    #[async_trait]
    impl MarketDataLookup for SlowMarketData {
        async fn observe(
            &self,
            _source: InputSource,
            _source_ref: &str,
            _at: DateTime<Utc>,
        ) -> Result<Option<Decimal>, LookupError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn formula_quote_survives_market_feed_timeout_via_fallback() {
        let demo = fixtures::demo_lookups();
        let lookups = Lookups { market_data: Arc::new(SlowMarketData), ..demo };
        let service = QuoteService::with_signing_key(
            lookups,
            "unit-test-signing-key-0123456789".to_string().into(),
            Duration::from_secs(900),
            Duration::from_millis(50),
        );

        let mut request = steel_request();
        request.sku = fixtures::ALUMINIUM_SKU.to_string();
        request.quantity = 10;

        let quote = service.calculate(request).await.unwrap();
        let dynamic = quote
            .components
            .iter()
            .find(|component| component.kind == ComponentKind::Dynamic)
            .unwrap();
        // The declared fallback value stands in for the unavailable feed.
        assert!(dynamic.amount > Decimal::ZERO);
        assert!(quote.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn flat_charges_enter_net_before_percentage_taxes() {
        use crate::domain::common::ValidityWindow;
        use crate::domain::tax::{TaxCharge, TaxChargeMethod, TaxChargeScope};
        use crate::lookups::memory::InMemoryTaxChargeLookup;

        let window = ValidityWindow::open_from(Utc::now() - chrono::Duration::days(1));
        let tax_charges = InMemoryTaxChargeLookup::new(vec![
            TaxCharge {
                key: "freight".to_string(),
                tenant: TenantId(fixtures::DEMO_TENANT.to_string()),
                scope: TaxChargeScope::All,
                region: None,
                method: TaxChargeMethod::Amount { amount: Decimal::new(100, 0) },
                window: window.clone(),
            },
            TaxCharge {
                key: "vat".to_string(),
                tenant: TenantId(fixtures::DEMO_TENANT.to_string()),
                scope: TaxChargeScope::All,
                region: None,
                method: TaxChargeMethod::RatePct { rate: Decimal::new(19, 0) },
                window,
            },
        ]);
        let lookups = Lookups { tax_charges: Arc::new(tax_charges), ..fixtures::demo_lookups() };
        let service = QuoteService::with_signing_key(
            lookups,
            "unit-test-signing-key-0123456789".to_string().into(),
            Duration::from_secs(900),
            Duration::from_millis(2_000),
        );

        let quote = service.calculate(steel_request()).await.unwrap();

        // 4750 - 237.50 + 100 freight = 4612.50 net; VAT applies on top of it.
        assert_eq!(quote.total_net, Decimal::new(46_125, 1));
        let vat = quote
            .components
            .iter()
            .find(|component| component.kind == ComponentKind::Tax)
            .unwrap();
        assert_eq!(vat.basis, Some(Decimal::new(46_125, 1)));
        assert_eq!(quote.total_gross, Decimal::new(46_125, 1) + vat.amount);
        assert!(quote.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn expired_quotes_are_swept() {
        let service = QuoteService::with_signing_key(
            fixtures::demo_lookups(),
            "unit-test-signing-key-0123456789".to_string().into(),
            Duration::from_millis(1),
            Duration::from_millis(2_000),
        );
        let quote = service.calculate(steel_request()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(service.get_quote(&quote.tenant, &quote.id).await.is_none());
        assert_eq!(service.sweep_expired().await, 0);
    }
}
