//! End-to-end scenarios through the public crate surface only.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;

use pricekit_core::fixtures;
use pricekit_core::{
    ComponentKind, CustomerId, EngineError, QuoteRequest, QuoteService, TenantId,
};

const SIGNING_KEY: &str = "integration-signing-key-00000001";

fn service(ttl: Duration) -> QuoteService {
    QuoteService::with_signing_key(
        fixtures::demo_lookups(),
        SIGNING_KEY.to_string().into(),
        ttl,
        Duration::from_millis(2_000),
    )
}

fn steel_request(quantity: u32) -> QuoteRequest {
    QuoteRequest {
        tenant: TenantId(fixtures::DEMO_TENANT.to_string()),
        customer_id: CustomerId(fixtures::DEMO_CUSTOMER.to_string()),
        sku: fixtures::STEEL_SKU.to_string(),
        quantity,
        uom: None,
        channel: None,
        price_date: None,
        context: BTreeMap::new(),
        requested_by: Some("integration".to_string()),
    }
}

#[tokio::test]
async fn full_pipeline_prices_the_reference_scenario() {
    let service = service(Duration::from_secs(900));
    let quote = service.calculate(steel_request(50)).await.unwrap();

    let kinds: Vec<ComponentKind> = quote.components.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ComponentKind::Base, ComponentKind::Condition, ComponentKind::Tax]);

    assert_eq!(quote.total_net, Decimal::new(45_125, 1));
    assert_eq!(quote.total_gross, Decimal::new(5_369_875, 3));
    assert!(service.verify_signature(&quote).is_ok());

    let fetched = service.get_quote(&quote.tenant, &quote.id).await.unwrap();
    assert_eq!(fetched.signature, quote.signature);
}

#[tokio::test]
async fn quantity_below_every_tier_uses_the_flat_base_price() {
    let service = service(Duration::from_secs(900));
    let quote = service.calculate(steel_request(5)).await.unwrap();

    // 5 t at the flat 100/t, below the first tier break at 10.
    let base = quote.base_component().unwrap();
    assert_eq!(base.rate, Some(Decimal::new(100, 0)));
    assert_eq!(base.amount, Decimal::new(500, 0));
}

#[tokio::test]
async fn formula_sku_gets_an_additive_dynamic_component() {
    let service = service(Duration::from_secs(900));
    let mut request = steel_request(10);
    request.sku = fixtures::ALUMINIUM_SKU.to_string();

    let quote = service.calculate(request).await.unwrap();
    let base = quote.base_component().unwrap();
    let dynamic = quote
        .components
        .iter()
        .find(|component| component.kind == ComponentKind::Dynamic)
        .unwrap();

    // (LME 2410 + premium 50) / 200 = 12.30 per unit, layered on the base.
    assert_eq!(dynamic.amount, Decimal::new(123, 0));
    let non_tax: Decimal = quote
        .components
        .iter()
        .filter(|component| component.kind != ComponentKind::Tax)
        .map(|component| component.amount)
        .sum();
    assert_eq!(quote.total_net, non_tax);
    assert!(dynamic.amount > Decimal::ZERO);
    assert!(base.amount > Decimal::ZERO);
}

#[tokio::test]
async fn expired_quote_is_gone_and_redemption_reports_it() {
    let service = service(Duration::from_millis(1));
    let quote = service.calculate(steel_request(50)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(service.get_quote(&quote.tenant, &quote.id).await.is_none());
    let redeemed = service.redeem(&quote.tenant, &quote.id, &quote.signature).await;
    assert!(matches!(
        redeemed,
        Err(EngineError::ExpiredQuote { .. }) | Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn tampered_total_invalidates_the_signature() {
    let service = service(Duration::from_secs(900));
    let mut quote = service.calculate(steel_request(50)).await.unwrap();

    quote.total_net += Decimal::ONE;
    assert!(matches!(
        service.verify_signature(&quote),
        Err(EngineError::SignatureMismatch { .. })
    ));
}
