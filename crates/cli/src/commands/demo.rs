use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::Serialize;

use pricekit_core::domain::common::{CustomerId, TenantId};
use pricekit_core::domain::quote::{ComponentKind, PriceQuote, QuoteRequest};
use pricekit_core::fixtures;
use pricekit_core::pricing::QuoteService;

use crate::commands::CommandResult;

// The demo runs against the built-in dataset with its own key; it never
// touches configured credentials.
const DEMO_SIGNING_KEY: &str = "pricekit-demo-signing-key-0001";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum DemoStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DemoCheck {
    name: &'static str,
    status: DemoStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    command: &'static str,
    status: DemoStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<DemoCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let fixture_started = Instant::now();
    match validate_fixtures() {
        Ok(count) => checks.push(DemoCheck {
            name: "fixture_validation",
            status: DemoStatus::Pass,
            elapsed_ms: fixture_started.elapsed().as_millis() as u64,
            message: format!("{count} demo records validated"),
        }),
        Err(message) => {
            checks.push(DemoCheck {
                name: "fixture_validation",
                status: DemoStatus::Fail,
                elapsed_ms: fixture_started.elapsed().as_millis() as u64,
                message,
            });
            checks.push(skipped("reference_scenario"));
            checks.push(skipped("redeem_round_trip"));
            checks.push(skipped("formula_scenario"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(DemoCheck {
                name: "reference_scenario",
                status: DemoStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("redeem_round_trip"));
            checks.push(skipped("formula_scenario"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let service = QuoteService::with_signing_key(
        fixtures::demo_lookups(),
        DEMO_SIGNING_KEY.to_string().into(),
        Duration::from_secs(900),
        Duration::from_millis(2_000),
    );

    let scenario_started = Instant::now();
    let steel_quote = match runtime.block_on(run_reference_scenario(&service)) {
        Ok(quote) => {
            checks.push(DemoCheck {
                name: "reference_scenario",
                status: DemoStatus::Pass,
                elapsed_ms: scenario_started.elapsed().as_millis() as u64,
                message: format!(
                    "50 t of {}: {} {} net, {} {} gross",
                    fixtures::STEEL_SKU,
                    quote.total_net,
                    quote.currency,
                    quote.total_gross,
                    quote.currency
                ),
            });
            Some(quote)
        }
        Err(message) => {
            checks.push(DemoCheck {
                name: "reference_scenario",
                status: DemoStatus::Fail,
                elapsed_ms: scenario_started.elapsed().as_millis() as u64,
                message,
            });
            None
        }
    };

    let redeem_started = Instant::now();
    match steel_quote {
        Some(quote) => match runtime.block_on(run_redeem_round_trip(&service, &quote)) {
            Ok(()) => checks.push(DemoCheck {
                name: "redeem_round_trip",
                status: DemoStatus::Pass,
                elapsed_ms: redeem_started.elapsed().as_millis() as u64,
                message: "signature accepted; tampered signature rejected".to_string(),
            }),
            Err(message) => checks.push(DemoCheck {
                name: "redeem_round_trip",
                status: DemoStatus::Fail,
                elapsed_ms: redeem_started.elapsed().as_millis() as u64,
                message,
            }),
        },
        None => checks.push(skipped("redeem_round_trip")),
    }

    let formula_started = Instant::now();
    match runtime.block_on(run_formula_scenario(&service)) {
        Ok(message) => checks.push(DemoCheck {
            name: "formula_scenario",
            status: DemoStatus::Pass,
            elapsed_ms: formula_started.elapsed().as_millis() as u64,
            message,
        }),
        Err(message) => checks.push(DemoCheck {
            name: "formula_scenario",
            status: DemoStatus::Fail,
            elapsed_ms: formula_started.elapsed().as_millis() as u64,
            message,
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn validate_fixtures() -> Result<usize, String> {
    let mut count = 0;
    for list in fixtures::demo_price_lists() {
        list.validate().map_err(|error| error.to_string())?;
        count += 1;
    }
    for set in fixtures::demo_condition_sets() {
        set.validate().map_err(|error| error.to_string())?;
        count += 1;
    }
    for formula in fixtures::demo_formulas() {
        formula.validate().map_err(|error| error.to_string())?;
        count += 1;
    }
    for charge in fixtures::demo_tax_charges() {
        charge.validate().map_err(|error| error.to_string())?;
        count += 1;
    }
    Ok(count)
}

fn demo_request(sku: &str, quantity: u32) -> QuoteRequest {
    QuoteRequest {
        tenant: TenantId(fixtures::DEMO_TENANT.to_string()),
        customer_id: CustomerId(fixtures::DEMO_CUSTOMER.to_string()),
        sku: sku.to_string(),
        quantity,
        uom: None,
        channel: None,
        price_date: None,
        context: BTreeMap::new(),
        requested_by: Some("demo".to_string()),
    }
}

async fn run_reference_scenario(service: &QuoteService) -> Result<PriceQuote, String> {
    let quote = service
        .calculate(demo_request(fixtures::STEEL_SKU, 50))
        .await
        .map_err(|error| error.to_string())?;

    expect_amount("base", quote.base_component().map(|c| c.amount), Decimal::new(4_750, 0))?;
    let discount = quote
        .components
        .iter()
        .find(|component| component.kind == ComponentKind::Condition)
        .map(|component| component.amount);
    expect_amount("loyalty discount", discount, Decimal::new(-2_375, 1))?;
    expect_amount("net total", Some(quote.total_net), Decimal::new(45_125, 1))?;
    expect_amount("tax total", Some(quote.tax_total()), Decimal::new(857_375, 3))?;
    expect_amount("gross total", Some(quote.total_gross), Decimal::new(5_369_875, 3))?;

    Ok(quote)
}

async fn run_redeem_round_trip(service: &QuoteService, quote: &PriceQuote) -> Result<(), String> {
    service
        .redeem(&quote.tenant, &quote.id, &quote.signature)
        .await
        .map_err(|error| format!("redeem with issued signature failed: {error}"))?;

    match service.redeem(&quote.tenant, &quote.id, "deadbeef").await {
        Ok(_) => Err("tampered signature was accepted".to_string()),
        Err(_) => Ok(()),
    }
}

async fn run_formula_scenario(service: &QuoteService) -> Result<String, String> {
    let quote = service
        .calculate(demo_request(fixtures::ALUMINIUM_SKU, 10))
        .await
        .map_err(|error| error.to_string())?;

    let dynamic = quote
        .components
        .iter()
        .find(|component| component.kind == ComponentKind::Dynamic)
        .ok_or_else(|| "quote has no dynamic pricing component".to_string())?;

    // LME 2410 + premium 50, divided by 200, lands exactly on the 0.05 step.
    let step = Decimal::new(5, 2);
    let unit_amount = dynamic.amount / Decimal::from(quote.inputs.quantity);
    if (unit_amount / step) != (unit_amount / step).trunc() {
        return Err(format!("dynamic unit amount {unit_amount} is not aligned to step {step}"));
    }

    Ok(format!(
        "10 t of {}: dynamic component {} on top of base, {} {} gross",
        fixtures::ALUMINIUM_SKU,
        dynamic.amount,
        quote.total_gross,
        quote.currency
    ))
}

fn expect_amount(
    name: &str,
    actual: Option<Decimal>,
    expected: Decimal,
) -> Result<(), String> {
    match actual {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(format!("{name} was {actual}, expected {expected}")),
        None => Err(format!("{name} component is missing")),
    }
}

fn skipped(name: &'static str) -> DemoCheck {
    DemoCheck {
        name,
        status: DemoStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<DemoCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == DemoStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == DemoStatus::Fail);

    let report = DemoReport {
        command: "demo",
        status: if failed { DemoStatus::Fail } else { DemoStatus::Pass },
        summary: format!("demo: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"demo\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

#[cfg(test)]
mod tests {
    use super::{skipped, DemoStatus};

    #[test]
    fn skipped_checks_carry_a_readable_reason() {
        let check = skipped("redeem_round_trip");
        assert_eq!(check.status, DemoStatus::Skipped);
        assert_eq!(check.message, "skipped due to previous failure");
    }
}
