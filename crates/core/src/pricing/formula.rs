use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::domain::formula::{DynamicFormula, RoundingMode, StepRounding};
use crate::domain::quote::{ComponentKind, QuoteComponent, QuoteRequest};
use crate::errors::EngineError;
use crate::expr;
use crate::lookups::MarketDataLookup;

/// Evaluates the market-data-driven pricing formula for a SKU: resolves the
/// declared inputs, runs the restricted arithmetic expression, then applies
/// step rounding and min/max caps.
pub struct FormulaEvaluator;

impl FormulaEvaluator {
    /// The applicable formula, most specific scope first (SKU, then
    /// commodity, then catch-all), ties broken by latest valid_from then key.
    pub fn select<'a>(
        formulas: &'a [DynamicFormula],
        sku: &str,
        commodity: Option<&str>,
        price_date: DateTime<Utc>,
    ) -> Option<&'a DynamicFormula> {
        formulas
            .iter()
            .filter(|formula| {
                formula.active
                    && formula.window.covers(price_date)
                    && formula.scope.matches(sku, commodity)
            })
            .max_by(|a, b| {
                a.scope
                    .specificity()
                    .cmp(&b.scope.specificity())
                    .then_with(|| a.window.valid_from.cmp(&b.window.valid_from))
                    .then_with(|| b.key.cmp(&a.key))
            })
    }

    pub async fn evaluate(
        formula: &DynamicFormula,
        request: &QuoteRequest,
        market_data: &dyn MarketDataLookup,
        lookup_timeout: Duration,
        price_date: DateTime<Utc>,
    ) -> Result<QuoteComponent, EngineError> {
        let inputs =
            Self::resolve_inputs(formula, request, market_data, lookup_timeout, price_date)
                .await?;

        let compiled = expr::compile(&formula.expression, &formula.input_names())
            .map_err(|error| EngineError::Validation {
                message: format!("formula `{}`: {error}", formula.key),
            })?;
        let raw = compiled.evaluate(&inputs).map_err(|error| EngineError::FormulaEvaluation {
            formula: formula.key.clone(),
            message: error.to_string(),
        })?;

        let rounded = match &formula.rounding {
            Some(rounding) => round_to_step(raw, rounding),
            None => raw,
        };
        let (unit_value, capped_value) = match &formula.caps {
            Some(caps) => caps.clamp(rounded),
            None => (rounded, None),
        };
        debug!(
            formula = %formula.key,
            raw = %raw,
            unit_value = %unit_value,
            capped = capped_value.is_some(),
            "dynamic formula evaluated"
        );

        let quantity = Decimal::from(request.quantity);
        Ok(QuoteComponent {
            key: format!("dynamic:{}", formula.key),
            kind: ComponentKind::Dynamic,
            description: format!("dynamic pricing `{}`", formula.key),
            rate: None,
            basis: Some(raw),
            amount: unit_value * quantity,
            calculated_from: Some("base".to_string()),
            capped_value,
        })
    }

    async fn resolve_inputs(
        formula: &DynamicFormula,
        request: &QuoteRequest,
        market_data: &dyn MarketDataLookup,
        lookup_timeout: Duration,
        price_date: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Decimal>, EngineError> {
        let mut resolved = BTreeMap::new();
        for input in &formula.inputs {
            let value = if input.source.is_market() {
                let source_ref = input.source_ref.as_deref().ok_or_else(|| {
                    EngineError::validation(format!(
                        "formula `{}` input `{}`: market source requires a source_ref",
                        formula.key, input.name
                    ))
                })?;
                let observed = tokio::time::timeout(
                    lookup_timeout,
                    market_data.observe(input.source, source_ref, price_date),
                )
                .await;
                match observed {
                    Ok(Ok(Some(value))) => Some(value),
                    Ok(Ok(None)) => None,
                    Ok(Err(error)) => {
                        // Degraded feed: fall back if the formula declares a
                        // fallback, otherwise surface the lookup failure.
                        warn!(
                            formula = %formula.key,
                            input = %input.name,
                            %error,
                            "market data lookup failed"
                        );
                        if input.fallback.is_none() {
                            return Err(EngineError::LookupFailed {
                                lookup: "market_data",
                                source: error,
                            });
                        }
                        None
                    }
                    Err(_) => {
                        warn!(
                            formula = %formula.key,
                            input = %input.name,
                            "market data lookup timed out"
                        );
                        if input.fallback.is_none() {
                            return Err(EngineError::LookupTimeout { lookup: "market_data" });
                        }
                        None
                    }
                }
            } else {
                request.context.get(&input.name).copied()
            };

            let value = value.or(input.fallback).ok_or_else(|| {
                EngineError::MissingFormulaInput {
                    formula: formula.key.clone(),
                    input: input.name.clone(),
                }
            })?;
            resolved.insert(input.name.clone(), value);
        }
        Ok(resolved)
    }
}

fn round_to_step(value: Decimal, rounding: &StepRounding) -> Decimal {
    let steps = value / rounding.step;
    let whole_steps = match rounding.mode {
        RoundingMode::Down => steps.floor(),
        RoundingMode::Up => steps.ceil(),
        RoundingMode::Nearest => {
            steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        }
    };
    whole_steps * rounding.step
}
