use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use pricekit_core::config::{EngineConfig, LoadOptions};
use pricekit_core::domain::common::{CustomerId, SalesChannel, TenantId};
use pricekit_core::domain::quote::QuoteRequest;
use pricekit_core::errors::EngineError;
use pricekit_core::fixtures;
use pricekit_core::pricing::QuoteService;

use crate::commands::CommandResult;
use crate::dataset;

pub struct CalculateArgs {
    pub tenant: String,
    pub customer: String,
    pub sku: String,
    pub quantity: u32,
    pub channel: Option<String>,
    pub dataset: Option<PathBuf>,
    pub context: Vec<String>,
}

pub fn run(args: CalculateArgs) -> CommandResult {
    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("calculate", "config_validation", error.to_string(), 2)
        }
    };

    let lookups = match &args.dataset {
        Some(path) => match dataset::load(path) {
            Ok(lookups) => lookups,
            Err(error) => {
                return CommandResult::failure("calculate", "dataset", format!("{error:#}"), 3)
            }
        },
        None => fixtures::demo_lookups(),
    };

    let channel = match args.channel.as_deref().map(SalesChannel::from_str).transpose() {
        Ok(channel) => channel,
        Err(error) => {
            return CommandResult::failure("calculate", "invalid_request", error.to_string(), 3)
        }
    };

    let context = match parse_context(&args.context) {
        Ok(context) => context,
        Err(message) => return CommandResult::failure("calculate", "invalid_request", message, 3),
    };

    let request = QuoteRequest {
        tenant: TenantId(args.tenant),
        customer_id: CustomerId(args.customer),
        sku: args.sku,
        quantity: args.quantity,
        uom: None,
        channel,
        price_date: None,
        context,
        requested_by: Some("cli".to_string()),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "calculate",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                5,
            )
        }
    };

    let service = QuoteService::new(&config, lookups);
    match runtime.block_on(service.calculate(request)) {
        Ok(quote) => match serde_json::to_value(&quote) {
            Ok(value) => CommandResult::success_with_quote(
                "calculate",
                format!(
                    "quote {} issued: {} {} net, {} {} gross, expires {}",
                    quote.id.0,
                    quote.total_net,
                    quote.currency,
                    quote.total_gross,
                    quote.currency,
                    quote.expires_at
                ),
                value,
            ),
            Err(error) => CommandResult::failure("calculate", "serialization", error.to_string(), 5),
        },
        Err(error) => {
            CommandResult::failure("calculate", error.class(), error.to_string(), exit_code(&error))
        }
    }
}

fn exit_code(error: &EngineError) -> u8 {
    match error {
        EngineError::Validation { .. } => 3,
        EngineError::NotFound { .. } => 4,
        _ => 5,
    }
}

fn parse_context(pairs: &[String]) -> Result<BTreeMap<String, Decimal>, String> {
    let mut context = BTreeMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(format!("context entry `{pair}` is not in NAME=VALUE form"));
        };
        let parsed = Decimal::from_str(value.trim())
            .map_err(|_| format!("context entry `{pair}` has a non-numeric value"))?;
        context.insert(name.trim().to_string(), parsed);
    }
    Ok(context)
}
