use std::fs;
use std::path::Path;

use pricekit_core::config::{EngineConfig, LoadOptions};
use pricekit_core::domain::quote::PriceQuote;
use pricekit_core::signature::QuoteSigner;

use crate::commands::CommandResult;

/// Checks a quote document against the configured signing key. Any edit to
/// the inputs, components or net total invalidates the signature.
pub fn run(input: &Path) -> CommandResult {
    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("verify", "config_validation", error.to_string(), 2)
        }
    };

    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "verify",
                "io",
                format!("could not read `{}`: {error}", input.display()),
                3,
            )
        }
    };

    let quote: PriceQuote = match serde_json::from_str(&raw) {
        Ok(quote) => quote,
        Err(error) => {
            return CommandResult::failure(
                "verify",
                "parse",
                format!("`{}` is not a valid quote document: {error}", input.display()),
                3,
            )
        }
    };

    if let Err(error) = quote.check_invariants() {
        return CommandResult::failure("verify", error.class(), error.to_string(), 5);
    }

    let signer = QuoteSigner::new(config.quote.signing_key.clone());
    match signer.verify(&quote, &quote.signature) {
        Ok(()) => CommandResult::success(
            "verify",
            format!("signature verified for quote {} (expires {})", quote.id.0, quote.expires_at),
        ),
        Err(error) => CommandResult::failure("verify", error.class(), error.to_string(), 5),
    }
}
