//! Keyed integrity codes binding a quote's inputs, components, and net total
//! to its identifier. A redeemed quote id is verified against this code to
//! detect tampering.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

use crate::domain::common::QuoteId;
use crate::domain::quote::{PriceQuote, QuoteComponent, QuoteInputs};
use crate::errors::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Canonical signing payload. Field order is fixed and the request context is
/// a `BTreeMap`, so the JSON serialization is deterministic.
#[derive(Serialize)]
struct SignaturePayload<'a> {
    id: &'a QuoteId,
    inputs: &'a QuoteInputs,
    components: &'a [QuoteComponent],
    total_net: &'a rust_decimal::Decimal,
}

#[derive(Clone)]
pub struct QuoteSigner {
    signing_key: SecretString,
}

impl QuoteSigner {
    pub fn new(signing_key: SecretString) -> Self {
        Self { signing_key }
    }

    pub fn sign(&self, quote: &PriceQuote) -> Result<String, EngineError> {
        let payload = canonical_payload(quote)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        Ok(encode_hex(mac.finalize().into_bytes().as_slice()))
    }

    /// Constant-time verification of a presented signature against the
    /// quote's payload.
    pub fn verify(&self, quote: &PriceQuote, presented: &str) -> Result<(), EngineError> {
        let mismatch = || EngineError::SignatureMismatch { id: quote.id.0.clone() };
        let presented_bytes = decode_hex(presented).ok_or_else(mismatch)?;

        let payload = canonical_payload(quote)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&presented_bytes).map_err(|_| mismatch())
    }

    fn mac(&self) -> Result<HmacSha256, EngineError> {
        HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .map_err(|_| EngineError::validation("signing key must not be empty"))
    }
}

fn canonical_payload(quote: &PriceQuote) -> Result<Vec<u8>, EngineError> {
    let payload = SignaturePayload {
        id: &quote.id,
        inputs: &quote.inputs,
        components: &quote.components,
        total_net: &quote.total_net,
    };
    serde_json::to_vec(&payload).map_err(|error| {
        EngineError::validation(format!("quote `{}` could not be serialized: {error}", quote.id.0))
    })
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(input.get(index..index + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::QuoteSigner;
    use crate::domain::common::{CustomerId, QuoteId, TenantId};
    use crate::domain::quote::{
        ComponentKind, CustomerKeys, PriceQuote, QuoteComponent, QuoteInputs,
    };
    use crate::errors::EngineError;

    fn signer() -> QuoteSigner {
        QuoteSigner::new("a-test-signing-key-32-chars-long".to_string().into())
    }

    fn quote_fixture(id: &str) -> PriceQuote {
        let created_at = Utc::now();
        PriceQuote {
            id: QuoteId(id.to_string()),
            tenant: TenantId("acme".to_string()),
            inputs: QuoteInputs {
                customer: CustomerKeys::unresolved(CustomerId("cust-1".to_string())),
                sku: "STL-COIL".to_string(),
                quantity: 50,
                channel: None,
                price_date: created_at,
                context: BTreeMap::new(),
                requested_by: None,
            },
            components: vec![QuoteComponent {
                key: "base".to_string(),
                kind: ComponentKind::Base,
                description: "base price".to_string(),
                rate: Some(Decimal::new(95, 0)),
                basis: Some(Decimal::new(50, 0)),
                amount: Decimal::new(4_750, 0),
                calculated_from: None,
                capped_value: None,
            }],
            currency: "EUR".to_string(),
            total_net: Decimal::new(4_750, 0),
            total_gross: Decimal::new(4_750, 0),
            created_at,
            expires_at: created_at + Duration::minutes(15),
            signature: String::new(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = signer();
        let mut quote = quote_fixture("q-1");
        quote.signature = signer.sign(&quote).expect("sign");
        assert!(signer.verify(&quote, &quote.signature).is_ok());
    }

    #[test]
    fn tampered_component_amount_fails_verification() {
        let signer = signer();
        let mut quote = quote_fixture("q-2");
        quote.signature = signer.sign(&quote).expect("sign");

        quote.components[0].amount += Decimal::ONE;
        assert!(matches!(
            signer.verify(&quote, &quote.signature),
            Err(EngineError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn signature_is_bound_to_the_quote_id() {
        let signer = signer();
        let quote_a = quote_fixture("q-3");
        let quote_b = quote_fixture("q-4");
        let signature_a = signer.sign(&quote_a).expect("sign");
        assert!(matches!(
            signer.verify(&quote_b, &signature_a),
            Err(EngineError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn garbage_signature_is_a_mismatch_not_a_panic() {
        let signer = signer();
        let quote = quote_fixture("q-5");
        assert!(matches!(
            signer.verify(&quote, "not-hex"),
            Err(EngineError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let quote = quote_fixture("q-6");
        let signature_a = signer().sign(&quote).expect("sign");
        let other = QuoteSigner::new("another-signing-key-32-chars-ok!".to_string().into());
        let signature_b = other.sign(&quote).expect("sign");
        assert_ne!(signature_a, signature_b);
    }
}
