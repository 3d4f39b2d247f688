//! Short-lived, expiry-aware quote cache. Quotes are write-once and
//! immutable; a changed price always means a new quote.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::common::{QuoteId, TenantId};
use crate::domain::quote::PriceQuote;
use crate::errors::EngineError;
use crate::signature::QuoteSigner;

#[derive(Default)]
pub struct QuoteStore {
    quotes: RwLock<HashMap<(TenantId, QuoteId), PriceQuote>>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write-once insert. A second insert under the same id is an error, not
    /// an overwrite.
    pub async fn put(&self, quote: PriceQuote) -> Result<(), EngineError> {
        let key = (quote.tenant.clone(), quote.id.clone());
        let mut quotes = self.quotes.write().await;
        if quotes.contains_key(&key) {
            return Err(EngineError::DuplicateQuoteId { id: quote.id.0.clone() });
        }
        quotes.insert(key, quote);
        Ok(())
    }

    /// Fresh quotes only. Expired entries are evicted lazily on read.
    pub async fn get(
        &self,
        tenant: &TenantId,
        id: &QuoteId,
        now: DateTime<Utc>,
    ) -> Option<PriceQuote> {
        let key = (tenant.clone(), id.clone());
        {
            let quotes = self.quotes.read().await;
            match quotes.get(&key) {
                Some(quote) if !quote.is_expired(now) => return Some(quote.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.quotes.write().await.remove(&key);
        None
    }

    /// Redemption: the stored quote is returned only when it exists, is
    /// unexpired, and the presented signature verifies against its payload.
    pub async fn redeem(
        &self,
        tenant: &TenantId,
        id: &QuoteId,
        presented_signature: &str,
        signer: &QuoteSigner,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, EngineError> {
        let key = (tenant.clone(), id.clone());
        let quote = {
            let quotes = self.quotes.read().await;
            quotes.get(&key).cloned()
        };
        let Some(quote) = quote else {
            return Err(EngineError::not_found("quote", &id.0));
        };
        if quote.is_expired(now) {
            self.quotes.write().await.remove(&key);
            return Err(EngineError::ExpiredQuote { id: id.0.clone() });
        }
        signer.verify(&quote, presented_signature)?;
        Ok(quote)
    }

    /// Drops every expired entry; returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut quotes = self.quotes.write().await;
        let before = quotes.len();
        quotes.retain(|_, quote| !quote.is_expired(now));
        before - quotes.len()
    }

    pub async fn len(&self) -> usize {
        self.quotes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quotes.read().await.is_empty()
    }
}
