use thiserror::Error;

/// Failures surfaced by injected data collaborators (price lists, condition
/// sets, formulas, market data, tax references). The engine never retries
/// these on its own; retry policy belongs to the collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup backend unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup returned corrupt reference data: {detail}")]
    Corrupt { detail: String },
}

impl LookupError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt { detail: detail.into() }
    }
}

/// The full failure taxonomy of a price calculation. Any failure aborts the
/// whole calculation; there is no partial pricing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("no applicable {entity} for `{key}`")]
    NotFound { entity: String, key: String },
    #[error("formula `{formula}` input `{input}` is unresolved and has no fallback")]
    MissingFormulaInput { formula: String, input: String },
    #[error("formula `{formula}` evaluation failed: {message}")]
    FormulaEvaluation { formula: String, message: String },
    /// Defensive variant: the engine always breaks ties deterministically and
    /// logs instead of raising this, but the class stays in the taxonomy for
    /// callers that opt into strict conflict handling.
    #[error("conflict resolution ambiguous in condition set `{set_key}`")]
    ConflictResolutionAmbiguous { set_key: String },
    #[error("quote `{id}` has expired")]
    ExpiredQuote { id: String },
    #[error("quote `{id}` signature does not match its payload")]
    SignatureMismatch { id: String },
    #[error("quote id `{id}` already exists in the store")]
    DuplicateQuoteId { id: String },
    #[error("{lookup} lookup timed out")]
    LookupTimeout { lookup: &'static str },
    #[error("{lookup} lookup failed: {source}")]
    LookupFailed {
        lookup: &'static str,
        #[source]
        source: LookupError,
    },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound { entity: entity.into(), key: key.into() }
    }

    /// Stable class names for structured logs and CLI exit-code mapping.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::MissingFormulaInput { .. } => "missing_formula_input",
            Self::FormulaEvaluation { .. } => "formula_evaluation",
            Self::ConflictResolutionAmbiguous { .. } => "conflict_resolution_ambiguous",
            Self::ExpiredQuote { .. } => "expired_quote",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::DuplicateQuoteId { .. } => "duplicate_quote_id",
            Self::LookupTimeout { .. } => "lookup_timeout",
            Self::LookupFailed { .. } => "lookup_failed",
        }
    }
}
