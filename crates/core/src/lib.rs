pub mod config;
pub mod domain;
pub mod errors;
pub mod expr;
pub mod fixtures;
pub mod lookups;
pub mod pricing;
pub mod signature;
pub mod store;

pub use config::{ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat};
pub use domain::common::{CustomerId, QuoteId, SalesChannel, TenantId, ValidityWindow};
pub use domain::condition::{
    AdjustmentMethod, ConditionKeyType, ConditionRule, ConditionSet, ConflictStrategy, RuleScope,
    RuleType,
};
pub use domain::formula::{
    DynamicFormula, FormulaInput, FormulaScope, InputSource, PriceCaps, RoundingMode, StepRounding,
};
pub use domain::price_list::{LineSelector, PriceList, PriceListLine, TierBreak};
pub use domain::quote::{
    ComponentKind, CustomerKeys, PriceQuote, QuoteComponent, QuoteInputs, QuoteRequest,
};
pub use domain::tax::{TaxCharge, TaxChargeMethod, TaxChargeScope};
pub use errors::{EngineError, LookupError};
pub use lookups::Lookups;
pub use pricing::composer::QuoteComposer;
pub use pricing::conditions::ConditionEngine;
pub use pricing::formula::FormulaEvaluator;
pub use pricing::price_list::PriceListResolver;
pub use pricing::QuoteService;
pub use signature::QuoteSigner;
pub use store::QuoteStore;
