pub mod common;
pub mod condition;
pub mod formula;
pub mod price_list;
pub mod quote;
pub mod tax;
