//! Sandwich Ledger Engine
//!
//! Integrity and aggregation core for the sandwich-collection ledger:
//! breakdown-sum validation, duplicate detection, filter-consistent views,
//! and batch mutation coordination. Persistence lives behind the
//! [`store::LedgerStore`] seam; this crate never owns it.

pub mod batch;
pub mod duplicates;
pub mod export;
pub mod hosts;
pub mod models;
pub mod parser;
pub mod session;
pub mod stats;
pub mod store;
pub mod validate;
pub mod view;
