//! # GSS Common Library
//!
//! Shared code for the grocery shopper survey services including:
//! - Reference data (retailer catalog, KPC attributes, quota targets)
//! - Segment classification and share-of-wallet ranking
//! - Survey flow state machine
//! - Retailer assignment engine
//! - Data-quality flag computation
//! - Database schema, respondent store and atomic counters
//! - Configuration loading

pub mod assignment;
pub mod catalog;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod flow;
pub mod quality;
pub mod segment;
pub mod sow;
pub mod time;

pub use error::{Error, Result};
pub use segment::{classify_segment, FunnelStage, Segment};
