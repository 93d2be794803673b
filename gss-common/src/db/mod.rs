//! Database models and queries

pub mod fill_counts;
pub mod init;
pub mod models;
pub mod quotas;
pub mod respondents;
pub mod retry;
pub mod zip_lookup;

pub use fill_counts::*;
pub use init::*;
pub use models::*;
pub use quotas::*;
pub use respondents::*;
pub use retry::*;
pub use zip_lookup::*;
