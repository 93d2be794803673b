//! HTTP API handlers for gss-sv

pub mod health;
pub mod survey;
pub mod zip;

pub use health::health_routes;
pub use survey::survey_routes;
pub use zip::zip_routes;
