//! HTTP API handlers for gss-ad

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod respondents;

pub use auth::{auth_middleware, login};
pub use dashboard::get_dashboard;
pub use health::health_routes;
pub use respondents::{get_respondent_detail, list_respondents};
