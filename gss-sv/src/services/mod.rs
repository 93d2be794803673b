//! Service layer between HTTP handlers and the shared library

pub mod survey_flow;
