//! Embedded security operations pipeline for the scrap-metal marketplace:
//! a structured security log, containment actions, incident playbooks,
//! threat forecasts and signed forensic exports.

pub mod api;
pub mod auth;
pub mod config;
pub mod containment;
pub mod error;
pub mod forensics;
pub mod health;
pub mod insights;
pub mod metrics;
pub mod playbooks;
pub mod rate_limiter;
pub mod security_log;

pub use error::{SocError, SocResult};
