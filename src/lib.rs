//! Lending desk
//!
//! A small library lending service: a persistent book catalog, the loan and
//! return rules, and a request-reply endpoint serving one request at a time.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod services;
pub mod transport;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
