//! Business logic services

pub mod lending;
pub mod rules;

pub use lending::LendingService;
