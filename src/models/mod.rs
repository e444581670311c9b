//! Data models for the lending desk

pub mod book;
pub mod envelope;

// Re-export commonly used types
pub use book::{ActiveLoan, Book, BookStatus, CatalogDocument};
pub use envelope::{Action, Command, Request, Response};
