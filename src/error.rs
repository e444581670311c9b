//! Error types for the lending desk

use thiserror::Error;

use crate::models::{Action, Book, Response};

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Acción desconocida: {0}")]
    UnknownAction(String),

    #[error("El campo '{0}' es requerido.")]
    MissingField(&'static str),

    #[error("{0}")]
    NotFound(String),

    /// The book exists but is not in a state that allows the operation
    #[error("{message}")]
    Conflict { message: String, book: Box<Book> },

    #[error("Invalid request payload: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Errors answered directly to the client as part of normal operation
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AppError::Storage(_) | AppError::Internal(_) | AppError::Io(_)
        )
    }

    /// Turn the error into the failure reply for `action`
    pub fn into_response(self, action: Option<Action>) -> Response {
        match self {
            AppError::UnknownAction(_) => Response::failure(self.to_string()),
            AppError::MissingField(_) | AppError::NotFound(_) => {
                Response::failure_for(action, self.to_string())
            }
            AppError::Conflict { message, book } => {
                Response::failure_for(action, message).with_book(*book)
            }
            AppError::Decode(detail) => {
                tracing::debug!("Rejected payload: {}", detail);
                Response::invalid_request()
            }
            AppError::Storage(msg) | AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Response::failure_for(action, format!("Error interno: {}", msg))
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                Response::failure_for(action, format!("Error interno: {}", e))
            }
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
