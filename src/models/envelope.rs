//! Request and response envelopes exchanged over the request-reply channel

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::book::Book;
use crate::error::{AppError, AppResult};

/// The fixed set of operations understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    LoanByIsbn,
    LoanByTitle,
    QueryByIsbn,
    ReturnByIsbn,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::LoanByIsbn,
        Action::LoanByTitle,
        Action::QueryByIsbn,
        Action::ReturnByIsbn,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::LoanByIsbn => "Prestamo por ISBN",
            Action::LoanByTitle => "Prestamo por Titulo",
            Action::QueryByIsbn => "Consulta por ISBN",
            Action::ReturnByIsbn => "Devolucion por ISBN",
        }
    }

    /// Queries answer with `found`, every other action with `success`
    pub fn is_query(&self) -> bool {
        matches!(self, Action::QueryByIsbn)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AppError::UnknownAction(s.to_string()))
    }
}

/// Incoming request, tagged by its `action` field.
///
/// Fields are optional at this stage; [`Request::into_command`] checks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "Prestamo por ISBN")]
    LoanByIsbn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        isbn: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        borrower: Option<String>,
    },
    #[serde(rename = "Prestamo por Titulo")]
    LoanByTitle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        borrower: Option<String>,
    },
    #[serde(rename = "Consulta por ISBN")]
    QueryByIsbn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        isbn: Option<String>,
    },
    #[serde(rename = "Devolucion por ISBN")]
    ReturnByIsbn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        isbn: Option<String>,
    },
}

impl Request {
    pub fn loan_by_isbn(isbn: impl Into<String>, borrower: impl Into<String>) -> Self {
        Request::LoanByIsbn {
            isbn: Some(isbn.into()),
            borrower: Some(borrower.into()),
        }
    }

    pub fn loan_by_title(title: impl Into<String>, borrower: impl Into<String>) -> Self {
        Request::LoanByTitle {
            title: Some(title.into()),
            borrower: Some(borrower.into()),
        }
    }

    pub fn query_by_isbn(isbn: impl Into<String>) -> Self {
        Request::QueryByIsbn {
            isbn: Some(isbn.into()),
        }
    }

    pub fn return_by_isbn(isbn: impl Into<String>) -> Self {
        Request::ReturnByIsbn {
            isbn: Some(isbn.into()),
        }
    }

    /// Decode a raw payload.
    ///
    /// Payloads that are not a JSON object, or whose fields have the wrong type,
    /// fail with [`AppError::Decode`]. A well-formed object naming an action
    /// outside the fixed set fails with [`AppError::UnknownAction`].
    pub fn decode(payload: &[u8]) -> AppResult<Self> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| AppError::Decode(e.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| AppError::Decode("request is not a JSON object".to_string()))?;

        match object.get("action") {
            Some(Value::String(name)) => {
                name.parse::<Action>()?;
            }
            Some(other) => return Err(AppError::UnknownAction(other.to_string())),
            None => return Err(AppError::UnknownAction("None".to_string())),
        }

        serde_json::from_value(value).map_err(|e| AppError::Decode(e.to_string()))
    }

    pub fn action(&self) -> Action {
        match self {
            Request::LoanByIsbn { .. } => Action::LoanByIsbn,
            Request::LoanByTitle { .. } => Action::LoanByTitle,
            Request::QueryByIsbn { .. } => Action::QueryByIsbn,
            Request::ReturnByIsbn { .. } => Action::ReturnByIsbn,
        }
    }

    /// Check required fields and trim them
    pub fn into_command(self) -> AppResult<Command> {
        match self {
            Request::LoanByIsbn { isbn, borrower } => Ok(Command::LoanByIsbn {
                isbn: required("isbn", isbn)?,
                borrower: required("borrower", borrower)?,
            }),
            Request::LoanByTitle { title, borrower } => Ok(Command::LoanByTitle {
                title: required("title", title)?,
                borrower: required("borrower", borrower)?,
            }),
            Request::QueryByIsbn { isbn } => Ok(Command::QueryByIsbn {
                isbn: required("isbn", isbn)?,
            }),
            Request::ReturnByIsbn { isbn } => Ok(Command::ReturnByIsbn {
                isbn: required("isbn", isbn)?,
            }),
        }
    }
}

fn required(field: &'static str, value: Option<String>) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        _ => Err(AppError::MissingField(field)),
    }
}

/// A validated request: every field is present, trimmed and non-empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoanByIsbn { isbn: String, borrower: String },
    LoanByTitle { title: String, borrower: String },
    QueryByIsbn { isbn: String },
    ReturnByIsbn { isbn: String },
}

/// Reply envelope.
///
/// Queries set `found`, other actions set `success`. Client-side transport
/// failures set both to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
}

impl Response {
    pub fn success(message: impl Into<String>, book: Book) -> Self {
        Self {
            success: Some(true),
            found: None,
            message: message.into(),
            book: Some(book),
        }
    }

    pub fn found(message: impl Into<String>, book: Book) -> Self {
        Self {
            success: None,
            found: Some(true),
            message: message.into(),
            book: Some(book),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            found: None,
            message: message.into(),
            book: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            success: None,
            found: Some(false),
            message: message.into(),
            book: None,
        }
    }

    /// Failure shaped for the given action (`found` for queries, `success` otherwise)
    pub fn failure_for(action: Option<Action>, message: impl Into<String>) -> Self {
        match action {
            Some(action) if action.is_query() => Self::not_found(message),
            _ => Self::failure(message),
        }
    }

    /// Failure produced on the client side, where the action outcome is unknown
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            found: Some(false),
            message: message.into(),
            book: None,
        }
    }

    /// Reply sent for payloads that cannot be decoded
    pub fn invalid_request() -> Self {
        Self::failure("JSON inválido.")
    }

    pub fn with_book(mut self, book: Book) -> Self {
        self.book = Some(book);
        self
    }

    /// Whether the operation succeeded (or the query found its book)
    pub fn is_ok(&self) -> bool {
        self.success.unwrap_or(false) || self.found.unwrap_or(false)
    }
}
