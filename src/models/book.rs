//! Book (catalog entry) model and its persisted record form.
//!
//! The persisted/wire record keeps the field names used by the existing catalog
//! file (`ISBN`, `titulo`, `estado`, ...). In memory the loan fields are grouped
//! into a single optional [`ActiveLoan`], so a book is either available or fully
//! loaned and never anything in between.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Loan status as stored in the `estado` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookStatus {
    #[serde(rename = "no prestado")]
    Available,
    #[serde(rename = "prestado")]
    Loaned,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BookStatus::Available => "no prestado",
            BookStatus::Loaned => "prestado",
        };
        write!(f, "{}", label)
    }
}

/// Details of the loan currently holding a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLoan {
    pub borrower: String,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BookRecord", into = "BookRecord")]
pub struct Book {
    pub isbn: String,
    pub title: String,
    loan: Option<ActiveLoan>,
    /// The record as it was loaded, key order and spelling included
    record: IndexMap<String, Value>,
}

impl Book {
    /// Create an available book
    pub fn new(isbn: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            loan: None,
            record: IndexMap::new(),
        }
    }

    pub fn status(&self) -> BookStatus {
        if self.loan.is_some() {
            BookStatus::Loaned
        } else {
            BookStatus::Available
        }
    }

    pub fn is_loaned(&self) -> bool {
        self.loan.is_some()
    }

    pub fn loan(&self) -> Option<&ActiveLoan> {
        self.loan.as_ref()
    }

    /// Record keys this service does not interpret, in their original order
    pub fn extra(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.record
            .iter()
            .filter(|(key, _)| !MANAGED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Mark the book as loaned
    pub(crate) fn start_loan(&mut self, loan: ActiveLoan) {
        self.loan = Some(loan);
    }

    /// Mark the book as available, clearing borrower and dates
    pub(crate) fn end_loan(&mut self) {
        self.loan = None;
    }
}

const ISBN_KEY: &str = "ISBN";
const ISBN_ALIAS: &str = "isbn";
const TITLE_KEY: &str = "titulo";
const STATUS_KEY: &str = "estado";
const BORROWER_KEY: &str = "prestatario";
const LOAN_DATE_KEY: &str = "fecha_prestamo";
const DUE_DATE_KEY: &str = "fecha_devolucion";

const MANAGED_KEYS: [&str; 7] = [
    ISBN_KEY,
    ISBN_ALIAS,
    TITLE_KEY,
    STATUS_KEY,
    BORROWER_KEY,
    LOAN_DATE_KEY,
    DUE_DATE_KEY,
];

/// Error raised when a persisted record breaks the book invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidBook {
    #[error("book record has no '{0}' field")]
    MissingField(&'static str),

    #[error("book record field '{0}' is invalid: {1}")]
    InvalidField(&'static str, String),

    #[error("book record has an empty ISBN")]
    EmptyIsbn,

    #[error("book {0} is 'prestado' but borrower or loan dates are missing")]
    IncompleteLoan(String),

    #[error("book {0} is 'no prestado' but still carries loan fields")]
    StaleLoanFields(String),
}

/// Persisted/wire form of a [`Book`]: the raw record, keys in file order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
struct BookRecord(IndexMap<String, Value>);

impl BookRecord {
    fn required<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, InvalidBook> {
        let value = self.0.get(key).ok_or(InvalidBook::MissingField(key))?;
        serde_json::from_value(value.clone())
            .map_err(|e| InvalidBook::InvalidField(key, e.to_string()))
    }

    /// Absent and `null` both read as `None`
    fn optional<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>, InvalidBook> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| InvalidBook::InvalidField(key, e.to_string())),
        }
    }

    /// Key the ISBN is stored under; `ISBN` unless the record only has the alias
    fn isbn_key(&self) -> &'static str {
        if !self.0.contains_key(ISBN_KEY) && self.0.contains_key(ISBN_ALIAS) {
            ISBN_ALIAS
        } else {
            ISBN_KEY
        }
    }

    /// Overwrite `key` in place, appending it only if it was not there
    fn set(&mut self, key: &str, value: Value) {
        match self.0.get_mut(key) {
            Some(slot) => *slot = value,
            None => {
                self.0.insert(key.to_string(), value);
            }
        }
    }

    /// Null out `key` if present; an absent key stays absent
    fn clear(&mut self, key: &str) {
        if let Some(slot) = self.0.get_mut(key) {
            *slot = Value::Null;
        }
    }
}

impl TryFrom<BookRecord> for Book {
    type Error = InvalidBook;

    fn try_from(record: BookRecord) -> Result<Self, Self::Error> {
        let isbn: String = record.required(record.isbn_key())?;
        if isbn.trim().is_empty() {
            return Err(InvalidBook::EmptyIsbn);
        }
        let title: String = record.required(TITLE_KEY)?;
        let status: BookStatus = record.required(STATUS_KEY)?;

        let loan = match (
            status,
            record.optional::<String>(BORROWER_KEY)?,
            record.optional::<NaiveDate>(LOAN_DATE_KEY)?,
            record.optional::<NaiveDate>(DUE_DATE_KEY)?,
        ) {
            (BookStatus::Loaned, Some(borrower), Some(loan_date), Some(due_date)) => {
                Some(ActiveLoan {
                    borrower,
                    loan_date,
                    due_date,
                })
            }
            (BookStatus::Loaned, _, _, _) => {
                return Err(InvalidBook::IncompleteLoan(isbn));
            }
            (BookStatus::Available, None, None, None) => None,
            (BookStatus::Available, _, _, _) => {
                return Err(InvalidBook::StaleLoanFields(isbn));
            }
        };

        Ok(Book {
            isbn,
            title,
            loan,
            record: record.0,
        })
    }
}

impl From<Book> for BookRecord {
    fn from(book: Book) -> Self {
        let status = book.status();
        let mut record = BookRecord(book.record);

        let isbn_key = record.isbn_key();
        record.set(isbn_key, Value::String(book.isbn));
        record.set(TITLE_KEY, Value::String(book.title));
        record.set(STATUS_KEY, Value::String(status.to_string()));

        match book.loan {
            Some(loan) => {
                record.set(BORROWER_KEY, Value::String(loan.borrower));
                record.set(LOAN_DATE_KEY, Value::String(loan.loan_date.to_string()));
                record.set(DUE_DATE_KEY, Value::String(loan.due_date.to_string()));
            }
            None => {
                record.clear(BORROWER_KEY);
                record.clear(LOAN_DATE_KEY);
                record.clear(DUE_DATE_KEY);
            }
        }

        record
    }
}

/// Snapshot document as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub libros: Vec<Book>,
}
