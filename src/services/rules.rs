//! Loan and return decisions.
//!
//! These functions only look at one book and their parameters; they never
//! touch the catalog. The caller decides whether to store the resulting book.

use chrono::{Days, NaiveDate};

use crate::{
    error::{AppError, AppResult},
    models::{ActiveLoan, Book, Response},
};

/// Outcome of a rule applied to one book
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub granted: bool,
    pub message: String,
    /// The book after the operation, or unchanged when refused
    pub book: Book,
}

impl Decision {
    fn granted(message: String, book: Book) -> Self {
        Self {
            granted: true,
            message,
            book,
        }
    }

    fn refused(message: String, book: &Book) -> Self {
        Self {
            granted: false,
            message,
            book: book.clone(),
        }
    }

    /// Success response, or a conflict carrying the current book
    pub fn into_response(self) -> AppResult<Response> {
        if self.granted {
            Ok(Response::success(self.message, self.book))
        } else {
            Err(AppError::Conflict {
                message: self.message,
                book: Box::new(self.book),
            })
        }
    }
}

/// Loan `book` to `borrower` starting `today` for `loan_period_days`
pub fn decide_loan(book: &Book, borrower: &str, loan_period_days: u32, today: NaiveDate) -> Decision {
    if let Some(loan) = book.loan() {
        return Decision::refused(
            format!(
                "El libro '{}' no está disponible. Fecha de devolución: {}",
                book.title, loan.due_date
            ),
            book,
        );
    }

    let due_date = today
        .checked_add_days(Days::new(u64::from(loan_period_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut loaned = book.clone();
    loaned.start_loan(ActiveLoan {
        borrower: borrower.to_string(),
        loan_date: today,
        due_date,
    });

    Decision::granted(
        format!("Préstamo exitoso: '{}' prestado a {}", book.title, borrower),
        loaned,
    )
}

/// Close the active loan of `book`
pub fn decide_return(book: &Book) -> Decision {
    if !book.is_loaned() {
        return Decision::refused(
            format!(
                "El libro '{}' ya está disponible, no tiene préstamo activo.",
                book.title
            ),
            book,
        );
    }

    let mut returned = book.clone();
    returned.end_loan();

    Decision::granted(
        format!("Devolución exitosa: '{}' ha sido devuelto.", book.title),
        returned,
    )
}
