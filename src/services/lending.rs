//! Lending service: validates requests and routes them to the rules and the catalog

use chrono::NaiveDate;
use std::sync::Arc;

use super::rules;
use crate::{
    config::LoansConfig,
    error::AppResult,
    models::{Command, Request, Response},
    repository::catalog::{BookKey, CatalogStore},
};

/// Source of the current date for new loans
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct LendingService {
    catalog: Arc<CatalogStore>,
    loans: LoansConfig,
    clock: Clock,
}

impl LendingService {
    pub fn new(catalog: Arc<CatalogStore>, loans: LoansConfig) -> Self {
        Self {
            catalog,
            loans,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Replace the clock used to date loans
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    /// Handle one decoded request.
    ///
    /// Validation failures, unknown books and conflicts come back as failure
    /// responses. Only storage and internal errors are returned as `Err`.
    pub async fn handle(&self, request: Request) -> AppResult<Response> {
        let action = request.action();

        let result = match request.into_command() {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) if e.is_recoverable() => {
                tracing::info!("{} refused: {}", action, e);
                Ok(e.into_response(Some(action)))
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, command: Command) -> AppResult<Response> {
        match command {
            Command::LoanByIsbn { isbn, borrower } => {
                self.loan(BookKey::Isbn(&isbn), &borrower, self.loans.isbn_loan_days)
                    .await
            }
            Command::LoanByTitle { title, borrower } => {
                self.loan(BookKey::Title(&title), &borrower, self.loans.title_loan_days)
                    .await
            }
            Command::QueryByIsbn { isbn } => self.query(&isbn).await,
            Command::ReturnByIsbn { isbn } => self.return_book(&isbn).await,
        }
    }

    async fn loan(&self, key: BookKey<'_>, borrower: &str, period_days: u32) -> AppResult<Response> {
        let today = (self.clock)();

        let decision = self
            .catalog
            .apply_and_persist(|books| {
                let book = key.locate_mut(books).ok_or_else(|| key.not_found())?;
                let decision = rules::decide_loan(book, borrower, period_days, today);
                if decision.granted {
                    *book = decision.book.clone();
                }
                Ok(decision)
            })
            .await?;

        if decision.granted {
            tracing::info!(
                isbn = %decision.book.isbn,
                borrower,
                period_days,
                "Loan granted"
            );
        }
        decision.into_response()
    }

    async fn query(&self, isbn: &str) -> AppResult<Response> {
        let key = BookKey::Isbn(isbn);
        let book = self.catalog.find(key).await.ok_or_else(|| key.not_found())?;

        Ok(Response::found(
            format!("Libro encontrado: '{}'", book.title),
            book,
        ))
    }

    async fn return_book(&self, isbn: &str) -> AppResult<Response> {
        let key = BookKey::Isbn(isbn);

        let decision = self
            .catalog
            .apply_and_persist(|books| {
                let book = key.locate_mut(books).ok_or_else(|| key.not_found())?;
                let decision = rules::decide_return(book);
                if decision.granted {
                    *book = decision.book.clone();
                }
                Ok(decision)
            })
            .await?;

        if decision.granted {
            tracing::info!(isbn, "Book returned");
        }
        decision.into_response()
    }
}
