//! Catalog store: the in-memory snapshot and its single mutation path

use std::sync::Arc;
use tokio::sync::Mutex;
use unicode_normalization::UnicodeNormalization;

use super::storage::SnapshotStorage;
use crate::{
    error::{AppError, AppResult},
    models::Book,
};

/// How a request identifies a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookKey<'a> {
    Isbn(&'a str),
    /// Case-insensitive substring of the title; the first match in catalog order wins
    Title(&'a str),
}

impl BookKey<'_> {
    /// Position of the matching book in `books`
    pub fn locate(&self, books: &[Book]) -> Option<usize> {
        match *self {
            BookKey::Isbn(isbn) => books.iter().position(|book| book.isbn == isbn),
            BookKey::Title(query) => {
                let query = fold_case(query);
                books
                    .iter()
                    .position(|book| fold_case(&book.title).contains(&query))
            }
        }
    }

    pub fn locate_mut<'b>(&self, books: &'b mut [Book]) -> Option<&'b mut Book> {
        let index = self.locate(books)?;
        books.get_mut(index)
    }

    /// Error reported when no book matches this key
    pub fn not_found(&self) -> AppError {
        match self {
            BookKey::Isbn(isbn) => {
                AppError::NotFound(format!("No se encontró un libro con ISBN: {}", isbn))
            }
            BookKey::Title(title) => {
                AppError::NotFound(format!("No se encontró un libro con título: '{}'", title))
            }
        }
    }
}

fn fold_case(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Owns the catalog snapshot.
///
/// Every lookup and mutation runs under one catalog-wide lock, and the lock is
/// held while a changed snapshot is persisted.
pub struct CatalogStore {
    books: Mutex<Vec<Book>>,
    storage: Arc<dyn SnapshotStorage>,
}

impl CatalogStore {
    /// Create the store and load the persisted snapshot
    pub async fn open(storage: Arc<dyn SnapshotStorage>) -> AppResult<Self> {
        let store = Self {
            books: Mutex::new(Vec::new()),
            storage,
        };
        store.load().await?;
        Ok(store)
    }

    /// Reload the full snapshot from storage, replacing the in-memory copy
    pub async fn load(&self) -> AppResult<Vec<Book>> {
        let mut books = self.books.lock().await;
        let loaded = self.storage.load().await?;
        ensure_unique_isbns(&loaded)?;

        *books = loaded.clone();
        tracing::debug!("Catalog loaded with {} books", books.len());
        Ok(loaded)
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> Option<Book> {
        self.find(BookKey::Isbn(isbn)).await
    }

    pub async fn find_by_title(&self, title: &str) -> Option<Book> {
        self.find(BookKey::Title(title)).await
    }

    pub async fn find(&self, key: BookKey<'_>) -> Option<Book> {
        let books = self.books.lock().await;
        key.locate(&books).and_then(|index| books.get(index).cloned())
    }

    /// Copy of the full current catalog
    pub async fn snapshot(&self) -> Vec<Book> {
        self.books.lock().await.clone()
    }

    /// Run `mutator` over a working copy of the catalog and publish the result.
    ///
    /// An unchanged copy is a no-op. A copy with exactly one changed book is
    /// persisted and only then becomes the current snapshot. Anything else, a
    /// mutator error, or a failed persist leaves the current snapshot as it was.
    pub async fn apply_and_persist<T, F>(&self, mutator: F) -> AppResult<T>
    where
        F: FnOnce(&mut [Book]) -> AppResult<T>,
    {
        let mut books = self.books.lock().await;
        let mut next = books.clone();
        let value = mutator(&mut next)?;

        let changed: Vec<usize> = books
            .iter()
            .zip(next.iter())
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(index, _)| index)
            .collect();

        match changed.as_slice() {
            [] => {}
            [index] => {
                let index = *index;
                if books[index].isbn != next[index].isbn {
                    return Err(AppError::Internal(format!(
                        "mutation changed ISBN {} to {}",
                        books[index].isbn, next[index].isbn
                    )));
                }

                self.storage.persist(&next).await?;
                *books = next;
            }
            many => {
                return Err(AppError::Internal(format!(
                    "mutation touched {} books, expected at most one",
                    many.len()
                )));
            }
        }

        Ok(value)
    }
}

fn ensure_unique_isbns(books: &[Book]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for book in books {
        if !seen.insert(book.isbn.as_str()) {
            return Err(AppError::Storage(format!(
                "Duplicate ISBN in catalog: {}",
                book.isbn
            )));
        }
    }
    Ok(())
}
