//! Snapshot storage backends for the catalog

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use crate::{
    error::{AppError, AppResult},
    models::{Book, CatalogDocument},
};

/// Loads and persists the complete catalog snapshot.
///
/// Implementations must replace the stored snapshot atomically: a reader of
/// the underlying medium sees either the previous or the new snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn load(&self) -> AppResult<Vec<Book>>;

    async fn persist(&self, books: &[Book]) -> AppResult<()>;
}

/// JSON document on the local filesystem (`{"libros": [...]}`)
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStorage for JsonFileStorage {
    async fn load(&self) -> AppResult<Vec<Book>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        let document: CatalogDocument = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Storage(format!("Malformed catalog {}: {}", self.path.display(), e))
        })?;

        Ok(document.libros)
    }

    async fn persist(&self, books: &[Book]) -> AppResult<()> {
        let document = CatalogDocument {
            libros: books.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| AppError::Storage(format!("Failed to encode catalog: {}", e)))?;

        // Write next to the target, then rename over it
        let temp_path = self.temp_path();
        let write_error = |e: std::io::Error| {
            AppError::Storage(format!("Failed to write {}: {}", temp_path.display(), e))
        };
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(write_error)?;
        file.write_all(&bytes).await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            AppError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Persisted {} books to {}", books.len(), self.path.display());
        Ok(())
    }
}

/// Keeps the snapshot in memory; used by tests and embedders without a file
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    books: Mutex<Vec<Book>>,
    persist_count: Mutex<usize>,
}

impl InMemoryStorage {
    pub fn new(books: Vec<Book>) -> Self {
        Self {
            books: Mutex::new(books),
            persist_count: Mutex::new(0),
        }
    }

    /// Last persisted snapshot
    pub fn stored(&self) -> Vec<Book> {
        self.books.lock().map(|books| books.clone()).unwrap_or_default()
    }

    /// Number of successful `persist` calls
    pub fn persist_count(&self) -> usize {
        self.persist_count.lock().map(|count| *count).unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStorage for InMemoryStorage {
    async fn load(&self) -> AppResult<Vec<Book>> {
        self.books
            .lock()
            .map(|books| books.clone())
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn persist(&self, books: &[Book]) -> AppResult<()> {
        let mut stored = self
            .books
            .lock()
            .map_err(|e| AppError::Storage(e.to_string()))?;
        *stored = books.to_vec();

        if let Ok(mut count) = self.persist_count.lock() {
            *count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_catalog_path() -> PathBuf {
        std::env::temp_dir().join(format!("lending-desk-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_file_roundtrip_keeps_extra_fields() {
        let path = temp_catalog_path();
        tokio::fs::write(
            &path,
            r#"{"libros": [
                {"ISBN": "111", "titulo": "Cien años de soledad", "autor": "García Márquez",
                 "estado": "no prestado", "prestatario": null,
                 "fecha_prestamo": null, "fecha_devolucion": null}
            ]}"#,
        )
        .await
        .unwrap();

        let storage = JsonFileStorage::new(&path);
        let books = storage.load().await.unwrap();
        assert_eq!(books.len(), 1);

        storage.persist(&books).await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"autor\": \"García Márquez\""));
        assert!(text.contains("\"titulo\": \"Cien años de soledad\""));
        assert!(!storage.temp_path().exists());

        let reloaded = storage.load().await.unwrap();
        assert_eq!(reloaded, books);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    const LAYOUT: &str = r#"{
  "libros": [
    {
      "ISBN": "111",
      "titulo": "Dune",
      "autor": "Frank Herbert",
      "estado": "no prestado",
      "prestatario": null,
      "fecha_prestamo": null,
      "fecha_devolucion": null
    },
    {
      "isbn": "222",
      "estado": "prestado",
      "titulo": "Rayuela",
      "prestatario": "Ana",
      "fecha_prestamo": "2024-03-01",
      "fecha_devolucion": "2024-03-08",
      "paginas": 736
    },
    {
      "ISBN": "333",
      "titulo": "Ficciones",
      "estado": "no prestado"
    }
  ]
}"#;

    #[tokio::test]
    async fn test_persist_keeps_record_layout() {
        let path = temp_catalog_path();
        tokio::fs::write(&path, LAYOUT).await.unwrap();

        let storage = JsonFileStorage::new(&path);
        assert_eq!(storage.path(), path.as_path());
        let books = storage.load().await.unwrap();
        storage.persist(&books).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, LAYOUT);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_loan_changes_only_loan_fields() {
        let path = temp_catalog_path();
        tokio::fs::write(&path, LAYOUT).await.unwrap();

        let storage = JsonFileStorage::new(&path);
        let mut books = storage.load().await.unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        books[0].start_loan(crate::models::ActiveLoan {
            borrower: "Bob".to_string(),
            loan_date: day,
            due_date: day + chrono::Days::new(7),
        });
        books[1].end_loan();
        storage.persist(&books).await.unwrap();

        let expected = LAYOUT
            .replacen(
                r#""estado": "no prestado",
      "prestatario": null,
      "fecha_prestamo": null,
      "fecha_devolucion": null"#,
                r#""estado": "prestado",
      "prestatario": "Bob",
      "fecha_prestamo": "2024-03-01",
      "fecha_devolucion": "2024-03-08""#,
                1,
            )
            .replacen(
                r#""estado": "prestado",
      "titulo": "Rayuela",
      "prestatario": "Ana",
      "fecha_prestamo": "2024-03-01",
      "fecha_devolucion": "2024-03-08""#,
                r#""estado": "no prestado",
      "titulo": "Rayuela",
      "prestatario": null,
      "fecha_prestamo": null,
      "fecha_devolucion": null"#,
                1,
            );
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, expected);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_storage_error() {
        let storage = JsonFileStorage::new(temp_catalog_path());
        assert!(matches!(storage.load().await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_malformed_file_is_storage_error() {
        let path = temp_catalog_path();
        tokio::fs::write(&path, b"{\"libros\": [{\"ISBN\": 1}]}").await.unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(matches!(storage.load().await, Err(AppError::Storage(_))));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_counts_persists() {
        let storage = InMemoryStorage::new(vec![Book::new("1", "A")]);
        assert_eq!(storage.load().await.unwrap().len(), 1);

        storage.persist(&[]).await.unwrap();
        assert!(storage.stored().is_empty());
        assert_eq!(storage.persist_count(), 1);
    }
}
