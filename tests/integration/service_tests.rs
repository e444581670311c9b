//! Service integration tests: a real server driven over TCP by the real client

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use lending_desk::{
    config::LoansConfig,
    models::{Book, BookStatus},
    repository::{CatalogStore, InMemoryStorage},
    services::LendingService,
    transport::{LibraryClient, Server},
    AppResult,
};

struct TestServer {
    address: SocketAddr,
    storage: Arc<InMemoryStorage>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<AppResult<()>>,
}

impl TestServer {
    async fn start(books: Vec<Book>) -> Self {
        let storage = Arc::new(InMemoryStorage::new(books));
        let catalog = Arc::new(CatalogStore::open(storage.clone()).await.unwrap());
        let service = LendingService::new(catalog, LoansConfig::default())
            .with_clock(|| NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());

        let server = Server::bind("127.0.0.1:0", Arc::new(service), 4096)
            .await
            .unwrap();
        let address = server.local_addr().unwrap();

        let (shutdown, stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = stop.await;
        }));

        Self {
            address,
            storage,
            shutdown,
            handle,
        }
    }

    fn client(&self) -> LibraryClient {
        LibraryClient::new(self.address.to_string(), Duration::from_secs(5))
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn catalog() -> Vec<Book> {
    vec![
        Book::new("111", "Dune"),
        Book::new("222", "Cien años de soledad"),
    ]
}

/// Send one raw line and read one raw reply line
async fn raw_exchange(stream: &mut BufReader<TcpStream>, payload: &str) -> Value {
    stream.get_mut().write_all(payload.as_bytes()).await.unwrap();
    stream.get_mut().write_all(b"\n").await.unwrap();

    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_loan_query_return_cycle() {
    let server = TestServer::start(catalog()).await;
    let mut client = server.client();

    let response = client.loan_by_isbn("111", "Ana").await;
    assert_eq!(response.success, Some(true));
    let book = response.book.unwrap();
    assert_eq!(book.status(), BookStatus::Loaned);
    assert_eq!(
        book.loan().unwrap().due_date,
        NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
    );

    let response = client.loan_by_isbn("111", "Bob").await;
    assert_eq!(response.success, Some(false));
    assert!(response.message.contains("2025-01-17"));

    let response = client.query_by_isbn("111").await;
    assert_eq!(response.found, Some(true));
    assert_eq!(response.book.unwrap().loan().unwrap().borrower, "Ana");

    let response = client.return_by_isbn("111").await;
    assert_eq!(response.success, Some(true));

    let response = client.return_by_isbn("111").await;
    assert_eq!(response.success, Some(false));

    let response = client.query_by_isbn("999").await;
    assert_eq!(response.found, Some(false));
    assert!(response.book.is_none());

    assert_eq!(server.storage.persist_count(), 2);
    assert_eq!(server.storage.stored(), catalog());
    server.stop().await;
}

#[tokio::test]
async fn test_loan_by_title_folds_case() {
    let server = TestServer::start(catalog()).await;
    let mut client = server.client();

    let response = client.loan_by_title("CIEN AÑOS DE SOLEDAD", "Ana").await;
    assert_eq!(response.success, Some(true));
    let book = response.book.unwrap();
    assert_eq!(book.isbn, "222");
    assert_eq!(
        book.loan().unwrap().due_date,
        NaiveDate::from_ymd_opt(2025, 1, 24).unwrap()
    );

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_payload_keeps_serving() {
    let server = TestServer::start(catalog()).await;
    let stream = TcpStream::connect(server.address).await.unwrap();
    let mut stream = BufReader::new(stream);

    let reply = raw_exchange(&mut stream, "{not json").await;
    assert_eq!(reply, json!({"success": false, "message": "JSON inválido."}));

    let reply = raw_exchange(&mut stream, r#"{"action": "Vender", "isbn": "111"}"#).await;
    assert_eq!(reply["success"], false);
    assert!(reply["message"].as_str().unwrap().contains("Vender"));

    let reply = raw_exchange(&mut stream, r#"{"isbn": "111"}"#).await;
    assert_eq!(reply["success"], false);

    let reply = raw_exchange(&mut stream, r#"{"action": "Consulta por ISBN", "isbn": "111"}"#).await;
    assert_eq!(reply["found"], true);
    assert_eq!(reply["book"]["titulo"], "Dune");
    assert_eq!(reply["book"]["estado"], "no prestado");

    server.stop().await;
}

#[tokio::test]
async fn test_missing_fields_are_reported() {
    let server = TestServer::start(catalog()).await;
    let stream = TcpStream::connect(server.address).await.unwrap();
    let mut stream = BufReader::new(stream);

    let reply = raw_exchange(&mut stream, r#"{"action": "Prestamo por ISBN", "isbn": "111"}"#).await;
    assert_eq!(reply["success"], false);
    assert!(reply["message"].as_str().unwrap().contains("borrower"));

    let reply = raw_exchange(&mut stream, r#"{"action": "Consulta por ISBN"}"#).await;
    assert_eq!(reply["found"], false);

    assert_eq!(server.storage.persist_count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_single_loan() {
    let server = TestServer::start(catalog()).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let mut client = server.client();
        handles.push(tokio::spawn(async move {
            client.loan_by_isbn("111", &format!("borrower-{}", i)).await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().success == Some(true) {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(server.storage.persist_count(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_client_times_out() {
    // Accepts connections but never replies
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut client = LibraryClient::new(address.to_string(), Duration::from_millis(200));
    let response = client.query_by_isbn("111").await;

    assert_eq!(response.success, Some(false));
    assert_eq!(response.found, Some(false));
    assert!(response.message.starts_with("Timeout"));

    silent.abort();
}

#[tokio::test]
async fn test_client_reports_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let mut client = LibraryClient::new(address.to_string(), Duration::from_secs(1));
    let response = client.loan_by_isbn("111", "Ana").await;

    assert!(!response.is_ok());
    assert!(response.message.starts_with("Error de conexión"));
}

#[tokio::test]
async fn test_client_reconnects_after_restart() {
    let server = TestServer::start(catalog()).await;
    let mut client = server.client();
    assert!(client.query_by_isbn("111").await.is_ok());

    let address = server.address;
    server.stop().await;

    // The old connection is gone; the failure drops it
    assert!(!client.query_by_isbn("111").await.is_ok());

    let storage = Arc::new(InMemoryStorage::new(catalog()));
    let catalog = Arc::new(CatalogStore::open(storage).await.unwrap());
    let service = Arc::new(LendingService::new(catalog, LoansConfig::default()));
    let server = Server::bind(&address.to_string(), service, 4096).await.unwrap();
    let (shutdown, stop) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run(async {
        let _ = stop.await;
    }));

    assert!(client.query_by_isbn("111").await.is_ok());

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
