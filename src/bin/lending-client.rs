//! Command-line client for the lending desk

use std::process::ExitCode;

use lending_desk::{config::AppConfig, models::Response, transport::LibraryClient};

const USAGE: &str = "\
Usage: lending-client [--server <host:port>] <command> [args...]

Commands:
  loan-isbn <isbn> <borrower>
  loan-title <title> <borrower>
  query <isbn>
  return <isbn>";

enum Command {
    LoanByIsbn { isbn: String, borrower: String },
    LoanByTitle { title: String, borrower: String },
    Query { isbn: String },
    Return { isbn: String },
}

fn parse_command(args: &[String]) -> Option<Command> {
    let (name, rest) = args.split_first()?;

    let command = match (name.as_str(), rest) {
        ("loan-isbn", [isbn, borrower]) => Command::LoanByIsbn {
            isbn: isbn.clone(),
            borrower: borrower.clone(),
        },
        ("loan-title", [title, borrower]) => Command::LoanByTitle {
            title: title.clone(),
            borrower: borrower.clone(),
        },
        ("query", [isbn]) => Command::Query { isbn: isbn.clone() },
        ("return", [isbn]) => Command::Return { isbn: isbn.clone() },
        _ => return None,
    };

    Some(command)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let _log_guard = lending_desk::logging::init(&config.logging, std::io::stderr());

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut server = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                let Some(address) = args.get(i + 1) else {
                    eprintln!("{}", USAGE);
                    return Ok(ExitCode::from(2));
                };
                server = Some(address.clone());
                i += 2;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(ExitCode::SUCCESS);
            }
            _ => break,
        }
    }

    let Some(command) = parse_command(&args[i..]) else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let mut client = match server {
        Some(address) => LibraryClient::new(address, config.client.timeout()),
        None => LibraryClient::from_config(&config.client),
    };
    tracing::debug!("Using server {}", client.address());

    let response: Response = match command {
        Command::LoanByIsbn { isbn, borrower } => client.loan_by_isbn(&isbn, &borrower).await,
        Command::LoanByTitle { title, borrower } => client.loan_by_title(&title, &borrower).await,
        Command::Query { isbn } => client.query_by_isbn(&isbn).await,
        Command::Return { isbn } => client.return_by_isbn(&isbn).await,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
