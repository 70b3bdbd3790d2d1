pub mod connection;
pub mod error_context;
pub mod server;

pub use server::{DatabaseServer, PgServer};

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
