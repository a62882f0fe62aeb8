// ABOUTME: MySQL source utilities for the exporter
// ABOUTME: Exports connection handling, row conversion and the paged table reader

pub mod connection;
pub mod converter;
pub mod reader;

pub use connection::{connect, SourceCredentials, DEFAULT_PORT};
pub use reader::{MySqlConnector, MySqlReader};

/// Quote a MySQL identifier with backticks, doubling embedded backticks
///
/// # Examples
///
/// ```
/// # use mysql_sqlite_exporter::mysql::quote_identifier;
/// assert_eq!(quote_identifier("contacts"), "`contacts`");
/// assert_eq!(quote_identifier("odd`name"), "`odd``name`");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
