// ABOUTME: MySQL connection utilities for the source database
// ABOUTME: Validates credentials, opens a utf8mb4 session and explains connection failures

use crate::error::SyncError;
use mysql_async::{Conn, OptsBuilder};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3306;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for the source MySQL server
#[derive(Clone, PartialEq)]
pub struct SourceCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

impl SourceCredentials {
    /// Check that every required parameter is present
    pub fn validate(&self) -> Result<(), SyncError> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("user", &self.user),
            ("password", &self.password),
            ("database", &self.database),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(SyncError::Connection(format!(
                "Missing database credentials: {}.\n\
                 Set them with --host/--user/--password/--database, the MYSQL_HOST, \
                 MYSQL_USER, MYSQL_PASSWORD, MYSQL_DATABASE environment variables, \
                 or the [source] section of the config file.",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    fn opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()))
            .db_name(Some(self.database.clone()))
            .init(vec!["SET NAMES utf8mb4"])
    }
}

/// Connect to the source MySQL database
///
/// Fails with [`SyncError::Connection`] when a credential is missing, the server
/// cannot be reached within 30 seconds, or the server rejects the login.
/// The connection is attempted exactly once.
pub async fn connect(credentials: &SourceCredentials) -> Result<Conn, SyncError> {
    credentials.validate()?;

    tracing::info!(
        "Connecting to MySQL at {}:{} (database '{}')",
        credentials.host,
        credentials.port,
        credentials.database
    );

    let conn = tokio::time::timeout(CONNECT_TIMEOUT, Conn::new(credentials.opts()))
        .await
        .map_err(|_| {
            SyncError::Connection(format!(
                "Connection timeout: {}:{} did not respond within {:?}.\n\
                 This could indicate network issues or server overload.",
                credentials.host, credentials.port, CONNECT_TIMEOUT
            ))
        })?
        .map_err(|e| describe_connect_error(credentials, e))?;

    tracing::debug!("Connected to MySQL");
    Ok(conn)
}

fn describe_connect_error(credentials: &SourceCredentials, err: mysql_async::Error) -> SyncError {
    let message = match &err {
        mysql_async::Error::Server(server) if server.code == 1045 => format!(
            "Authentication failed: Invalid username or password for user '{}'.\n\
             Please verify your database credentials.",
            credentials.user
        ),
        mysql_async::Error::Server(server) if server.code == 1049 => format!(
            "Database does not exist: '{}'.\n\
             Please check the database name.",
            credentials.database
        ),
        mysql_async::Error::Server(server) if server.code == 1044 => format!(
            "Access denied to database '{}' for user '{}'.\n\
             Error: {}",
            credentials.database, credentials.user, server.message
        ),
        mysql_async::Error::Io(io) => format!(
            "Unable to reach database server {}:{}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            credentials.host, credentials.port, io
        ),
        other => format!("Failed to connect to MySQL: {}", other),
    };
    SyncError::Connection(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> SourceCredentials {
        SourceCredentials {
            host: "localhost".to_string(),
            user: "exporter".to_string(),
            password: "secret".to_string(),
            database: "prod".to_string(),
            port: DEFAULT_PORT,
        }
    }

    #[test]
    fn test_validate_accepts_complete_credentials() {
        assert!(credentials().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let creds = SourceCredentials {
            user: String::new(),
            database: "  ".to_string(),
            ..credentials()
        };

        let err = creds.validate().unwrap_err();
        assert!(matches!(err, SyncError::Connection(_)));
        let msg = err.to_string();
        assert!(msg.contains("user, database"), "unexpected message: {}", msg);
        assert!(!msg.contains("host,"));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("localhost"));
    }

    #[tokio::test]
    async fn test_connect_with_missing_credentials_fails_before_network() {
        let creds = SourceCredentials {
            password: String::new(),
            ..credentials()
        };
        let result = connect(&creds).await;
        assert!(matches!(result, Err(SyncError::Connection(_))));
    }

    // NOTE: This test requires a real MySQL instance
    #[tokio::test]
    #[ignore]
    async fn test_connect_with_env_credentials_succeeds() {
        let creds = crate::config::SourceOverrides::from_env()
            .resolve()
            .expect("MYSQL_* variables must be set for integration tests");
        let conn = connect(&creds).await.unwrap();
        conn.disconnect().await.unwrap();
    }
}
