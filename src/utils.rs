// ABOUTME: Small helpers shared by the CLI commands
// ABOUTME: Default file locations and identifier sanitizing for display

use std::path::{Path, PathBuf};

/// Destination used when neither the CLI nor the config names one,
/// relative to the directory holding the executable
pub const DEFAULT_DESTINATION: &str = "database/prod_database_local_copy.db";

pub const DEFAULT_FIELDS_FILE: &str = "table_fields.json";

/// Default SQLite destination next to the running executable
///
/// Falls back to a path relative to the working directory when the
/// executable location cannot be determined.
pub fn default_destination() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    match exe_dir {
        Some(dir) => dir.join(DEFAULT_DESTINATION),
        None => {
            tracing::debug!("Executable location unknown, using working directory");
            PathBuf::from(DEFAULT_DESTINATION)
        }
    }
}

/// `table_fields.json` next to the executable, if present
pub fn default_fields_file() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let path = exe.parent()?.join(DEFAULT_FIELDS_FILE);
    path.is_file().then_some(path)
}

/// Pick the destination: CLI flag, then config file, then the default
pub fn resolve_destination(cli: Option<PathBuf>, config: Option<PathBuf>) -> PathBuf {
    cli.or(config).unwrap_or_else(default_destination)
}

/// Sanitize an identifier (table name, column name) for display
///
/// Removes control characters and limits length to prevent log injection attacks
/// and ensure readable error messages.
///
/// # Examples
///
/// ```
/// # use mysql_sqlite_exporter::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\x00name"), "tablename");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
///
/// // Length limit
/// let long_name = "a".repeat(200);
/// assert_eq!(sanitize_identifier(&long_name).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination_layout() {
        let path = default_destination();
        assert!(path.ends_with("database/prod_database_local_copy.db"));
    }

    #[test]
    fn test_resolve_destination_precedence() {
        let cli = Some(PathBuf::from("cli.db"));
        let config = Some(PathBuf::from("config.db"));

        assert_eq!(
            resolve_destination(cli.clone(), config.clone()),
            PathBuf::from("cli.db")
        );
        assert_eq!(
            resolve_destination(None, config),
            PathBuf::from("config.db")
        );
        assert_eq!(resolve_destination(None, None), default_destination());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("normal_table"), "normal_table");
        assert_eq!(sanitize_identifier("table\x00name"), "tablename");
        assert_eq!(sanitize_identifier("table\nname"), "tablename");

        let long_name = "a".repeat(200);
        assert_eq!(sanitize_identifier(&long_name).len(), 100);
    }
}
