// ABOUTME: Export configuration loading and table selection
// ABOUTME: Reads the TOML export config, the JSON column allow-list and source credentials

use crate::error::SyncError;
use crate::filters::{FilterCondition, TableFilter};
use crate::mysql::{SourceCredentials, DEFAULT_PORT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One table to export
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    /// Columns to export in order; `None` exports every source column
    pub allowlist: Option<Vec<String>>,
    pub filter: Option<TableFilter>,
}

impl TableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            allowlist: None,
            filter: None,
        }
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.allowlist = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn with_filter(mut self, filter: TableFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Source connection settings; every field is optional so layers can be merged
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SourceOverrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
}

impl SourceOverrides {
    /// Read `MYSQL_HOST`, `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_DATABASE` and `MYSQL_PORT`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            host: var("MYSQL_HOST"),
            user: var("MYSQL_USER"),
            password: var("MYSQL_PASSWORD"),
            database: var("MYSQL_DATABASE"),
            port: var("MYSQL_PORT").and_then(|p| p.parse().ok()),
        }
    }

    /// Fill fields missing from `self` with values from `fallback`
    pub fn or(self, fallback: SourceOverrides) -> Self {
        Self {
            host: self.host.or(fallback.host),
            user: self.user.or(fallback.user),
            password: self.password.or(fallback.password),
            database: self.database.or(fallback.database),
            port: self.port.or(fallback.port),
        }
    }

    /// Build validated credentials, failing when a required field is missing
    pub fn resolve(self) -> Result<SourceCredentials, SyncError> {
        let credentials = SourceCredentials {
            host: self.host.unwrap_or_default(),
            user: self.user.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            database: self.database.unwrap_or_default(),
            port: self.port.unwrap_or(DEFAULT_PORT),
        };
        credentials.validate()?;
        Ok(credentials)
    }
}

/// Filter as written in the config file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterConfig {
    Expression(String),
    Conditions(Vec<FilterCondition>),
}

/// `[[tables]]` entry of the config file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub filter: Option<FilterConfig>,
    pub raw_filter: Option<String>,
}

impl TableConfig {
    fn to_spec(&self, fields: &HashMap<String, Vec<String>>) -> Result<TableSpec, SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::Config("Table entry with an empty name".to_string()));
        }

        let filter = match (&self.filter, &self.raw_filter) {
            (Some(_), Some(_)) => {
                return Err(SyncError::Config(format!(
                    "Table '{}' sets both 'filter' and 'raw_filter'",
                    self.name
                )))
            }
            (Some(FilterConfig::Expression(expression)), None) => {
                Some(TableFilter::parse(expression)?)
            }
            (Some(FilterConfig::Conditions(conditions)), None) => {
                Some(TableFilter::from_conditions(conditions.clone())?)
            }
            (None, Some(raw)) => {
                tracing::warn!(
                    "Table '{}' uses a raw filter; it is appended to the query unchecked",
                    self.name
                );
                Some(TableFilter::Raw(raw.clone()))
            }
            (None, None) => None,
        };

        let allowlist = fields
            .get(&self.name)
            .cloned()
            .or_else(|| self.columns.clone());

        Ok(TableSpec {
            name: self.name.clone(),
            allowlist,
            filter,
        })
    }
}

/// Contents of the export config file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub destination: Option<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub fields_file: Option<PathBuf>,
    #[serde(default)]
    pub source: SourceOverrides,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            destination: None,
            page_size: DEFAULT_PAGE_SIZE,
            fields_file: None,
            source: SourceOverrides::default(),
            tables: Vec::new(),
        }
    }
}

impl ExportConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse export config")
    }

    /// Table specs in config order, with allow-lists from `fields` taking precedence
    pub fn table_specs(
        &self,
        fields: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<TableSpec>, SyncError> {
        let mut specs: Vec<TableSpec> = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            if specs.iter().any(|s| s.name == table.name) {
                return Err(SyncError::Config(format!(
                    "Table '{}' is configured more than once",
                    table.name
                )));
            }
            specs.push(table.to_spec(fields)?);
        }

        // Tables only named in the fields file still get exported
        let mut extra: Vec<&String> = fields
            .keys()
            .filter(|name| !specs.iter().any(|s| &s.name == *name))
            .collect();
        extra.sort();
        for name in extra {
            specs.push(TableSpec::new(name).with_columns(fields[name].as_slice()));
        }

        Ok(specs)
    }
}

/// Load the export config file
///
/// A relative `fields_file` is resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<ExportConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config = ExportConfig::from_toml(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if let (Some(fields), Some(dir)) = (&config.fields_file, path.parent()) {
        if fields.is_relative() {
            config.fields_file = Some(dir.join(fields));
        }
    }

    Ok(config)
}

/// Load a JSON column allow-list file: `{ "table": ["column", ...] }`
pub fn load_table_fields(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fields file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid fields file {}", path.display()))
}

/// Restrict `specs` to `names`, in the order given
///
/// Names without a configured entry are exported with every column and no filter.
pub fn select_tables(specs: &[TableSpec], names: &[String]) -> Vec<TableSpec> {
    let mut selected: Vec<TableSpec> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if name.is_empty() || selected.iter().any(|s| s.name == name) {
            continue;
        }
        let spec = specs
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .unwrap_or_else(|| TableSpec::new(name));
        selected.push(spec);
    }
    selected
}
