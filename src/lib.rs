// ABOUTME: Library module for mysql-sqlite-exporter
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod exporter;
pub mod filters;
pub mod interactive;
pub mod mysql;
pub mod progress;
pub mod source;
pub mod sqlite;
pub mod utils;
