// ABOUTME: Command implementations for the exporter CLI
// ABOUTME: Exports the export and status commands

pub mod export;
pub mod status;

pub use export::{export, ExportOptions};
pub use status::status;
