//! Data-inspection tools for datalyst.
//!
//! Three tools give the agent access to the user's files:
//! - `file_inspector`: show a file's contents (CSV rows, plain text, PDF text)
//! - `data_query_engine`: run a table query over CSV or JSON
//! - `document_deep_analyst`: keyword search over long PDF or TXT documents
//!
//! With the `pdf` feature, PDF text extraction is available.

pub mod data_query_engine;
pub mod document;
pub mod document_deep_analyst;
pub mod file_inspector;
pub mod query;
pub mod splitter;
pub mod table;

use datalyst_config::ToolsConfig;
use datalyst_core::tool::ToolRegistry;

pub use data_query_engine::DataQueryEngineTool;
pub use document_deep_analyst::DocumentDeepAnalystTool;
pub use file_inspector::FileInspectorTool;

/// Create the tool registry the agent runs with.
///
/// Registration order is the order tools are offered to the model.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FileInspectorTool::new(config.data_dir.clone())));
    registry.register(Box::new(DataQueryEngineTool::new(
        config.data_dir.clone(),
        config.max_rendered_rows,
    )));
    registry.register(Box::new(DocumentDeepAnalystTool::new(config)));
    registry
}
