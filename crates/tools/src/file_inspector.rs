//! File inspector tool: show a file's contents so the model can see
//! column names and text before querying.

use std::path::PathBuf;

use async_trait::async_trait;
use datalyst_core::error::ToolError;
use datalyst_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

use crate::document::{self, DocumentKind};
use crate::table;

pub struct FileInspectorTool {
    data_dir: PathBuf,
}

impl FileInspectorTool {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for FileInspectorTool {
    fn name(&self) -> &str {
        "file_inspector"
    }

    fn description(&self) -> &str {
        "Parses a file and returns its contents. For CSV it returns a list of structured rows; \
         for TXT, MD, JSON or PDF it returns the plain text. Use it first to learn the exact column names."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path of the file to inspect"
                }
            },
            "required": ["filePath"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let requested = arguments["filePath"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: "file_inspector".into(),
                reason: "Missing 'filePath' argument".into(),
            })?;
        let path = match document::resolve_path(&self.data_dir, requested) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = requested, error = %e, "Refused file outside the data directory");
                return Ok(ToolResult::error(format!("ERROR: {e}")));
            }
        };

        let Some(kind) = DocumentKind::from_path(&path) else {
            warn!(path = %path.display(), "Unsupported file type for inspection");
            return Ok(ToolResult::error(String::new()));
        };

        let output = match kind {
            DocumentKind::Csv => document::read_text(&path).await.and_then(|content| {
                csv_as_records(&content).map_err(|e| document::DocumentError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }),
            _ => document::load_text(&path).await,
        };

        match output {
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "File inspected");
                Ok(ToolResult::ok(text))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File inspection failed");
                Ok(ToolResult::error(String::new()))
            }
        }
    }
}

/// Render CSV rows as `[{"pageContent": "col: value, ..."}]`.
fn csv_as_records(content: &str) -> Result<String, table::TableError> {
    let records = table::parse_csv(content)?;
    let documents: Vec<serde_json::Value> = records
        .rows
        .iter()
        .map(|row| {
            let text = records
                .headers
                .iter()
                .zip(row)
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            serde_json::json!({ "pageContent": text })
        })
        .collect();
    Ok(serde_json::Value::Array(documents).to_string())
}
