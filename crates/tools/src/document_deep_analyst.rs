//! Document deep analyst tool: keyword search over long PDF or TXT files.
//!
//! The document is split into overlapping chunks; each chunk scores one
//! point per query word it contains and the best chunks are returned.

use std::path::PathBuf;

use async_trait::async_trait;
use datalyst_config::ToolsConfig;
use datalyst_core::error::ToolError;
use datalyst_core::tool::{Tool, ToolResult};
use tracing::debug;

use crate::document::{self, DocumentKind};
use crate::splitter::TextSplitter;

pub const NOT_FOUND: &str =
    "No specific information found about that topic. Try using different words.";

pub struct DocumentDeepAnalystTool {
    data_dir: PathBuf,
    splitter: TextSplitter,
    top_k: usize,
}

impl DocumentDeepAnalystTool {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            top_k: config.top_k,
        }
    }
}

#[async_trait]
impl Tool for DocumentDeepAnalystTool {
    fn name(&self) -> &str {
        "document_deep_analyst"
    }

    fn description(&self) -> &str {
        "Deep analysis of PDF and TXT files: searches and extracts the paragraphs most relevant \
         to a query. Use it for long documents where file_inspector does not show everything."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path of the PDF or TXT file"
                },
                "query": {
                    "type": "string",
                    "description": "The question or keywords to search for"
                }
            },
            "required": ["filePath", "query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let requested = arguments["filePath"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: "document_deep_analyst".into(),
                reason: "Missing 'filePath' argument".into(),
            })?;
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: "document_deep_analyst".into(),
                reason: "Missing 'query' argument".into(),
            })?;
        let path = match document::resolve_path(&self.data_dir, requested) {
            Ok(path) => path,
            Err(e) => return Ok(ToolResult::error(format!("Error analyzing document: {e}"))),
        };

        if !matches!(
            DocumentKind::from_path(&path),
            Some(DocumentKind::Pdf | DocumentKind::Text)
        ) {
            return Ok(ToolResult::error(format!(
                "ERROR: document_deep_analyst only supports documents (PDF or TXT).\nFile \"{}\" is {}.",
                document::display_name(&path),
                document::extension(&path),
            )));
        }

        let text = match document::load_text(&path).await {
            Ok(text) => text,
            Err(e) => {
                return Ok(ToolResult::error(format!("Error analyzing document: {e}")));
            }
        };

        let chunks = self.splitter.split(&text);
        let ranked = rank_chunks(&chunks, query, self.top_k);
        debug!(
            path = %path.display(),
            chunks = chunks.len(),
            matches = ranked.len(),
            "Document searched"
        );

        if ranked.is_empty() {
            return Ok(ToolResult::ok(NOT_FOUND));
        }

        let fragments = ranked
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[RESULTADO {}]: {}", i + 1, chunk))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolResult::ok(format!(
            "I found these fragments in the file:\n\n{fragments}"
        )))
    }
}

/// Score chunks by how many query words (lowercased, repeats counted) they
/// contain, keep those scoring above zero, best first, ties in document
/// order.
pub fn rank_chunks<'a>(chunks: &'a [String], query: &str, top_k: usize) -> Vec<&'a str> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();

    let mut scored: Vec<(usize, &str)> = chunks
        .iter()
        .map(|chunk| {
            let content = chunk.to_lowercase();
            let score = words.iter().filter(|w| content.contains(*w)).count();
            (score, chunk.as_str())
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, c)| c).collect()
}
