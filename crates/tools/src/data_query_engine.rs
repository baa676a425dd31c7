//! Data query engine tool: run a query over a CSV or JSON file.
//!
//! Every failure is returned as text with correction hints so the model
//! can fix its query on the next turn.

use std::path::PathBuf;

use async_trait::async_trait;
use datalyst_core::error::ToolError;
use datalyst_core::tool::{Tool, ToolResult};
use tracing::{debug, info};

use crate::document::{self, DocumentKind};
use crate::query;
use crate::table::Table;

pub struct DataQueryEngineTool {
    data_dir: PathBuf,
    max_rendered_rows: usize,
}

impl DataQueryEngineTool {
    pub fn new(data_dir: impl Into<PathBuf>, max_rendered_rows: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_rendered_rows,
        }
    }
}

#[async_trait]
impl Tool for DataQueryEngineTool {
    fn name(&self) -> &str {
        "data_query_engine"
    }

    fn description(&self) -> &str {
        "Runs statistical analysis and filters over CSV or JSON files. Receives 'queryCode', \
         a table query such as: (table) => table.filter(d => d.Sueldo > 1000).rollup({ total: aq.op.sum('Sueldo') })"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queryCode": {
                    "type": "string",
                    "description": "The table query to execute, e.g. (table) => table.groupby('Puesto').rollup({ avg: aq.op.mean('Sueldo') })"
                },
                "filePath": {
                    "type": "string",
                    "description": "Path of the CSV or JSON file"
                }
            },
            "required": ["queryCode", "filePath"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = arguments["queryCode"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: "data_query_engine".into(),
                reason: "Missing 'queryCode' argument".into(),
            })?;
        let requested = arguments["filePath"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: "data_query_engine".into(),
                reason: "Missing 'filePath' argument".into(),
            })?;
        let path = match document::resolve_path(&self.data_dir, requested) {
            Ok(path) => path,
            Err(e) => return Ok(ToolResult::error(format!("ERROR: {e}"))),
        };

        let kind = DocumentKind::from_path(&path);
        if !matches!(kind, Some(DocumentKind::Csv | DocumentKind::Json)) {
            return Ok(ToolResult::error(format!(
                "ERROR: data_query_engine only supports structured files (CSV or JSON).\n\
                 File \"{}\" is {}.\n\
                 For PDF or TXT files, read the text with file_inspector or search it with document_deep_analyst.",
                document::display_name(&path),
                display_extension(&path),
            )));
        }

        if code.contains("Math.") {
            return Ok(ToolResult::error(math_rejection(code)));
        }

        info!(path = %path.display(), "Running table query");

        let content = match document::read_text(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::error(query_failure(code, &e.to_string()))),
        };
        let json = matches!(kind, Some(DocumentKind::Json));
        let source = code.to_string();
        let max_rows = self.max_rendered_rows;

        // CPU-bound; runs off the async workers so the dispatch timeout can fire.
        let outcome = tokio::task::spawn_blocking(move || run_query(&source, &content, json, max_rows))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "data_query_engine".into(),
                reason: format!("query worker failed: {e}"),
            })?;

        match outcome {
            Ok((rendered, columns, rows)) => {
                debug!(rows, columns = columns.len(), "Query succeeded");
                Ok(ToolResult::ok(format!("QUERY SUCCESSFUL:\n{rendered}")).with_data(
                    serde_json::json!({
                        "columns": columns,
                        "rows": rows,
                    }),
                ))
            }
            Err(e) => {
                debug!(error = %e, "Query failed");
                Ok(ToolResult::error(query_failure(code, &e)))
            }
        }
    }
}

/// Load the table, run the query and render the result.
fn run_query(
    source: &str,
    content: &str,
    json: bool,
    max_rows: usize,
) -> Result<(String, Vec<String>, usize), String> {
    let table = if json {
        Table::from_json(content)
    } else {
        Table::from_csv(content)
    }
    .map_err(|e| e.to_string())?;
    let result = query::run(source, table).map_err(|e| e.to_string())?;
    let rows = result.num_rows();
    Ok((result.render(max_rows), result.columns, rows))
}

fn display_extension(path: &std::path::Path) -> String {
    let ext = document::extension(path);
    if ext.is_empty() {
        "a file without extension".into()
    } else {
        ext
    }
}

fn math_rejection(code: &str) -> String {
    format!(
        "ERROR: Your query uses Math functions, which are not available in table queries.

YOUR CODE:
{code}

CORRECTION NEEDED:
- Do NOT use Math.sqrt() or any other Math function
- Do NOT use arrow functions inside rollup()

Example correct code:
(table) => table.rollup({{ std_dev: aq.op.stdev('Amount') }})

Please rewrite your query using only aq.op aggregates."
    )
}

fn query_failure(code: &str, message: &str) -> String {
    format!(
        "ERROR IN QUERY:

YOUR CODE:
{code}

ERROR MESSAGE:
{message}

COMMON FIXES:
1. For standard deviation use ONLY: aq.op.stdev('ColumnName')
2. Do NOT use arrow functions (d => ...) inside rollup()
3. Do NOT use Math.sqrt or other Math functions
4. Use .groupby() before .rollup()
5. Check that column names match exactly (case-sensitive)

Please try again with corrected syntax."
    )
}
