//! The system directive sent ahead of the history on every decision step.

use std::collections::BTreeSet;

const PREAMBLE: &str = "You are a Data Analyst.";

const PROTOCOL: &str = "RULES:
MANDATORY STEPS:
1. Use 'file_inspector' to see the exact column names.
2. For calculations, use 'data_query_engine'.
3. COPY the column names exactly (e.g., if the inspector says 'Salary', don't type 'salary').
CRITICAL: Read tool error messages CAREFULLY and fix the EXACT issue mentioned.

MANDATORY WORKFLOW:
1. ALWAYS use 'file_inspector' FIRST to see exact column names
2. For calculations, use 'data_query_engine' with the EXACT column names from step 1
3. If a tool returns an ERROR, you MUST change your approach - do NOT retry the same code

QUERY SYNTAX (data_query_engine):
CORRECT order: table.groupby('Column').rollup({ metric: aq.op.mean('Value') })
WRONG order: table.rollup({ ... }).groupby('Column')

Standard deviation: aq.op.stdev('ColumnName')
NEVER use: Math.sqrt or any other Math function

VALID EXAMPLES:
- Average: (table) => table.rollup({ avg: aq.op.mean('Sueldo') })
- Group stats: (table) => table.groupby('Puesto').rollup({ avg: aq.op.mean('Sueldo'), std: aq.op.stdev('Sueldo') })
- Filter: (table) => table.filter(d => d.Puesto === 'Desarrollador').rollup({ total: aq.op.sum('Sueldo') })
- Count: (table) => table.groupby('Puesto').rollup({ count: aq.op.count() })

IMPORTANT:
- If a previous tool result already contains the data you need, respond directly
- Match column names EXACTLY (case-sensitive)
- After 2 failed attempts with a tool, explain the issue to the user instead of retrying
- To view a file, use 'file_inspector'
- To search long PDF or TXT files, use 'document_deep_analyst'
- Never use placeholders - always use the actual numbers

EXTREMELY IMPORTANT:
Your answer must be ONLY the requested final value (number, code or name).
Do not include explanations, units (such as USD) or phrases like 'The answer is'.";

/// Renders the directive for a given set of known files.
#[derive(Debug, Clone, Default)]
pub struct Directive {
    custom: Option<String>,
}

impl Directive {
    /// A directive using the built-in protocol text, or `custom` when given.
    pub fn new(custom: Option<String>) -> Self {
        Self { custom }
    }

    /// Render the directive. Files are listed in sorted order.
    pub fn render(&self, known_files: &BTreeSet<String>) -> String {
        let files = known_files
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        match &self.custom {
            Some(text) => format!("{text}\n\nFILES: [{files}]"),
            None => format!("{PREAMBLE}\n\nFILES: [{files}]\n\n{PROTOCOL}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lists_files_sorted() {
        let text = Directive::default().render(&files(&["b.pdf", "a.csv"]));
        assert!(text.starts_with("You are a Data Analyst."));
        assert!(text.contains("FILES: [a.csv, b.pdf]"));
        assert!(text.contains("MANDATORY WORKFLOW"));
    }

    #[test]
    fn no_files_renders_empty_list() {
        let text = Directive::default().render(&BTreeSet::new());
        assert!(text.contains("FILES: []"));
    }

    #[test]
    fn custom_text_keeps_file_list() {
        let text = Directive::new(Some("Answer tersely.".into())).render(&files(&["x.json"]));
        assert_eq!(text, "Answer tersely.\n\nFILES: [x.json]");
    }
}
