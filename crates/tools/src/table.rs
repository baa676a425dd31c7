//! In-memory tables for the query engine.
//!
//! A [`Table`] is a list of named columns plus rows of loosely typed
//! [`Value`]s. Tables are loaded from CSV (with a small RFC 4180 reader
//! that handles quoting and CRLF line endings) or from JSON, and rendered
//! back as a pipe-delimited text grid for the model to read.

use std::cmp::Ordering;
use std::fmt;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Infer a typed value from a raw CSV field.
    ///
    /// Empty fields become `Null`, `true`/`false` become booleans, anything
    /// that reads as a decimal number becomes a number, the rest stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match trimmed {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if looks_numeric(trimmed) {
            if let Ok(n) = trimmed.parse::<f64>() {
                return Value::Number(n);
            }
        }
        Value::Text(raw.to_string())
    }

    /// Convert a JSON value into a cell. Nested values are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, used by aggregates and arithmetic.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) if looks_numeric(s.trim()) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Strict equality: same kind and same value.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (a, b) => a == b,
        }
    }

    /// Loose equality: numbers compare with numeric-looking text.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.strict_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Total order used for sorting: nulls first, then booleans, numbers
    /// and text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::Text(_) => 3,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Key used to group rows; distinguishes kinds so `1` and `"1"` differ.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "n:".into(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Number(n) => format!("f:{}", format_number(*n)),
            Value::Text(s) => format!("s:{s}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Format a number for display: integers without a fraction, everything
/// else rounded to six decimals with trailing zeros dropped.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let rounded = format!("{n:.6}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".into()
    } else {
        trimmed.to_string()
    }
}

fn looks_numeric(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    !body.is_empty()
        && body.chars().any(|c| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
        && body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

/// Errors raised while loading tabular data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("the file has no header row")]
    MissingHeader,

    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("record on line {line} has {found} fields, expected {expected}")]
    RecordLength {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported JSON layout: {0}")]
    UnsupportedJson(String),
}

/// Raw CSV contents: a header row plus string records.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecords {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse CSV text, skipping blank lines.
///
/// Every record must have as many fields as the header.
pub fn parse_csv(content: &str) -> Result<CsvRecords, TableError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = split_records(content)?;
    if records.is_empty() {
        return Err(TableError::MissingHeader);
    }
    let (_, headers) = records.remove(0);
    let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::with_capacity(records.len());
    for (line, fields) in records {
        if fields.len() != headers.len() {
            return Err(TableError::RecordLength {
                line,
                expected: headers.len(),
                found: fields.len(),
            });
        }
        rows.push(fields);
    }

    Ok(CsvRecords { headers, rows })
}

/// Split CSV text into records, each tagged with its starting line number.
fn split_records(content: &str) -> Result<Vec<(usize, Vec<String>)>, TableError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut quote_line = 1;
    let mut chars = content.chars().peekable();

    let finish_record =
        |fields: &mut Vec<String>, field: &mut String, records: &mut Vec<(usize, Vec<String>)>, at: usize| {
            fields.push(std::mem::take(field));
            let record = std::mem::take(fields);
            let blank = record.len() == 1 && record[0].trim().is_empty();
            if !blank {
                records.push((at, record));
            }
        };

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                finish_record(&mut fields, &mut field, &mut records, record_line);
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !fields.is_empty() {
        finish_record(&mut fields, &mut field, &mut records, record_line);
    }

    Ok(records)
}

/// A column-named table of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Load CSV text, inferring cell types.
    pub fn from_csv(content: &str) -> Result<Self, TableError> {
        let records = parse_csv(content)?;
        let rows = records
            .rows
            .iter()
            .map(|r| r.iter().map(|f| Value::infer(f)).collect())
            .collect();
        Ok(Self::new(records.headers, rows))
    }

    /// Load JSON text: either an array of row objects or an object mapping
    /// column names to equally long arrays.
    pub fn from_json(content: &str) -> Result<Self, TableError> {
        let parsed: serde_json::Value =
            serde_json::from_str(content).map_err(|e| TableError::InvalidJson(e.to_string()))?;

        match parsed {
            serde_json::Value::Array(items) => {
                let mut columns: Vec<String> = Vec::new();
                for item in &items {
                    let obj = item.as_object().ok_or_else(|| {
                        TableError::UnsupportedJson("array elements must be objects".into())
                    })?;
                    for key in obj.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
                let rows = items
                    .iter()
                    .map(|item| {
                        columns
                            .iter()
                            .map(|c| item.get(c).map(Value::from_json).unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                Ok(Self::new(columns, rows))
            }
            serde_json::Value::Object(map) => {
                let columns: Vec<String> = map.keys().cloned().collect();
                let mut arrays = Vec::with_capacity(columns.len());
                for (name, column) in &map {
                    let values = column.as_array().ok_or_else(|| {
                        TableError::UnsupportedJson(format!("column '{name}' is not an array"))
                    })?;
                    arrays.push(values);
                }
                let len = arrays.iter().map(|a| a.len()).max().unwrap_or(0);
                let rows = (0..len)
                    .map(|i| {
                        arrays
                            .iter()
                            .map(|a| a.get(i).map(Value::from_json).unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                Ok(Self::new(columns, rows))
            }
            _ => Err(TableError::UnsupportedJson(
                "expected an array of objects or an object of arrays".into(),
            )),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Render as a pipe-delimited grid, showing at most `max_rows` rows.
    pub fn render(&self, max_rows: usize) -> String {
        let shown = &self.rows[..self.rows.len().min(max_rows)];
        let cells: Vec<Vec<String>> = shown
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
                    .max(3)
            })
            .collect();

        let mut out = Vec::with_capacity(cells.len() + 3);
        out.push(grid_line(self.columns.iter().map(String::as_str), &widths));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        out.push(format!("|{}|", rule.join("|")));
        for row in &cells {
            out.push(grid_line(row.iter().map(String::as_str), &widths));
        }
        if self.rows.len() > shown.len() {
            out.push(format!("({} of {} rows shown)", shown.len(), self.rows.len()));
        }
        out.join("\n")
    }
}

fn grid_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = values
        .zip(widths)
        .map(|(v, w)| format!(" {v}{} ", " ".repeat(w.saturating_sub(v.chars().count()))))
        .collect();
    format!("|{}|", padded.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_cell_types() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("1500"), Value::Number(1500.0));
        assert_eq!(Value::infer("-2.5e3"), Value::Number(-2500.0));
        assert_eq!(Value::infer("Desarrollador"), Value::Text("Desarrollador".into()));
        assert_eq!(Value::infer("inf"), Value::Text("inf".into()));
        assert_eq!(Value::infer("2024-01-05"), Value::Text("2024-01-05".into()));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1500.0), "1500");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(-0.0000001), "0");
    }

    #[test]
    fn parses_simple_csv() {
        let records = parse_csv("Nombre,Puesto,Sueldo\nAna,Dev,1500\nLuis,QA,1200\n").unwrap();
        assert_eq!(records.headers, vec!["Nombre", "Puesto", "Sueldo"]);
        assert_eq!(records.rows.len(), 2);
        assert_eq!(records.rows[1], vec!["Luis", "QA", "1200"]);
    }

    #[test]
    fn parses_quotes_crlf_and_blank_lines() {
        let csv = "name,notes\r\n\"Smith, J\",\"said \"\"hi\"\"\"\r\n\r\nDoe,\"multi\nline\"\r\n";
        let records = parse_csv(csv).unwrap();
        assert_eq!(records.rows.len(), 2);
        assert_eq!(records.rows[0][0], "Smith, J");
        assert_eq!(records.rows[0][1], "said \"hi\"");
        assert_eq!(records.rows[1][1], "multi\nline");
    }

    #[test]
    fn strips_byte_order_mark() {
        let records = parse_csv("\u{feff}id,v\n1,2").unwrap();
        assert_eq!(records.headers[0], "id");
    }

    #[test]
    fn ragged_record_is_rejected() {
        let err = parse_csv("a,b\n1,2\n3\n").unwrap_err();
        assert_eq!(
            err,
            TableError::RecordLength {
                line: 3,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_csv("a,b\n\"open,2\n").unwrap_err();
        assert_eq!(err, TableError::UnterminatedQuote { line: 2 });
    }

    #[test]
    fn empty_input_has_no_header() {
        assert_eq!(parse_csv("").unwrap_err(), TableError::MissingHeader);
    }

    #[test]
    fn json_rows_and_columns() {
        let rows = Table::from_json(r#"[{"a": 1, "b": "x"}, {"a": 2, "c": true}]"#).unwrap();
        assert_eq!(rows.columns, vec!["a", "b", "c"]);
        assert_eq!(rows.rows[1], vec![Value::Number(2.0), Value::Null, Value::Bool(true)]);

        let cols = Table::from_json(r#"{"a": [1, 2, 3], "b": ["x", "y", "z"]}"#).unwrap();
        assert_eq!(cols.num_rows(), 3);
        assert_eq!(cols.rows[2][1], Value::Text("z".into()));
    }

    #[test]
    fn json_columns_keep_file_order() {
        let rows =
            Table::from_json(r#"[{"Nombre": "Ana", "Sueldo": 1500, "Area": "IT"}]"#).unwrap();
        assert_eq!(rows.columns, vec!["Nombre", "Sueldo", "Area"]);

        let cols = Table::from_json(r#"{"zeta": [1], "alfa": [2]}"#).unwrap();
        assert_eq!(cols.columns, vec!["zeta", "alfa"]);
        assert!(cols.render(10).starts_with("| zeta | alfa |"));
    }

    #[test]
    fn json_scalar_is_unsupported() {
        assert!(matches!(
            Table::from_json("42"),
            Err(TableError::UnsupportedJson(_))
        ));
    }

    #[test]
    fn loose_and_strict_equality() {
        let n = Value::Number(5.0);
        let s = Value::Text("5".into());
        assert!(!n.strict_eq(&s));
        assert!(n.loose_eq(&s));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn render_truncates() {
        let table = Table::from_csv("k,v\na,1\nb,2\nc,3").unwrap();
        let out = table.render(2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "| k   | v   |");
        assert_eq!(lines[2], "| a   | 1   |");
        assert_eq!(lines.last().copied(), Some("(2 of 3 rows shown)"));
    }
}
