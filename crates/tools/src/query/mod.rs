//! A small tabular query language.
//!
//! Queries are method chains over a table, written in the style of
//! dataframe libraries:
//!
//! ```text
//! (table) => table.filter(d => d.Puesto === 'Dev')
//!                 .groupby('Puesto')
//!                 .rollup({ avg: aq.op.mean('Sueldo'), n: aq.op.count() })
//! ```
//!
//! Source text is tokenized, parsed into a [`Query`] and interpreted
//! against a [`Table`]. Nothing is ever evaluated as host code.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use parser::{AggOp, Aggregate, BinaryOp, Expr, Method, Query, SortKey, Step, UnaryOp};

use crate::table::Table;

/// Everything that can go wrong parsing or running a query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("{}", unknown_column_message(.column, .available))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    #[error(
        "unsupported table method '{0}' (supported: filter, groupby, rollup, select, orderby, limit, count, ungroup)"
    )]
    UnsupportedVerb(String),

    #[error(
        "unsupported aggregate 'aq.op.{0}' (supported: count, sum, mean, average, min, max, median, stdev, stdevp, variance, variancep, distinct, valid)"
    )]
    UnsupportedAggregate(String),

    #[error("{0}")]
    Invalid(String),
}

impl QueryError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        QueryError::Syntax {
            message: message.into(),
            position,
        }
    }

    /// The closest existing column for an unknown-column error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            QueryError::UnknownColumn { column, available } => near_match(column, available),
            _ => None,
        }
    }
}

fn near_match<'a>(column: &str, available: &'a [String]) -> Option<&'a str> {
    let wanted = column.trim().to_lowercase();
    available
        .iter()
        .find(|c| c.trim().to_lowercase() == wanted)
        .map(String::as_str)
}

fn unknown_column_message(column: &str, available: &[String]) -> String {
    let mut message = format!(
        "column '{column}' does not exist. Available columns: {}.",
        available.join(", ")
    );
    if let Some(near) = near_match(column, available) {
        message.push_str(&format!(
            " Did you mean '{near}'? Column names are case-sensitive."
        ));
    }
    message
}

/// Parse and run `source` against `table`.
pub fn run(source: &str, table: Table) -> Result<Table, QueryError> {
    let query = parse(source)?;
    eval::execute(&query, table)
}

/// Parse query source without running it.
pub fn parse(source: &str) -> Result<Query, QueryError> {
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse_query()
}
