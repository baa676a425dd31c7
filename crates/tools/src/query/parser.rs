//! Recursive-descent parser producing the query AST.

use super::QueryError;
use super::lexer::{Spanned, Token};
use crate::table::Value;

/// A parsed query: table verbs applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Filter(Expr),
    GroupBy(Vec<String>),
    Rollup(Vec<(String, Aggregate)>),
    Select(Vec<String>),
    OrderBy(Vec<SortKey>),
    Limit(usize),
    Count { name: String },
    Ungroup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Stdev,
    StdevPop,
    Variance,
    VariancePop,
    Distinct,
    Valid,
}

impl AggOp {
    /// Resolve an aggregate name, accepting the common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "mean" | "average" | "avg" => Self::Mean,
            "min" => Self::Min,
            "max" => Self::Max,
            "median" => Self::Median,
            "stdev" | "std" | "stddev" => Self::Stdev,
            "stdevp" => Self::StdevPop,
            "variance" | "var" => Self::Variance,
            "variancep" => Self::VariancePop,
            "distinct" => Self::Distinct,
            "valid" => Self::Valid,
            _ => return None,
        })
    }

    pub fn needs_column(self) -> bool {
        !matches!(self, Self::Count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub op: AggOp,
    pub column: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    StrictEq,
    Eq,
    StrictNe,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Includes,
    StartsWith,
    EndsWith,
    ToLowerCase,
    ToUpperCase,
    Trim,
    Length,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "includes" => Self::Includes,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "toLowerCase" => Self::ToLowerCase,
            "toUpperCase" => Self::ToUpperCase,
            "trim" => Self::Trim,
            "length" => Self::Length,
            _ => return None,
        })
    }
}

/// Row-level expression used by `filter`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call {
        target: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every column name the expression reads.
    pub fn fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field(name) => out.push(name),
            Expr::Unary(_, inner) => inner.fields(out),
            Expr::Binary(_, left, right) => {
                left.fields(out);
                right.fields(out);
            }
            Expr::Call { target, args, .. } => {
                target.fields(out);
                for arg in args {
                    arg.fields(out);
                }
            }
        }
    }
}

/// Deepest expression nesting (parentheses, unary operators) accepted.
pub const MAX_DEPTH: usize = 64;

/// Most operator and method nodes accepted across a query's filters.
pub const MAX_EXPR_NODES: usize = 256;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Name bound to the current row inside a `filter` callback.
    row_param: Option<String>,
    depth: usize,
    nodes: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            row_param: None,
            depth: 0,
            nodes: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.pos)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), QueryError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        let mut message = message.into();
        match self.peek() {
            Some(token) => message.push_str(&format!(", found {}", describe(token))),
            None => message.push_str(", found end of query"),
        }
        QueryError::syntax(message, self.position())
    }

    fn ident(&mut self, what: &str) -> Result<String, QueryError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// query = [param '=>'] ['{' 'return'] IDENT ('.' verb '(' args ')')* [';'] ['}']
    pub fn parse_query(&mut self) -> Result<Query, QueryError> {
        let table_param = self.arrow_param()?;

        let braced = self.eat(&Token::LBrace);
        if braced {
            let keyword = self.ident("'return'")?;
            if keyword != "return" {
                return Err(QueryError::syntax(
                    "a block body must start with 'return'",
                    self.position(),
                ));
            }
        }

        let root = self.ident("the table")?;
        if let Some(param) = &table_param {
            if &root != param {
                return Err(QueryError::Invalid(format!(
                    "the query must start from the table parameter '{param}', not '{root}'"
                )));
            }
        }

        let mut steps = Vec::new();
        while self.eat(&Token::Dot) {
            let verb = self.ident("a table method")?;
            self.expect(Token::LParen, "'(' after the method name")?;
            if let Some(step) = self.parse_verb(&verb)? {
                steps.push(step);
            }
            self.expect(Token::RParen, "')' to close the method call")?;
        }

        while self.eat(&Token::Semicolon) {}
        if braced {
            self.expect(Token::RBrace, "'}' to close the block")?;
        }
        if self.peek().is_some() {
            return Err(self.error("unexpected input after the query"));
        }

        Ok(Query { steps })
    }

    /// Parse an optional `x =>` or `(x) =>` prefix.
    fn arrow_param(&mut self) -> Result<Option<String>, QueryError> {
        match (self.peek(), self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some(Token::LParen), Some(Token::Ident(name)), Some(Token::RParen), Some(Token::Arrow)) => {
                let name = name.clone();
                self.pos += 4;
                Ok(Some(name))
            }
            (Some(Token::Ident(name)), Some(Token::Arrow), _, _) => {
                let name = name.clone();
                self.pos += 2;
                Ok(Some(name))
            }
            _ => Ok(None),
        }
    }

    fn parse_verb(&mut self, verb: &str) -> Result<Option<Step>, QueryError> {
        let step = match verb {
            "filter" => Step::Filter(self.parse_row_callback()?),
            "groupby" | "group_by" | "groupBy" => Step::GroupBy(self.parse_columns()?),
            "rollup" => Step::Rollup(self.parse_rollup()?),
            "select" => Step::Select(self.parse_columns()?),
            "orderby" | "order_by" | "orderBy" => Step::OrderBy(self.parse_sort_keys()?),
            "limit" => Step::Limit(self.parse_count()?),
            "count" => Step::Count {
                name: self.parse_count_options()?,
            },
            "ungroup" => Step::Ungroup,
            // Materialising calls are accepted and ignored; results are
            // always rendered as a table.
            "objects" | "print" | "toArray" => {
                if let Some(Token::Number(_)) = self.peek() {
                    self.pos += 1;
                }
                return Ok(None);
            }
            other => return Err(QueryError::UnsupportedVerb(other.to_string())),
        };
        Ok(Some(step))
    }

    /// A list of quoted column names, either as separate arguments or as an
    /// array literal.
    fn parse_columns(&mut self) -> Result<Vec<String>, QueryError> {
        let bracketed = self.eat(&Token::LBracket);
        let close = if bracketed {
            Token::RBracket
        } else {
            Token::RParen
        };

        let mut columns = Vec::new();
        while self.peek() != Some(&close) {
            match self.peek() {
                Some(Token::Str(name)) => {
                    columns.push(name.clone());
                    self.pos += 1;
                }
                _ => {
                    return Err(self.error(
                        "column names must be quoted strings, e.g. 'Sueldo'",
                    ));
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if bracketed {
            self.expect(Token::RBracket, "']' to close the column list")?;
        }
        if columns.is_empty() {
            return Err(self.error("expected at least one column name"));
        }
        Ok(columns)
    }

    fn parse_count(&mut self) -> Result<usize, QueryError> {
        match self.peek() {
            Some(Token::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                let n = *n as usize;
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.error("expected a non-negative whole number")),
        }
    }

    /// `count()` or `count({ as: 'name' })`.
    fn parse_count_options(&mut self) -> Result<String, QueryError> {
        if !self.eat(&Token::LBrace) {
            return Ok("count".into());
        }
        let key = self.object_key()?;
        if key != "as" {
            return Err(QueryError::Invalid(format!(
                "count() only accepts the 'as' option, not '{key}'"
            )));
        }
        self.expect(Token::Colon, "':' after 'as'")?;
        let name = match self.advance() {
            Some(Token::Str(name)) => name,
            _ => return Err(QueryError::syntax("'as' must be a quoted name", self.position())),
        };
        self.eat(&Token::Comma);
        self.expect(Token::RBrace, "'}' to close the options")?;
        Ok(name)
    }

    fn object_key(&mut self) -> Result<String, QueryError> {
        match self.peek() {
            Some(Token::Ident(key)) | Some(Token::Str(key)) => {
                let key = key.clone();
                self.pos += 1;
                Ok(key)
            }
            _ => Err(self.error("expected an output name")),
        }
    }

    /// `{ name: aq.op.fn('Column'), ... }`
    fn parse_rollup(&mut self) -> Result<Vec<(String, Aggregate)>, QueryError> {
        self.expect(Token::LBrace, "'{' with named aggregates")?;
        let mut entries = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            let name = self.object_key()?;
            self.expect(Token::Colon, "':' after the output name")?;
            let aggregate = self.parse_aggregate()?;
            entries.push((name, aggregate));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "'}' to close the aggregates")?;
        if entries.is_empty() {
            return Err(QueryError::Invalid(
                "rollup() needs at least one aggregate, e.g. { total: aq.op.sum('Sueldo') }".into(),
            ));
        }
        Ok(entries)
    }

    fn parse_aggregate(&mut self) -> Result<Aggregate, QueryError> {
        let arrow_follows = matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Token::Ident(_)), Some(Token::Arrow)) | (Some(Token::LParen), _)
        );
        if arrow_follows {
            return Err(QueryError::Invalid(
                "arrow functions are not allowed inside rollup(); use aq.op.<function>('Column')"
                    .into(),
            ));
        }

        let mut path = vec![self.ident("an aggregate such as aq.op.mean('Column')")?];
        while self.eat(&Token::Dot) {
            path.push(self.ident("a name after '.'")?);
        }
        let name = match path.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["aq", "op", name] | ["op", name] => name.to_string(),
            _ => {
                return Err(QueryError::Invalid(format!(
                    "'{}' is not an aggregate; use aq.op.<function>('Column')",
                    path.join(".")
                )));
            }
        };
        let op = AggOp::from_name(&name).ok_or(QueryError::UnsupportedAggregate(name))?;

        self.expect(Token::LParen, "'(' after the aggregate name")?;
        let column = match self.peek() {
            Some(Token::Str(column)) => {
                let column = column.clone();
                self.pos += 1;
                Some(column)
            }
            Some(Token::RParen) => None,
            _ => return Err(self.error("aggregate arguments must be a quoted column name")),
        };
        self.expect(Token::RParen, "')' after the aggregate argument")?;

        if op.needs_column() && column.is_none() {
            return Err(QueryError::Invalid(format!(
                "aq.op.{}() needs a column name, e.g. aq.op.{}('Sueldo')",
                path[path.len() - 1],
                path[path.len() - 1]
            )));
        }
        Ok(Aggregate { op, column })
    }

    /// `'col'`, `aq.desc('col')` or `desc('col')`, comma separated.
    fn parse_sort_keys(&mut self) -> Result<Vec<SortKey>, QueryError> {
        let mut keys = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            match self.advance() {
                Some(Token::Str(column)) => keys.push(SortKey {
                    column,
                    descending: false,
                }),
                Some(Token::Ident(first)) => {
                    let mut path = vec![first];
                    while self.eat(&Token::Dot) {
                        path.push(self.ident("a name after '.'")?);
                    }
                    let descending = match path.last().map(String::as_str) {
                        Some("desc") => true,
                        Some("asc") => false,
                        _ => {
                            return Err(QueryError::Invalid(format!(
                                "'{}' is not a sort key; use 'Column' or aq.desc('Column')",
                                path.join(".")
                            )));
                        }
                    };
                    self.expect(Token::LParen, "'(' after desc")?;
                    let column = match self.advance() {
                        Some(Token::Str(column)) => column,
                        _ => {
                            return Err(QueryError::syntax(
                                "desc() takes a quoted column name",
                                self.position(),
                            ));
                        }
                    };
                    self.expect(Token::RParen, "')' after the column name")?;
                    keys.push(SortKey { column, descending });
                }
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.error("expected a column name or aq.desc('Column')"));
                }
                None => return Err(self.error("expected a column name or aq.desc('Column')")),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if keys.is_empty() {
            return Err(self.error("orderby() needs at least one column"));
        }
        Ok(keys)
    }

    /// `d => expr`, `(d) => expr` or `d => { return expr; }`.
    fn parse_row_callback(&mut self) -> Result<Expr, QueryError> {
        let param = self
            .arrow_param()?
            .ok_or_else(|| self.error("filter() expects a row function such as d => d.Sueldo > 1000"))?;

        let previous = self.row_param.replace(param);
        let braced = self.eat(&Token::LBrace);
        if braced {
            let keyword = self.ident("'return'")?;
            if keyword != "return" {
                return Err(QueryError::syntax(
                    "a block body must start with 'return'",
                    self.position(),
                ));
            }
        }
        let expr = self.parse_expr()?;
        if braced {
            while self.eat(&Token::Semicolon) {}
            self.expect(Token::RBrace, "'}' to close the function body")?;
        }
        self.row_param = previous;
        Ok(expr)
    }

    // expr = or
    fn parse_expr(&mut self) -> Result<Expr, QueryError> {
        self.nested(Self::parse_or)
    }

    /// Run `parse` one nesting level deeper, refusing runaway nesting.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, QueryError>,
    ) -> Result<Expr, QueryError> {
        if self.depth >= MAX_DEPTH {
            return Err(QueryError::Invalid(format!(
                "query is nested too deeply (more than {MAX_DEPTH} levels)"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Count one more operator or method node.
    fn grow(&mut self) -> Result<(), QueryError> {
        self.nodes += 1;
        if self.nodes > MAX_EXPR_NODES {
            return Err(QueryError::Invalid(format!(
                "filter expressions are too long (more than {MAX_EXPR_NODES} operations)"
            )));
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Result<Expr, QueryError> {
        self.grow()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::And, left, right)?;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::StrictNe) => BinaryOp::StrictNe,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        let op = if self.eat(&Token::Not) {
            UnaryOp::Not
        } else if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else {
            return self.parse_postfix();
        };
        self.grow()?;
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    // postfix = primary ('.' IDENT ['(' args ')'] | '[' STRING ']')*
    fn parse_postfix(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.ident("a method name after '.'")?;
                let method = Method::from_name(&name).ok_or_else(|| {
                    QueryError::Invalid(format!(
                        "'{name}' is not supported in filter expressions; use includes, startsWith, endsWith, toLowerCase, toUpperCase, trim or length"
                    ))
                })?;
                let mut args = Vec::new();
                if method != Method::Length {
                    self.expect(Token::LParen, "'(' to call the method")?;
                    while self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')' to close the method call")?;
                }
                self.grow()?;
                expr = Expr::Call {
                    target: Box::new(expr),
                    method,
                    args,
                };
            } else if self.peek() == Some(&Token::LBracket) {
                return Err(self.error("indexing is only supported on the row, e.g. d['Column']"));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        let at = self.position();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')' to close the group")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ if self.row_param.as_deref() == Some(name.as_str()) => self.parse_field(),
                "Math" => Err(QueryError::Invalid(
                    "Math functions are not available in queries; use aq.op aggregates inside rollup()"
                        .into(),
                )),
                _ => Err(QueryError::Invalid(format!(
                    "unknown name '{name}'; refer to columns through the row parameter, e.g. d.Sueldo"
                ))),
            },
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected a value"))
            }
            None => Err(QueryError::syntax("unexpected end of query", at)),
        }
    }

    /// After the row parameter: `.Column` or `['Column']`.
    fn parse_field(&mut self) -> Result<Expr, QueryError> {
        if self.eat(&Token::Dot) {
            return Ok(Expr::Field(self.ident("a column name after '.'")?));
        }
        if self.eat(&Token::LBracket) {
            let column = match self.advance() {
                Some(Token::Str(column)) => column,
                _ => {
                    return Err(QueryError::syntax(
                        "row indexing takes a quoted column name",
                        self.position(),
                    ));
                }
            };
            self.expect(Token::RBracket, "']' after the column name")?;
            return Ok(Expr::Field(column));
        }
        Err(self.error("expected a column access such as d.Sueldo"))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{name}'"),
        Token::Number(n) => format!("number {n}"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Arrow => "'=>'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::LBrace => "'{'".into(),
        Token::RBrace => "'}'".into(),
        Token::LBracket => "'['".into(),
        Token::RBracket => "']'".into(),
        Token::Comma => "','".into(),
        Token::Colon => "':'".into(),
        Token::Semicolon => "';'".into(),
        Token::Dot => "'.'".into(),
        other => format!("operator {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    #[test]
    fn bare_chain_without_prefix() {
        let query = parse("table.groupby('a', 'b').count()").unwrap();
        assert_eq!(
            query.steps,
            vec![
                Step::GroupBy(vec!["a".into(), "b".into()]),
                Step::Count {
                    name: "count".into()
                },
            ]
        );
    }

    #[test]
    fn array_column_list_and_trailing_semicolon() {
        let query = parse("(dt) => dt.select(['x', 'y']);").unwrap();
        assert_eq!(query.steps, vec![Step::Select(vec!["x".into(), "y".into()])]);
    }

    #[test]
    fn block_body_is_accepted() {
        let query = parse("(table) => { return table.limit(3); }").unwrap();
        assert_eq!(query.steps, vec![Step::Limit(3)]);
    }

    #[test]
    fn filter_precedence() {
        let query = parse("(t) => t.filter(d => d.a > 1 && d.b === 'x' || !d.c)").unwrap();
        let Step::Filter(expr) = &query.steps[0] else {
            panic!("expected filter");
        };
        // || binds loosest.
        assert!(matches!(expr, Expr::Binary(BinaryOp::Or, _, _)));
        let mut fields = Vec::new();
        expr.fields(&mut fields);
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn arithmetic_precedence() {
        let query = parse("(t) => t.filter(d => d.a + d.b * 2 > 10)").unwrap();
        let Step::Filter(Expr::Binary(BinaryOp::Gt, left, _)) = &query.steps[0] else {
            panic!("expected comparison");
        };
        assert!(matches!(left.as_ref(), Expr::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn count_with_alias() {
        let query = parse("(t) => t.count({ as: 'n' })").unwrap();
        assert_eq!(query.steps, vec![Step::Count { name: "n".into() }]);
    }

    #[test]
    fn sort_keys() {
        let query = parse("(t) => t.orderby('a', aq.desc('b'), desc('c'))").unwrap();
        let Step::OrderBy(keys) = &query.steps[0] else {
            panic!("expected orderby");
        };
        assert_eq!(keys.len(), 3);
        assert!(!keys[0].descending);
        assert!(keys[1].descending);
        assert_eq!(keys[2].column, "c");
    }

    #[test]
    fn objects_call_is_ignored() {
        let query = parse("(t) => t.limit(1).objects()").unwrap();
        assert_eq!(query.steps, vec![Step::Limit(1)]);
    }

    #[test]
    fn arrow_inside_rollup_is_rejected() {
        let err = parse("(t) => t.rollup({ s: d => op.sum(d.x) })").unwrap_err();
        assert!(err.to_string().contains("arrow functions are not allowed"));
    }

    #[test]
    fn math_is_rejected() {
        let err = parse("(t) => t.filter(d => Math.abs(d.x) > 1)").unwrap_err();
        assert!(err.to_string().contains("Math"));
    }

    #[test]
    fn deeply_nested_groups_are_refused() {
        let depth = 5_000;
        let source = format!(
            "(t) => t.filter(d => {}d.Sueldo{} > 1)",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let err = parse(&source).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");
    }

    #[test]
    fn long_negation_chain_is_refused() {
        let source = format!("(t) => t.filter(d => {}d.activo)", "!".repeat(5_000));
        let err = parse(&source).unwrap_err();
        assert!(matches!(err, QueryError::Invalid(_)), "{err}");
    }

    #[test]
    fn long_operator_chain_is_refused() {
        let source = format!("(t) => t.filter(d => d.a{} > 1)", " + 1".repeat(5_000));
        let err = parse(&source).unwrap_err();
        assert!(err.to_string().contains("too long"), "{err}");
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let source = format!(
            "(t) => t.filter(d => {}d.Sueldo{} > 1)",
            "(".repeat(20),
            ")".repeat(20)
        );
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn aggregate_requires_column() {
        let err = parse("(t) => t.rollup({ s: aq.op.sum() })").unwrap_err();
        assert!(err.to_string().contains("needs a column name"));
    }

    #[test]
    fn unknown_aggregate() {
        let err = parse("(t) => t.rollup({ s: aq.op.mode('x') })").unwrap_err();
        assert_eq!(err, QueryError::UnsupportedAggregate("mode".into()));
    }

    #[test]
    fn root_must_match_parameter() {
        let err = parse("(table) => data.limit(1)").unwrap_err();
        assert!(matches!(err, QueryError::Invalid(_)));
    }

    #[test]
    fn unquoted_column_rejected() {
        let err = parse("(t) => t.groupby(Puesto)").unwrap_err();
        assert!(err.to_string().contains("quoted"));
    }
}
