//! Interpreter: applies parsed query steps to a table.

use std::collections::HashMap;

use super::QueryError;
use super::parser::{AggOp, Aggregate, BinaryOp, Expr, Method, Query, SortKey, Step, UnaryOp};
use crate::table::{Table, Value};

/// A table plus the grouping columns set by `groupby`.
struct Frame {
    table: Table,
    groups: Vec<String>,
}

pub fn execute(query: &Query, table: Table) -> Result<Table, QueryError> {
    let mut frame = Frame {
        table,
        groups: Vec::new(),
    };

    for step in &query.steps {
        frame = apply(step, frame)?;
    }

    Ok(frame.table)
}

fn apply(step: &Step, mut frame: Frame) -> Result<Frame, QueryError> {
    match step {
        Step::Filter(expr) => {
            let mut fields = Vec::new();
            expr.fields(&mut fields);
            for field in fields {
                column(&frame.table, field)?;
            }
            let columns = frame.table.columns.clone();
            frame
                .table
                .rows
                .retain(|row| evaluate(expr, &columns, row).truthy());
            Ok(frame)
        }
        Step::GroupBy(names) => {
            for name in names {
                column(&frame.table, name)?;
            }
            frame.groups = names.clone();
            Ok(frame)
        }
        Step::Rollup(aggregates) => {
            let table = rollup(&frame.table, &frame.groups, aggregates)?;
            Ok(Frame {
                table,
                groups: Vec::new(),
            })
        }
        Step::Count { name } => {
            let aggregates = vec![(
                name.clone(),
                Aggregate {
                    op: AggOp::Count,
                    column: None,
                },
            )];
            let table = rollup(&frame.table, &frame.groups, &aggregates)?;
            Ok(Frame {
                table,
                groups: Vec::new(),
            })
        }
        Step::Select(names) => {
            let indices = names
                .iter()
                .map(|n| column(&frame.table, n))
                .collect::<Result<Vec<_>, _>>()?;
            let rows = frame
                .table
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect();
            frame.groups.retain(|g| names.contains(g));
            frame.table = Table::new(names.clone(), rows);
            Ok(frame)
        }
        Step::OrderBy(keys) => {
            let resolved = keys
                .iter()
                .map(|k| column(&frame.table, &k.column).map(|i| (i, k)))
                .collect::<Result<Vec<(usize, &SortKey)>, _>>()?;
            frame.table.rows.sort_by(|a, b| {
                resolved
                    .iter()
                    .map(|(i, key)| {
                        let ordering = a[*i].sort_cmp(&b[*i]);
                        if key.descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(frame)
        }
        Step::Limit(n) => {
            frame.table.rows.truncate(*n);
            Ok(frame)
        }
        Step::Ungroup => {
            frame.groups.clear();
            Ok(frame)
        }
    }
}

fn column(table: &Table, name: &str) -> Result<usize, QueryError> {
    table
        .column_index(name)
        .ok_or_else(|| QueryError::UnknownColumn {
            column: name.to_string(),
            available: table.columns.clone(),
        })
}

/// Aggregate rows, one output row per group in first-appearance order.
fn rollup(
    table: &Table,
    groups: &[String],
    aggregates: &[(String, Aggregate)],
) -> Result<Table, QueryError> {
    let group_indices = groups
        .iter()
        .map(|g| column(table, g))
        .collect::<Result<Vec<_>, _>>()?;
    let aggregate_indices = aggregates
        .iter()
        .map(|(_, agg)| agg.column.as_deref().map(|c| column(table, c)).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    let mut partitions: Vec<Vec<usize>> = Vec::new();
    if group_indices.is_empty() {
        partitions.push((0..table.rows.len()).collect());
    } else {
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        for (row_idx, row) in table.rows.iter().enumerate() {
            let key: Vec<String> = group_indices.iter().map(|&i| row[i].group_key()).collect();
            let slot = *seen.entry(key).or_insert_with(|| {
                partitions.push(Vec::new());
                partitions.len() - 1
            });
            partitions[slot].push(row_idx);
        }
    }

    let mut columns = groups.to_vec();
    columns.extend(aggregates.iter().map(|(name, _)| name.clone()));

    let rows = partitions
        .iter()
        .map(|members| {
            let mut out: Vec<Value> = match members.first() {
                Some(&first) => group_indices
                    .iter()
                    .map(|&i| table.rows[first][i].clone())
                    .collect(),
                None => Vec::new(),
            };
            for ((_, agg), idx) in aggregates.iter().zip(&aggregate_indices) {
                let values: Vec<&Value> = match idx {
                    Some(i) => members.iter().map(|&r| &table.rows[r][*i]).collect(),
                    None => Vec::new(),
                };
                out.push(aggregate(agg.op, members.len(), &values));
            }
            out
        })
        .collect();

    Ok(Table::new(columns, rows))
}

fn aggregate(op: AggOp, row_count: usize, values: &[&Value]) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    match op {
        AggOp::Count => {
            if values.is_empty() {
                Value::Number(row_count as f64)
            } else {
                Value::Number(present.len() as f64)
            }
        }
        AggOp::Valid => Value::Number(present.len() as f64),
        AggOp::Distinct => {
            let mut keys: Vec<String> = values.iter().map(|v| v.group_key()).collect();
            keys.sort();
            keys.dedup();
            Value::Number(keys.len() as f64)
        }
        AggOp::Sum => Value::Number(numbers.iter().sum()),
        AggOp::Mean => mean(&numbers).map(Value::Number).unwrap_or(Value::Null),
        AggOp::Min => extreme(&present, &numbers, std::cmp::Ordering::Less),
        AggOp::Max => extreme(&present, &numbers, std::cmp::Ordering::Greater),
        AggOp::Median => {
            if numbers.is_empty() {
                return Value::Null;
            }
            let mut sorted = numbers.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                Value::Number((sorted[mid - 1] + sorted[mid]) / 2.0)
            } else {
                Value::Number(sorted[mid])
            }
        }
        AggOp::Variance => variance(&numbers, 1).map(Value::Number).unwrap_or(Value::Null),
        AggOp::VariancePop => variance(&numbers, 0).map(Value::Number).unwrap_or(Value::Null),
        AggOp::Stdev => variance(&numbers, 1)
            .map(|v| Value::Number(v.sqrt()))
            .unwrap_or(Value::Null),
        AggOp::StdevPop => variance(&numbers, 0)
            .map(|v| Value::Number(v.sqrt()))
            .unwrap_or(Value::Null),
    }
}

fn mean(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        None
    } else {
        Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
    }
}

/// Variance with `ddof` delta degrees of freedom (1 = sample, 0 = population).
fn variance(numbers: &[f64], ddof: usize) -> Option<f64> {
    if numbers.len() <= ddof {
        return None;
    }
    let m = mean(numbers)?;
    let squares: f64 = numbers.iter().map(|x| (x - m).powi(2)).sum();
    Some(squares / (numbers.len() - ddof) as f64)
}

/// Minimum or maximum: numeric when the column has numbers, otherwise by
/// the value ordering.
fn extreme(present: &[&Value], numbers: &[f64], wanted: std::cmp::Ordering) -> Value {
    if !numbers.is_empty() {
        let pick = numbers
            .iter()
            .copied()
            .reduce(|acc, x| if x.total_cmp(&acc) == wanted { x } else { acc });
        return pick.map(Value::Number).unwrap_or(Value::Null);
    }
    present
        .iter()
        .copied()
        .reduce(|acc, v| if v.sort_cmp(acc) == wanted { v } else { acc })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Evaluate a row expression. Type mismatches yield `Null` rather than
/// failing, so a filter simply drops the row.
fn evaluate(expr: &Expr, columns: &[String], row: &[Value]) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Field(name) => columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| row.get(i).cloned())
            .unwrap_or(Value::Null),
        Expr::Unary(UnaryOp::Not, inner) => Value::Bool(!evaluate(inner, columns, row).truthy()),
        Expr::Unary(UnaryOp::Neg, inner) => evaluate(inner, columns, row)
            .as_number()
            .map(|n| Value::Number(-n))
            .unwrap_or(Value::Null),
        Expr::Binary(BinaryOp::And, left, right) => {
            let l = evaluate(left, columns, row);
            if l.truthy() { evaluate(right, columns, row) } else { l }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let l = evaluate(left, columns, row);
            if l.truthy() { l } else { evaluate(right, columns, row) }
        }
        Expr::Binary(op, left, right) => {
            binary(*op, evaluate(left, columns, row), evaluate(right, columns, row))
        }
        Expr::Call {
            target,
            method,
            args,
        } => {
            let target = evaluate(target, columns, row);
            let args: Vec<Value> = args.iter().map(|a| evaluate(a, columns, row)).collect();
            call(*method, &target, &args)
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Value {
    match op {
        BinaryOp::StrictEq => Value::Bool(l.strict_eq(&r)),
        BinaryOp::StrictNe => Value::Bool(!l.strict_eq(&r)),
        BinaryOp::Eq => Value::Bool(l.loose_eq(&r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(&r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                _ => match (l.as_number(), r.as_number()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::Add => match (&l, &r) {
            (Value::Text(a), b) => Value::Text(format!("{a}{b}")),
            (a, Value::Text(b)) => Value::Text(format!("{a}{b}")),
            _ => arithmetic(&l, &r, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(&l, &r, |a, b| a - b),
        BinaryOp::Mul => arithmetic(&l, &r, |a, b| a * b),
        BinaryOp::Div => arithmetic(&l, &r, |a, b| a / b),
        BinaryOp::Rem => arithmetic(&l, &r, |a, b| a % b),
        // Short-circuit operators are handled in `evaluate`.
        BinaryOp::And | BinaryOp::Or => Value::Null,
    }
}

fn arithmetic(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Value::Number(f(a, b)),
        _ => Value::Null,
    }
}

fn call(method: Method, target: &Value, args: &[Value]) -> Value {
    let text = match target {
        Value::Null => return Value::Null,
        other => other.to_string(),
    };
    let arg = args.first().map(|a| a.to_string()).unwrap_or_default();

    match method {
        Method::Includes => Value::Bool(text.contains(&arg)),
        Method::StartsWith => Value::Bool(text.starts_with(&arg)),
        Method::EndsWith => Value::Bool(text.ends_with(&arg)),
        Method::ToLowerCase => Value::Text(text.to_lowercase()),
        Method::ToUpperCase => Value::Text(text.to_uppercase()),
        Method::Trim => Value::Text(text.trim().to_string()),
        Method::Length => Value::Number(text.chars().count() as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::run;

    fn sales() -> Table {
        Table::from_csv(
            "region,product,amount,returned\n\
             north,a,10,false\n\
             south,b,,false\n\
             north,b,30,true\n\
             east,a,5.5,false\n",
        )
        .unwrap()
    }

    #[test]
    fn nulls_are_skipped_by_numeric_aggregates() {
        let out = run(
            "(t) => t.rollup({ n: aq.op.count(), v: aq.op.valid('amount'), total: aq.op.sum('amount'), avg: aq.op.mean('amount') })",
            sales(),
        )
        .unwrap();
        assert_eq!(
            out.rows[0],
            vec![
                Value::Number(4.0),
                Value::Number(3.0),
                Value::Number(45.5),
                Value::Number(45.5 / 3.0),
            ]
        );
    }

    #[test]
    fn filter_on_booleans_and_arithmetic() {
        let out = run(
            "(t) => t.filter(d => !d.returned && d.amount * 2 > 10).select('product')",
            sales(),
        )
        .unwrap();
        assert_eq!(out.rows, vec![vec![Value::Text("a".into())], vec![Value::Text("a".into())]]);
    }

    #[test]
    fn comparisons_against_null_are_false() {
        let out = run("(t) => t.filter(d => d.amount < 100).count()", sales()).unwrap();
        assert_eq!(out.rows[0][0], Value::Number(3.0));
    }

    #[test]
    fn grouped_empty_table_has_no_rows() {
        let out = run(
            "(t) => t.filter(d => d.region === 'west').groupby('region').count()",
            sales(),
        )
        .unwrap();
        assert_eq!(out.columns, vec!["region", "count"]);
        assert!(out.rows.is_empty());
    }

    #[test]
    fn ungrouped_empty_table_still_aggregates() {
        let out = run(
            "(t) => t.filter(d => false).rollup({ n: aq.op.count(), s: aq.op.sum('amount'), m: aq.op.mean('amount') })",
            sales(),
        )
        .unwrap();
        assert_eq!(out.rows[0], vec![Value::Number(0.0), Value::Number(0.0), Value::Null]);
    }

    #[test]
    fn multi_key_sort_is_stable() {
        let out = run(
            "(t) => t.orderby('product', aq.desc('region')).select('region', 'product')",
            sales(),
        )
        .unwrap();
        let regions: Vec<String> = out.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(regions, vec!["north", "east", "south", "north"]);
    }

    #[test]
    fn ungroup_returns_single_rollup_row() {
        let out = run(
            "(t) => t.groupby('region').ungroup().rollup({ n: aq.op.count() })",
            sales(),
        )
        .unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.rows[0][0], Value::Number(4.0));
    }

    #[test]
    fn population_and_sample_variance_differ() {
        let table = Table::from_csv("x\n2\n4\n4\n4\n5\n5\n7\n9\n").unwrap();
        let out = run(
            "(t) => t.rollup({ p: aq.op.stdevp('x'), s: aq.op.variance('x') })",
            table,
        )
        .unwrap();
        assert_eq!(out.rows[0][0], Value::Number(2.0));
        let Value::Number(sample) = out.rows[0][1] else {
            panic!("variance should be numeric");
        };
        assert!((sample - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn text_min_max() {
        let out = run(
            "(t) => t.rollup({ first: aq.op.min('region'), last: aq.op.max('region') })",
            sales(),
        )
        .unwrap();
        assert_eq!(out.rows[0], vec![Value::Text("east".into()), Value::Text("south".into())]);
    }

    #[test]
    fn string_concatenation_and_length() {
        let out = run(
            "(t) => t.filter(d => (d.region + '-' + d.product) === 'north-b' && d.region.length === 5)",
            sales(),
        )
        .unwrap();
        assert_eq!(out.num_rows(), 1);
    }
}
