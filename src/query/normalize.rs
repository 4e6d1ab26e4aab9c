//! Query normalization.
//!
//! Turns raw SQL into the canonical, parameter-only form the cache plan is
//! keyed by. Literal values found in WHERE conditions are hoisted into an
//! ordered *extra args* list and replaced with placeholders, so two queries
//! differing only in inline literals normalize to the same text.

use sqlparser::ast::{BinaryOperator, Expr, SetExpr, Statement, Value as SqlValue};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::data::Cell;

/// A literal extracted from the query text, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraArg {
    pub column: String,
    pub value: Cell,
}

#[derive(Debug, Clone)]
pub struct NormalizedQuery {
    /// Canonical parameter-only text.
    pub query: String,
    /// Values for the placeholders synthesized during normalization.
    pub extra_args: Vec<ExtraArg>,
    /// The statement carries a row-locking clause (`FOR UPDATE` etc.).
    pub for_update: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("failed to parse query: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),

    #[error("empty query")]
    Empty,

    #[error("expected a single statement, got {0}")]
    MultipleStatements(usize),

    #[error("normalizer panicked: {0}")]
    Internal(String),
}

/// Normalize a raw query.
///
/// The literal-extraction walk is known to be the fragile part of the
/// pipeline, so the whole pass runs under `catch_unwind`; a panic surfaces
/// as [`NormalizeError::Internal`] and the caller degrades to passthrough.
pub fn normalize(raw: &str) -> Result<NormalizedQuery, NormalizeError> {
    let raw = raw.to_string();
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || normalize_inner(&raw)))
        .unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(NormalizeError::Internal(msg))
        })
}

fn normalize_inner(raw: &str) -> Result<NormalizedQuery, NormalizeError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, raw)?;
    if statements.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if statements.len() > 1 {
        return Err(NormalizeError::MultipleStatements(statements.len()));
    }
    let mut statement = statements.remove(0);

    let mut extra_args = Vec::new();
    let mut for_update = false;

    match &mut statement {
        Statement::Query(query) => {
            for_update = !query.locks.is_empty();
            if let SetExpr::Select(select) = &mut *query.body {
                if let Some(selection) = &mut select.selection {
                    extract(selection, &mut extra_args);
                }
            }
        }
        Statement::Update { selection, .. } => {
            if let Some(selection) = selection {
                extract(selection, &mut extra_args);
            }
        }
        Statement::Delete { selection, .. } => {
            if let Some(selection) = selection {
                extract(selection, &mut extra_args);
            }
        }
        _ => {}
    }

    Ok(NormalizedQuery {
        query: statement.to_string(),
        extra_args,
        for_update,
    })
}

/// Replace literals in comparison and IN-list positions with placeholders,
/// collecting their values left to right.
fn extract(expr: &mut Expr, args: &mut Vec<ExtraArg>) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                extract(left, args);
                extract(right, args);
            }
            _ => {
                let Some(column) = column_name(left) else {
                    return;
                };
                if let Expr::Value(value) = &mut **right {
                    hoist(column, value, args);
                }
            }
        },
        Expr::InList { expr: target, list, .. } => {
            let Some(column) = column_name(target) else {
                return;
            };
            for item in list {
                if let Expr::Value(value) = item {
                    hoist(column.clone(), value, args);
                }
            }
        }
        Expr::Nested(inner) => extract(inner, args),
        _ => {}
    }
}

fn hoist(column: String, value: &mut SqlValue, args: &mut Vec<ExtraArg>) {
    if let Some(cell) = literal_cell(value) {
        args.push(ExtraArg {
            column,
            value: cell,
        });
        *value = SqlValue::Placeholder("?".to_string());
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.clone()),
        _ => None,
    }
}

fn literal_cell(value: &SqlValue) -> Option<Cell> {
    match value {
        SqlValue::Number(text, _) => text
            .parse::<i64>()
            .ok()
            .map(Cell::Int)
            .or_else(|| text.parse::<f64>().ok().map(Cell::Float)),
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Some(Cell::Text(s.clone()))
        }
        SqlValue::Boolean(b) => Some(Cell::Bool(*b)),
        _ => None,
    }
}
