//! Cache plan model.
//!
//! The plan is a declarative document listing every normalized query the
//! application issues, whether its result is cacheable, and the structured
//! body (table, conditions, targets) the invalidation engine works from.
//! It is produced offline and loaded once at startup.

pub mod schema;

pub use schema::{ColumnMeta, Schema, SchemaError, TableSchema};

use serde::{Deserialize, Serialize};

/// A cache plan: an ordered list of recognized queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePlan {
    pub queries: Vec<PlanEntry>,
}

/// One recognized query, tagged by statement kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlanEntry {
    Select(SelectPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    Insert(InsertPlan),
}

impl PlanEntry {
    /// Normalized query text this entry matches.
    pub fn query(&self) -> &str {
        match self {
            PlanEntry::Select(p) => &p.query,
            PlanEntry::Update(p) => &p.query,
            PlanEntry::Delete(p) => &p.query,
            PlanEntry::Insert(p) => &p.query,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            PlanEntry::Select(p) => &p.table,
            PlanEntry::Update(p) => &p.table,
            PlanEntry::Delete(p) => &p.table,
            PlanEntry::Insert(p) => &p.table,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanEntry::Select(_) => "select",
            PlanEntry::Update(_) => "update",
            PlanEntry::Delete(_) => "delete",
            PlanEntry::Insert(_) => "insert",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, PlanEntry::Select(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectPlan {
    pub query: String,
    pub table: String,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub query: String,
    pub table: String,
    pub targets: Vec<UpdateTarget>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl UpdatePlan {
    /// Column names this update writes to.
    pub fn target_columns(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.column.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePlan {
    pub query: String,
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertPlan {
    pub query: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub column: String,
    pub placeholder: Placeholder,
}

/// One WHERE-clause condition of a normalized query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    #[serde(default)]
    pub operator: Operator,
    pub placeholder: Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Eq,
    In,
}

/// Where a condition's bound value comes from.
///
/// `extra: false` indexes the caller's argument vector; `extra: true`
/// indexes the extra-args list the normalizer extracted from inline
/// literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub index: usize,
    #[serde(default)]
    pub extra: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate plan entry for query: {0}")]
    DuplicateQuery(String),
}

impl CachePlan {
    pub fn from_yaml(doc: &str) -> Result<Self, PlanError> {
        Ok(serde_yaml::from_str(doc)?)
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, PlanError> {
        let doc = std::fs::read_to_string(path)?;
        Self::from_yaml(&doc)
    }
}
