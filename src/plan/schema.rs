//! Table schema loaded from SQL DDL.
//!
//! Only uniqueness metadata is consumed at runtime: the invalidation engine
//! asks whether a condition column is primary or unique to decide between a
//! targeted forget and a full purge.

use fxhash::FxHashMap;
use sqlparser::ast::{ColumnOption, Statement, TableConstraint};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone)]
pub struct Schema {
    tables: FxHashMap<String, TableSchema>,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    columns: FxHashMap<String, ColumnMeta>,
}

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
    pub is_primary: bool,
    pub is_unique: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schema DDL: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),
}

impl Schema {
    /// Build a schema from `CREATE TABLE` statements.
    ///
    /// Statements other than `CREATE TABLE` (SET, DROP, etc.) are skipped.
    /// A multi-column PRIMARY KEY or UNIQUE constraint marks no single
    /// column unique.
    pub fn from_ddl(ddl: &str) -> Result<Self, SchemaError> {
        let statements = Parser::parse_sql(&MySqlDialect {}, ddl)?;

        let mut tables = FxHashMap::default();
        for statement in statements {
            let Statement::CreateTable {
                name,
                columns,
                constraints,
                ..
            } = statement
            else {
                continue;
            };

            let table_name = name
                .0
                .last()
                .map(|i| i.value.clone())
                .unwrap_or_default();

            let mut metas = FxHashMap::default();
            for col in &columns {
                let mut meta = ColumnMeta {
                    name: col.name.value.clone(),
                    data_type: col.data_type.to_string(),
                    is_primary: false,
                    is_unique: false,
                };
                for opt in &col.options {
                    if let ColumnOption::Unique { is_primary, .. } = &opt.option {
                        if *is_primary {
                            meta.is_primary = true;
                        } else {
                            meta.is_unique = true;
                        }
                    }
                }
                metas.insert(meta.name.clone(), meta);
            }

            for constraint in &constraints {
                let TableConstraint::Unique {
                    columns: cols,
                    is_primary,
                    ..
                } = constraint
                else {
                    continue;
                };
                if cols.len() != 1 {
                    continue;
                }
                if let Some(meta) = metas.get_mut(&cols[0].value) {
                    if *is_primary {
                        meta.is_primary = true;
                    } else {
                        meta.is_unique = true;
                    }
                }
            }

            tables.insert(
                table_name.clone(),
                TableSchema {
                    name: table_name,
                    columns: metas,
                },
            );
        }

        Ok(Self { tables })
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, SchemaError> {
        let ddl = std::fs::read_to_string(path)?;
        Self::from_ddl(&ddl)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnMeta> {
        self.tables.get(table).and_then(|t| t.column(column))
    }

    /// True if the column identifies at most one row (primary or unique).
    pub fn is_row_identity(&self, table: &str, column: &str) -> bool {
        self.column(table, column)
            .map(|c| c.is_primary || c.is_unique)
            .unwrap_or(false)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.get(name)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}
