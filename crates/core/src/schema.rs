//! Schema description for synthetic datasets
//!
//! A [`SchemaSpec`] is an ordered list of tables. Foreign keys may only
//! reference tables defined earlier in the list, which makes the list
//! itself a valid insertion order and rules out cycles.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit integer
    Integer,
    /// Double-precision float
    Real,
    /// Variable-length text
    Text,
    /// Boolean
    Boolean,
    /// Seconds since the Unix epoch
    Timestamp,
}

impl ColumnType {
    /// SQL type name used when rendering DDL
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Data type
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Whether NULL is allowed
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a NOT NULL column
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    /// Allow NULL values
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A foreign key from one column to another table's primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing column in this table
    pub column: String,
    /// Referenced (parent) table
    pub references: String,
    /// Referenced column; defaults to the parent's primary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
}

impl ForeignKey {
    /// Reference `parent`'s primary key from `column`
    pub fn new(column: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            references: parent.into(),
            referenced_column: None,
        }
    }
}

/// A table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Columns in insertion order
    #[serde(rename = "column")]
    pub columns: Vec<ColumnDef>,
    /// Primary key column
    pub primary_key: String,
    /// Foreign keys
    #[serde(default, rename = "foreign_key")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    /// Create a table with the given primary key and no columns yet
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: primary_key.into(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a column
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Append a foreign key
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Position of a column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Look up a column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Foreign key declared on `column`, if any
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Distinct parent tables, in declaration order
    pub fn parents(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.foreign_keys
            .iter()
            .map(|fk| fk.references.as_str())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Column names, in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Render a `CREATE TABLE` statement
    pub fn create_table_sql(&self, schema: &SchemaSpec) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", c.name, c.ty.sql_name());
                if c.name == self.primary_key {
                    def.push_str(" PRIMARY KEY");
                } else if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();
        for fk in &self.foreign_keys {
            let target = fk
                .referenced_column
                .clone()
                .or_else(|| schema.table(&fk.references).map(|t| t.primary_key.clone()))
                .unwrap_or_default();
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.references, target
            ));
        }
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, parts.join(", "))
    }
}

/// Ordered list of table definitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// Tables, parents before children
    #[serde(rename = "table", default)]
    pub tables: Vec<TableDef>,
}

impl SchemaSpec {
    /// Create a schema from tables in dependency order
    pub fn new(tables: Vec<TableDef>) -> Self {
        Self { tables }
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Position of a table in declaration order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    /// Validate names, keys and dependency order.
    ///
    /// Every foreign key must point at the primary key of a table declared
    /// strictly earlier; self-references and forward references are rejected.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut defined: HashMap<&str, usize> = HashMap::new();
        for (idx, table) in self.tables.iter().enumerate() {
            if defined.insert(table.name.as_str(), idx).is_some() {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
        }

        for (idx, table) in self.tables.iter().enumerate() {
            if table.columns.is_empty() {
                return Err(SchemaError::EmptyTable(table.name.clone()));
            }

            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }

            if table.get_column(&table.primary_key).is_none() {
                return Err(SchemaError::UnknownColumn {
                    table: table.name.clone(),
                    column: table.primary_key.clone(),
                });
            }

            for fk in &table.foreign_keys {
                if table.get_column(&fk.column).is_none() {
                    return Err(SchemaError::UnknownColumn {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                    });
                }
                let parent_idx = match defined.get(fk.references.as_str()) {
                    Some(&i) => i,
                    None => {
                        return Err(SchemaError::UnknownTable {
                            table: table.name.clone(),
                            referenced: fk.references.clone(),
                        })
                    }
                };
                if parent_idx >= idx {
                    return Err(SchemaError::ForwardReference {
                        table: table.name.clone(),
                        referenced: fk.references.clone(),
                    });
                }
                let parent = &self.tables[parent_idx];
                if let Some(target) = &fk.referenced_column {
                    if parent.get_column(target).is_none() {
                        return Err(SchemaError::UnknownColumn {
                            table: parent.name.clone(),
                            column: target.clone(),
                        });
                    }
                    if *target != parent.primary_key {
                        return Err(SchemaError::NotPrimaryKey {
                            table: table.name.clone(),
                            column: fk.column.clone(),
                            referenced_table: parent.name.clone(),
                            referenced_column: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Group tables into dependency levels.
    ///
    /// Level 0 holds tables without foreign keys; every other table sits one
    /// level above its deepest parent. Tables within a level share no
    /// foreign-key relationship and may be loaded concurrently; levels must
    /// be processed in order.
    pub fn dependency_levels(&self) -> Result<Vec<Vec<&TableDef>>, SchemaError> {
        self.validate()?;

        let mut level_of: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<&TableDef>> = Vec::new();
        for table in &self.tables {
            let level = table
                .parents()
                .iter()
                .filter_map(|p| level_of.get(p))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(table.name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(table);
        }
        Ok(levels)
    }

    /// `CREATE TABLE` statements in dependency order
    pub fn create_table_sql(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.create_table_sql(self)).collect()
    }
}
