#![forbid(unsafe_code)]

use crate::types::{ColumnType, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type TableResult<T> = Result<T, TableError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("duplicate table: {table}")]
    DuplicateTable { table: String },

    #[error("duplicate column {table}[{column}]")]
    DuplicateColumn { table: String, column: String },

    #[error("column {index} out of range for {table} ({count} columns)")]
    ColumnOutOfRange {
        table: String,
        index: usize,
        count: usize,
    },

    #[error("row {row} out of range for {table} ({count} rows)")]
    RowOutOfRange {
        table: String,
        row: usize,
        count: usize,
    },

    #[error("schema mismatch for {table}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch for {table}[{column}]: expected {expected}, got {actual:?}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: ColumnType,
        actual: Value,
    },

    #[error("{table}[{column}] is read-only")]
    ReadOnly { table: String, column: String },

    #[error("write to {table} rejected: {reason}")]
    Rejected { table: String, reason: String },
}

/// Row-indexed access to a table, physical or derived.
///
/// This is the whole contract the view engine needs from storage: index-addressable rows,
/// columns resolvable by name, and optional writes. `generation` lets cached consumers
/// detect that the data under them changed.
pub trait Table: fmt::Debug {
    fn name(&self) -> &str;

    fn display_name(&self) -> &str {
        self.name()
    }

    fn row_count(&self) -> usize;
    fn column_count(&self) -> usize;
    fn column_name(&self, column: usize) -> Option<&str>;
    fn column_index(&self, name: &str) -> Option<usize>;

    /// Declared type of a column. `None` when the column is untyped or out of range.
    fn column_type(&self, column: usize) -> Option<ColumnType>;

    /// Value of a cell, or `None` if `row`/`column` is out of range.
    fn value(&self, row: usize, column: usize) -> Option<Value>;

    fn value_string(&self, row: usize, column: usize) -> String {
        match self.value(row, column) {
            Some(value) => value.to_string(),
            None => "Out of Range".to_string(),
        }
    }

    fn set_value(&self, _row: usize, column: usize, _value: Value) -> TableResult<()> {
        Err(TableError::ReadOnly {
            table: self.name().to_string(),
            column: self.column_name(column).unwrap_or("?").to_string(),
        })
    }

    /// Monotonic data version. Bumped by every successful write.
    fn generation(&self) -> u64 {
        0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Clone, Debug)]
enum ColumnValues {
    Bool(Vec<Option<bool>>),
    Int(Vec<Option<i64>>),
    UInt(Vec<Option<u64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<Arc<str>>>),
}

impl ColumnValues {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Bool => ColumnValues::Bool(Vec::new()),
            ColumnType::Int => ColumnValues::Int(Vec::new()),
            ColumnType::UInt => ColumnValues::UInt(Vec::new()),
            ColumnType::Float => ColumnValues::Float(Vec::new()),
            ColumnType::Text => ColumnValues::Text(Vec::new()),
        }
    }

    fn get(&self, row: usize) -> Option<Value> {
        let value = match self {
            ColumnValues::Bool(v) => v.get(row)?.map(Value::Bool),
            ColumnValues::Int(v) => v.get(row)?.map(Value::Int),
            ColumnValues::UInt(v) => v.get(row)?.map(Value::UInt),
            ColumnValues::Float(v) => v.get(row)?.map(Value::from),
            ColumnValues::Text(v) => v.get(row)?.clone().map(Value::Text),
        };
        Some(value.unwrap_or(Value::Null))
    }

    /// Store an already type-checked value. Returns false if the slot does not exist.
    fn put(&mut self, row: Option<usize>, value: Value) -> bool {
        fn store<T>(values: &mut Vec<Option<T>>, row: Option<usize>, item: Option<T>) -> bool {
            match row {
                None => {
                    values.push(item);
                    true
                }
                Some(row) => match values.get_mut(row) {
                    Some(slot) => {
                        *slot = item;
                        true
                    }
                    None => false,
                },
            }
        }

        match (self, value) {
            (ColumnValues::Bool(v), Value::Bool(b)) => store(v, row, Some(b)),
            (ColumnValues::Int(v), Value::Int(i)) => store(v, row, Some(i)),
            (ColumnValues::UInt(v), Value::UInt(u)) => store(v, row, Some(u)),
            (ColumnValues::Float(v), Value::Float(f)) => store(v, row, Some(f.0)),
            (ColumnValues::Text(v), Value::Text(s)) => store(v, row, Some(s)),
            (ColumnValues::Bool(v), _) => store(v, row, None),
            (ColumnValues::Int(v), _) => store(v, row, None),
            (ColumnValues::UInt(v), _) => store(v, row, None),
            (ColumnValues::Float(v), _) => store(v, row, None),
            (ColumnValues::Text(v), _) => store(v, row, None),
        }
    }
}

fn coerce(
    table: &str,
    schema: &ColumnSchema,
    value: Value,
) -> TableResult<Value> {
    value
        .cast(schema.column_type)
        .ok_or_else(|| TableError::TypeMismatch {
            table: table.to_string(),
            column: schema.name.clone(),
            expected: schema.column_type,
            actual: value,
        })
}

/// An in-memory table with one typed vector per column.
///
/// Cells can be overwritten in place through [`Table::set_value`]; the row set itself is
/// fixed once the table is built.
#[derive(Debug)]
pub struct ColumnarTable {
    name: String,
    schema: Vec<ColumnSchema>,
    column_index: HashMap<String, usize>,
    columns: Vec<RefCell<ColumnValues>>,
    rows: usize,
    generation: Cell<u64>,
}

impl ColumnarTable {
    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn get_cell(&self, row: usize, column: usize) -> Value {
        self.value(row, column).unwrap_or(Value::Null)
    }

    pub fn column_values(&self, column: usize) -> Option<Vec<Value>> {
        let values = self.columns.get(column)?.borrow();
        Some((0..self.rows).filter_map(|row| values.get(row)).collect())
    }
}

impl Table for ColumnarTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column_count(&self) -> usize {
        self.schema.len()
    }

    fn column_name(&self, column: usize) -> Option<&str> {
        self.schema.get(column).map(|c| c.name.as_str())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    fn column_type(&self, column: usize) -> Option<ColumnType> {
        self.schema.get(column).map(|c| c.column_type)
    }

    fn value(&self, row: usize, column: usize) -> Option<Value> {
        if row >= self.rows {
            return None;
        }
        self.columns.get(column)?.borrow().get(row)
    }

    fn set_value(&self, row: usize, column: usize, value: Value) -> TableResult<()> {
        let schema = self
            .schema
            .get(column)
            .ok_or_else(|| TableError::ColumnOutOfRange {
                table: self.name.clone(),
                index: column,
                count: self.schema.len(),
            })?;
        if row >= self.rows {
            return Err(TableError::RowOutOfRange {
                table: self.name.clone(),
                row,
                count: self.rows,
            });
        }
        let value = coerce(&self.name, schema, value)?;
        self.columns[column].borrow_mut().put(Some(row), value);
        self.generation.set(self.generation.get() + 1);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.get()
    }
}

/// Row-at-a-time builder for [`ColumnarTable`].
#[derive(Debug)]
pub struct ColumnarTableBuilder {
    name: String,
    schema: Vec<ColumnSchema>,
    columns: Vec<ColumnValues>,
    rows: usize,
}

impl ColumnarTableBuilder {
    pub fn new(name: impl Into<String>, schema: Vec<ColumnSchema>) -> Self {
        let columns = schema.iter().map(|c| ColumnValues::new(c.column_type)).collect();
        Self {
            name: name.into(),
            schema,
            columns,
            rows: 0,
        }
    }

    pub fn append_row(&mut self, row: &[Value]) -> TableResult<()> {
        if row.len() != self.schema.len() {
            return Err(TableError::SchemaMismatch {
                table: self.name.clone(),
                expected: self.schema.len(),
                actual: row.len(),
            });
        }

        // Type-check the whole row first so a bad cell never leaves ragged columns.
        let mut coerced = Vec::with_capacity(row.len());
        for (schema, value) in self.schema.iter().zip(row) {
            coerced.push(coerce(&self.name, schema, value.clone())?);
        }
        for (column, value) in self.columns.iter_mut().zip(coerced) {
            column.put(None, value);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn finalize(self) -> TableResult<ColumnarTable> {
        let mut column_index = HashMap::with_capacity(self.schema.len());
        for (idx, column) in self.schema.iter().enumerate() {
            if column_index.insert(column.name.clone(), idx).is_some() {
                return Err(TableError::DuplicateColumn {
                    table: self.name,
                    column: column.name.clone(),
                });
            }
        }

        Ok(ColumnarTable {
            name: self.name,
            schema: self.schema,
            column_index,
            columns: self.columns.into_iter().map(RefCell::new).collect(),
            rows: self.rows,
            generation: Cell::new(0),
        })
    }
}
