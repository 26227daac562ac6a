//! Columns of a [`ViewTable`].
//!
//! Every variant answers the same questions (value of a row, its display string, whether it
//! can be written, where a row comes from) so a table can treat its columns uniformly.
//! Variants that need their table to answer, like merge columns, take it as `owner`.

use crate::cache::{ValueCache, ValueCacheMode};
use crate::error::{ViewError, ViewResult};
use crate::expression::Expression;
use crate::merge::MergeAlgorithm;
use crate::select::Select;
use crate::table::ViewTable;
use memview_columnar::Value;
use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

/// Display string of rows a column has no value for.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Const,
    Expression,
    RowIndex,
    Typed,
    Node,
    NodeMerge,
}

/// Physical cell behind a view cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowLink {
    pub table: String,
    pub row: usize,
}

/// One value broadcast to every row.
#[derive(Debug)]
pub struct ConstColumn {
    value: RefCell<Value>,
}

impl ConstColumn {
    pub fn new(value: Value) -> Self {
        Self {
            value: RefCell::new(value),
        }
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Replace the broadcast value, for every row at once.
    pub fn set(&self, value: Value) {
        *self.value.borrow_mut() = value;
    }
}

#[derive(Debug)]
pub struct ExpressionColumn {
    expression: Expression,
    cache: OnceCell<ValueCache>,
    seen_generation: Cell<Option<u64>>,
}

impl ExpressionColumn {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            cache: OnceCell::new(),
            seen_generation: Cell::new(None),
        }
    }

    /// Sized from the expression on first use, so building the column evaluates nothing.
    fn cache(&self) -> &ValueCache {
        self.cache
            .get_or_init(|| ValueCache::for_expression(&self.expression))
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    fn entry(&self, row: usize) -> ViewResult<(Value, String)> {
        if self.seen_generation.get().is_none() {
            self.seen_generation.set(Some(self.expression.generation()));
        }
        self.cache().get_or_try_compute(row, || {
            let value = self.expression.value(row)?;
            Ok((value, self.expression.value_string(row)))
        })
    }

    /// Drops cached values. Reports whether a table the expression reads was written since
    /// values were last read.
    fn update(&self) -> bool {
        if let Some(cache) = self.cache.get() {
            cache.set_all_dirty();
        }
        let Some(seen) = self.seen_generation.get() else {
            return false;
        };
        let generation = self.expression.generation();
        self.seen_generation.set(Some(generation));
        seen != generation
    }
}

/// A physical column read through a select's matching rows.
#[derive(Debug)]
pub struct TypedColumn {
    name: String,
    binding: OnceCell<(Rc<Select>, usize)>,
    indices: RefCell<Option<Rc<[usize]>>>,
    seen_generation: Cell<Option<u64>>,
}

impl TypedColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: OnceCell::new(),
            indices: RefCell::new(None),
            seen_generation: Cell::new(None),
        }
    }

    /// Bind to `column` of the select's source table. A column is bound once.
    pub fn bind(&self, select: Rc<Select>, column: usize) -> ViewResult<()> {
        self.binding
            .set((select, column))
            .map_err(|_| ViewError::AlreadyBound {
                column: self.name.clone(),
            })
    }

    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    fn bound(&self) -> ViewResult<&(Rc<Select>, usize)> {
        self.binding.get().ok_or_else(|| ViewError::Unbound {
            column: self.name.clone(),
        })
    }

    fn resolve(&self, select: &Select) -> Rc<[usize]> {
        if let Some(indices) = self.indices.borrow().as_ref() {
            return Rc::clone(indices);
        }
        let indices = select.matching_indices(0);
        *self.indices.borrow_mut() = Some(Rc::clone(&indices));
        indices
    }

    /// Source row backing view row `row`. Without where-clauses the rows map one to one.
    pub fn source_row(&self, row: usize) -> ViewResult<Option<usize>> {
        let (select, _) = self.bound()?;
        if self.seen_generation.get().is_none() {
            self.seen_generation.set(Some(select.source().generation()));
        }
        if !select.has_where() {
            let count = select.row_count().unwrap_or_else(|| select.source().row_count());
            return Ok((row < count).then_some(row));
        }
        Ok(self.resolve(select).get(row).copied())
    }

    pub fn row_count(&self) -> ViewResult<usize> {
        let (select, _) = self.bound()?;
        if !select.has_where() {
            return Ok(select.row_count().unwrap_or_else(|| select.source().row_count()));
        }
        Ok(self.resolve(select).len())
    }

    fn value(&self, row: usize) -> ViewResult<Option<Value>> {
        let (select, column) = self.bound()?;
        Ok(match self.source_row(row)? {
            Some(source_row) => select.source().value(source_row, *column),
            None => None,
        })
    }

    fn set_value(&self, row: usize, value: Value) -> ViewResult<()> {
        let (select, column) = self.bound()?;
        let Some(source_row) = self.source_row(row)? else {
            return Err(ViewError::RowOutOfRange {
                row,
                count: self.row_count()?,
            });
        };
        select.source().set_value(source_row, *column, value)?;
        Ok(())
    }

    /// Reports whether the source table changed since the last look, dropping the row map
    /// when it did.
    fn update(&self) -> bool {
        let Some((select, _)) = self.binding.get() else {
            return false;
        };
        let generation = select.source().generation();
        let previous = self.seen_generation.replace(Some(generation));
        let changed = previous.is_some_and(|seen| seen != generation);
        if changed {
            self.indices.replace(None);
        }
        changed
    }
}

/// A row of a node column: set once while the node table is built.
#[derive(Clone, Debug, Default)]
pub enum NodeEntry {
    #[default]
    Empty,
    Expression(Expression),
    /// Merge of column `column` over the whole group table of the row.
    Merge {
        column: usize,
        merge: MergeAlgorithm,
    },
}

/// One explicitly set entry per child node of a node table.
#[derive(Debug)]
pub struct NodeColumn {
    name: String,
    entries: RefCell<Vec<NodeEntry>>,
    cache: ValueCache,
}

impl NodeColumn {
    pub fn new(name: impl Into<String>, rows: usize) -> Self {
        Self {
            name: name.into(),
            entries: RefCell::new(vec![NodeEntry::Empty; rows]),
            cache: ValueCache::new(ValueCacheMode::Direct(rows)),
        }
    }

    /// Set the entry of `row`. An entry is set once.
    pub fn set_entry(&self, row: usize, entry: NodeEntry) -> ViewResult<()> {
        let mut entries = self.entries.borrow_mut();
        let count = entries.len();
        let slot = entries
            .get_mut(row)
            .ok_or(ViewError::RowOutOfRange { row, count })?;
        if !matches!(slot, NodeEntry::Empty) {
            return Err(ViewError::EntryAlreadySet {
                column: self.name.clone(),
                row,
            });
        }
        *slot = entry;
        self.cache.set_entry_dirty(row);
        Ok(())
    }

    pub fn entry(&self, row: usize) -> Option<NodeEntry> {
        self.entries.borrow().get(row).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn compute(&self, owner: &ViewTable, row: usize) -> ViewResult<Value> {
        let entry = self.entry(row).ok_or(ViewError::RowOutOfRange {
            row,
            count: self.len(),
        })?;
        match entry {
            NodeEntry::Empty => Ok(Value::Null),
            NodeEntry::Expression(expression) => expression.value(row),
            NodeEntry::Merge { column, merge } => owner.merge_group(row, column, &merge),
        }
    }

    fn value(&self, owner: &ViewTable, row: usize) -> ViewResult<Value> {
        let (value, _) = self.cache.get_or_try_compute(row, || {
            let value = self.compute(owner, row)?;
            let text = value.to_string();
            Ok::<_, ViewError>((value, text))
        })?;
        Ok(value)
    }
}

/// Per-row merge of the matching column of each row's group table.
#[derive(Debug)]
pub struct NodeMergeColumn {
    column: usize,
    merge: MergeAlgorithm,
    values: RefCell<Option<Rc<[Value]>>>,
    dirty: Cell<bool>,
}

impl NodeMergeColumn {
    pub fn new(column: usize, merge: MergeAlgorithm) -> Self {
        Self {
            column,
            merge,
            values: RefCell::new(None),
            dirty: Cell::new(true),
        }
    }

    pub fn merge(&self) -> &MergeAlgorithm {
        &self.merge
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Merged value of every row, computed all at once and kept until the column is marked
    /// dirty by an update reporting changed children.
    fn values(&self, owner: &ViewTable) -> ViewResult<Rc<[Value]>> {
        if !self.dirty.get() {
            if let Some(values) = self.values.borrow().as_ref() {
                return Ok(Rc::clone(values));
            }
        }
        let values = (0..owner.group_count())
            .map(|group| owner.merge_group(group, self.column, &self.merge))
            .collect::<ViewResult<Vec<Value>>>()?;
        let values: Rc<[Value]> = values.into();
        *self.values.borrow_mut() = Some(Rc::clone(&values));
        self.dirty.set(false);
        Ok(values)
    }

    fn value(&self, owner: &ViewTable, row: usize) -> ViewResult<Value> {
        let values = self.values(owner)?;
        values
            .get(row)
            .cloned()
            .ok_or(ViewError::RowOutOfRange {
                row,
                count: values.len(),
            })
    }
}

#[derive(Debug)]
pub enum ViewColumn {
    Const(ConstColumn),
    Expression(ExpressionColumn),
    RowIndex,
    Typed(TypedColumn),
    Node(NodeColumn),
    NodeMerge(NodeMergeColumn),
}

impl ViewColumn {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ViewColumn::Const(_) => ColumnKind::Const,
            ViewColumn::Expression(_) => ColumnKind::Expression,
            ViewColumn::RowIndex => ColumnKind::RowIndex,
            ViewColumn::Typed(_) => ColumnKind::Typed,
            ViewColumn::Node(_) => ColumnKind::Node,
            ViewColumn::NodeMerge(_) => ColumnKind::NodeMerge,
        }
    }

    /// Value of `row`. Rows a typed column has no match for are `Null`.
    pub fn value(&self, owner: &ViewTable, row: usize) -> ViewResult<Value> {
        match self {
            ViewColumn::Const(column) => Ok(column.value()),
            ViewColumn::Expression(column) => column.entry(row).map(|(value, _)| value),
            ViewColumn::RowIndex => {
                let count = owner.group_count();
                if row < count {
                    Ok(Value::UInt(row as u64))
                } else {
                    Err(ViewError::RowOutOfRange { row, count })
                }
            }
            ViewColumn::Typed(column) => Ok(column.value(row)?.unwrap_or_default()),
            ViewColumn::Node(column) => column.value(owner, row),
            ViewColumn::NodeMerge(column) => column.value(owner, row),
        }
    }

    pub fn value_string(&self, owner: &ViewTable, row: usize) -> String {
        let result = match self {
            ViewColumn::Expression(column) => column.entry(row).map(|(_, text)| text),
            ViewColumn::Typed(column) => column
                .value(row)
                .map(|value| value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string())),
            _ => self.value(owner, row).map(|value| value.to_string()),
        };
        result.unwrap_or_else(|err| err.to_string())
    }

    /// Number of rows the column has values for.
    pub fn row_count(&self, owner: &ViewTable) -> usize {
        match self {
            ViewColumn::Const(_) | ViewColumn::RowIndex | ViewColumn::NodeMerge(_) => {
                owner.group_count()
            }
            ViewColumn::Expression(column) => column.expression.row_count(),
            ViewColumn::Typed(column) => column.row_count().unwrap_or(0),
            ViewColumn::Node(column) => column.len(),
        }
    }

    /// Write a single cell.
    ///
    /// Constant columns take the value for every row and typed columns write through to the
    /// physical table. Computed columns ignore the write. Node columns reject it with an error.
    pub fn set_value(&self, row: usize, value: Value) -> ViewResult<()> {
        match self {
            ViewColumn::Const(column) => {
                column.set(value);
                Ok(())
            }
            ViewColumn::Typed(column) => column.set_value(row, value),
            ViewColumn::Node(column) => Err(ViewError::ReadOnly {
                column: column.name.clone(),
            }),
            ViewColumn::Expression(_) | ViewColumn::RowIndex | ViewColumn::NodeMerge(_) => {
                log::debug!("ignoring write to computed {:?} column at row {row}", self.kind());
                Ok(())
            }
        }
    }

    /// Set the value of every row. Only constant columns accept it.
    pub fn set_const_value(&self, value: Value) -> ViewResult<()> {
        match self {
            ViewColumn::Const(column) => {
                column.set(value);
                Ok(())
            }
            _ => {
                log::error!("cannot set a constant value on a {:?} column", self.kind());
                Ok(())
            }
        }
    }

    /// Physical cell a row reads from. Only typed columns have one.
    pub fn row_link(&self, row: usize) -> Option<RowLink> {
        let ViewColumn::Typed(column) = self else {
            return None;
        };
        let (select, _) = column.binding.get()?;
        let source_row = column.source_row(row).ok()??;
        Some(RowLink {
            table: select.source().name().to_string(),
            row: source_row,
        })
    }

    /// Refresh cached state. Returns whether the column's underlying data changed.
    ///
    /// `children_changed` reports that group tables below the owner changed, which
    /// invalidates merged values.
    pub fn update(&self, children_changed: bool) -> bool {
        match self {
            ViewColumn::Typed(column) => column.update(),
            ViewColumn::Expression(column) => column.update(),
            ViewColumn::Node(column) => {
                if children_changed {
                    column.cache.set_all_dirty();
                }
                false
            }
            ViewColumn::NodeMerge(column) => {
                if children_changed {
                    column.dirty.set(true);
                }
                false
            }
            ViewColumn::Const(_) | ViewColumn::RowIndex => false,
        }
    }
}
