//! Typed-at-runtime expressions evaluated per row, and the resolver that turns schema text into
//! them.

use crate::error::{ViewError, ViewResult};
use crate::operator::Operator;
use crate::scope::{ScopeArena, ScopeId};
use crate::select::{Select, SelectSet};
use memview_columnar::{ColumnType, Table, Value};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// Name of the implicit row-index column.
pub const ROW_INDEX_NAME: &str = "#";

#[derive(Clone)]
pub enum Expression {
    Const(Value),
    /// A physical column read at the evaluated row.
    Column {
        table: Rc<dyn Table>,
        column: usize,
    },
    /// The evaluated row number itself.
    RowIndex { table: Rc<dyn Table> },
    TypeChange {
        inner: Box<Expression>,
        to: ColumnType,
    },
    /// `column` of the select's source, read at the select's n-th matching row.
    Select {
        select: Rc<Select>,
        column: usize,
    },
    /// Remaps the row through the set's conditional row indices before evaluating `inner`.
    SelectSetConditional {
        set: Rc<SelectSet>,
        inner: Box<Expression>,
    },
    /// `column` of the select's source, read at the first match for the evaluated driving row.
    FirstMatchSelect {
        select: Rc<Select>,
        column: usize,
    },
    /// Always evaluates `inner` at `row`.
    FixedRow { inner: Box<Expression>, row: usize },
    DefaultOnError {
        inner: Box<Expression>,
        default: Value,
    },
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Const(value.into())
    }

    pub fn value(&self, row: usize) -> ViewResult<Value> {
        match self {
            Expression::Const(value) => Ok(value.clone()),
            Expression::Column { table, column } => {
                table
                    .value(row, *column)
                    .ok_or_else(|| ViewError::RowOutOfRange {
                        row,
                        count: table.row_count(),
                    })
            }
            Expression::RowIndex { table } => {
                if row < table.row_count() {
                    Ok(Value::from(row as u64))
                } else {
                    Err(ViewError::RowOutOfRange {
                        row,
                        count: table.row_count(),
                    })
                }
            }
            Expression::TypeChange { inner, to } => {
                let value = inner.value(row)?;
                value.cast(*to).ok_or_else(|| ViewError::Conversion {
                    value: value.to_string(),
                    to: to.to_string(),
                })
            }
            Expression::Select { select, column } => {
                let indices = select.matching_indices(0);
                let source_row = *indices.get(row).ok_or(ViewError::RowOutOfRange {
                    row,
                    count: indices.len(),
                })?;
                select
                    .source()
                    .value(source_row, *column)
                    .ok_or_else(|| ViewError::RowOutOfRange {
                        row: source_row,
                        count: select.source().row_count(),
                    })
            }
            Expression::SelectSetConditional { set, inner } => match set.conditional_row_indices() {
                None => inner.value(row),
                Some(indices) => {
                    let effective = *indices.get(row).ok_or(ViewError::RowOutOfRange {
                        row,
                        count: indices.len(),
                    })?;
                    inner.value(effective)
                }
            },
            Expression::FirstMatchSelect { select, column } => match select.first_match(row) {
                Some(source_row) => Ok(select
                    .source()
                    .value(source_row, *column)
                    .unwrap_or_default()),
                None => Ok(Value::Null),
            },
            Expression::FixedRow { inner, row } => inner.value(*row),
            Expression::DefaultOnError { inner, default } => {
                Ok(inner.value(row).unwrap_or_else(|_| default.clone()))
            }
        }
    }

    /// Display text of the value at `row`. Evaluation errors render as their message.
    pub fn value_string(&self, row: usize) -> String {
        if let Expression::FirstMatchSelect { select, .. } = self {
            if select.first_match(row).is_none() {
                return "N/A".to_string();
            }
        }
        match self.value(row) {
            Ok(value) => value.to_string(),
            Err(err) => err.to_string(),
        }
    }

    /// Whether the expression yields a different value per row.
    pub fn has_multiple_rows(&self) -> bool {
        match self {
            Expression::Const(_) | Expression::FixedRow { .. } => false,
            Expression::Column { .. }
            | Expression::RowIndex { .. }
            | Expression::Select { .. }
            | Expression::FirstMatchSelect { .. } => true,
            Expression::TypeChange { inner, .. }
            | Expression::SelectSetConditional { inner, .. }
            | Expression::DefaultOnError { inner, .. } => inner.has_multiple_rows(),
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Expression::Const(_) => 1,
            Expression::Column { table, .. } | Expression::RowIndex { table } => table.row_count(),
            Expression::Select { select, .. } => select.matching_indices(0).len(),
            Expression::FirstMatchSelect { select, .. } => select.first_match_row_count(),
            Expression::SelectSetConditional { set, inner } => match set.conditional_row_indices() {
                Some(indices) => indices.len(),
                None => inner.row_count(),
            },
            Expression::FixedRow { inner, row } => usize::from(*row < inner.row_count()),
            Expression::TypeChange { inner, .. } | Expression::DefaultOnError { inner, .. } => {
                inner.row_count()
            }
        }
    }

    /// Type of the produced values, when it is known statically.
    pub fn value_type(&self) -> Option<ColumnType> {
        match self {
            Expression::Const(value) => value.column_type(),
            Expression::Column { table, column } => table.column_type(*column),
            Expression::RowIndex { .. } => Some(ColumnType::UInt),
            Expression::TypeChange { to, .. } => Some(*to),
            Expression::Select { select, column }
            | Expression::FirstMatchSelect { select, column } => {
                select.source().column_type(*column)
            }
            Expression::SelectSetConditional { inner, .. }
            | Expression::FixedRow { inner, .. }
            | Expression::DefaultOnError { inner, .. } => inner.value_type(),
        }
    }

    /// Combined [`Table::generation`] of every table the expression reads. Changes whenever
    /// one of them is written.
    pub fn generation(&self) -> u64 {
        match self {
            Expression::Const(_) => 0,
            Expression::Column { table, .. } | Expression::RowIndex { table } => table.generation(),
            Expression::Select { select, .. } | Expression::FirstMatchSelect { select, .. } => {
                select_generation(select)
            }
            Expression::SelectSetConditional { set, inner } => {
                let condition = set.condition().map_or(0, |condition| {
                    condition
                        .left
                        .generation()
                        .wrapping_add(condition.right.generation())
                });
                condition.wrapping_add(inner.generation())
            }
            Expression::TypeChange { inner, .. }
            | Expression::FixedRow { inner, .. }
            | Expression::DefaultOnError { inner, .. } => inner.generation(),
        }
    }
}

fn select_generation(select: &Select) -> u64 {
    let wheres = select.where_clauses().map_or(0, |where_| {
        where_
            .comparisons()
            .iter()
            .fold(0u64, |sum, comparison| sum.wrapping_add(comparison.value.generation()))
    });
    select.source().generation().wrapping_add(wheres)
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Const(value) => write!(f, "Const({value:?})"),
            Expression::Column { table, column } => {
                write!(f, "Column({}[{column}])", table.name())
            }
            Expression::RowIndex { table } => write!(f, "RowIndex({})", table.name()),
            Expression::TypeChange { inner, to } => write!(f, "TypeChange({inner:?} -> {to})"),
            Expression::Select { select, column } => {
                write!(f, "Select({}[{column}])", select.name())
            }
            Expression::SelectSetConditional { inner, .. } => {
                write!(f, "SelectSetConditional({inner:?})")
            }
            Expression::FirstMatchSelect { select, column } => {
                write!(f, "FirstMatchSelect({}[{column}])", select.name())
            }
            Expression::FixedRow { inner, row } => write!(f, "FixedRow({inner:?} @ {row})"),
            Expression::DefaultOnError { inner, default } => {
                write!(f, "DefaultOnError({inner:?} or {default:?})")
            }
        }
    }
}

/// Right-hand side of a comparison, evaluated once for a given right row.
enum Prepared {
    Scalar(Option<Value>),
    Set(Vec<Value>),
}

impl Prepared {
    fn new(op: Operator, right: &Expression, right_row: usize) -> Self {
        if op.is_one_to_many() {
            Prepared::Set(
                (0..right.row_count())
                    .filter_map(|row| right.value(row).ok())
                    .collect(),
            )
        } else {
            Prepared::Scalar(right.value(right_row).ok())
        }
    }

    fn accepts(&self, op: Operator, left: &Value) -> bool {
        match self {
            Prepared::Scalar(None) => false,
            Prepared::Scalar(Some(right)) => left
                .compare(right)
                .is_some_and(|ordering| op.matches(ordering)),
            Prepared::Set(values) => {
                let found = values
                    .iter()
                    .any(|right| left.compare(right) == Some(std::cmp::Ordering::Equal));
                found == (op == Operator::IsIn)
            }
        }
    }
}

/// `left op right`, both sides evaluated at the same row.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub left: Expression,
    pub op: Operator,
    pub right: Expression,
}

impl Comparison {
    pub fn new(left: Expression, op: Operator, right: Expression) -> Self {
        Self { left, op, right }
    }

    /// Evaluate at `row`. Errors and incomparable values never match.
    pub fn value(&self, row: usize) -> bool {
        let Ok(left) = self.left.value(row) else {
            return false;
        };
        Prepared::new(self.op, &self.right, row).accepts(self.op, &left)
    }

    pub fn is_many_to_many(&self) -> bool {
        !self.op.is_one_to_many() && self.left.has_multiple_rows() && self.right.has_multiple_rows()
    }

    pub fn row_count(&self) -> usize {
        self.left.row_count().min(self.right.row_count())
    }
}

/// A physical column compared against an expression; the building block of where-clauses.
#[derive(Clone)]
pub struct ColumnComparison {
    pub table: Rc<dyn Table>,
    pub column: usize,
    pub op: Operator,
    pub value: Expression,
}

impl ColumnComparison {
    fn cell(&self, source_row: usize) -> Value {
        self.table.value(source_row, self.column).unwrap_or_default()
    }

    /// Source rows in `range` whose cell matches the value at `row`.
    pub fn match_indices(&self, row: usize, range: Range<usize>) -> Vec<usize> {
        let prepared = Prepared::new(self.op, &self.value, row);
        range
            .filter(|&source_row| prepared.accepts(self.op, &self.cell(source_row)))
            .collect()
    }

    /// Keep only the `indices` whose cell matches the value at `row`.
    pub fn retain_matching(&self, row: usize, indices: &mut Vec<usize>) {
        let prepared = Prepared::new(self.op, &self.value, row);
        indices.retain(|&source_row| prepared.accepts(self.op, &self.cell(source_row)));
    }

    pub fn matches(&self, source_row: usize, row: usize) -> bool {
        Prepared::new(self.op, &self.value, row).accepts(self.op, &self.cell(source_row))
    }

    pub fn first_match(&self, row: usize) -> Option<usize> {
        let prepared = Prepared::new(self.op, &self.value, row);
        (0..self.table.row_count()).find(|&source_row| prepared.accepts(self.op, &self.cell(source_row)))
    }

    pub fn is_many_to_many(&self) -> bool {
        !self.op.is_one_to_many() && self.value.has_multiple_rows()
    }
}

impl fmt::Debug for ColumnComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = self.table.column_name(self.column).unwrap_or("?");
        write!(f, "{}.{column} {} {:?}", self.table.name(), self.op, self.value)
    }
}

/// Unresolved expression text as declared by a view definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaExpression {
    pub value: String,
    /// The text is a constant and must not be resolved as an identifier.
    pub literal: bool,
    /// Evaluate at this row regardless of the row asked for.
    pub row: Option<usize>,
    /// Value used when evaluation fails.
    pub default: Option<String>,
    pub value_type: Option<ColumnType>,
}

impl MetaExpression {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            literal: true,
            ..Self::default()
        }
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_type(mut self, value_type: ColumnType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Split `select.column` into its two parts. Single names and deeper paths return `None`.
    pub fn select_and_column(&self) -> Option<(&str, &str)> {
        let (select, column) = self.value.split_once('.')?;
        if column.contains('.') {
            return None;
        }
        Some((select, column))
    }
}

/// Controls how [`parse_identifier`] resolves a [`MetaExpression`].
#[derive(Clone)]
pub struct ParseIdentifierOption<'a> {
    pub arena: &'a ScopeArena,
    /// Innermost scope frame to search for select names.
    pub scope: Option<ScopeId>,
    /// Table that `table.column` and bare `column` identifiers refer to.
    pub identifier_table: Option<Rc<dyn Table>>,
    /// Resolve many-to-many selects to their first match for the evaluated driving row instead
    /// of listing all their matches.
    pub use_first_match: bool,
    /// On failure produce a text constant of the raw value instead of `None`, silently.
    pub default_on_error: bool,
    /// Type forced onto numeric constants and resolved columns.
    pub override_type: Option<ColumnType>,
    /// Do not apply this set's condition when one of its selects is referenced.
    pub bypass_set: Option<Rc<SelectSet>>,
    /// Prefix for diagnostics.
    pub context: &'a str,
}

impl<'a> ParseIdentifierOption<'a> {
    pub fn new(arena: &'a ScopeArena, scope: Option<ScopeId>, context: &'a str) -> Self {
        Self {
            arena,
            scope,
            identifier_table: None,
            use_first_match: false,
            default_on_error: false,
            override_type: None,
            bypass_set: None,
            context,
        }
    }

    fn fail(&self, meta: &MetaExpression, message: fmt::Arguments<'_>) -> Option<Expression> {
        if self.default_on_error {
            return Some(Expression::Const(Value::from(meta.value.as_str())));
        }
        log::error!("{}: {message}", self.context);
        None
    }
}

/// Resolve `meta` to an expression.
///
/// The value is read as, in order: a literal constant; `#` for the row index of the identifier
/// table; a signed or unsigned number; `true`/`false` when a bool is wanted; `select.column`
/// looked up through the scope chain; `table.column` or `column` on the identifier table.
pub fn parse_identifier(meta: &MetaExpression, opt: &ParseIdentifierOption<'_>) -> Option<Expression> {
    let text = meta.value.trim();
    if meta.literal {
        let ty = meta.value_type.unwrap_or(ColumnType::Text);
        let value = Value::parse(&meta.value, ty).unwrap_or_else(|| Value::from(meta.value.as_str()));
        return Some(Expression::Const(value));
    }
    if text.is_empty() {
        if !opt.default_on_error {
            log::warn!("{}: no value specified", opt.context);
        }
        return opt.default_on_error.then(|| Expression::Const(Value::from("")));
    }
    if text == ROW_INDEX_NAME {
        return match &opt.identifier_table {
            Some(table) => Some(Expression::RowIndex {
                table: Rc::clone(table),
            }),
            None => opt.fail(meta, format_args!("'{ROW_INDEX_NAME}' used without a table")),
        };
    }

    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        let ty = opt.override_type.or(meta.value_type).unwrap_or(ColumnType::Int);
        return match Value::parse(text, ty) {
            Some(value) => Some(Expression::Const(value)),
            None => opt.fail(meta, format_args!("'{text}' is not a valid {ty}")),
        };
    }

    if opt.override_type.or(meta.value_type) == Some(ColumnType::Bool) {
        if let Some(value) = Value::parse(text, ColumnType::Bool) {
            return Some(Expression::Const(value));
        }
    }

    let parts: Vec<&str> = text.split('.').collect();
    let (source, column_name) = match parts.as_slice() {
        [owner, column] => {
            if let Some(hit) = opt.arena.find_select(opt.scope, owner) {
                (Source::Select(hit), *column)
            } else if let Some(table) = opt
                .identifier_table
                .as_ref()
                .filter(|table| table.name() == *owner)
            {
                (Source::Table(Rc::clone(table), own_fixed_row(opt)), *column)
            } else {
                return opt.fail(
                    meta,
                    format_args!("unknown identifier '{owner}', must be a table or select name"),
                );
            }
        }
        [column] => match &opt.identifier_table {
            Some(table) => (Source::Table(Rc::clone(table), own_fixed_row(opt)), *column),
            None => {
                return opt.fail(meta, format_args!("unknown identifier '{column}', no table in scope"))
            }
        },
        _ => return opt.fail(meta, format_args!("malformed identifier '{text}'")),
    };

    let table = source.table();
    let Some(column) = table.column_index(column_name) else {
        return opt.fail(
            meta,
            format_args!("unknown identifier '{column_name}', must be a column name"),
        );
    };
    let column_type = table.column_type(column);

    let (mut expression, fixed_row) = match source {
        Source::Select(hit) => {
            let mut expression = if opt.use_first_match && hit.select.is_many_to_many() {
                Expression::FirstMatchSelect {
                    select: Rc::clone(&hit.select),
                    column,
                }
            } else {
                Expression::Select {
                    select: Rc::clone(&hit.select),
                    column,
                }
            };
            let bypassed = opt
                .bypass_set
                .as_ref()
                .is_some_and(|bypass| Rc::ptr_eq(bypass, &hit.set));
            if hit.set.has_condition() && !bypassed {
                expression = Expression::SelectSetConditional {
                    set: Rc::clone(&hit.set),
                    inner: Box::new(expression),
                };
            }
            (expression, hit.fixed_row)
        }
        Source::Table(table, fixed_row) => (Expression::Column { table, column }, fixed_row),
    };

    if let Some(row) = meta.row.or(fixed_row) {
        expression = Expression::FixedRow {
            inner: Box::new(expression),
            row,
        };
    }

    let desired = opt.override_type.or(meta.value_type).or(column_type);
    if let Some(to) = desired.filter(|to| Some(*to) != column_type) {
        expression = Expression::TypeChange {
            inner: Box::new(expression),
            to,
        };
    }

    if let Some(default) = &meta.default {
        let default = desired
            .and_then(|ty| Value::parse(default, ty))
            .unwrap_or_else(|| Value::from(default.as_str()));
        expression = Expression::DefaultOnError {
            inner: Box::new(expression),
            default,
        };
    }

    Some(expression)
}

enum Source {
    Select(crate::scope::ScopeHit),
    Table(Rc<dyn Table>, Option<usize>),
}

impl Source {
    fn table(&self) -> Rc<dyn Table> {
        match self {
            Source::Select(hit) => Rc::clone(hit.select.source()),
            Source::Table(table, _) => Rc::clone(table),
        }
    }
}

fn own_fixed_row(opt: &ParseIdentifierOption<'_>) -> Option<usize> {
    opt.scope
        .and_then(|scope| opt.arena.frame(scope))
        .and_then(|frame| frame.fixed_row())
}
