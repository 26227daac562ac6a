use crate::column::{
    ColumnKind, ConstColumn, ExpressionColumn, NodeColumn, NodeEntry, NodeMergeColumn, RowLink,
    TypedColumn, ViewColumn,
};
use crate::definition::{ColumnDef, ComparisonDef, NodeData, NodeDef};
use crate::error::{ViewError, ViewResult};
use crate::expression::{
    parse_identifier, Comparison, MetaExpression, ParseIdentifierOption, ROW_INDEX_NAME,
};
use crate::merge::{Merge, MergeAlgorithm};
use crate::meta::{MetaColumn, MetaTable};
use crate::options::ViewOptions;
use crate::scope::{ScopeArena, ScopeId};
use crate::select::{build_select_set, SelectSet};
use memview_columnar::{ColumnType, Database, Table, TableError, TableResult, Value};
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

/// State shared by every table of one view schema.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) database: Rc<Database>,
    pub(crate) options: ViewOptions,
    pub(crate) arena: RefCell<ScopeArena>,
}

/// A live table built from a [`NodeDef`].
///
/// Rows are either the node's declared children (node data) or the rows of its data select
/// set (select data). Each row can be expanded into a group table, built on first request and
/// kept for the lifetime of this table.
pub struct ViewTable {
    shared: Rc<Shared>,
    node: Rc<NodeDef>,
    full_name: String,
    meta: Rc<MetaTable>,
    local_set: Option<Rc<SelectSet>>,
    data_set: Option<Rc<SelectSet>>,
    local_scope: Option<ScopeId>,
    scope: Option<ScopeId>,
    valid_children: Option<Vec<usize>>,
    columns: Vec<Option<ViewColumn>>,
    groups: OnceCell<Vec<OnceCell<Option<Rc<ViewTable>>>>>,
}

impl ViewTable {
    /// Build `node` on top of `parent_scope`.
    ///
    /// Definition problems are logged and yield `Ok(None)`: a root without a name, a node
    /// without data, a select table whose main select is many-to-many.
    pub(crate) fn build(
        shared: &Rc<Shared>,
        node: &Rc<NodeDef>,
        meta: &Rc<MetaTable>,
        parent_name: Option<&str>,
        parent_scope: Option<ScopeId>,
    ) -> ViewResult<Option<Rc<ViewTable>>> {
        if parent_name.is_none() && node.name.is_empty() {
            log::error!("view '{}': table needs a name", shared.name);
            return Ok(None);
        }
        let full_name = match parent_name {
            Some(parent) => format!("{parent}.{}", node.name),
            None => node.name.clone(),
        };
        let Some(data_set_def) = node.data.select_set() else {
            return Ok(None);
        };
        let context = format!("view '{}' table '{full_name}'", shared.name);
        let policy = shared.options.select_cache;

        let (local_set, local_scope) = match build_select_set(
            &node.local_select_set,
            &shared.database,
            &shared.arena,
            policy,
            parent_scope,
            &context,
        ) {
            Some((set, scope)) => (Some(set), Some(scope)),
            None => (None, parent_scope),
        };
        let (data_set, scope) = match build_select_set(
            data_set_def,
            &shared.database,
            &shared.arena,
            policy,
            local_scope,
            &context,
        ) {
            Some((set, scope)) => (Some(set), Some(scope)),
            None => (None, local_scope),
        };

        if let NodeData::Select { .. } = node.data {
            match &data_set {
                None => {
                    log::error!("{context}: select data needs at least one valid select");
                    return Ok(None);
                }
                Some(set) if set.is_many_to_many() => {
                    log::error!(
                        "{context}: cannot build a table from a many-to-many select; \
                         give its where-clauses a row value"
                    );
                    return Ok(None);
                }
                Some(_) => {}
            }
        }

        let mut columns: Vec<Option<ViewColumn>> = (0..meta.len()).map(|_| None).collect();
        let mut valid_children = None;
        match &node.data {
            NodeData::NoData => {}
            NodeData::Node { children, .. } => {
                let mut valid = Vec::with_capacity(children.len());
                for (index, child) in children.iter().enumerate() {
                    let passes = match &child.condition {
                        Some(condition) => evaluate_condition(shared, condition, scope, &context),
                        None => true,
                    };
                    if passes {
                        valid.push(index);
                    }
                }
                for (slot, meta_column) in columns.iter_mut().zip(meta.columns()) {
                    *slot = Some(ViewColumn::Node(NodeColumn::new(
                        meta_column.name.clone(),
                        valid.len(),
                    )));
                }
                for (row, &index) in valid.iter().enumerate() {
                    build_node_entries(shared, &children[index], row, &columns, meta, scope, &context)?;
                }
                if valid.len() != children.len() {
                    valid_children = Some(valid);
                }
            }
            NodeData::Select {
                columns: column_defs,
                ..
            } => {
                for def in column_defs {
                    let Some(meta_column) = meta.column_by_name(&def.name) else {
                        continue;
                    };
                    if columns[meta_column.index].is_some() {
                        log::error!("{context}: column '{}' is declared twice", def.name);
                        continue;
                    }
                    let Some(value) = &def.value else {
                        continue;
                    };
                    columns[meta_column.index] = build_select_column(
                        shared,
                        meta_column,
                        value,
                        data_set.as_deref(),
                        scope,
                        &context,
                    )?;
                }
            }
        }

        for (slot, meta_column) in columns.iter_mut().zip(meta.columns()) {
            if slot.is_none() {
                if let Some(merge) = &meta_column.merge {
                    *slot = Some(ViewColumn::NodeMerge(NodeMergeColumn::new(
                        meta_column.index,
                        merge.clone(),
                    )));
                }
            }
        }

        log::debug!(
            "{context}: built {} of {} columns",
            columns.iter().flatten().count(),
            columns.len()
        );

        Ok(Some(Rc::new(ViewTable {
            shared: Rc::clone(shared),
            node: Rc::clone(node),
            full_name,
            meta: Rc::clone(meta),
            local_set,
            data_set,
            local_scope,
            scope,
            valid_children,
            columns,
            groups: OnceCell::new(),
        })))
    }

    pub fn node(&self) -> &Rc<NodeDef> {
        &self.node
    }

    pub fn meta(&self) -> &Rc<MetaTable> {
        &self.meta
    }

    pub fn local_select_set(&self) -> Option<&Rc<SelectSet>> {
        self.local_set.as_ref()
    }

    pub fn data_select_set(&self) -> Option<&Rc<SelectSet>> {
        self.data_set.as_ref()
    }

    /// Innermost scope frame of this table.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// Declared child indices whose condition held, when some did not.
    pub fn valid_child_indices(&self) -> Option<&[usize]> {
        self.valid_children.as_deref()
    }

    pub fn column(&self, column: usize) -> Option<&ViewColumn> {
        self.columns.get(column)?.as_ref()
    }

    pub fn column_kind(&self, column: usize) -> Option<ColumnKind> {
        self.column(column).map(ViewColumn::kind)
    }

    fn groups(&self) -> &[OnceCell<Option<Rc<ViewTable>>>] {
        self.groups.get_or_init(|| {
            let count = match &self.node.data {
                NodeData::NoData => 0,
                NodeData::Node { children, .. } => {
                    self.valid_children.as_ref().map_or(children.len(), Vec::len)
                }
                NodeData::Select { .. } => self
                    .data_set
                    .as_ref()
                    .filter(|set| !set.is_many_to_many())
                    .and_then(|set| set.row_count())
                    .unwrap_or(0),
            };
            (0..count).map(|_| OnceCell::new()).collect()
        })
    }

    pub fn is_group_initialized(&self) -> bool {
        self.groups.get().is_some()
    }

    /// Number of rows. Counting them the first time runs the data selects.
    pub fn group_count(&self) -> usize {
        self.groups().len()
    }

    fn child_index(&self, group: usize) -> Option<usize> {
        match &self.valid_children {
            Some(valid) => valid.get(group).copied(),
            None => Some(group),
        }
    }

    /// The table a row expands into.
    ///
    /// The group table is built on the first call and the same instance is returned
    /// afterwards. `Ok(None)` when the row has nothing to expand into.
    pub fn create_group_table(&self, group: usize) -> ViewResult<Option<Rc<ViewTable>>> {
        let groups = self.groups();
        let slot = groups.get(group).ok_or(ViewError::RowOutOfRange {
            row: group,
            count: groups.len(),
        })?;
        if let Some(table) = slot.get() {
            return Ok(table.clone());
        }

        let child = match &self.node.data {
            NodeData::NoData => None,
            NodeData::Node { children, .. } => self
                .child_index(group)
                .and_then(|index| children.get(index))
                .cloned(),
            NodeData::Select { child, .. } => child.clone(),
        };
        let table = match child {
            Some(child) => {
                let scope = match &self.data_set {
                    Some(set) => Some(self.shared.arena.borrow_mut().push(
                        self.local_scope,
                        Rc::clone(set),
                        Some(group),
                    )),
                    None => self.local_scope,
                };
                ViewTable::build(&self.shared, &child, &self.meta, Some(&self.full_name), scope)?
            }
            None => None,
        };
        let _ = slot.set(table.clone());
        Ok(table)
    }

    /// Merge `column` over every row of the group table of `group`.
    pub fn merge_group(&self, group: usize, column: usize, merge: &MergeAlgorithm) -> ViewResult<Value> {
        let Some(sub) = self.create_group_table(group)? else {
            return Ok(Value::Null);
        };
        Ok(merge.merge(&*sub, column, 0..sub.group_count()))
    }

    pub fn is_group_expandable(&self, group: usize, _column: usize) -> bool {
        match &self.node.data {
            NodeData::NoData => false,
            NodeData::Node { children, .. } => {
                group < self.group_count()
                    && self
                        .child_index(group)
                        .and_then(|index| children.get(index))
                        .is_some_and(|child| child.has_data())
            }
            NodeData::Select { child, .. } => child.is_some(),
        }
    }

    /// Only the first column carries the expand control.
    pub fn is_column_expandable(&self, column: usize) -> bool {
        column == 0
    }

    /// Refresh cached state after the underlying data changed.
    ///
    /// Initializes the rows if needed, updates every group table built so far, then every
    /// column. Returns whether anything changed.
    pub fn update(&self) -> bool {
        let initialized = !self.is_group_initialized();
        let mut children_changed = false;
        for child in self.groups().iter().filter_map(OnceCell::get).flatten() {
            children_changed |= child.update();
        }
        let mut changed = children_changed;
        for column in self.columns.iter().flatten() {
            changed |= column.update(children_changed);
        }
        initialized || changed
    }

    fn column_or_err(&self, column: usize) -> ViewResult<Option<&ViewColumn>> {
        match self.columns.get(column) {
            Some(slot) => Ok(slot.as_ref()),
            None => Err(ViewError::ColumnOutOfRange {
                table: self.full_name.clone(),
                column,
            }),
        }
    }

    /// Write one cell through the column's write rules.
    pub fn set_cell(&self, row: usize, column: usize, value: Value) -> ViewResult<()> {
        match self.column_or_err(column)? {
            Some(view_column) => view_column.set_value(row, value),
            None => {
                log::error!("{}: column {column} has no values to set", self.full_name);
                Ok(())
            }
        }
    }

    pub fn set_const_value(&self, column: usize, value: Value) -> ViewResult<()> {
        match self.column_or_err(column)? {
            Some(view_column) => view_column.set_const_value(value),
            None => {
                log::error!("{}: column {column} has no values to set", self.full_name);
                Ok(())
            }
        }
    }

    pub fn row_link(&self, row: usize, column: usize) -> Option<RowLink> {
        self.column(column)?.row_link(row)
    }
}

impl Table for ViewTable {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn row_count(&self) -> usize {
        self.group_count()
    }

    fn column_count(&self) -> usize {
        self.meta.len()
    }

    fn column_name(&self, column: usize) -> Option<&str> {
        self.meta.column(column).map(|c| c.name.as_str())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.meta.index_of(name)
    }

    fn column_type(&self, column: usize) -> Option<ColumnType> {
        self.meta.column(column).and_then(|c| c.value_type)
    }

    fn value(&self, row: usize, column: usize) -> Option<Value> {
        if row >= self.group_count() || column >= self.meta.len() {
            return None;
        }
        let Some(view_column) = self.column(column) else {
            return Some(Value::Null);
        };
        Some(view_column.value(self, row).unwrap_or_else(|err| {
            log::debug!("{}[{row}, {column}]: {err}", self.full_name);
            Value::Null
        }))
    }

    fn value_string(&self, row: usize, column: usize) -> String {
        if row >= self.group_count() || column >= self.meta.len() {
            return "Out of Range".to_string();
        }
        match self.column(column) {
            Some(view_column) => view_column.value_string(self, row),
            None => String::new(),
        }
    }

    fn set_value(&self, row: usize, column: usize, value: Value) -> TableResult<()> {
        self.set_cell(row, column, value).map_err(|err| match err {
            ViewError::Table(err) => err,
            other => TableError::Rejected {
                table: self.full_name.clone(),
                reason: other.to_string(),
            },
        })
    }
}

impl fmt::Debug for ViewTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewTable")
            .field("name", &self.full_name)
            .field("columns", &self.meta.len())
            .field("groups", &self.groups.get().map(Vec::len))
            .finish()
    }
}

fn evaluate_condition(
    shared: &Shared,
    condition: &ComparisonDef,
    scope: Option<ScopeId>,
    context: &str,
) -> bool {
    let comparison = {
        let arena = shared.arena.borrow();
        let mut opt = ParseIdentifierOption::new(&arena, scope, context);
        opt.use_first_match = true;
        opt.default_on_error = true;
        match (
            parse_identifier(&condition.left, &opt),
            parse_identifier(&condition.right, &opt),
        ) {
            (Some(left), Some(right)) => Comparison::new(left, condition.op, right),
            _ => return false,
        }
    };
    comparison.value(0)
}

/// Fill row `row` of a node table's columns from child node `child`.
fn build_node_entries(
    shared: &Shared,
    child: &NodeDef,
    row: usize,
    columns: &[Option<ViewColumn>],
    meta: &MetaTable,
    scope: Option<ScopeId>,
    context: &str,
) -> ViewResult<()> {
    if !child.local_select_set.is_empty() {
        log::error!(
            "{context}: node '{}' cannot have local selects when its parent has node data; \
             ignoring them",
            child.name
        );
    }

    let node_column = |index: usize| match columns.get(index) {
        Some(Some(ViewColumn::Node(column))) => Some(column),
        _ => None,
    };

    let arena = shared.arena.borrow();
    for def in &child.columns {
        let Some(meta_column) = meta.column_by_name(&def.name) else {
            continue;
        };
        let Some(column) = node_column(meta_column.index) else {
            continue;
        };
        if !matches!(column.entry(row), Some(NodeEntry::Empty)) {
            log::error!("{context}: node '{}' sets column '{}' twice", child.name, def.name);
            continue;
        }
        let entry = match &def.value {
            Some(value) => {
                let mut opt = ParseIdentifierOption::new(&arena, scope, context);
                opt.use_first_match = true;
                opt.override_type = meta_column.value_type;
                match parse_identifier(value, &opt) {
                    Some(expression) => NodeEntry::Expression(expression),
                    None => continue,
                }
            }
            None => default_entry(meta_column),
        };
        column.set_entry(row, entry)?;
    }

    for meta_column in meta.columns() {
        if declares(&child.columns, &meta_column.name) {
            continue;
        }
        if let Some(column) = node_column(meta_column.index) {
            column.set_entry(row, default_entry(meta_column))?;
        }
    }
    Ok(())
}

fn declares(columns: &[ColumnDef], name: &str) -> bool {
    columns.iter().any(|column| column.name == name)
}

fn default_entry(meta_column: &MetaColumn) -> NodeEntry {
    match &meta_column.merge {
        Some(merge) => NodeEntry::Merge {
            column: meta_column.index,
            merge: merge.clone(),
        },
        None => NodeEntry::Empty,
    }
}

/// Column of a select table: a constant, the row index, a direct read of the main select, or
/// a general expression.
fn build_select_column(
    shared: &Shared,
    meta_column: &MetaColumn,
    value: &MetaExpression,
    data_set: Option<&SelectSet>,
    scope: Option<ScopeId>,
    context: &str,
) -> ViewResult<Option<ViewColumn>> {
    if value.literal {
        let ty = value
            .value_type
            .or(meta_column.value_type)
            .unwrap_or(ColumnType::Text);
        let constant =
            Value::parse(&value.value, ty).unwrap_or_else(|| Value::from(value.value.as_str()));
        return Ok(Some(ViewColumn::Const(ConstColumn::new(constant))));
    }
    if value.value.trim() == ROW_INDEX_NAME {
        return Ok(Some(ViewColumn::RowIndex));
    }

    if let (Some((select_name, column_name)), Some(set)) = (value.select_and_column(), data_set) {
        let main = set.main_select().filter(|main| main.name() == select_name);
        if let Some(main) = main.filter(|_| value.row.is_none() && value.default.is_none()) {
            let source_column = main.source().column_index(column_name);
            let desired = value.value_type.or(meta_column.value_type);
            if let Some(source_column) = source_column.filter(|&c| {
                !set.has_condition()
                    && (desired.is_none() || desired == main.source().column_type(c))
            }) {
                let column = TypedColumn::new(meta_column.name.clone());
                column.bind(Rc::clone(main), source_column)?;
                return Ok(Some(ViewColumn::Typed(column)));
            }
        }
    }

    let arena = shared.arena.borrow();
    let mut opt = ParseIdentifierOption::new(&arena, scope, context);
    opt.override_type = meta_column.value_type;
    Ok(parse_identifier(value, &opt).map(|expression| {
        ViewColumn::Expression(ExpressionColumn::new(expression))
    }))
}
