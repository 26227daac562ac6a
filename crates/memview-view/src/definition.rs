//! Already-parsed view definitions. Loading them from a file format is left to the caller.

use crate::expression::MetaExpression;
use crate::merge::MergeAlgorithm;
use crate::operator::Operator;
use memview_columnar::ColumnType;
use std::rc::Rc;

/// How the where-clauses of a select combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WhereCombine {
    /// A row matches when every clause matches.
    #[default]
    All,
    /// A row matches when any clause matches.
    Any,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhereDef {
    /// Column of the select's source table.
    pub column: String,
    pub op: Operator,
    pub value: MetaExpression,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectDef {
    pub name: String,
    /// Name of the physical source table.
    pub table: String,
    pub max_row: Option<usize>,
    pub wheres: Vec<WhereDef>,
    pub combine: WhereCombine,
}

impl SelectDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            max_row: None,
            wheres: Vec::new(),
            combine: WhereCombine::All,
        }
    }

    pub fn with_max_row(mut self, max_row: usize) -> Self {
        self.max_row = Some(max_row);
        self
    }

    pub fn with_combine(mut self, combine: WhereCombine) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_where(mut self, column: impl Into<String>, op: Operator, value: MetaExpression) -> Self {
        self.wheres.push(WhereDef {
            column: column.into(),
            op,
            value,
        });
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonDef {
    pub left: MetaExpression,
    pub op: Operator,
    pub right: MetaExpression,
}

impl ComparisonDef {
    pub fn new(left: MetaExpression, op: Operator, right: MetaExpression) -> Self {
        Self { left, op, right }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectSetDef {
    pub selects: Vec<SelectDef>,
    /// Post-filter applied to the main select's rows.
    pub condition: Option<ComparisonDef>,
}

impl SelectSetDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_select(mut self, select: SelectDef) -> Self {
        self.selects.push(select);
        self
    }

    pub fn with_condition(mut self, condition: ComparisonDef) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selects.is_empty()
    }
}

/// A column declaration. Declarations with the same name across a definition tree describe
/// one column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub display_name: Option<String>,
    pub value_type: Option<ColumnType>,
    /// Value source. Columns without one only take part in metadata and merging.
    pub value: Option<MetaExpression>,
    /// How the column aggregates child tables when a row has no value of its own.
    pub merge: Option<MergeAlgorithm>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            value_type: None,
            value: None,
            merge: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_type(mut self, value_type: ColumnType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_value(mut self, value: MetaExpression) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_merge(mut self, merge: MergeAlgorithm) -> Self {
        self.merge = Some(merge);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub enum NodeData {
    /// A leaf: the node contributes its own column values only.
    #[default]
    NoData,
    /// Rows are the explicitly declared child nodes.
    Node {
        select_set: SelectSetDef,
        columns: Vec<ColumnDef>,
        children: Vec<Rc<NodeDef>>,
    },
    /// Rows are generated from the select set's matching rows.
    Select {
        select_set: SelectSetDef,
        columns: Vec<ColumnDef>,
        /// Template built for each row when the row is expanded.
        child: Option<Rc<NodeDef>>,
    },
}

impl NodeData {
    pub fn columns(&self) -> &[ColumnDef] {
        match self {
            NodeData::NoData => &[],
            NodeData::Node { columns, .. } | NodeData::Select { columns, .. } => columns,
        }
    }

    pub fn select_set(&self) -> Option<&SelectSetDef> {
        match self {
            NodeData::NoData => None,
            NodeData::Node { select_set, .. } | NodeData::Select { select_set, .. } => {
                Some(select_set)
            }
        }
    }

    pub fn children(&self) -> Vec<&Rc<NodeDef>> {
        match self {
            NodeData::NoData => Vec::new(),
            NodeData::Node { children, .. } => children.iter().collect(),
            NodeData::Select { child, .. } => child.iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeDef {
    pub name: String,
    /// The node is left out of its parent when this evaluates to false.
    pub condition: Option<ComparisonDef>,
    /// Selects visible to the node's rows and descendants.
    pub local_select_set: SelectSetDef,
    /// The node's own column values.
    pub columns: Vec<ColumnDef>,
    pub data: NodeData,
}

impl NodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: ComparisonDef) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_local_select_set(mut self, select_set: SelectSetDef) -> Self {
        self.local_select_set = select_set;
        self
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_data(mut self, data: NodeData) -> Self {
        self.data = data;
        self
    }

    pub fn has_data(&self) -> bool {
        !matches!(self.data, NodeData::NoData)
    }
}

/// Root of a view: a named collection of top-level node definitions.
#[derive(Clone, Debug, Default)]
pub struct ViewSchemaDef {
    pub name: String,
    pub tables: Vec<Rc<NodeDef>>,
}

impl ViewSchemaDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: NodeDef) -> Self {
        self.tables.push(Rc::new(table));
        self
    }
}
