//! Column metadata shared by every table built from one root definition.
//!
//! All declarations of a definition tree are collected up front by [`MetaTableBuilder`]; the
//! frozen [`MetaTable`] is then shared read-only by the root table and all its descendants,
//! so a column has the same index at every level of the tree.

use crate::definition::{ColumnDef, NodeDef};
use crate::merge::MergeAlgorithm;
use memview_columnar::ColumnType;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub struct MetaColumn {
    pub index: usize,
    pub name: String,
    pub display_name: String,
    pub value_type: Option<ColumnType>,
    pub merge: Option<MergeAlgorithm>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetaTable {
    name: String,
    columns: Vec<MetaColumn>,
    by_name: HashMap<String, usize>,
}

impl MetaTable {
    /// Collect the columns of a root definition and everything below it.
    pub fn from_node(node: &NodeDef) -> Rc<MetaTable> {
        let mut builder = MetaTableBuilder::new(node.name.clone());
        builder.declare_tree(node);
        builder.finish()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[MetaColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&MetaColumn> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&MetaColumn> {
        self.index_of(name).and_then(|index| self.columns.get(index))
    }
}

#[derive(Debug)]
pub struct MetaTableBuilder {
    table: MetaTable,
}

impl MetaTableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: MetaTable {
                name: name.into(),
                ..MetaTable::default()
            },
        }
    }

    /// Add a column or merge a repeated declaration into the existing one. Fields left unset
    /// by earlier declarations are filled in; conflicting values keep the first one.
    pub fn declare(&mut self, def: &ColumnDef) -> usize {
        if let Some(index) = self.table.index_of(&def.name) {
            let table_name = self.table.name.clone();
            let column = &mut self.table.columns[index];
            merge_field(&table_name, &def.name, "type", &mut column.value_type, &def.value_type);
            merge_field(&table_name, &def.name, "merge", &mut column.merge, &def.merge);
            if let Some(display_name) = &def.display_name {
                if column.display_name == column.name {
                    column.display_name = display_name.clone();
                }
            }
            return index;
        }

        let index = self.table.columns.len();
        self.table.columns.push(MetaColumn {
            index,
            name: def.name.clone(),
            display_name: def.display_name.clone().unwrap_or_else(|| def.name.clone()),
            value_type: def.value_type,
            merge: def.merge.clone(),
        });
        self.table.by_name.insert(def.name.clone(), index);
        index
    }

    /// Declare the node's own columns, then its data columns, then its children depth-first.
    pub fn declare_tree(&mut self, node: &NodeDef) {
        for column in node.columns.iter().chain(node.data.columns()) {
            self.declare(column);
        }
        for child in node.data.children() {
            self.declare_tree(child);
        }
    }

    pub fn finish(self) -> Rc<MetaTable> {
        Rc::new(self.table)
    }
}

fn merge_field<T: Clone + PartialEq + std::fmt::Debug>(
    table: &str,
    column: &str,
    field: &str,
    current: &mut Option<T>,
    declared: &Option<T>,
) {
    match (current.as_ref(), declared) {
        (None, Some(declared)) => *current = Some(declared.clone()),
        (Some(current), Some(declared)) if current != declared => {
            log::warn!(
                "table '{table}': column '{column}' redeclared with {field} {declared:?}, keeping {current:?}"
            );
        }
        _ => {}
    }
}
