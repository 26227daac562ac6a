#![forbid(unsafe_code)]

use crate::table::{Table, TableError, TableResult};
use std::collections::HashMap;
use std::rc::Rc;

/// A named collection of physical tables (the base schema views are built over).
#[derive(Debug, Default)]
pub struct Database {
    name: String,
    tables: Vec<Rc<dyn Table>>,
    table_index: HashMap<String, usize>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            table_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_table(&mut self, table: impl Table + 'static) -> TableResult<Rc<dyn Table>> {
        self.add_shared(Rc::new(table))
    }

    pub fn add_shared(&mut self, table: Rc<dyn Table>) -> TableResult<Rc<dyn Table>> {
        let name = table.name().to_string();
        if self.table_index.contains_key(&name) {
            return Err(TableError::DuplicateTable { table: name });
        }
        self.table_index.insert(name, self.tables.len());
        self.tables.push(table.clone());
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Option<Rc<dyn Table>> {
        let idx = *self.table_index.get(name)?;
        self.tables.get(idx).cloned()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Rc<dyn Table>> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
