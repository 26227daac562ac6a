use crate::definition::ViewSchemaDef;
use crate::error::{ViewError, ViewResult};
use crate::meta::MetaTable;
use crate::options::ViewOptions;
use crate::scope::ScopeArena;
use crate::table::{Shared, ViewTable};
use memview_columnar::Database;
use std::cell::RefCell;
use std::rc::Rc;

/// A set of view definitions bound to one physical database.
///
/// Column metadata of every root definition is computed here, before any table is built, and
/// stays frozen afterwards.
#[derive(Debug)]
pub struct ViewSchema {
    shared: Rc<Shared>,
    def: ViewSchemaDef,
    metas: Vec<Rc<MetaTable>>,
}

impl ViewSchema {
    pub fn new(def: ViewSchemaDef, database: Rc<Database>, options: ViewOptions) -> Self {
        let metas = def.tables.iter().map(|node| MetaTable::from_node(node)).collect();
        let shared = Rc::new(Shared {
            name: def.name.clone(),
            database,
            options,
            arena: RefCell::new(ScopeArena::new()),
        });
        Self { shared, def, metas }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn database(&self) -> &Rc<Database> {
        &self.shared.database
    }

    pub fn options(&self) -> ViewOptions {
        self.shared.options
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.def.tables.iter().map(|node| node.name.as_str())
    }

    pub fn meta_table(&self, name: &str) -> Option<&Rc<MetaTable>> {
        let index = self.def.tables.iter().position(|node| node.name == name)?;
        self.metas.get(index)
    }

    /// Number of scope frames pushed so far by table builds.
    pub fn scope_frame_count(&self) -> usize {
        self.shared.arena.borrow().len()
    }

    /// Build the root table `name`. `Ok(None)` when its definition cannot be built; the reason
    /// is logged.
    pub fn build_table(&self, name: &str) -> ViewResult<Option<Rc<ViewTable>>> {
        let index = self
            .def
            .tables
            .iter()
            .position(|node| node.name == name)
            .ok_or_else(|| ViewError::UnknownTable(name.to_string()))?;
        self.build_index(index)
    }

    /// Build every root table, skipping the ones that fail.
    pub fn build_all(&self) -> ViewResult<Vec<Rc<ViewTable>>> {
        let mut tables = Vec::with_capacity(self.def.tables.len());
        for index in 0..self.def.tables.len() {
            tables.extend(self.build_index(index)?);
        }
        Ok(tables)
    }

    fn build_index(&self, index: usize) -> ViewResult<Option<Rc<ViewTable>>> {
        match (self.def.tables.get(index), self.metas.get(index)) {
            (Some(node), Some(meta)) => ViewTable::build(&self.shared, node, meta, None, None),
            _ => Ok(None),
        }
    }
}
