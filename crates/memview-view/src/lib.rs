//! Lazy hierarchical view tables over a physical [`memview_columnar::Database`].
//!
//! A [`ViewSchema`] binds view definitions ([`ViewSchemaDef`]) to a database. Building one of
//! its tables yields a [`ViewTable`] whose rows come either from declared child nodes or from
//! the rows matched by a [`SelectSet`]. Any row can be expanded into a group table, built on
//! demand and memoized. Columns are constants, expressions, row indices, direct reads of a
//! select, node entries or merges of child tables (see [`ViewColumn`]).
//!
//! The engine is single-threaded: tables, selects and their caches use `Rc` and interior
//! mutability and can't leave the thread that built them.
//!
//! ```compile_fail
//! use memview_view::ViewTable;
//! fn assert_send<T: Send>() {}
//! assert_send::<ViewTable>();
//! ```
//!
//! ```
//! use memview_columnar::{ColumnSchema, ColumnType, ColumnarTableBuilder, Database, Table, Value};
//! use memview_view::{
//!     ColumnDef, MetaExpression, NodeData, NodeDef, SelectDef, SelectSetDef, ViewOptions,
//!     ViewSchema, ViewSchemaDef,
//! };
//! use std::rc::Rc;
//!
//! let mut builder = ColumnarTableBuilder::new(
//!     "Objects",
//!     vec![ColumnSchema::new("size", ColumnType::Int)],
//! );
//! for size in [16, 32, 64] {
//!     builder.append_row(&[Value::Int(size)]).unwrap();
//! }
//! let mut db = Database::new("snapshot");
//! db.add_table(builder.finalize().unwrap()).unwrap();
//!
//! let objects = NodeDef::new("Objects").with_data(NodeData::Select {
//!     select_set: SelectSetDef::new().with_select(SelectDef::new("obj", "Objects")),
//!     columns: vec![ColumnDef::new("size").with_value(MetaExpression::new("obj.size"))],
//!     child: None,
//! });
//! let schema = ViewSchema::new(
//!     ViewSchemaDef::new("memory").with_table(objects),
//!     Rc::new(db),
//!     ViewOptions::default(),
//! );
//! let table = schema.build_table("Objects").unwrap().unwrap();
//! assert_eq!(table.row_count(), 3);
//! assert_eq!(table.value(2, 0), Some(Value::Int(64)));
//! ```

#![forbid(unsafe_code)]

mod cache;
mod column;
mod definition;
mod error;
mod expression;
mod merge;
mod meta;
mod operator;
mod options;
mod schema;
mod scope;
mod select;
mod table;

pub use cache::{ValueCache, ValueCacheMode};
pub use column::{
    ColumnKind, ConstColumn, ExpressionColumn, NodeColumn, NodeEntry, NodeMergeColumn, RowLink,
    TypedColumn, ViewColumn, NOT_AVAILABLE,
};
pub use definition::{
    ColumnDef, ComparisonDef, NodeData, NodeDef, SelectDef, SelectSetDef, ViewSchemaDef,
    WhereCombine, WhereDef,
};
pub use error::{ViewError, ViewResult};
pub use expression::{
    parse_identifier, ColumnComparison, Comparison, Expression, MetaExpression,
    ParseIdentifierOption, ROW_INDEX_NAME,
};
pub use merge::{Merge, MergeAlgorithm};
pub use meta::{MetaColumn, MetaTable, MetaTableBuilder};
pub use operator::Operator;
pub use options::{SelectCachePolicy, ViewOptions};
pub use schema::ViewSchema;
pub use scope::{ScopeArena, ScopeFrame, ScopeHit, ScopeId};
pub use select::{Select, SelectCacheStats, SelectSet, WhereUnion};
pub use table::ViewTable;

pub use memview_columnar::{Table, Value};
