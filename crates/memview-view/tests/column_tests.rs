mod common;

use memview_view::{
    Expression, NodeColumn, NodeEntry, Select, SelectCachePolicy, TypedColumn, ViewError,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

#[test]
fn typed_columns_bind_once() {
    let db = common::snapshot();
    let select = Rc::new(Select::new(
        "obj",
        db.table("Objects").unwrap(),
        None,
        SelectCachePolicy::SingleSlot,
    ));
    let column = TypedColumn::new("size");
    assert_eq!(
        column.source_row(0),
        Err(ViewError::Unbound {
            column: "size".to_string(),
        })
    );

    column.bind(Rc::clone(&select), common::OBJECT_SIZE).unwrap();
    assert!(column.is_bound());
    assert_eq!(
        column.bind(select, common::OBJECT_NAME),
        Err(ViewError::AlreadyBound {
            column: "size".to_string(),
        })
    );
    assert_eq!(column.source_row(5), Ok(Some(5)));
    assert_eq!(column.source_row(6), Ok(None));
    assert_eq!(column.row_count(), Ok(6));
}

#[test]
fn node_entries_are_set_once() {
    let column = NodeColumn::new("name", 2);
    assert!(matches!(column.entry(1), Some(NodeEntry::Empty)));

    column
        .set_entry(0, NodeEntry::Expression(Expression::constant("Textures")))
        .unwrap();
    assert_eq!(
        column
            .set_entry(0, NodeEntry::Expression(Expression::constant("Meshes")))
            .unwrap_err(),
        ViewError::EntryAlreadySet {
            column: "name".to_string(),
            row: 0,
        }
    );
    assert_eq!(
        column.set_entry(2, NodeEntry::Empty).unwrap_err(),
        ViewError::RowOutOfRange { row: 2, count: 2 }
    );
    assert_eq!(column.len(), 2);
}

#[test]
fn errors_render_their_context() {
    assert_eq!(
        ViewError::RowOutOfRange { row: 4, count: 3 }.to_string(),
        "out of range (4 : [0, 3[)"
    );
}
