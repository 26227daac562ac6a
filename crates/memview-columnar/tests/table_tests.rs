use memview_columnar::{
    ColumnSchema, ColumnType, ColumnarTable, ColumnarTableBuilder, Database, Table, TableError,
    Value,
};
use pretty_assertions::assert_eq;

fn build_objects() -> ColumnarTable {
    let schema = vec![
        ColumnSchema::new("address", ColumnType::UInt),
        ColumnSchema::new("size", ColumnType::Int),
        ColumnSchema::new("name", ColumnType::Text),
    ];
    let mut builder = ColumnarTableBuilder::new("Objects", schema);
    builder
        .append_row(&[Value::UInt(0x1000), Value::Int(64), "Texture".into()])
        .unwrap();
    builder
        .append_row(&[Value::UInt(0x2000), Value::Null, "Mesh".into()])
        .unwrap();
    builder
        .append_row(&[Value::UInt(0x3000), Value::from(12.0), Value::Int(7)])
        .unwrap();
    builder.finalize().unwrap()
}

#[test]
fn cells_are_typed_per_column() {
    let table = build_objects();
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column_count(), 3);
    assert_eq!(table.column_index("size"), Some(1));
    assert_eq!(table.column_type(0), Some(ColumnType::UInt));
    assert_eq!(table.value(0, 1), Some(Value::Int(64)));
    assert_eq!(table.value(1, 1), Some(Value::Null));
    // Float and int inputs are coerced into the declared column type.
    assert_eq!(table.value(2, 1), Some(Value::Int(12)));
    assert_eq!(table.value(2, 2), Some(Value::from("7")));
}

#[test]
fn out_of_range_reads_are_reported() {
    let table = build_objects();
    assert_eq!(table.value(3, 0), None);
    assert_eq!(table.value(0, 9), None);
    assert_eq!(table.value_string(3, 0), "Out of Range");
    assert_eq!(table.get_cell(3, 0), Value::Null);
}

#[test]
fn writes_bump_the_generation() {
    let table = build_objects();
    assert_eq!(table.generation(), 0);
    table.set_value(1, 1, Value::Int(32)).unwrap();
    assert_eq!(table.value(1, 1), Some(Value::Int(32)));
    assert_eq!(table.generation(), 1);

    let err = table.set_value(0, 1, "big".into()).unwrap_err();
    assert!(matches!(err, TableError::TypeMismatch { .. }));
    let err = table.set_value(5, 1, Value::Int(1)).unwrap_err();
    assert!(matches!(err, TableError::RowOutOfRange { row: 5, .. }));
    assert_eq!(table.generation(), 1);
}

#[test]
fn builder_rejects_ragged_rows_and_duplicate_columns() {
    let mut builder =
        ColumnarTableBuilder::new("T", vec![ColumnSchema::new("a", ColumnType::Int)]);
    let err = builder.append_row(&[Value::Int(1), Value::Int(2)]).unwrap_err();
    assert_eq!(
        err,
        TableError::SchemaMismatch {
            table: "T".to_string(),
            expected: 1,
            actual: 2,
        }
    );
    assert_eq!(builder.row_count(), 0);

    let builder = ColumnarTableBuilder::new(
        "T",
        vec![
            ColumnSchema::new("a", ColumnType::Int),
            ColumnSchema::new("a", ColumnType::Text),
        ],
    );
    assert!(matches!(
        builder.finalize(),
        Err(TableError::DuplicateColumn { .. })
    ));
}

#[test]
fn database_resolves_tables_by_name() {
    let mut db = Database::new("snapshot");
    db.add_table(build_objects()).unwrap();
    assert_eq!(db.len(), 1);
    assert_eq!(db.table("Objects").unwrap().row_count(), 3);
    assert!(db.table("Types").is_none());
    assert!(matches!(
        db.add_table(build_objects()),
        Err(TableError::DuplicateTable { .. })
    ));
}
