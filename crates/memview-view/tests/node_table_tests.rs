mod common;

use memview_columnar::{ColumnType, Table, Value};
use memview_view::{
    ColumnDef, ColumnKind, ComparisonDef, MergeAlgorithm, MetaExpression, NodeData, NodeDef,
    Operator, SelectDef, SelectSetDef, ViewError, ViewOptions, ViewSchema, ViewSchemaDef,
    ViewTable,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

const NAME: usize = 0;
const SIZE: usize = 1;
const LARGEST: usize = 2;

fn expr(text: &str) -> MetaExpression {
    MetaExpression::new(text)
}

fn objects_of_type(name: &str, type_index: &str) -> NodeDef {
    NodeDef::new(name)
        .with_column(ColumnDef::new("name").with_value(MetaExpression::literal(name)))
        .with_data(NodeData::Select {
            select_set: SelectSetDef::new().with_select(
                SelectDef::new("obj", "Objects").with_where(
                    "typeIndex",
                    Operator::Equal,
                    expr(type_index),
                ),
            ),
            columns: vec![
                ColumnDef::new("name").with_value(expr("obj.name")),
                ColumnDef::new("size").with_value(expr("obj.size")),
            ],
            child: None,
        })
}

fn hidden_unless(left: &str, op: Operator, right: &str) -> NodeDef {
    NodeDef::new(format!("{left} {op} {right}"))
        .with_condition(ComparisonDef::new(expr(left), op, expr(right)))
        .with_column(ColumnDef::new("name").with_value(MetaExpression::literal("guarded")))
}

fn summary(children: Vec<NodeDef>) -> NodeDef {
    NodeDef::new("Summary")
        .with_local_select_set(SelectSetDef::new().with_select(
            SelectDef::new("big", "Objects").with_where(
                "size",
                Operator::GreaterEqual,
                expr("200"),
            ),
        ))
        .with_data(NodeData::Node {
            select_set: SelectSetDef::new(),
            columns: vec![
                ColumnDef::new("name"),
                ColumnDef::new("size")
                    .with_type(ColumnType::Int)
                    .with_merge(MergeAlgorithm::Sum),
                ColumnDef::new("largest"),
            ],
            children: children.into_iter().map(Rc::new).collect(),
        })
}

fn build(root: NodeDef) -> Rc<ViewTable> {
    let schema = ViewSchema::new(
        ViewSchemaDef::new("memory").with_table(root),
        common::snapshot(),
        ViewOptions::default(),
    );
    schema.build_table("Summary").unwrap().unwrap()
}

#[test]
fn node_rows_are_the_declared_children() {
    let root = build(summary(vec![
        objects_of_type("Textures", "0"),
        objects_of_type("Meshes", "1"),
    ]));

    assert_eq!(root.row_count(), 2);
    assert_eq!(root.valid_child_indices(), None);
    assert_eq!(root.column_kind(NAME), Some(ColumnKind::Node));
    assert_eq!(root.value(0, NAME), Some(Value::from("Textures")));
    assert_eq!(root.value(1, NAME), Some(Value::from("Meshes")));
    // Undeclared entries with a merge algorithm reduce the child's table.
    assert_eq!(root.value(0, SIZE), Some(Value::Int(104)));
    assert_eq!(root.value(1, SIZE), Some(Value::Int(384)));
    assert_eq!(root.value(0, LARGEST), Some(Value::Null));
}

#[test]
fn node_children_expand_into_their_own_tables() {
    let root = build(summary(vec![
        objects_of_type("Textures", "0"),
        objects_of_type("Meshes", "1"),
    ]));
    assert!(root.is_group_expandable(1, 0));

    let meshes = root.create_group_table(1).unwrap().unwrap();
    assert_eq!(meshes.name(), "Summary.Meshes");
    assert_eq!(meshes.row_count(), 2);
    assert_eq!(meshes.value_string(1, NAME), "mesh_b");
    assert!(Rc::ptr_eq(&meshes, &root.create_group_table(1).unwrap().unwrap()));
}

#[test]
fn failing_conditions_drop_children() {
    let root = build(summary(vec![
        objects_of_type("Textures", "0"),
        hidden_unless("1", Operator::Equal, "0"),
        objects_of_type("Meshes", "1"),
        hidden_unless("big.size", Operator::Greater, "100"),
        hidden_unless("big.size", Operator::Greater, "1000"),
    ]));

    assert_eq!(root.valid_child_indices(), Some(&[0, 2, 3][..]));
    assert_eq!(root.row_count(), 3);
    assert_eq!(root.value(1, NAME), Some(Value::from("Meshes")));
    assert_eq!(root.value(2, NAME), Some(Value::from("guarded")));
    assert!(!root.is_group_expandable(2, 0));
    assert!(root.create_group_table(2).unwrap().is_none());
}

#[test]
fn conditions_on_unresolved_identifiers_fail_quietly() {
    common::capture_logs();
    let root = build(summary(vec![
        hidden_unless("nothing.size", Operator::Equal, "0"),
        objects_of_type("Textures", "0"),
    ]));
    // The unresolved side becomes its own text, which never equals a number.
    assert_eq!(root.valid_child_indices(), Some(&[1][..]));
    assert_eq!(common::logged_errors(), Vec::<String>::new());
}

#[test]
fn node_entries_resolve_selects_in_scope() {
    let root = build(summary(vec![objects_of_type("Textures", "0")
        .with_column(ColumnDef::new("largest").with_value(expr("big.name")))]));
    assert_eq!(root.value(0, LARGEST), Some(Value::from("mesh_b")));
}

#[test]
fn node_columns_are_read_only() {
    let root = build(summary(vec![objects_of_type("Textures", "0")]));
    assert_eq!(
        root.set_cell(0, NAME, Value::from("renamed")),
        Err(ViewError::ReadOnly {
            column: "name".to_string(),
        })
    );
    assert_eq!(root.value(0, NAME), Some(Value::from("Textures")));
}

#[test]
fn local_selects_on_node_children_are_reported() {
    common::capture_logs();
    let with_local = objects_of_type("Textures", "0").with_local_select_set(
        SelectSetDef::new().with_select(SelectDef::new("types", "Types")),
    );
    let root = build(summary(vec![with_local]));
    assert_eq!(root.row_count(), 1);
    assert!(common::has_error_containing("cannot have local selects"));
}
