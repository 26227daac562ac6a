mod common;

use common::{OBJECT_SIZE, OBJECT_TYPE_INDEX};
use memview_columnar::{Database, Table, Value};
use memview_view::{
    ColumnComparison, Comparison, Expression, Operator, Select, SelectCachePolicy,
    SelectCacheStats, SelectSet, WhereCombine, WhereUnion,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn objects(db: &Database) -> Rc<dyn Table> {
    db.table("Objects").unwrap()
}

fn compare(table: &Rc<dyn Table>, column: usize, op: Operator, value: Expression) -> ColumnComparison {
    ColumnComparison {
        table: Rc::clone(table),
        column,
        op,
        value,
    }
}

fn select_with(
    db: &Database,
    max_row: Option<usize>,
    policy: SelectCachePolicy,
    combine: WhereCombine,
    comparisons: Vec<ColumnComparison>,
) -> Rc<Select> {
    let select = Rc::new(Select::new("obj", objects(db), max_row, policy));
    let mut where_ = WhereUnion::new(combine);
    for comparison in comparisons {
        where_.push(comparison);
    }
    assert!(select.set_where(where_));
    select
}

/// Objects whose type index equals `Types.index` at the driving row.
fn objects_by_type(db: &Database, policy: SelectCachePolicy) -> Rc<Select> {
    let objects = objects(db);
    let types = db.table("Types").unwrap();
    select_with(
        db,
        None,
        policy,
        WhereCombine::All,
        vec![compare(
            &objects,
            OBJECT_TYPE_INDEX,
            Operator::Equal,
            Expression::Column {
                table: types,
                column: 0,
            },
        )],
    )
}

#[test]
fn matching_indices_are_memoized_for_the_last_driving_row() {
    let db = common::snapshot();
    let select = objects_by_type(&db, SelectCachePolicy::SingleSlot);

    let first = select.matching_indices(0);
    assert_eq!(first.to_vec(), vec![0, 2, 4]);
    let again = select.matching_indices(0);
    assert!(Rc::ptr_eq(&first, &again));

    let other = select.matching_indices(1);
    assert_eq!(other.to_vec(), vec![1, 5]);
    assert!(!Rc::ptr_eq(&first, &other));

    // A single slot only remembers row 1 now.
    let back = select.matching_indices(0);
    assert_eq!(back.to_vec(), vec![0, 2, 4]);
    assert!(!Rc::ptr_eq(&first, &back));
    assert_eq!(select.stats(), SelectCacheStats { hits: 1, misses: 3 });
}

#[test]
fn per_driving_row_cache_keeps_every_row() {
    let db = common::snapshot();
    let select = objects_by_type(&db, SelectCachePolicy::PerDrivingRow);

    let row0 = select.matching_indices(0);
    let row2 = select.matching_indices(2);
    assert_eq!(row2.to_vec(), vec![3]);
    assert!(Rc::ptr_eq(&row0, &select.matching_indices(0)));
    assert!(Rc::ptr_eq(&row2, &select.matching_indices(2)));
    assert_eq!(select.stats(), SelectCacheStats { hits: 2, misses: 2 });
}

#[test]
fn where_values_spanning_rows_make_a_select_many_to_many() {
    let db = common::snapshot();
    let select = objects_by_type(&db, SelectCachePolicy::SingleSlot);
    assert!(select.is_many_to_many());
    assert_eq!(select.row_count(), None);

    assert_eq!(select.first_match(1), Some(1));
    assert_eq!(select.first_matches(0..4), vec![Some(0), Some(1), Some(3), None]);
    assert_eq!(select.first_match_row_count(), 3);
}

#[test]
fn max_row_truncates_matches() {
    let db = common::snapshot();
    let textures = [0, 2, 4];
    for max_row in 0..=4 {
        let objects = objects(&db);
        let select = select_with(
            &db,
            Some(max_row),
            SelectCachePolicy::SingleSlot,
            WhereCombine::All,
            vec![compare(
                &objects,
                OBJECT_TYPE_INDEX,
                Operator::Equal,
                Expression::constant(0),
            )],
        );
        let expected = &textures[..max_row.min(textures.len())];
        assert_eq!(select.matching_indices(0).to_vec(), expected.to_vec());
        assert!(!select.is_many_to_many());
    }
}

#[test]
fn select_without_where_matches_every_row() {
    let db = common::snapshot();
    let select = Select::new("obj", objects(&db), None, SelectCachePolicy::SingleSlot);
    assert!(!select.has_where());
    assert_eq!(select.row_count(), Some(6));
    assert_eq!(select.matching_indices(0).to_vec(), (0..6).collect::<Vec<_>>());
    assert_eq!(select.first_match(3), Some(3));
    assert_eq!(select.first_match_row_count(), 0);

    let capped = Select::new("obj", objects(&db), Some(2), SelectCachePolicy::SingleSlot);
    assert_eq!(capped.row_count(), Some(2));
    assert_eq!(capped.matching_indices(0).to_vec(), vec![0, 1]);
}

#[test]
fn writes_to_the_source_invalidate_the_memo() {
    let db = common::snapshot();
    let objects = objects(&db);
    let select = select_with(
        &db,
        None,
        SelectCachePolicy::SingleSlot,
        WhereCombine::All,
        vec![compare(
            &objects,
            OBJECT_SIZE,
            Operator::Greater,
            Expression::constant(30),
        )],
    );
    let before = select.matching_indices(0);
    assert_eq!(before.to_vec(), vec![0, 1, 2, 5]);

    objects.set_value(3, OBJECT_SIZE, Value::Int(40)).unwrap();
    let after = select.matching_indices(0);
    assert_eq!(after.to_vec(), vec![0, 1, 2, 3, 5]);
    assert_eq!(select.stats(), SelectCacheStats { hits: 0, misses: 2 });
}

#[test]
fn row_count_ignores_entries_older_than_the_source() {
    let db = common::snapshot();
    let objects = objects(&db);
    let select = select_with(
        &db,
        None,
        SelectCachePolicy::PerDrivingRow,
        WhereCombine::All,
        vec![compare(
            &objects,
            OBJECT_SIZE,
            Operator::Greater,
            Expression::constant(30),
        )],
    );
    assert_eq!(select.row_count(), None);
    select.matching_indices(0);
    assert_eq!(select.row_count(), Some(4));

    objects.set_value(3, OBJECT_SIZE, Value::Int(40)).unwrap();
    assert_eq!(select.row_count(), None);
    select.matching_indices(1);
    assert_eq!(select.row_count(), Some(5));
}

#[test]
fn where_clauses_combine_with_all_or_any() {
    let db = common::snapshot();
    let objects = objects(&db);
    let clauses = || {
        vec![
            compare(
                &objects,
                OBJECT_TYPE_INDEX,
                Operator::Equal,
                Expression::constant(1),
            ),
            compare(
                &objects,
                OBJECT_SIZE,
                Operator::GreaterEqual,
                Expression::constant(200),
            ),
        ]
    };

    let all = select_with(&db, None, SelectCachePolicy::SingleSlot, WhereCombine::All, clauses());
    assert_eq!(all.matching_indices(0).to_vec(), vec![5]);
    assert_eq!(all.first_match(0), Some(5));

    let any = select_with(&db, None, SelectCachePolicy::SingleSlot, WhereCombine::Any, clauses());
    assert_eq!(any.matching_indices(0).to_vec(), vec![1, 5]);
    assert_eq!(any.first_match(0), Some(1));
}

#[test]
fn set_operators_test_membership() {
    let db = common::snapshot();
    let objects = objects(&db);
    let select = select_with(
        &db,
        None,
        SelectCachePolicy::SingleSlot,
        WhereCombine::All,
        vec![compare(
            &objects,
            OBJECT_TYPE_INDEX,
            Operator::NotIn,
            Expression::constant(0),
        )],
    );
    assert_eq!(select.matching_indices(0).to_vec(), vec![1, 3, 5]);
    // Membership never depends on the driving row.
    assert!(!select.is_many_to_many());
}

#[test]
fn where_clauses_are_set_once() {
    let db = common::snapshot();
    let select = objects_by_type(&db, SelectCachePolicy::SingleSlot);
    assert!(!select.set_where(WhereUnion::new(WhereCombine::Any)));
    assert_eq!(select.where_clauses().map(WhereUnion::len), Some(1));
}

fn first_four(db: &Database) -> Rc<Select> {
    Rc::new(Select::new(
        "obj",
        objects(db),
        Some(4),
        SelectCachePolicy::SingleSlot,
    ))
}

#[test]
fn condition_filters_main_rows_by_position() {
    let db = common::snapshot();
    let obj = first_four(&db);
    let mut set = SelectSet::new();
    assert!(set.add(Rc::clone(&obj)));
    assert!(set.set_condition(Comparison::new(
        Expression::Select {
            select: Rc::clone(&obj),
            column: OBJECT_TYPE_INDEX,
        },
        Operator::NotEqual,
        Expression::constant(0),
    )));

    assert_eq!(set.main_rows().unwrap().to_vec(), vec![0, 1, 2, 3]);
    let passing = set.conditional_row_indices().unwrap();
    assert_eq!(passing.to_vec(), vec![1, 3]);
    assert!(Rc::ptr_eq(&passing, &set.conditional_row_indices().unwrap()));
    assert_eq!(set.row_count(), Some(2));
    assert_eq!(set.source_row(0), Some(1));
    assert_eq!(set.source_row(1), Some(3));
    assert_eq!(set.source_row(2), None);
}

#[test]
fn set_without_condition_passes_every_main_row() {
    let db = common::snapshot();
    let mut set = SelectSet::new();
    assert_eq!(set.main_rows(), None);
    assert_eq!(set.row_count(), None);

    set.add(first_four(&db));
    assert!(!set.has_condition());
    assert_eq!(set.conditional_row_indices(), None);
    assert_eq!(set.row_count(), Some(4));
    assert_eq!(set.source_row(2), Some(2));
}

#[test]
fn duplicate_select_names_are_rejected() {
    common::capture_logs();
    let db = common::snapshot();
    let mut set = SelectSet::new();
    assert!(set.add(first_four(&db)));
    assert!(!set.add(objects_by_type(&db, SelectCachePolicy::SingleSlot)));
    assert_eq!(set.len(), 1);
    assert!(common::has_error_containing("duplicate select 'obj'"));
}

#[test]
fn set_is_many_to_many_when_its_main_select_is() {
    let db = common::snapshot();
    let mut set = SelectSet::new();
    set.add(objects_by_type(&db, SelectCachePolicy::SingleSlot));
    assert!(set.is_many_to_many());

    let mut plain = SelectSet::new();
    plain.add(first_four(&db));
    assert!(!plain.is_many_to_many());
}
