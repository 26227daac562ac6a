use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memview_columnar::{ColumnSchema, ColumnType, ColumnarTableBuilder, Table, Value};
use memview_view::{
    ColumnComparison, Expression, Operator, Select, SelectCachePolicy, WhereCombine, WhereUnion,
};
use std::rc::Rc;
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("MEMVIEW_SELECT_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (10_000..=5_000_000).contains(&v))
        .unwrap_or(200_000)
}

/// `Objects` with `rows` rows spread over `types` type indices, and the `Types` table.
fn build_tables(rows: usize, types: usize) -> (Rc<dyn Table>, Rc<dyn Table>) {
    let mut type_builder =
        ColumnarTableBuilder::new("Types", vec![ColumnSchema::new("index", ColumnType::Int)]);
    for index in 0..types {
        type_builder.append_row(&[Value::Int(index as i64)]).unwrap();
    }

    let mut object_builder = ColumnarTableBuilder::new(
        "Objects",
        vec![
            ColumnSchema::new("typeIndex", ColumnType::Int),
            ColumnSchema::new("size", ColumnType::Int),
        ],
    );
    for row in 0..rows {
        object_builder
            .append_row(&[
                Value::Int((row % types) as i64),
                Value::Int((row % 4096) as i64),
            ])
            .unwrap();
    }

    (
        Rc::new(object_builder.finalize().unwrap()),
        Rc::new(type_builder.finalize().unwrap()),
    )
}

fn objects_by_type(
    objects: &Rc<dyn Table>,
    types: &Rc<dyn Table>,
    policy: SelectCachePolicy,
) -> Select {
    let select = Select::new("obj", Rc::clone(objects), None, policy);
    let mut where_ = WhereUnion::new(WhereCombine::All);
    where_.push(ColumnComparison {
        table: Rc::clone(objects),
        column: 0,
        op: Operator::Equal,
        value: Expression::Column {
            table: Rc::clone(types),
            column: 0,
        },
    });
    select.set_where(where_);
    select
}

fn bench_select_cache(c: &mut Criterion) {
    let rows = bench_rows();
    let (objects, types) = build_tables(rows, 64);
    // Group tables visited out of order, as when a user expands rows back and forth.
    let visits = [0usize, 17, 0, 17, 42, 0, 42, 17];

    let mut group = c.benchmark_group("select_cache");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements((rows * visits.len()) as u64));

    for (label, policy) in [
        ("single_slot", SelectCachePolicy::SingleSlot),
        ("per_driving_row", SelectCachePolicy::PerDrivingRow),
    ] {
        let select = objects_by_type(&objects, &types, policy);
        group.bench_with_input(BenchmarkId::new(label, rows), &rows, |b, _| {
            b.iter(|| {
                for &row in &visits {
                    black_box(select.matching_indices(row).len());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select_cache);
criterion_main!(benches);
