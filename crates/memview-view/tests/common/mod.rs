#![allow(dead_code)]

use log::{Level, LevelFilter, Log, Metadata, Record};
use memview_columnar::{ColumnSchema, ColumnType, ColumnarTableBuilder, Database, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Collects log records per test thread so tests can assert on diagnostics.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

/// Install the capturing logger (once per test binary) and clear this thread's records.
pub fn capture_logs() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
    RECORDS.with(|records| records.borrow_mut().clear());
}

pub fn logged_errors() -> Vec<String> {
    RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, message)| message.clone())
            .collect()
    })
}

pub fn has_error_containing(needle: &str) -> bool {
    logged_errors().iter().any(|message| message.contains(needle))
}

pub const TYPES: [(i64, &str); 3] = [(0, "Texture"), (1, "Mesh"), (2, "Shader")];

/// (address, typeIndex, size, name)
pub const OBJECTS: [(u64, i64, i64, &str); 6] = [
    (0x1000, 0, 64, "tex_a"),
    (0x2000, 1, 128, "mesh_a"),
    (0x3000, 0, 32, "tex_b"),
    (0x4000, 2, 16, "shader_a"),
    (0x5000, 0, 8, "tex_c"),
    (0x6000, 1, 256, "mesh_b"),
];

pub const OBJECT_ADDRESS: usize = 0;
pub const OBJECT_TYPE_INDEX: usize = 1;
pub const OBJECT_SIZE: usize = 2;
pub const OBJECT_NAME: usize = 3;

/// A small snapshot with a `Types` table and an `Objects` table referencing it by index.
pub fn snapshot() -> Rc<Database> {
    let mut types = ColumnarTableBuilder::new(
        "Types",
        vec![
            ColumnSchema::new("index", ColumnType::Int),
            ColumnSchema::new("name", ColumnType::Text),
        ],
    );
    for (index, name) in TYPES {
        types.append_row(&[Value::Int(index), name.into()]).unwrap();
    }

    let mut objects = ColumnarTableBuilder::new(
        "Objects",
        vec![
            ColumnSchema::new("address", ColumnType::UInt),
            ColumnSchema::new("typeIndex", ColumnType::Int),
            ColumnSchema::new("size", ColumnType::Int),
            ColumnSchema::new("name", ColumnType::Text),
        ],
    );
    for (address, type_index, size, name) in OBJECTS {
        objects
            .append_row(&[
                Value::UInt(address),
                Value::Int(type_index),
                Value::Int(size),
                name.into(),
            ])
            .unwrap();
    }

    let mut db = Database::new("snapshot");
    db.add_table(types.finalize().unwrap()).unwrap();
    db.add_table(objects.finalize().unwrap()).unwrap();
    Rc::new(db)
}
