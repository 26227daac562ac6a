use memview_columnar::TableError;

pub type ViewResult<T> = Result<T, ViewError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("out of range ({row} : [0, {count}[)")]
    RowOutOfRange { row: usize, count: usize },

    #[error("column {column} out of range for view table '{table}'")]
    ColumnOutOfRange { table: String, column: usize },

    #[error("cannot convert '{value}' to {to}")]
    Conversion { value: String, to: String },

    #[error("column '{column}' is already bound")]
    AlreadyBound { column: String },

    #[error("entry {row} of column '{column}' is already set")]
    EntryAlreadySet { column: String, row: usize },

    #[error("column '{column}' is read-only")]
    ReadOnly { column: String },

    #[error("column '{column}' is not bound")]
    Unbound { column: String },
}
