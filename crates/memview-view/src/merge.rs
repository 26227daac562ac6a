use memview_columnar::{Table, Value};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// A reduction of a contiguous row range of one column into a single value.
pub trait Merge: fmt::Debug {
    fn merge(&self, source: &dyn Table, column: usize, rows: Range<usize>) -> Value;
}

/// Built-in merge algorithms. All of them skip null cells and yield `Null` for an empty input.
#[derive(Clone, Debug)]
pub enum MergeAlgorithm {
    /// Numeric sum. Stays integral unless a float is involved.
    Sum,
    Min,
    Max,
    /// First non-null value.
    First,
    /// Number of non-null values.
    Count,
    /// Display strings of the non-null values joined by `separator`.
    Concat { separator: String },
    Custom(Rc<dyn Merge>),
}

impl MergeAlgorithm {
    pub fn custom(merge: impl Merge + 'static) -> Self {
        MergeAlgorithm::Custom(Rc::new(merge))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergeAlgorithm::Sum => "sum",
            MergeAlgorithm::Min => "min",
            MergeAlgorithm::Max => "max",
            MergeAlgorithm::First => "first",
            MergeAlgorithm::Count => "count",
            MergeAlgorithm::Concat { .. } => "concat",
            MergeAlgorithm::Custom(_) => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "sum" => Some(MergeAlgorithm::Sum),
            "min" => Some(MergeAlgorithm::Min),
            "max" => Some(MergeAlgorithm::Max),
            "first" => Some(MergeAlgorithm::First),
            "count" => Some(MergeAlgorithm::Count),
            "concat" => Some(MergeAlgorithm::Concat {
                separator: ", ".to_string(),
            }),
            _ => None,
        }
    }
}

impl PartialEq for MergeAlgorithm {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MergeAlgorithm::Concat { separator: a }, MergeAlgorithm::Concat { separator: b }) => {
                a == b
            }
            (MergeAlgorithm::Custom(a), MergeAlgorithm::Custom(b)) => Rc::ptr_eq(a, b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

fn non_null(source: &dyn Table, column: usize, rows: Range<usize>) -> impl Iterator<Item = Value> + '_ {
    rows.filter_map(move |row| source.value(row, column))
        .filter(|value| !value.is_null())
}

fn extreme(values: impl Iterator<Item = Value>, keep: Ordering) -> Value {
    values
        .reduce(|best, value| match value.compare(&best) {
            Some(ordering) if ordering == keep => value,
            _ => best,
        })
        .unwrap_or_default()
}

fn sum(values: impl Iterator<Item = Value>) -> Value {
    let mut int: i128 = 0;
    let mut float = 0.0;
    let mut any = false;
    let mut any_float = false;
    let mut all_unsigned = true;
    for value in values {
        match value {
            Value::Int(v) => {
                int += i128::from(v);
                all_unsigned = false;
            }
            Value::UInt(v) => int += i128::from(v),
            Value::Float(v) => {
                float += v.0;
                any_float = true;
            }
            _ => continue,
        }
        any = true;
    }
    if !any {
        Value::Null
    } else if any_float {
        Value::from(float + int as f64)
    } else if all_unsigned {
        u64::try_from(int).map_or_else(|_| Value::from(int as f64), Value::UInt)
    } else {
        i64::try_from(int).map_or_else(|_| Value::from(int as f64), Value::Int)
    }
}

impl Merge for MergeAlgorithm {
    fn merge(&self, source: &dyn Table, column: usize, rows: Range<usize>) -> Value {
        let values = non_null(source, column, rows.clone());
        match self {
            MergeAlgorithm::Sum => sum(values),
            MergeAlgorithm::Min => extreme(values, Ordering::Less),
            MergeAlgorithm::Max => extreme(values, Ordering::Greater),
            MergeAlgorithm::First => values.into_iter().next().unwrap_or_default(),
            MergeAlgorithm::Count => {
                let count = values.count();
                if count == 0 {
                    Value::Null
                } else {
                    Value::UInt(count as u64)
                }
            }
            MergeAlgorithm::Concat { separator } => {
                let parts: Vec<String> = values.map(|value| value.to_string()).collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::from(parts.join(separator))
                }
            }
            MergeAlgorithm::Custom(merge) => merge.merge(source, column, rows),
        }
    }
}
