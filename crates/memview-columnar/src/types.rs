#![forbid(unsafe_code)]

use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Logical type of a physical or view column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    Int,
    UInt,
    Float,
    Text,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::UInt => "uint",
            ColumnType::Float => "float",
            ColumnType::Text => "string",
        }
    }

    /// Resolve a schema type name. Accepts the width-specific aliases used by snapshot
    /// schemas (`long`, `ulong`, `double`, ...), all of which collapse to one logical type.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "bool" => Some(ColumnType::Bool),
            "int" | "long" | "short" => Some(ColumnType::Int),
            "uint" | "ulong" | "ushort" => Some(ColumnType::UInt),
            "float" | "double" => Some(ColumnType::Float),
            "string" => Some(ColumnType::Text),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::UInt | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
///
/// `Null` is the value of missing cells and of unmatched view rows; it sorts before every
/// other value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    Text(Arc<str>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::UInt(_) => Some(ColumnType::UInt),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Compare two values.
    ///
    /// Numeric values compare across `Int`/`UInt`/`Float`. Values of unrelated types are
    /// incomparable and yield `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::UInt(a), Value::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::Text(a), Value::Text(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (a, b) => {
                let a = a.as_f64()?;
                let b = b.as_f64()?;
                Some(OrderedFloat(a).cmp(&OrderedFloat(b)))
            }
        }
    }

    /// Convert to another column type. `Null` converts to `Null` for every type.
    pub fn cast(&self, to: ColumnType) -> Option<Value> {
        if self.is_null() || self.column_type() == Some(to) {
            return Some(self.clone());
        }
        match to {
            ColumnType::Text => Some(Value::from(self.to_string())),
            ColumnType::Bool => match self {
                Value::Int(v) => Some(Value::Bool(*v != 0)),
                Value::UInt(v) => Some(Value::Bool(*v != 0)),
                Value::Float(v) => Some(Value::Bool(v.0 != 0.0)),
                Value::Text(s) => Value::parse(s, ColumnType::Bool),
                _ => None,
            },
            ColumnType::Int => match self {
                Value::Bool(b) => Some(Value::Int(i64::from(*b))),
                Value::UInt(v) => i64::try_from(*v).ok().map(Value::Int),
                Value::Float(v) if v.0.is_finite() => Some(Value::Int(v.0.trunc() as i64)),
                Value::Text(s) => Value::parse(s, ColumnType::Int),
                _ => None,
            },
            ColumnType::UInt => match self {
                Value::Bool(b) => Some(Value::UInt(u64::from(*b))),
                Value::Int(v) => u64::try_from(*v).ok().map(Value::UInt),
                Value::Float(v) if v.0.is_finite() && v.0 >= 0.0 => {
                    Some(Value::UInt(v.0.trunc() as u64))
                }
                Value::Text(s) => Value::parse(s, ColumnType::UInt),
                _ => None,
            },
            ColumnType::Float => match self {
                Value::Bool(b) => Some(Value::from(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) => Value::parse(s, ColumnType::Float),
                other => other.as_f64().map(Value::from),
            },
        }
    }

    /// Parse schema text into a value of the given type.
    ///
    /// Unsigned values also accept a `0x` prefix since most of them are addresses.
    pub fn parse(text: &str, ty: ColumnType) -> Option<Value> {
        let text = text.trim();
        match ty {
            ColumnType::Bool => {
                if text.eq_ignore_ascii_case("true") {
                    Some(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            ColumnType::Int => text.parse::<i64>().ok().map(Value::Int),
            ColumnType::UInt => {
                let parsed = match text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => text.parse::<u64>().ok(),
                };
                parsed.map(Value::UInt)
            }
            ColumnType::Float => text.parse::<f64>().ok().map(Value::from),
            ColumnType::Text => Some(Value::from(text)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", v.0),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(OrderedFloat(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_compare_across_types() {
        assert_eq!(Value::Int(-1).compare(&Value::UInt(0)), Some(Ordering::Less));
        assert_eq!(Value::UInt(3).compare(&Value::from(2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(4).compare(&Value::from(4.0)), Some(Ordering::Equal));
    }

    #[test]
    fn null_sorts_first_and_unrelated_types_are_incomparable() {
        assert_eq!(Value::Null.compare(&Value::from("a")), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Null), Some(Ordering::Greater));
        assert_eq!(Value::from("1").compare(&Value::Int(1)), None);
        assert_eq!(Value::Bool(true).compare(&Value::Int(1)), None);
    }

    #[test]
    fn parse_accepts_signs_and_hex_addresses() {
        assert_eq!(Value::parse("+76", ColumnType::Int), Some(Value::Int(76)));
        assert_eq!(Value::parse("-1", ColumnType::Int), Some(Value::Int(-1)));
        assert_eq!(
            Value::parse("0x1F", ColumnType::UInt),
            Some(Value::UInt(31))
        );
        assert_eq!(Value::parse("TRUE", ColumnType::Bool), Some(Value::Bool(true)));
        assert_eq!(Value::parse("nope", ColumnType::Float), None);
    }

    #[test]
    fn cast_converts_between_logical_types() {
        assert_eq!(Value::Int(7).cast(ColumnType::Text), Some(Value::from("7")));
        assert_eq!(Value::from(3.9).cast(ColumnType::Int), Some(Value::Int(3)));
        assert_eq!(Value::Int(-3).cast(ColumnType::UInt), None);
        assert_eq!(Value::Null.cast(ColumnType::Bool), Some(Value::Null));
    }

    #[test]
    fn type_names_collapse_width_aliases() {
        assert_eq!(ColumnType::from_name("ulong"), Some(ColumnType::UInt));
        assert_eq!(ColumnType::from_name("double"), Some(ColumnType::Float));
        assert_eq!(ColumnType::from_name("DiffResult"), None);
    }
}
