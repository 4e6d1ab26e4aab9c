use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Scalar cell types a driver row can carry.
///
/// The set mirrors what mainstream wire protocols hand back: integers,
/// floats, booleans, text, byte strings, timestamps and NULL. The enum is
/// closed; drivers must map exotic column types onto one of these or fail
/// the row conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Cell {
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "int",
            Cell::Float(_) => "float",
            Cell::Text(_) => "text",
            Cell::Bytes(_) => "bytes",
            Cell::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Float(a), Cell::Float(b)) => a.to_bits() == b.to_bits(),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Bytes(a), Cell::Bytes(b)) => a == b,
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Default for Cell {
    fn default() -> Self {
        Cell::Null
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Cell::Timestamp(t) => write!(f, "{}", t),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(v: Vec<u8>) -> Self {
        Cell::Bytes(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(v: NaiveDateTime) -> Self {
        Cell::Timestamp(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Cell::Float(1.5), Cell::Float(1.5));
        assert_ne!(Cell::Float(0.0), Cell::Float(-0.0));
        assert_eq!(Cell::Float(f64::NAN), Cell::Float(f64::NAN));
    }

    #[test]
    fn test_no_cross_type_equality() {
        assert_ne!(Cell::Int(1), Cell::Float(1.0));
        assert_ne!(Cell::Text("1".into()), Cell::Int(1));
        assert_ne!(Cell::Bytes(b"a".to_vec()), Cell::Text("a".into()));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Cell::Null.type_name(), "null");
        assert_eq!(Cell::from(7i64).type_name(), "int");
        assert_eq!(Cell::from("x").type_name(), "text");
        assert_eq!(Cell::Bytes(vec![1]).type_name(), "bytes");
    }
}
