use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A host-provided callable usable from templates
pub type Function = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Capability interface for opaque host values: the evaluator resolves named
/// fields and invokes named methods through it without any schema up front.
pub trait Object: Send + Sync {
    /// Resolve a named field, or None when the object has no such field
    fn field(&self, name: &str) -> Option<Value>;

    /// Whether the object exposes a method with this name
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    /// Invoke a named method with evaluated arguments
    fn invoke(&self, name: &str, _args: &[Value]) -> Result<Value> {
        Err(Error::call(name, "no such method"))
    }

    /// Type label used in diagnostics
    fn type_name(&self) -> &str {
        "object"
    }

    /// Text emitted when the object itself is printed
    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// Uniform representation of any value the evaluator touches
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    Object(Arc<dyn Object>),
    Function(Function),
}

impl Value {
    /// Type label used in diagnostics
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Object(obj) => obj.type_name(),
            Value::Function(_) => "function",
        }
    }

    /// Truthiness: nil, false, zero and empty collections are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Sequence(seq) => !seq.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn mismatch(op: &str, left: &Value, right: &Value) -> Error {
        Error::TypeMismatch(format!(
            "cannot apply {} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))
    }

    fn overflow(op: &str) -> Error {
        Error::TypeMismatch(format!("integer overflow in {}", op))
    }

    /// Addition: numeric with Int/Float promotion, or string concatenation
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| Self::overflow("+")),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                _ => Err(Self::mismatch("+", self, other)),
            },
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(*b)
                .map(Value::Int)
                .ok_or_else(|| Self::overflow("-")),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a - b)),
                _ => Err(Self::mismatch("-", self, other)),
            },
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or_else(|| Self::overflow("*")),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a * b)),
                _ => Err(Self::mismatch("*", self, other)),
            },
        }
    }

    /// Division: integral when both operands are Int, promoting otherwise
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(Error::DivisionByZero)
                } else {
                    // i64::MIN / -1 has no representable result
                    a.checked_div(*b)
                        .map(Value::Int)
                        .ok_or_else(|| Self::overflow("/"))
                }
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => Err(Self::mismatch("/", self, other)),
            },
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(Error::DivisionByZero)
                } else {
                    a.checked_rem(*b)
                        .map(Value::Int)
                        .ok_or_else(|| Self::overflow("%"))
                }
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a % b)),
                _ => Err(Self::mismatch("%", self, other)),
            },
        }
    }

    /// Arithmetic negation
    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Self::overflow("-")),
            Value::Float(n) => Ok(Value::Float(-n)),
            _ => Err(Error::TypeMismatch(format!(
                "cannot negate {}",
                self.type_name()
            ))),
        }
    }

    /// Ordering comparison: numeric or lexicographic string operands only
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b).ok_or_else(|| {
                Error::TypeMismatch("cannot order NaN operands".to_string())
            });
        }
        if let (Value::String(a), Value::String(b)) = (self, other) {
            return Ok(a.cmp(b));
        }
        Err(Self::mismatch("ordering", self, other))
    }
}

// Equality is defined for all value kinds; cross-kind comparisons are
// unequal except Int/Float, which compare numerically.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Sequence(seq) => {
                f.write_str("[")?;
                for (i, item) in seq.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Mapping(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => f.write_str(&obj.render()),
            Value::Function(_) => f.write_str("<function>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Sequence(seq) => f.debug_tuple("Sequence").field(seq).finish(),
            Value::Mapping(map) => {
                write!(f, "Mapping(")?;
                f.debug_map().entries(map.iter()).finish()?;
                f.write_str(")")
            }
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Value::Function(_) => f.write_str("Function"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(seq: Vec<Value>) -> Self {
        Value::Sequence(seq)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Mapping(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Sequence(seq) => {
                serde_json::Value::Array(seq.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Mapping(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Object(obj) => serde_json::Value::String(obj.render()),
            Value::Function(_) => serde_json::Value::Null,
        }
    }
}
