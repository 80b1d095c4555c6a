use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{ast::FunctionDecl, diagnostics::Diagnostic};

/// Signature shared by host builtins and caller-registered builtins.
pub type RuntimeFn = Rc<dyn Fn(&[Value]) -> Result<Value, Diagnostic>>;

/// A runtime value. Cheap to clone; the payload is shared behind `Rc`.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

pub enum ValueKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Function(FunctionValue),
    Null,
}

#[derive(Clone)]
pub enum FunctionValue {
    Native(NativeFn),
    Declared(Rc<FunctionDecl>),
}

#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    pub callback: RuntimeFn,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Str(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(values))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Self::new(ValueKind::Object(entries))
    }

    pub fn native_fn(name: impl Into<String>, callback: RuntimeFn) -> Self {
        Self::new(ValueKind::Function(FunctionValue::Native(NativeFn {
            name: name.into(),
            callback,
        })))
    }

    pub fn declared_fn(decl: Rc<FunctionDecl>) -> Self {
        Self::new(ValueKind::Function(FunctionValue::Declared(decl)))
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0, ValueKind::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::Bool(b) => *b,
            ValueKind::Null => false,
            ValueKind::Number(n) => *n != 0.0,
            ValueKind::Str(s) => !s.is_empty(),
            ValueKind::Array(values) => !values.is_empty(),
            ValueKind::Object(map) => !map.is_empty(),
            ValueKind::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Number(_) => "number",
            ValueKind::Str(_) => "string",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Array(_) => "array",
            ValueKind::Object(_) => "object",
            ValueKind::Function(_) => "function",
            ValueKind::Null => "null",
        }
    }
}

/// Renders an f64 the way the language displays numbers: integral values
/// print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Number(n) => write!(f, "{}", format_number(*n)),
            ValueKind::Str(s) => write!(f, "{s}"),
            ValueKind::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            ValueKind::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            ValueKind::Object(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            ValueKind::Function(_) => write!(f, "<function>"),
            ValueKind::Null => write!(f, "null"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Str(s) => write!(f, "\"{s}\""),
            ValueKind::Function(FunctionValue::Native(native)) => {
                write!(f, "<native fn {}>", native.name)
            }
            ValueKind::Function(FunctionValue::Declared(decl)) => {
                write!(f, "<fn {}>", decl.name)
            }
            _ => write!(f, "{self}"),
        }
    }
}
