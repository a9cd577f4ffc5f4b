use std::fmt;
use std::sync::Arc;

use im::Vector;

use crate::dispatch::VariadicFn;
use crate::error::SorrelError;
use crate::seq::SeqRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FnArity {
    min: usize,
    max: Option<usize>,
}

impl FnArity {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        if let Some(max_val) = max {
            assert!(min <= max_val, "min arity cannot exceed max arity");
        }
        Self { min, max }
    }

    pub fn exact(count: usize) -> Self {
        Self::new(count, Some(count))
    }

    pub fn at_least(min: usize) -> Self {
        Self::new(min, None)
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self::new(min, Some(max))
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }
}

/// Host function with a fixed or bounded argument count. Variadic guest
/// functions go through [`VariadicFn`] instead.
pub struct NativeFn {
    func: Box<dyn Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync>,
    arity: FnArity,
    debug_name: Option<Arc<str>>,
}

impl NativeFn {
    pub fn new(
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
            arity,
            debug_name: None,
        }
    }

    pub fn with_name(
        arity: FnArity,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        let mut nf = Self::new(arity, func);
        nf.debug_name = Some(name.into().into());
        nf
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, SorrelError> {
        (self.func)(args)
    }

    pub fn arity(&self) -> FnArity {
        self.arity
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }
}

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Nil,
    List(Vector<Value>),
    Vector(Vector<Value>),
    Seq(SeqRef),
    Func(Arc<NativeFn>),
    Variadic(Arc<VariadicFn>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "str",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Seq(_) => "seq",
            Value::Func(_) | Value::Variadic(_) => "fn",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_) | Value::Variadic(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Variadic(a), Value::Variadic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn write_callable(f: &mut fmt::Formatter<'_>, name: Option<&str>) -> fmt::Result {
    match name {
        Some(name) => write!(f, "#<fn {}>", name),
        None => write!(f, "#<fn>"),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", escape_string_fragment(s)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Vector(items) => f.debug_list().entries(items).finish(),
            Value::Seq(_) => write!(f, "<seq>"),
            Value::Func(func) => write_callable(f, func.debug_name()),
            Value::Variadic(func) => write_callable(f, func.debug_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) => write!(f, "\"{}\"", escape_string_fragment(s)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(" "))
            }
            Value::Vector(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(" "))
            }
            Value::Seq(_) => write!(f, "<seq>"),
            Value::Func(func) => write_callable(f, func.debug_name()),
            Value::Variadic(func) => write_callable(f, func.debug_name()),
        }
    }
}

fn escape_string_fragment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
