//! Runtime values and their conversions.

use std::{fmt::Write as _, sync::Arc};

use scriptbridge_core::{Channel, GuestException, GuestValue};

use crate::ast::FunctionDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    SendResult,
    Input,
    Str,
    Len,
    Int,
    ReportException,
    Plot,
    PlotRaw,
    Scene,
    ReadFile,
    WriteFile,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Self::Print,
            "send_result" => Self::SendResult,
            "input" => Self::Input,
            "str" => Self::Str,
            "len" => Self::Len,
            "int" => Self::Int,
            "report_exception" => Self::ReportException,
            "plot" => Self::Plot,
            "plot_raw" => Self::PlotRaw,
            "scene" => Self::Scene,
            "read_file" => Self::ReadFile,
            "write_file" => Self::WriteFile,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::SendResult => "send_result",
            Self::Input => "input",
            Self::Str => "str",
            Self::Len => "len",
            Self::Int => "int",
            Self::ReportException => "report_exception",
            Self::Plot => "plot",
            Self::PlotRaw => "plot_raw",
            Self::Scene => "scene",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Function(Arc<FunctionDef>),
    Coroutine(Arc<FunctionDef>, Vec<Value>),
    Builtin(Builtin),
    ExceptionClass(String),
    Exception(GuestException),
    Module(String),
    Stream(Channel),
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Function(_) => "function",
            Self::Coroutine(..) => "coroutine",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::ExceptionClass(_) => "type",
            Self::Exception(exc) => &exc.kind,
            Self::Module(_) => "module",
            Self::Stream(_) => "TextIOWrapper",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    /// `str(value)`.
    pub fn display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Exception(exc) => exc.message.clone(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => float_repr(*f),
            Self::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::List(items) => {
                let inner: Vec<_> = items.iter().map(Self::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Dict(entries) => {
                let mut out = String::from("{");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: {}", Self::Str(key.clone()).repr(), value.repr());
                }
                out.push('}');
                out
            }
            Self::Function(def) => format!("<function {}>", def.name),
            Self::Coroutine(def, _) => format!("<coroutine object {}>", def.name),
            Self::Builtin(b) => format!("<built-in function {}>", b.name()),
            Self::ExceptionClass(name) => format!("<class '{name}'>"),
            Self::Exception(exc) => format!("{}({})", exc.kind, Self::Str(exc.message.clone()).repr()),
            Self::Module(name) => format!("<module '{name}'>"),
            Self::Stream(Channel::Stdout) => "<stdout>".to_string(),
            Self::Stream(Channel::Stderr) => "<stderr>".to_string(),
        }
    }

    /// Convert for the result channel. Values with no data form become
    /// [`GuestValue::Opaque`].
    pub fn to_guest(&self) -> GuestValue {
        match self {
            Self::None => GuestValue::Null,
            Self::Bool(b) => GuestValue::Bool(*b),
            Self::Int(n) => GuestValue::Int(*n),
            Self::Float(f) => GuestValue::Float(*f),
            Self::Str(s) => GuestValue::Str(s.clone()),
            Self::List(items) => GuestValue::List(items.iter().map(Self::to_guest).collect()),
            Self::Dict(entries) => GuestValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_guest()))
                    .collect(),
            ),
            other => GuestValue::Opaque(other.type_name().to_string()),
        }
    }

    pub fn from_guest(value: GuestValue) -> Self {
        match value {
            GuestValue::Null | GuestValue::Opaque(_) => Self::None,
            GuestValue::Bool(b) => Self::Bool(b),
            GuestValue::Int(n) => Self::Int(n),
            GuestValue::Float(f) => Self::Float(f),
            GuestValue::Str(s) => Self::Str(s),
            GuestValue::List(items) => Self::List(items.into_iter().map(Self::from_guest).collect()),
            GuestValue::Map(entries) => Self::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_guest(v)))
                    .collect(),
            ),
        }
    }

    /// Equality as `==` sees it: numbers compare across int and float.
    #[allow(clippy::cast_precision_loss)]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Bool(a), Self::Int(b)) | (Self::Int(b), Self::Bool(a)) => i64::from(*a) == *b,
            _ => self == other,
        }
    }
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_style_repr() {
        let value = Value::Dict(vec![
            ("a".into(), Value::List(vec![Value::Int(1), Value::Float(2.0)])),
            ("b".into(), Value::Str("it's".into())),
            ("c".into(), Value::None),
        ]);
        assert_eq!(value.repr(), r"{'a': [1, 2.0], 'b': 'it\'s', 'c': None}");
        assert_eq!(Value::Str("plain".into()).display(), "plain");
        assert_eq!(Value::Float(0.5).display(), "0.5");
    }

    #[test]
    fn test_guest_conversion() {
        let value = Value::List(vec![Value::Bool(true), Value::Builtin(Builtin::Print)]);
        assert_eq!(
            value.to_guest(),
            GuestValue::List(vec![
                GuestValue::Bool(true),
                GuestValue::Opaque("builtin_function_or_method".into()),
            ])
        );
        let back = Value::from_guest(GuestValue::Map(vec![("k".into(), GuestValue::Int(3))]));
        assert_eq!(back, Value::Dict(vec![("k".into(), Value::Int(3))]));
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
        assert!(!Value::Str("1".into()).loose_eq(&Value::Int(1)));
    }
}
