//! Runtime type references and argument values.
//!
//! # Design
//! Service methods are described at startup rather than discovered through
//! reflection, so declared types travel as `TypeRef` values. Converter and
//! adapter factories match on them. Argument values travel as `Arg`, a
//! closed set of shapes that covers URL parameters, JSON payloads and
//! prebuilt bodies, with `Opaque` as an escape hatch for values only a
//! custom converter understands.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::http::RequestBody;

/// Raw name of the default call abstraction.
pub const CALL: &str = "Call";

/// Raw name of the parsed response wrapper.
pub const RESPONSE: &str = "Response";

/// A converted value whose concrete type is only known to the caller.
pub type AnyValue = Box<dyn Any + Send>;

/// A declared parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// `()`: "returns nothing" as a method return type, "discard the body"
    /// as a call's response type.
    Unit,
    Named { id: TypeId, name: &'static str },
    Generic { raw: &'static str, args: Vec<TypeRef> },
    /// An unbound type parameter such as `T`.
    Variable(&'static str),
    Wildcard,
}

impl TypeRef {
    /// `()` maps to `Unit`; every other type is `Named`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            return TypeRef::Unit;
        }
        TypeRef::Named {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn generic(raw: &'static str, args: Vec<TypeRef>) -> Self {
        TypeRef::Generic { raw, args }
    }

    /// `Call<inner>`.
    pub fn call(inner: TypeRef) -> Self {
        TypeRef::generic(CALL, vec![inner])
    }

    /// `Response<inner>`.
    pub fn response(inner: TypeRef) -> Self {
        TypeRef::generic(RESPONSE, vec![inner])
    }

    pub fn variable(name: &'static str) -> Self {
        TypeRef::Variable(name)
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        match self {
            TypeRef::Unit => TypeId::of::<T>() == TypeId::of::<()>(),
            TypeRef::Named { id, .. } => *id == TypeId::of::<T>(),
            _ => false,
        }
    }

    /// The outermost type name, ignoring type arguments.
    pub fn raw_name(&self) -> &'static str {
        match self {
            TypeRef::Unit => "()",
            TypeRef::Named { name, .. } => *name,
            TypeRef::Generic { raw, .. } => *raw,
            TypeRef::Variable(name) => *name,
            TypeRef::Wildcard => "_",
        }
    }

    pub fn type_arg(&self, index: usize) -> Option<&TypeRef> {
        match self {
            TypeRef::Generic { args, .. } => args.get(index),
            _ => None,
        }
    }

    /// True when a type variable or wildcard appears anywhere inside.
    pub fn has_unresolved(&self) -> bool {
        match self {
            TypeRef::Variable(_) | TypeRef::Wildcard => true,
            TypeRef::Generic { args, .. } => args.iter().any(TypeRef::has_unresolved),
            TypeRef::Unit | TypeRef::Named { .. } => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Generic { raw, args } => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            other => f.write_str(other.raw_name()),
        }
    }
}

/// One argument supplied to a service method invocation.
#[derive(Clone)]
pub enum Arg {
    Null,
    Text(String),
    Json(serde_json::Value),
    Body(RequestBody),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Arg {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Arg::Opaque(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    /// Render the value for use in a URL or header, if it has a textual form.
    pub fn as_param(&self) -> Option<String> {
        match self {
            Arg::Text(s) => Some(s.clone()),
            Arg::Json(serde_json::Value::String(s)) => Some(s.clone()),
            Arg::Json(serde_json::Value::Null) | Arg::Null => None,
            Arg::Json(v) => Some(v.to_string()),
            Arg::Body(_) | Arg::Opaque(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Arg::Opaque(v) => v.downcast_ref(),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Text(_) => "text",
            Arg::Json(_) => "json",
            Arg::Body(_) => "request body",
            Arg::Opaque(_) => "opaque value",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("Null"),
            Arg::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Arg::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Arg::Body(b) => f.debug_tuple("Body").field(b).finish(),
            Arg::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

macro_rules! arg_from_display {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::Text(value.to_string())
            }
        })*
    };
}

arg_from_display!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, bool, char, f32, f64);

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        Arg::Json(value)
    }
}

impl From<RequestBody> for Arg {
    fn from(value: RequestBody) -> Self {
        Arg::Body(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Null, Into::into)
    }
}
