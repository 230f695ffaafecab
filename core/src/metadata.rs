//! Pre-resolved declarative metadata for service interfaces.
//!
//! # Design
//! The core never parses annotation syntax. Whoever declares a service
//! (hand-written code, a macro, a generated table) hands over one
//! `MethodMetadata` per endpoint: verb, relative URL template, declared
//! return type, and per-parameter role tags. The compiler validates and
//! binds these once per method.

use crate::http::HttpMethod;
use crate::types::TypeRef;

/// Per-parameter tags. Role tags are `Path`, `Query`, `Header` and `Body`;
/// `Marker` carries free-form hints for converter factories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamAnnotation {
    Path(String),
    Query(String),
    Header(String),
    Body,
    Marker(String),
}

impl ParamAnnotation {
    pub fn is_role(&self) -> bool {
        !matches!(self, ParamAnnotation::Marker(_))
    }
}

/// Per-method tags beyond verb and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodAnnotation {
    /// Hand the response body to the caller unbuffered.
    Streaming,
    /// A header sent with every request of this method.
    Header(String, String),
    Marker(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMetadata {
    pub ty: TypeRef,
    pub annotations: Vec<ParamAnnotation>,
}

impl ParamMetadata {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            annotations: Vec::new(),
        }
    }

    pub fn path<T: 'static>(name: &str) -> Self {
        Self::new(TypeRef::of::<T>()).with(ParamAnnotation::Path(name.to_string()))
    }

    pub fn query<T: 'static>(name: &str) -> Self {
        Self::new(TypeRef::of::<T>()).with(ParamAnnotation::Query(name.to_string()))
    }

    pub fn header<T: 'static>(name: &str) -> Self {
        Self::new(TypeRef::of::<T>()).with(ParamAnnotation::Header(name.to_string()))
    }

    pub fn body<T: 'static>() -> Self {
        Self::new(TypeRef::of::<T>()).with(ParamAnnotation::Body)
    }

    #[must_use]
    pub fn with(mut self, annotation: ParamAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Everything known about one service method before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMetadata {
    pub name: String,
    pub verb: HttpMethod,
    pub path: String,
    pub return_type: TypeRef,
    pub params: Vec<ParamMetadata>,
    pub annotations: Vec<MethodAnnotation>,
}

impl MethodMetadata {
    /// A method returning `Call<()>` until `returns` says otherwise.
    pub fn new(name: &str, verb: HttpMethod, path: &str) -> Self {
        Self {
            name: name.to_string(),
            verb,
            path: path.to_string(),
            return_type: TypeRef::call(TypeRef::Unit),
            params: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn get(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Get, path)
    }

    pub fn post(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Post, path)
    }

    pub fn put(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Put, path)
    }

    pub fn delete(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Delete, path)
    }

    #[must_use]
    pub fn returns(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    /// Shorthand for `returns(TypeRef::call(TypeRef::of::<T>()))`.
    #[must_use]
    pub fn returns_call<T: 'static>(self) -> Self {
        self.returns(TypeRef::call(TypeRef::of::<T>()))
    }

    #[must_use]
    pub fn param(mut self, param: ParamMetadata) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn annotate(mut self, annotation: MethodAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.annotations.contains(&MethodAnnotation::Streaming)
    }
}

/// A service interface: a name plus its declared methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodMetadata>,
}

impl ServiceDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods.iter().find(|m| m.name == name)
    }
}
