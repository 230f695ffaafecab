//! Call adapters: turning the default call shape into a declared return shape.
//!
//! # Design
//! A method whose declared return type is `Call<T>` needs no adaptation;
//! the identity adapter hands the call back unchanged. Anything else
//! (a blocking wrapper, a future, a reactive type) is supplied by a
//! registered `CallAdapterFactory`. Factories are asked in registration
//! order and the identity adapter is consulted last.

use std::sync::Arc;

use crate::call::DynCall;
use crate::metadata::MethodAnnotation;
use crate::types::{AnyValue, TypeRef, CALL};

pub trait CallAdapter: Send + Sync {
    /// The body type the response converter must produce for this adapter.
    fn response_type(&self) -> &TypeRef;

    fn adapt(&self, call: DynCall) -> AnyValue;
}

pub trait CallAdapterFactory: Send + Sync {
    fn get(&self, return_type: &TypeRef, annotations: &[MethodAnnotation]) -> Option<Arc<dyn CallAdapter>>;
}

/// Matches `Call<T>` exactly and returns the call untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallAdapterFactory;

impl CallAdapterFactory for DefaultCallAdapterFactory {
    fn get(&self, return_type: &TypeRef, _annotations: &[MethodAnnotation]) -> Option<Arc<dyn CallAdapter>> {
        match return_type {
            TypeRef::Generic { raw, args } if *raw == CALL && args.len() == 1 => Some(Arc::new(IdentityCallAdapter {
                response_type: args[0].clone(),
            })),
            _ => None,
        }
    }
}

struct IdentityCallAdapter {
    response_type: TypeRef,
}

impl CallAdapter for IdentityCallAdapter {
    fn response_type(&self) -> &TypeRef {
        &self.response_type
    }

    fn adapt(&self, call: DynCall) -> AnyValue {
        Box::new(call)
    }
}

#[derive(Clone, Default)]
pub struct CallAdapterRegistry {
    factories: Vec<Arc<dyn CallAdapterFactory>>,
}

impl CallAdapterRegistry {
    pub fn new(factories: Vec<Arc<dyn CallAdapterFactory>>) -> Self {
        Self { factories }
    }

    pub fn get(&self, return_type: &TypeRef, annotations: &[MethodAnnotation]) -> Option<Arc<dyn CallAdapter>> {
        self.factories
            .iter()
            .find_map(|f| f.get(return_type, annotations))
            .or_else(|| DefaultCallAdapterFactory.get(return_type, annotations))
    }
}

impl std::fmt::Debug for CallAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAdapterRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}
