//! Converter factories and the ordered resolution chain.
//!
//! # Design
//! A `ConverterFactory` advertises up to three capabilities: request body
//! converters, response body converters and string converters for URL and
//! header parameters. Each capability is a method returning `Option`, with
//! `None` meaning "not mine". The chain asks registered factories in
//! registration order and falls back to [`BuiltInConverters`] when none of
//! them answers.
//!
//! Response converters return `Option<AnyValue>`: `None` is a legitimate
//! result (the body was discarded), not a failure.

mod builtin;
mod json;
mod text;

use std::sync::Arc;

use crate::error::ConversionError;
use crate::http::{RequestBody, ResponseBody};
use crate::metadata::{MethodAnnotation, ParamAnnotation};
use crate::types::{AnyValue, Arg, TypeRef};

pub use builtin::BuiltInConverters;
pub use json::JsonConverterFactory;
pub use text::TextConverterFactory;

/// Turns an argument into a request body.
pub trait RequestConverter: Send + Sync {
    fn convert(&self, value: &Arg) -> Result<RequestBody, ConversionError>;
}

/// Turns a response body into a value.
pub trait ResponseConverter: Send + Sync {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError>;
}

/// Renders an argument for a path segment, query string or header.
pub trait StringConverter: Send + Sync {
    fn convert(&self, value: &Arg) -> Result<String, ConversionError>;
}

impl<F> RequestConverter for F
where
    F: Fn(&Arg) -> Result<RequestBody, ConversionError> + Send + Sync,
{
    fn convert(&self, value: &Arg) -> Result<RequestBody, ConversionError> {
        self(value)
    }
}

impl<F> ResponseConverter for F
where
    F: Fn(ResponseBody) -> Result<Option<AnyValue>, ConversionError> + Send + Sync,
{
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        self(body)
    }
}

impl<F> StringConverter for F
where
    F: Fn(&Arg) -> Result<String, ConversionError> + Send + Sync,
{
    fn convert(&self, value: &Arg) -> Result<String, ConversionError> {
        self(value)
    }
}

/// Resolves converters for declared types. Every method defaults to "no
/// match" so a factory only implements the capabilities it has.
pub trait ConverterFactory: Send + Sync {
    fn request_body_converter(
        &self,
        _ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn RequestConverter>> {
        None
    }

    fn response_body_converter(
        &self,
        _ty: &TypeRef,
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn ResponseConverter>> {
        None
    }

    fn string_converter(
        &self,
        _ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
    ) -> Option<Arc<dyn StringConverter>> {
        None
    }
}

/// Registered factories in priority order, backed by the built-ins.
#[derive(Clone, Default)]
pub struct ConverterChain {
    factories: Vec<Arc<dyn ConverterFactory>>,
}

impl ConverterChain {
    pub fn new(factories: Vec<Arc<dyn ConverterFactory>>) -> Self {
        Self { factories }
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn request_body_converter(
        &self,
        ty: &TypeRef,
        param_annotations: &[ParamAnnotation],
        method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn RequestConverter>> {
        self.factories
            .iter()
            .find_map(|f| f.request_body_converter(ty, param_annotations, method_annotations))
            .or_else(|| BuiltInConverters.request_body_converter(ty, param_annotations, method_annotations))
    }

    pub fn response_body_converter(
        &self,
        ty: &TypeRef,
        method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn ResponseConverter>> {
        self.factories
            .iter()
            .find_map(|f| f.response_body_converter(ty, method_annotations))
            .or_else(|| BuiltInConverters.response_body_converter(ty, method_annotations))
    }

    /// Always resolves: the built-in renders any argument with a textual form.
    pub fn string_converter(&self, ty: &TypeRef, param_annotations: &[ParamAnnotation]) -> Arc<dyn StringConverter> {
        self.factories
            .iter()
            .find_map(|f| f.string_converter(ty, param_annotations))
            .unwrap_or_else(builtin::to_string_converter)
    }
}

impl std::fmt::Debug for ConverterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterChain")
            .field("factories", &self.factories.len())
            .finish()
    }
}
