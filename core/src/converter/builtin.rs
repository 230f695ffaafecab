use std::sync::Arc;

use super::{ConverterFactory, RequestConverter, ResponseConverter, StringConverter};
use crate::error::ConversionError;
use crate::http::{RequestBody, ResponseBody};
use crate::metadata::{MethodAnnotation, ParamAnnotation};
use crate::types::{AnyValue, Arg, TypeRef};

/// Fallback converters consulted after every registered factory.
///
/// - `ResponseBody` responses are buffered in memory, or handed over as-is
///   when the method is marked `Streaming`.
/// - `()` responses are drained and closed, producing no value.
/// - `RequestBody` arguments pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltInConverters;

impl ConverterFactory for BuiltInConverters {
    fn request_body_converter(
        &self,
        ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn RequestConverter>> {
        if ty.is::<RequestBody>() {
            Some(Arc::new(PassThroughRequestConverter))
        } else {
            None
        }
    }

    fn response_body_converter(
        &self,
        ty: &TypeRef,
        method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn ResponseConverter>> {
        if ty.is::<ResponseBody>() {
            if method_annotations.contains(&MethodAnnotation::Streaming) {
                return Some(Arc::new(StreamingResponseConverter));
            }
            return Some(Arc::new(BufferingResponseConverter));
        }
        if *ty == TypeRef::Unit {
            return Some(Arc::new(DiscardResponseConverter));
        }
        None
    }

    fn string_converter(
        &self,
        _ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
    ) -> Option<Arc<dyn StringConverter>> {
        Some(to_string_converter())
    }
}

pub(super) fn to_string_converter() -> Arc<dyn StringConverter> {
    Arc::new(ToStringConverter)
}

struct PassThroughRequestConverter;

impl RequestConverter for PassThroughRequestConverter {
    fn convert(&self, value: &Arg) -> Result<RequestBody, ConversionError> {
        match value {
            Arg::Body(body) => Ok(body.clone()),
            other => Err(ConversionError::new(format!(
                "expected a prebuilt request body, got {}",
                other.describe()
            ))),
        }
    }
}

struct BufferingResponseConverter;

impl ResponseConverter for BufferingResponseConverter {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        let content_type = body.content_type().map(str::to_string);
        let bytes = body
            .bytes()
            .map_err(|e| ConversionError::new(format!("failed to buffer response body: {e}")).with_source(e))?;
        Ok(Some(Box::new(ResponseBody::from_bytes(content_type.as_deref(), bytes))))
    }
}

struct StreamingResponseConverter;

impl ResponseConverter for StreamingResponseConverter {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        Ok(Some(Box::new(body)))
    }
}

struct DiscardResponseConverter;

impl ResponseConverter for DiscardResponseConverter {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        body.drain()
            .map_err(|e| ConversionError::new(format!("failed to drain response body: {e}")).with_source(e))?;
        Ok(None)
    }
}

struct ToStringConverter;

impl StringConverter for ToStringConverter {
    fn convert(&self, value: &Arg) -> Result<String, ConversionError> {
        value.as_param().ok_or_else(|| {
            ConversionError::new(format!("{} argument cannot be rendered as a parameter", value.describe()))
        })
    }
}
