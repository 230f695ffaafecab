use std::sync::Arc;

use super::{ConverterFactory, RequestConverter, ResponseConverter};
use crate::error::ConversionError;
use crate::http::{RequestBody, ResponseBody};
use crate::metadata::{MethodAnnotation, ParamAnnotation};
use crate::types::{AnyValue, Arg, TypeRef};

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// Converts `String` bodies to and from `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverterFactory;

impl ConverterFactory for TextConverterFactory {
    fn request_body_converter(
        &self,
        ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn RequestConverter>> {
        ty.is::<String>().then(|| Arc::new(TextRequestConverter) as Arc<dyn RequestConverter>)
    }

    fn response_body_converter(
        &self,
        ty: &TypeRef,
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn ResponseConverter>> {
        ty.is::<String>().then(|| Arc::new(TextResponseConverter) as Arc<dyn ResponseConverter>)
    }
}

struct TextRequestConverter;

impl RequestConverter for TextRequestConverter {
    fn convert(&self, value: &Arg) -> Result<RequestBody, ConversionError> {
        match value {
            Arg::Text(text) => Ok(RequestBody::new(Some(TEXT_PLAIN), text.clone())),
            other => Err(ConversionError::new(format!("expected text, got {}", other.describe()))),
        }
    }
}

struct TextResponseConverter;

impl ResponseConverter for TextResponseConverter {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        let text = body
            .string()
            .map_err(|e| ConversionError::new(format!("failed to read text body: {e}")).with_source(e))?;
        Ok(Some(Box::new(text)))
    }
}
