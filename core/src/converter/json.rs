use std::sync::Arc;

use serde_json::Value;

use super::{ConverterFactory, RequestConverter, ResponseConverter};
use crate::error::ConversionError;
use crate::http::{RequestBody, ResponseBody};
use crate::metadata::{MethodAnnotation, ParamAnnotation};
use crate::types::{AnyValue, Arg, TypeRef};

const APPLICATION_JSON: &str = "application/json";

/// Converts `serde_json::Value` bodies to and from `application/json`.
///
/// Typed payloads go through `serde_json::to_value` / `from_value` at the
/// call site; the chain only ever sees `Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverterFactory;

impl ConverterFactory for JsonConverterFactory {
    fn request_body_converter(
        &self,
        ty: &TypeRef,
        _param_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn RequestConverter>> {
        ty.is::<Value>().then(|| Arc::new(JsonRequestConverter) as Arc<dyn RequestConverter>)
    }

    fn response_body_converter(
        &self,
        ty: &TypeRef,
        _method_annotations: &[MethodAnnotation],
    ) -> Option<Arc<dyn ResponseConverter>> {
        ty.is::<Value>().then(|| Arc::new(JsonResponseConverter) as Arc<dyn ResponseConverter>)
    }
}

struct JsonRequestConverter;

impl RequestConverter for JsonRequestConverter {
    fn convert(&self, value: &Arg) -> Result<RequestBody, ConversionError> {
        let Arg::Json(value) = value else {
            return Err(ConversionError::new(format!("expected json, got {}", value.describe())));
        };
        let content = serde_json::to_vec(value)
            .map_err(|e| ConversionError::new(format!("serialization failed: {e}")).with_source(e))?;
        Ok(RequestBody::new(Some(APPLICATION_JSON), content))
    }
}

struct JsonResponseConverter;

impl ResponseConverter for JsonResponseConverter {
    fn convert(&self, body: ResponseBody) -> Result<Option<AnyValue>, ConversionError> {
        let value: Value = serde_json::from_reader(body)
            .map_err(|e| ConversionError::new(format!("deserialization failed: {e}")).with_source(e))?;
        Ok(Some(Box::new(value)))
    }
}
