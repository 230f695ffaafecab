//! Compiling method metadata into reusable descriptors.
//!
//! # Design
//! `MethodDescriptor::compile` validates one method's metadata and resolves
//! everything that does not depend on argument values: the call adapter,
//! the response converter, the request body converter and one string
//! converter per URL/header parameter. The result is immutable and shared
//! by every invocation of that method.
//!
//! `DescriptorCache` memoizes the descriptors of one created service, keyed
//! by declaration position rather than by name, so two services that share
//! a name never see each other's descriptors. Each key owns a `OnceCell`,
//! so concurrent first calls block on a single compilation and all receive
//! the same `Arc`. A failed compilation leaves
//! the cell empty; configuration errors are deterministic, so a retry
//! fails the same way.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::adapter::{CallAdapter, CallAdapterRegistry};
use crate::call::DynCall;
use crate::converter::{ConverterChain, RequestConverter, ResponseConverter, StringConverter};
use crate::error::{CallError, ConfigurationError, ConversionError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::metadata::{MethodAnnotation, MethodMetadata, ParamAnnotation};
use crate::request_builder::{is_media_type, RequestBuilder};
use crate::response::RawResponse;
use crate::types::{AnyValue, Arg, TypeRef, RESPONSE};

/// What a bound parameter contributes to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRole {
    Path(String),
    Query(String),
    Header(String),
    Body,
}

pub struct ParamBinding {
    pub index: usize,
    pub role: ParamRole,
    string_converter: Option<Arc<dyn StringConverter>>,
}

impl ParamBinding {
    fn render(&self, arg: &Arg) -> Result<String, ConversionError> {
        match &self.string_converter {
            Some(converter) => converter.convert(arg),
            None => Err(ConversionError::new("a body parameter has no text form")),
        }
    }
}

impl fmt::Debug for ParamBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamBinding")
            .field("index", &self.index)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

pub struct MethodDescriptor {
    service: String,
    name: String,
    verb: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    param_count: usize,
    bindings: Vec<ParamBinding>,
    response_type: TypeRef,
    request_converter: Option<Arc<dyn RequestConverter>>,
    response_converter: Arc<dyn ResponseConverter>,
    call_adapter: Arc<dyn CallAdapter>,
}

impl MethodDescriptor {
    pub fn compile(
        service: &str,
        method: &MethodMetadata,
        converters: &ConverterChain,
        adapters: &CallAdapterRegistry,
    ) -> Result<Self, ConfigurationError> {
        let fail = |reason: String| ConfigurationError::new(service, &method.name, reason);
        let return_type = &method.return_type;

        if *return_type == TypeRef::Unit {
            return Err(fail("Service methods cannot return ()".to_string()));
        }
        if return_type.has_unresolved() {
            return Err(fail(format!(
                "Method return type must not include a type variable or wildcard: {return_type}"
            )));
        }
        for (index, param) in method.params.iter().enumerate() {
            if param.ty.has_unresolved() {
                return Err(fail(format!(
                    "Parameter type must not include a type variable or wildcard: {} (parameter #{})",
                    param.ty,
                    index + 1
                )));
            }
        }
        if is_low_level_response(return_type) {
            return Err(fail(format!(
                "'{return_type}' is not a valid return type. Wrap it in a Call."
            )));
        }

        let call_adapter = adapters
            .get(return_type, &method.annotations)
            .ok_or_else(|| fail(format!("Unable to create call adapter for {return_type}")))?;

        let response_type = call_adapter.response_type().clone();
        if is_low_level_response(&response_type) {
            return Err(fail(format!(
                "'{response_type}' is not a valid response body type. Did you mean ResponseBody?"
            )));
        }
        let response_converter = converters
            .response_body_converter(&response_type, &method.annotations)
            .ok_or_else(|| fail(format!("Unable to create converter for {response_type}")))?;

        let mut headers = Vec::new();
        for annotation in &method.annotations {
            if let MethodAnnotation::Header(name, value) = annotation {
                if name.trim().is_empty() {
                    return Err(fail("Header name must not be empty".to_string()));
                }
                if name.eq_ignore_ascii_case("Content-Type") && !is_media_type(value) {
                    return Err(fail(format!("Malformed content type: {value}")));
                }
                headers.push((name.clone(), value.clone()));
            }
        }

        let mut bindings = Vec::new();
        let mut request_converter = None;
        for (index, param) in method.params.iter().enumerate() {
            let position = index + 1;
            let mut roles = param.annotations.iter().filter(|a| a.is_role());
            let Some(role) = roles.next() else {
                continue;
            };
            if roles.next().is_some() {
                return Err(fail(format!(
                    "Multiple role annotations found (parameter #{position})"
                )));
            }

            let role = match role {
                ParamAnnotation::Path(name) => {
                    if !method.path.contains(&format!("{{{name}}}")) {
                        return Err(fail(format!(
                            "URL \"{}\" does not contain \"{{{name}}}\" (parameter #{position})",
                            method.path
                        )));
                    }
                    ParamRole::Path(name.clone())
                }
                ParamAnnotation::Query(name) => ParamRole::Query(name.clone()),
                ParamAnnotation::Header(name) => ParamRole::Header(name.clone()),
                ParamAnnotation::Body => {
                    if !method.verb.permits_body() {
                        return Err(fail(format!(
                            "Non-body HTTP method {} cannot contain a body parameter (parameter #{position})",
                            method.verb
                        )));
                    }
                    if request_converter.is_some() {
                        return Err(fail(format!("Multiple body parameters found (parameter #{position})")));
                    }
                    let converter = converters
                        .request_body_converter(&param.ty, &param.annotations, &method.annotations)
                        .ok_or_else(|| {
                            fail(format!(
                                "Unable to create @Body converter for {} (parameter #{position})",
                                param.ty
                            ))
                        })?;
                    request_converter = Some(converter);
                    ParamRole::Body
                }
                ParamAnnotation::Marker(_) => continue,
            };

            let string_converter = match role {
                ParamRole::Body => None,
                _ => Some(converters.string_converter(&param.ty, &param.annotations)),
            };
            bindings.push(ParamBinding {
                index,
                role,
                string_converter,
            });
        }

        debug!(
            service,
            method = %method.name,
            verb = %method.verb,
            path = %method.path,
            response_type = %response_type,
            "compiled method descriptor"
        );

        Ok(Self {
            service: service.to_string(),
            name: method.name.clone(),
            verb: method.verb,
            path: method.path.clone(),
            headers,
            param_count: method.params.len(),
            bindings,
            response_type,
            request_converter,
            response_converter,
            call_adapter,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verb(&self) -> HttpMethod {
        self.verb
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn bindings(&self) -> &[ParamBinding] {
        &self.bindings
    }

    pub fn response_type(&self) -> &TypeRef {
        &self.response_type
    }

    pub fn has_request_converter(&self) -> bool {
        self.request_converter.is_some()
    }

    pub(crate) fn response_converter(&self) -> &Arc<dyn ResponseConverter> {
        &self.response_converter
    }

    /// Reshape a fresh call into the method's declared return type.
    pub fn adapt(&self, call: DynCall) -> AnyValue {
        self.call_adapter.adapt(call)
    }

    /// Materialize a concrete request from argument values.
    pub fn to_request(&self, base_url: &str, args: &[Arg]) -> Result<HttpRequest, CallError> {
        if args.len() != self.param_count {
            return Err(self.argument_count_error(args.len()).into());
        }

        let mut builder = RequestBuilder::new(self.verb, base_url, &self.path);
        for (name, value) in &self.headers {
            builder.set_header(name, value)?;
        }

        for binding in &self.bindings {
            let arg = &args[binding.index];
            match &binding.role {
                ParamRole::Path(name) => {
                    if arg.is_null() {
                        return Err(ConversionError::new(format!("Path parameter \"{name}\" value must not be null.")).into());
                    }
                    let value = binding.render(arg)?;
                    builder.substitute_path_param(name, &value);
                }
                ParamRole::Query(name) => {
                    if !arg.is_null() {
                        let value = binding.render(arg)?;
                        builder.append_query_param(name, &value);
                    }
                }
                ParamRole::Header(name) => {
                    if !arg.is_null() {
                        let value = binding.render(arg)?;
                        builder.set_header(name, &value)?;
                    }
                }
                ParamRole::Body => {
                    if arg.is_null() {
                        return Err(ConversionError::new("Body parameter value must not be null.").into());
                    }
                    let converter = self.request_converter.as_ref().ok_or_else(|| {
                        ConfigurationError::new(&self.service, &self.name, "body parameter has no converter")
                    })?;
                    builder.set_body(converter.convert(arg)?);
                }
            }
        }

        if self.verb.permits_body() && !builder.has_body() {
            builder.set_body(RequestBody::empty());
        }
        Ok(builder.build())
    }

    pub(crate) fn argument_count_error(&self, given: usize) -> ConfigurationError {
        ConfigurationError::new(
            &self.service,
            &self.name,
            format!("Expected {} argument(s) but received {given}", self.param_count),
        )
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("service", &self.service)
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("bindings", &self.bindings)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

fn is_low_level_response(ty: &TypeRef) -> bool {
    ty.raw_name() == RESPONSE || ty.is::<HttpResponse>() || ty.is::<RawResponse>()
}

/// Identity of a method declaration within one created service: its
/// position in `ServiceDescriptor::methods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub index: usize,
}

impl MethodKey {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

#[derive(Default)]
pub struct DescriptorCache {
    slots: Mutex<HashMap<MethodKey, Arc<OnceCell<Arc<MethodDescriptor>>>>>,
}

impl DescriptorCache {
    pub fn get_or_compile<F>(&self, key: &MethodKey, compile: F) -> Result<Arc<MethodDescriptor>, ConfigurationError>
    where
        F: FnOnce() -> Result<MethodDescriptor, ConfigurationError>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(*key).or_default())
        };
        if let Some(descriptor) = slot.get() {
            trace!(method = descriptor.name(), index = key.index, "descriptor cache hit");
            return Ok(Arc::clone(descriptor));
        }
        slot.get_or_try_init(|| compile().map(Arc::new)).map(Arc::clone)
    }

    pub fn get(&self, key: &MethodKey) -> Option<Arc<MethodDescriptor>> {
        self.slots.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of successfully compiled descriptors.
    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCache").field("compiled", &self.len()).finish()
    }
}
