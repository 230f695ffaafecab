//! Declarative HTTP API client core.
//!
//! # Overview
//! A service is described as data (`ServiceDescriptor`): method names, HTTP
//! verbs, URL templates, parameter roles and return types. `RestClient`
//! compiles each method into a `MethodDescriptor` once, then turns every
//! invocation into a `Call` that builds an `HttpRequest`, hands it to a
//! pluggable `Transport`, and converts the `HttpResponse` into a typed
//! `Response`.
//!
//! # Design
//! - The core performs no I/O itself. Sockets, pools and executors belong
//!   to the `Transport` implementation supplied by the caller.
//! - Body conversion and return-shape adaptation are open extension points
//!   (`ConverterFactory`, `CallAdapterFactory`) resolved in registration
//!   order with built-in fallbacks.
//! - Values cross the erased boundary as `Arg` (inputs) and `AnyValue`
//!   (converted bodies, adapted calls); `Call<T>` recovers the static type.
//! - Errors are `thiserror` types; configuration mistakes are reported with
//!   the service and method that caused them.

pub mod adapter;
pub mod call;
pub mod client;
pub mod config;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod metadata;
pub mod request_builder;
pub mod response;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use adapter::{CallAdapter, CallAdapterFactory, CallAdapterRegistry, DefaultCallAdapterFactory};
pub use call::{Call, CallState, Callback, DynCall};
pub use client::{RestClient, RestClientBuilder, Service, ServiceRouter};
pub use config::ClientConfig;
pub use converter::{
    BuiltInConverters, ConverterChain, ConverterFactory, JsonConverterFactory, RequestConverter, ResponseConverter,
    StringConverter, TextConverterFactory,
};
pub use descriptor::{DescriptorCache, MethodDescriptor, MethodKey, ParamBinding, ParamRole};
pub use error::{
    BuildError, CallError, CallStateError, ConfigurationError, ConversionError, TransportError, TransportErrorKind,
    ValidationErrors,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, ResponseBody};
pub use metadata::{MethodAnnotation, MethodMetadata, ParamAnnotation, ParamMetadata, ServiceDescriptor};
pub use request_builder::RequestBuilder;
pub use response::{ErrorBody, RawResponse, Response};
pub use transport::{Completion, Transport, TransportCall};
pub use types::{AnyValue, Arg, TypeRef};
