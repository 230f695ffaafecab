//! The client facade: configuration, descriptor caching and service binding.
//!
//! # Design
//! `RestClient` is cheap to clone; every clone shares one converter chain
//! and one adapter registry. `create` turns a `ServiceDescriptor` into a
//! `ServiceRouter` that dispatches invocations by method name. Each router
//! owns the descriptor cache for the declarations it was created from, so
//! same-named services created on one client stay independent. Descriptors
//! compile on first invocation unless the client validates eagerly, in
//! which case `create` compiles every method and reports all failures
//! together.
//!
//! A typed service is a plain struct holding a router; the `Service` trait
//! supplies its metadata and wraps the router once it exists.

use std::any::type_name;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::adapter::{CallAdapterFactory, CallAdapterRegistry};
use crate::call::{Call, DynCall};
use crate::config::ClientConfig;
use crate::converter::{ConverterChain, ConverterFactory};
use crate::descriptor::{DescriptorCache, MethodDescriptor, MethodKey};
use crate::error::{BuildError, CallError, ConfigurationError, ValidationErrors};
use crate::metadata::{MethodMetadata, ServiceDescriptor};
use crate::transport::Transport;
use crate::types::Arg;

/// A statically declared service bound to a router.
pub trait Service: Sized {
    fn descriptor() -> ServiceDescriptor;

    fn bind(router: ServiceRouter) -> Self;
}

struct ClientInner {
    base_url: Arc<str>,
    transport: Arc<dyn Transport>,
    converters: ConverterChain,
    adapters: CallAdapterRegistry,
    compiled: AtomicUsize,
    validate_eagerly: bool,
}

#[derive(Clone)]
pub struct RestClient {
    inner: Arc<ClientInner>,
}

impl RestClient {
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn converters(&self) -> &ConverterChain {
        &self.inner.converters
    }

    pub fn call_adapters(&self) -> &CallAdapterRegistry {
        &self.inner.adapters
    }

    /// Number of method descriptors compiled so far, across every service
    /// created from this client.
    pub fn compiled_methods(&self) -> usize {
        self.inner.compiled.load(Ordering::Acquire)
    }

    pub fn create(&self, service: ServiceDescriptor) -> Result<ServiceRouter, ValidationErrors> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for method in &service.methods {
            if !seen.insert(method.name.as_str()) {
                errors.push(ConfigurationError::new(
                    &service.name,
                    &method.name,
                    "Duplicate method name",
                ));
            }
        }

        let descriptors = Arc::new(DescriptorCache::default());
        if self.inner.validate_eagerly {
            for (index, method) in service.methods.iter().enumerate() {
                if let Err(err) = self.load_descriptor(&descriptors, &service.name, index, method) {
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }
        debug!(
            service = %service.name,
            methods = service.methods.len(),
            eager = self.inner.validate_eagerly,
            "created service"
        );
        Ok(ServiceRouter {
            client: self.clone(),
            service: Arc::new(service),
            descriptors,
        })
    }

    pub fn create_service<S: Service>(&self) -> Result<S, ValidationErrors> {
        Ok(S::bind(self.create(S::descriptor())?))
    }

    fn load_descriptor(
        &self,
        cache: &DescriptorCache,
        service: &str,
        index: usize,
        method: &MethodMetadata,
    ) -> Result<Arc<MethodDescriptor>, ConfigurationError> {
        let inner = &self.inner;
        cache.get_or_compile(&MethodKey::new(index), || {
            let descriptor = MethodDescriptor::compile(service, method, &inner.converters, &inner.adapters)?;
            inner.compiled.fetch_add(1, Ordering::AcqRel);
            Ok(descriptor)
        })
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.base_url)
            .field("converters", &self.inner.converters)
            .field("adapters", &self.inner.adapters)
            .field("validate_eagerly", &self.inner.validate_eagerly)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RestClientBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    converter_factories: Vec<Arc<dyn ConverterFactory>>,
    adapter_factories: Vec<Arc<dyn CallAdapterFactory>>,
    validate_eagerly: bool,
}

impl RestClientBuilder {
    pub fn from_config(config: ClientConfig) -> Self {
        Self::default()
            .base_url(&config.base_url)
            .validate_eagerly(config.validate_eagerly)
    }

    #[must_use]
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    /// Factories are consulted in the order they are added.
    #[must_use]
    pub fn add_converter_factory(mut self, factory: impl ConverterFactory + 'static) -> Self {
        self.converter_factories.push(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn add_call_adapter_factory(mut self, factory: impl CallAdapterFactory + 'static) -> Self {
        self.adapter_factories.push(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn client(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn validate_eagerly(mut self, validate_eagerly: bool) -> Self {
        self.validate_eagerly = validate_eagerly;
        self
    }

    pub fn build(self) -> Result<RestClient, BuildError> {
        let base_url = self
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or(BuildError::MissingBaseUrl)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;

        Ok(RestClient {
            inner: Arc::new(ClientInner {
                base_url: Arc::from(base_url),
                transport,
                converters: ConverterChain::new(self.converter_factories),
                adapters: CallAdapterRegistry::new(self.adapter_factories),
                compiled: AtomicUsize::new(0),
                validate_eagerly: self.validate_eagerly,
            }),
        })
    }
}

/// Dispatches invocations of one service's methods.
#[derive(Clone)]
pub struct ServiceRouter {
    client: RestClient,
    service: Arc<ServiceDescriptor>,
    descriptors: Arc<DescriptorCache>,
}

impl ServiceRouter {
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn descriptor(&self, method: &str) -> Result<Arc<MethodDescriptor>, ConfigurationError> {
        let (index, metadata) = self
            .service
            .methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == method)
            .ok_or_else(|| ConfigurationError::new(&self.service.name, method, "No such method"))?;
        self.client
            .load_descriptor(&self.descriptors, &self.service.name, index, metadata)
    }

    /// Invoke `method` and return whatever its call adapter produces.
    pub fn invoke<R: 'static>(&self, method: &str, args: Vec<Arg>) -> Result<R, CallError> {
        let descriptor = self.descriptor(method)?;
        if args.len() != descriptor.param_count() {
            return Err(descriptor.argument_count_error(args.len()).into());
        }
        let inner = &self.client.inner;
        let call = DynCall::new(
            Arc::clone(&descriptor),
            args.into(),
            Arc::clone(&inner.transport),
            Arc::clone(&inner.base_url),
        );
        descriptor.adapt(call).downcast::<R>().map(|adapted| *adapted).map_err(|_| {
            ConfigurationError::new(
                &self.service.name,
                method,
                format!("Call adapter does not produce a {}", type_name::<R>()),
            )
            .into()
        })
    }

    /// Invoke a method declared as returning `Call<T>`.
    pub fn call<T: 'static>(&self, method: &str, args: Vec<Arg>) -> Result<Call<T>, CallError> {
        let call: DynCall = self.invoke(method, args)?;
        Ok(call.typed())
    }
}

impl fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("service", &self.service.name)
            .field("methods", &self.service.methods.len())
            .finish()
    }
}
