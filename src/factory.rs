//! Factory descriptors: the eight ways to produce a named implementation
//!
//! A [`Factory`] pairs a shape tag with the underlying payload (a literal
//! value, a closure, a generator, or a scoped-resource object), the
//! parameters it declares, and optional bound default overrides. Descriptors
//! are immutable once registered; the preparer normalizes every shape into
//! one uniform scoped-acquisition operation so the resolution engine never
//! needs to know which shape it is driving.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use indexmap::IndexMap;

use crate::error::BoxError;
use crate::value::{Params, TypeSpec, Value};

/// Shape tag describing how a factory produces and releases its instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactoryShape {
    /// Plain value, nothing to call, nothing to release
    Value,
    /// Constructor producing an instance; nothing to release
    Class,
    /// Function producing an instance; nothing to release
    Func,
    /// Generator: yields the instance once, finalizes on release
    GenFunc,
    /// Explicit begin/end scoped resource
    Scoped,
    /// Like `Func`, but suspending
    AsyncFunc,
    /// Like `GenFunc`, but suspending
    AsyncGenFunc,
    /// Like `Scoped`, but suspending
    AsyncScoped,
}

impl FactoryShape {
    /// True for shapes that require the cooperative discipline.
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            FactoryShape::AsyncFunc | FactoryShape::AsyncGenFunc | FactoryShape::AsyncScoped
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FactoryShape::Value => "value",
            FactoryShape::Class => "class",
            FactoryShape::Func => "func",
            FactoryShape::GenFunc => "gen-func",
            FactoryShape::Scoped => "scoped",
            FactoryShape::AsyncFunc => "async-func",
            FactoryShape::AsyncGenFunc => "async-gen-func",
            FactoryShape::AsyncScoped => "async-scoped",
        }
    }
}

impl fmt::Display for FactoryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Declared parameters
// =============================================================================

/// One declared factory parameter: name, optional default, type spec.
///
/// Parameters are declared explicitly on the descriptor; there is no runtime
/// reflection. An untyped parameter ([`TypeSpec::Any`]) accepts any value.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    default: Option<Value>,
    type_spec: TypeSpec,
}

impl Parameter {
    /// Declare a parameter with no default, accepting any value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            type_spec: TypeSpec::Any,
        }
    }

    /// Restrict the parameter to a declared type.
    pub fn of_type(mut self, type_spec: TypeSpec) -> Self {
        self.type_spec = type_spec;
        self
    }

    /// Give the parameter a default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[inline]
    pub fn type_spec(&self) -> &TypeSpec {
        &self.type_spec
    }

    pub(crate) fn set_default(&mut self, value: Value) {
        self.default = Some(value);
    }
}

// =============================================================================
// Callable payloads
// =============================================================================

/// Factory closure producing an instance from resolved parameters.
pub type FactoryFn = dyn Fn(Params) -> Result<Value, BoxError> + Send + Sync;

/// Suspended sequence driven by the preparer: one value, then completion.
pub type GeneratorIter = Box<dyn Iterator<Item = Result<Value, BoxError>> + Send>;

/// Factory closure producing a generator.
pub type GeneratorFn = dyn Fn(Params) -> Result<GeneratorIter, BoxError> + Send + Sync;

/// Suspending factory closure.
pub type AsyncFactoryFn =
    dyn Fn(Params) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

/// Suspending generator stream.
pub type GeneratorStream = BoxStream<'static, Result<Value, BoxError>>;

/// Factory closure producing a suspending generator.
pub type AsyncGeneratorFn = dyn Fn(Params) -> GeneratorStream + Send + Sync;

/// Explicit scoped resource: acquire on `begin`, release on `end`.
///
/// `end` runs during container teardown and must not fail unless the
/// release itself fails.
pub trait ScopedResource: Send + Sync {
    fn begin(&self, params: Params) -> Result<Value, BoxError>;
    fn end(&self) -> Result<(), BoxError>;
}

/// Suspending scoped resource.
#[async_trait]
pub trait AsyncScopedResource: Send + Sync {
    async fn begin(&self, params: Params) -> Result<Value, BoxError>;
    async fn end(&self) -> Result<(), BoxError>;
}

#[derive(Clone)]
pub(crate) enum Payload {
    Value(Value),
    Func(Arc<FactoryFn>),
    GenFunc(Arc<GeneratorFn>),
    Scoped(Arc<dyn ScopedResource>),
    AsyncFunc(Arc<AsyncFactoryFn>),
    AsyncGenFunc(Arc<AsyncGeneratorFn>),
    AsyncScoped(Arc<dyn AsyncScopedResource>),
}

// =============================================================================
// Descriptors
// =============================================================================

/// Describes one way to produce a named implementation.
#[derive(Clone)]
pub struct Factory {
    name: String,
    shape: FactoryShape,
    payload: Payload,
    params: IndexMap<String, Parameter>,
    bound: IndexMap<String, Value>,
}

impl Factory {
    fn with_payload(name: impl Into<String>, shape: FactoryShape, payload: Payload) -> Self {
        Self {
            name: name.into(),
            shape,
            payload,
            params: IndexMap::new(),
            bound: IndexMap::new(),
        }
    }

    /// A plain value; acquisition yields it as-is.
    pub fn value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_payload(name, FactoryShape::Value, Payload::Value(value.into()))
    }

    /// A constructor: called with resolved parameters, yields the instance.
    pub fn class<F>(name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(Params) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::with_payload(name, FactoryShape::Class, Payload::Func(Arc::new(ctor)))
    }

    /// A function: called with resolved parameters, yields the instance.
    pub fn function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Params) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::with_payload(name, FactoryShape::Func, Payload::Func(Arc::new(func)))
    }

    /// A generator: its first item is the instance; on release it must
    /// complete without producing further items.
    pub fn generator<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Params) -> Result<GeneratorIter, BoxError> + Send + Sync + 'static,
    {
        Self::with_payload(name, FactoryShape::GenFunc, Payload::GenFunc(Arc::new(func)))
    }

    /// An explicit scoped resource.
    pub fn scoped(name: impl Into<String>, resource: Arc<dyn ScopedResource>) -> Self {
        Self::with_payload(name, FactoryShape::Scoped, Payload::Scoped(resource))
    }

    /// A suspending function.
    pub fn async_function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Params) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync + 'static,
    {
        Self::with_payload(
            name,
            FactoryShape::AsyncFunc,
            Payload::AsyncFunc(Arc::new(func)),
        )
    }

    /// A suspending generator.
    pub fn async_generator<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Params) -> GeneratorStream + Send + Sync + 'static,
    {
        Self::with_payload(
            name,
            FactoryShape::AsyncGenFunc,
            Payload::AsyncGenFunc(Arc::new(func)),
        )
    }

    /// A suspending scoped resource.
    pub fn async_scoped(
        name: impl Into<String>,
        resource: Arc<dyn AsyncScopedResource>,
    ) -> Self {
        Self::with_payload(name, FactoryShape::AsyncScoped, Payload::AsyncScoped(resource))
    }

    /// Declare a parameter. Declaration order is resolution order.
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.params.insert(parameter.name().to_owned(), parameter);
        self
    }

    /// Bind a default for a declared parameter, overriding any default the
    /// parameter itself declares.
    pub fn bind(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bound.insert(param.into(), value.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> FactoryShape {
        self.shape
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        FactoryShape,
        Payload,
        IndexMap<String, Parameter>,
        IndexMap<String, Value>,
    ) {
        (self.name, self.shape, self.payload, self.params, self.bound)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}
