//! # Conject - Configuration-Driven Dependency Injection for Rust
//!
//! Factories register under names; configuration wires named instances to
//! implementations and to each other; instances are constructed lazily, on
//! first request, and memoized for the container's lifetime.
//!
//! ## Features
//!
//! - 🏭 **Named factories** - Eight factory shapes (values, functions,
//!   constructors, generators, scoped resources, and their suspending
//!   counterparts) unified behind one acquisition contract
//! - 🔧 **Declarative wiring** - Instances declared as data: references,
//!   expressions, nested lists and maps, loaded from JSON documents
//! - 💤 **Lazy and memoized** - Nothing is constructed until requested;
//!   every instance is constructed at most once per container
//! - 🔁 **Cycle detection** - Dependency cycles reported with the full
//!   build chain
//! - 🔍 **Dry-run probing** - Verify an instance is constructible without
//!   running any factory
//! - ♻️ **Scoped teardown** - Releases run in reverse acquisition order
//! - ⚡ **Two disciplines** - Blocking containers need no async runtime;
//!   async containers accept suspending factories
//! - 📊 **Observable** - Optional tracing integration under the `conject`
//!   target
//!
//! ## Quick Start
//!
//! ```rust
//! use conject::{ContainerConfig, DepSpec, Factory, Parameter, TypeSpec, Value};
//!
//! let mut spec = DepSpec::new();
//! spec.add(
//!     Factory::function("return_sum", |p| {
//!         Ok(Value::Int(p.int("first")? + p.int("second")?))
//!     })
//!     .param(Parameter::new("first").of_type(TypeSpec::Int))
//!     .param(Parameter::new("second").of_type(TypeSpec::Int).with_default(10)),
//! )?;
//! spec.add(Factory::function("return_7", |_| Ok(Value::Int(7))))?;
//!
//! let config = ContainerConfig::from_json(&serde_json::json!({
//!     "sum_inst": {
//!         "-impl": "return_sum",
//!         "first": { "-ref": "first_arg" },
//!         "second": 1,
//!     },
//!     "first_arg": { "-impl": "return_7" },
//! }))?;
//!
//! let mut container = spec.start_container(config)?;
//! container.ensure_constructible("sum_inst")?;
//! assert_eq!(container.get("sum_inst")?, Value::Int(8));
//! # Ok::<(), conject::DiError>(())
//! ```
//!
//! ## Implicit wiring
//!
//! A parameter with no configured value and no default resolves the instance
//! with the parameter's own name, so dependency graphs often need no explicit
//! wiring at all. Configured values take precedence, then declared defaults,
//! then wiring by name.

mod config;
mod container;
mod deferred;
mod error;
mod expr;
mod factory;
#[cfg(feature = "logging")]
pub mod logging;
mod prepare;
mod registry;
mod value;

pub use config::*;
pub use container::*;
pub use deferred::*;
pub use error::*;
pub use expr::*;
pub use factory::*;
pub use registry::*;
pub use value::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AsyncContainer, AsyncDepSpec, Container, ContainerConfig, Deferred, DepSpec, DiError,
        Factory, InstanceConfig, Parameter, Params, Result, TypeSpec, Value,
    };
    pub use std::sync::Arc;
}
