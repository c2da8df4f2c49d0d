//! Implementation registries
//!
//! A registry collects named factory descriptors, prepares each one for its
//! discipline at registration time, and starts containers against a
//! configuration. Registration is the eager half of the lifecycle: duplicate
//! names, discipline mismatches and malformed bound defaults all surface
//! here, before any container exists. Starting a container checks the
//! configuration against the registered implementations and constructs
//! nothing.
//!
//! One registry can start any number of containers; each container memoizes
//! and releases its instances independently.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::ContainerConfig;
use crate::container::{AsyncContainer, Container};
use crate::error::{DiError, Result};
use crate::factory::Factory;
use crate::prepare::{Discipline, Prepared, prepare};

fn add_prepared(
    impls: &mut IndexMap<String, Prepared>,
    factories: Vec<Factory>,
    discipline: Discipline,
) -> Result<()> {
    // Prepare the whole batch before touching the registry, so a failing
    // descriptor leaves no partial registration behind.
    let mut batch: IndexMap<String, Prepared> = IndexMap::with_capacity(factories.len());
    for factory in factories {
        let name = factory.name().to_owned();
        if impls.contains_key(&name) || batch.contains_key(&name) {
            return Err(DiError::DuplicateImpl { name });
        }
        batch.insert(name, prepare(factory, discipline)?);
    }

    for (name, prepared) in batch {
        tracing::debug!(target: "conject", implementation = %name, "registered implementation");
        impls.insert(name, prepared);
    }

    Ok(())
}

/// Registry of blocking implementations.
///
/// Suspending factory shapes are rejected at registration; containers started
/// from this registry resolve without an async runtime.
#[derive(Default)]
pub struct DepSpec {
    impls: IndexMap<String, Prepared>,
}

impl DepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one implementation under its factory name.
    pub fn add(&mut self, factory: Factory) -> Result<()> {
        add_prepared(&mut self.impls, vec![factory], Discipline::Blocking)
    }

    /// Register a batch of implementations; on any failure none are kept.
    pub fn add_many(&mut self, factories: Vec<Factory>) -> Result<()> {
        add_prepared(&mut self.impls, factories, Discipline::Blocking)
    }

    /// Names of the registered implementations, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.impls.keys().map(String::as_str)
    }

    /// Check the configuration against this registry and start a container.
    pub fn start_container(&self, config: ContainerConfig) -> Result<Container> {
        config.check(&self.impls)?;
        Ok(Container::new(Arc::new(self.impls.clone()), config))
    }
}

/// Registry of implementations that may suspend.
///
/// Accepts every factory shape; blocking shapes complete without yielding.
#[derive(Default)]
pub struct AsyncDepSpec {
    impls: IndexMap<String, Prepared>,
}

impl AsyncDepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one implementation under its factory name.
    pub fn add(&mut self, factory: Factory) -> Result<()> {
        add_prepared(&mut self.impls, vec![factory], Discipline::Cooperative)
    }

    /// Register a batch of implementations; on any failure none are kept.
    pub fn add_many(&mut self, factories: Vec<Factory>) -> Result<()> {
        add_prepared(&mut self.impls, factories, Discipline::Cooperative)
    }

    /// Names of the registered implementations, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.impls.keys().map(String::as_str)
    }

    /// Check the configuration against this registry and start a container.
    pub fn start_container(&self, config: ContainerConfig) -> Result<AsyncContainer> {
        config.check(&self.impls)?;
        Ok(AsyncContainer::new(Arc::new(self.impls.clone()), config))
    }
}
