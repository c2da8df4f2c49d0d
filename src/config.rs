//! Container configuration
//!
//! A configuration document is a mapping from instance name to a mapping of
//! parameter values. Three reserved keys shape the document:
//!
//! - `-impl` selects the implementation name (default: the instance name)
//! - `-ref` marks a mapping as a reference to another instance by name
//! - `-expr` marks a mapping as an expression over other instances
//!
//! `-ref` and `-expr` must be the only key of their mapping. Documents arrive
//! as already-parsed [`serde_json::Value`] trees; [`ContainerConfig`] can also
//! be assembled programmatically.

use indexmap::IndexMap;

use crate::deferred::Deferred;
use crate::error::{DiError, Result};
use crate::expr::Expression;
use crate::prepare::Prepared;
use crate::value::Value;

/// Reserved key selecting the implementation for an instance.
pub const IMPL_KEY: &str = "-impl";
/// Reserved key marking a reference value.
pub const REF_KEY: &str = "-ref";
/// Reserved key marking an expression value.
pub const EXPR_KEY: &str = "-expr";

/// Configuration of one named instance.
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    impl_name: String,
    parameters: IndexMap<String, Deferred>,
}

impl InstanceConfig {
    /// Configure an instance backed by the named implementation.
    pub fn new(impl_name: impl Into<String>) -> Self {
        Self {
            impl_name: impl_name.into(),
            parameters: IndexMap::new(),
        }
    }

    /// Set a parameter to a literal or deferred value.
    pub fn with(mut self, param: impl Into<String>, value: impl Into<Deferred>) -> Self {
        self.parameters.insert(param.into(), value.into());
        self
    }

    #[inline]
    pub fn impl_name(&self) -> &str {
        &self.impl_name
    }

    #[inline]
    pub fn parameters(&self) -> &IndexMap<String, Deferred> {
        &self.parameters
    }
}

/// Configuration of one container: instance name → instance configuration.
///
/// Instances not listed here still resolve when an implementation of the same
/// name exists.
#[derive(Clone, Debug, Default)]
pub struct ContainerConfig {
    instances: IndexMap<String, InstanceConfig>,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an instance configuration.
    pub fn instance(mut self, name: impl Into<String>, config: InstanceConfig) -> Self {
        self.instances.insert(name.into(), config);
        self
    }

    #[inline]
    pub fn instances(&self) -> &IndexMap<String, InstanceConfig> {
        &self.instances
    }

    #[inline]
    pub(crate) fn get(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.get(name)
    }

    /// Load a configuration from an already-parsed JSON document.
    pub fn from_json(doc: &serde_json::Value) -> Result<Self> {
        let top = doc.as_object().ok_or_else(|| {
            DiError::invalid_config("container configuration must be a mapping")
        })?;

        let mut instances = IndexMap::with_capacity(top.len());
        for (inst_name, inst_doc) in top {
            instances.insert(inst_name.clone(), load_instance(inst_name, inst_doc)?);
        }

        Ok(Self { instances })
    }

    /// Statically check this configuration against prepared implementations:
    /// every referenced implementation must exist and every configured
    /// parameter must be one it declares. Runs before any construction.
    pub(crate) fn check(&self, impls: &IndexMap<String, Prepared>) -> Result<()> {
        for (inst_name, inst) in &self.instances {
            let Some(prepared) = impls.get(inst.impl_name()) else {
                return Err(DiError::UnknownImpl {
                    instance: inst_name.clone(),
                    impl_name: inst.impl_name().to_owned(),
                });
            };

            for param_name in inst.parameters().keys() {
                if !prepared.params.contains_key(param_name) {
                    return Err(DiError::UnknownParam {
                        impl_name: inst.impl_name().to_owned(),
                        param: param_name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn load_instance(inst_name: &str, doc: &serde_json::Value) -> Result<InstanceConfig> {
    let entries = doc.as_object().ok_or_else(|| {
        DiError::invalid_config(format!(
            "instance {inst_name:?} description must be a mapping"
        ))
    })?;

    let impl_name = match entries.get(IMPL_KEY) {
        None => inst_name.to_owned(),
        Some(serde_json::Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(DiError::invalid_config(format!(
                "{IMPL_KEY} of instance {inst_name:?} must be a string, got {other}"
            )));
        }
    };

    let mut parameters = IndexMap::new();
    for (param_name, param_doc) in entries {
        if param_name == IMPL_KEY {
            continue;
        }
        parameters.insert(param_name.clone(), load_value(param_doc)?);
    }

    Ok(InstanceConfig {
        impl_name,
        parameters,
    })
}

fn load_value(doc: &serde_json::Value) -> Result<Deferred> {
    match doc {
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(load_value(item)?);
            }
            Ok(Deferred::List(out))
        }
        serde_json::Value::Object(entries) => {
            if let Some(target) = entries.get(REF_KEY) {
                if entries.len() != 1 {
                    return Err(DiError::invalid_config(format!(
                        "{REF_KEY} must be the only key of its mapping"
                    )));
                }
                let name = target.as_str().ok_or_else(|| {
                    DiError::invalid_config(format!("{REF_KEY} must be a string"))
                })?;
                return Ok(Deferred::Ref(name.to_owned()));
            }

            if let Some(code) = entries.get(EXPR_KEY) {
                if entries.len() != 1 {
                    return Err(DiError::invalid_config(format!(
                        "{EXPR_KEY} must be the only key of its mapping"
                    )));
                }
                let code = code.as_str().ok_or_else(|| {
                    DiError::invalid_config(format!("{EXPR_KEY} must be a string"))
                })?;
                return Ok(Deferred::Expr(Expression::parse(code)?));
            }

            let mut out = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key.clone(), load_value(value)?);
            }
            Ok(Deferred::Map(out))
        }
        literal => Ok(Deferred::Value(Value::from(literal))),
    }
}
