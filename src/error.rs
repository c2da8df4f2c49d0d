//! Error types for the dependency-injection runtime
//!
//! Two families share one enum: *configuration errors* are raised eagerly at
//! registration or container-start time, *instance errors* are raised during
//! resolution and carry the build stack needed to render a useful message.

use thiserror::Error;

/// Boxed error produced by user factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during registration, configuration or resolution
#[derive(Error, Debug)]
pub enum DiError {
    /// An implementation with this name is already registered
    #[error("implementation {name:?} is already registered")]
    DuplicateImpl { name: String },

    /// A factory shape requires the cooperative discipline but the registry is blocking
    #[error("implementation {name:?} has shape {shape} which requires an async registry")]
    DisciplineMismatch { name: String, shape: &'static str },

    /// Malformed configuration document
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration references an implementation that does not exist
    #[error("instance {instance:?} references unknown implementation {impl_name:?}")]
    UnknownImpl { instance: String, impl_name: String },

    /// Configuration sets a parameter the implementation does not declare
    #[error("implementation {impl_name:?} has no parameter {param:?}")]
    UnknownParam { impl_name: String, param: String },

    /// No implementation and no cached instance for a requested name
    #[error("{}", missing_value_message(.stack))]
    MissingValue { stack: Vec<String> },

    /// An instance depends on itself, directly or transitively
    #[error("{}", cycle_message(.stack))]
    DependencyCycle { stack: Vec<String> },

    /// A constructor argument failed its parameter validator
    #[error("invalid value for {instance}.{param}: expected {expected}, got {value}")]
    InvalidImplParam {
        instance: String,
        param: String,
        expected: String,
        value: String,
    },

    /// A resolved instance failed the type check requested on `get`
    #[error("invalid type for instance {instance:?}: expected {expected}, got {value}")]
    InvalidInstanceType {
        instance: String,
        expected: String,
        value: String,
    },

    /// `inject` was given a name that is already present in the cache
    #[error("instance {name:?} already exists")]
    AlreadyInjected { name: String },

    /// The factory itself failed while constructing the instance
    #[error("failed to construct instance {name:?}: {source}")]
    CreationFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A generator-shaped factory broke the acquire/release protocol
    #[error("factory {name:?} violated the acquisition protocol: {reason}")]
    FactoryProtocol { name: String, reason: String },

    /// A release operation failed during container teardown
    #[error("failed to release instance {name:?}: {source}")]
    ReleaseFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Expression evaluation failed at construction time
    #[error("expression {code:?} failed: {reason}")]
    ExpressionFailed { code: String, reason: String },

    /// A blocking container hit an acquisition that actually suspended
    #[error("blocking container suspended while resolving {name:?}")]
    WouldSuspend { name: String },
}

impl DiError {
    /// Wrap a factory failure with the instance name it was constructing
    #[inline]
    pub fn creation_failed(name: impl Into<String>, source: BoxError) -> Self {
        Self::CreationFailed {
            name: name.into(),
            source,
        }
    }

    /// Configuration-document error with a free-form reason
    #[inline]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// True for errors detected before any construction begins
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateImpl { .. }
                | Self::DisciplineMismatch { .. }
                | Self::InvalidConfig { .. }
                | Self::UnknownImpl { .. }
                | Self::UnknownParam { .. }
        )
    }
}

fn quote_chain(stack: &[String]) -> String {
    stack
        .iter()
        .map(|name| format!("{name:?}"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn missing_value_message(stack: &[String]) -> String {
    match stack {
        [] => "missing value".to_owned(),
        [only] => format!("neither instance nor implementation exists for {only:?}"),
        [.., instance, param] => format!(
            "parameter {param:?} of instance {instance:?} is not configured (while building {})",
            quote_chain(&stack[..stack.len() - 1]),
        ),
    }
}

fn cycle_message(stack: &[String]) -> String {
    let first = stack.first().map(String::as_str).unwrap_or("?");
    format!(
        "instance {first:?} is depending on itself: {}",
        quote_chain(stack),
    )
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_single_name() {
        let err = DiError::MissingValue {
            stack: vec!["db".into()],
        };
        assert_eq!(
            err.to_string(),
            "neither instance nor implementation exists for \"db\""
        );
    }

    #[test]
    fn missing_value_reports_build_chain() {
        let err = DiError::MissingValue {
            stack: vec!["app".into(), "service".into(), "pool_size".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("parameter \"pool_size\" of instance \"service\""));
        assert!(msg.contains("\"app\" -> \"service\""));
    }

    #[test]
    fn cycle_message_names_first_instance() {
        let err = DiError::DependencyCycle {
            stack: vec!["a".into(), "b".into(), "a".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("instance \"a\" is depending on itself"));
        assert!(msg.ends_with("\"a\" -> \"b\" -> \"a\""));
    }

    #[test]
    fn config_error_classification() {
        assert!(DiError::DuplicateImpl { name: "x".into() }.is_config_error());
        assert!(
            !DiError::MissingValue {
                stack: vec!["x".into()]
            }
            .is_config_error()
        );
    }
}
