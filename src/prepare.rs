//! Implementation preparer
//!
//! Normalizes every [`Factory`] shape into one uniform scoped acquisition:
//! `begin(params) -> value` plus an optional `end()` registered for teardown,
//! both expressed as possibly-suspending operations. Blocking registries
//! reject suspending shapes here, so a container never mixes disciplines.
//!
//! Shapes prepared for a blocking registry produce futures that are always
//! immediately ready; the blocking container polls them exactly once.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;

use crate::error::{DiError, Result};
use crate::factory::{Factory, Parameter, Payload};
use crate::value::{Params, Value};

/// Which execution discipline a registry prepares implementations for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Discipline {
    /// "Suspend" blocks the calling thread; suspending shapes are rejected
    Blocking,
    /// "Suspend" yields to a scheduler; every shape is accepted
    Cooperative,
}

/// Deferred release of an acquired resource.
pub(crate) type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Result of one acquisition: the instance plus its optional release.
pub(crate) struct Acquired {
    pub value: Value,
    pub release: Option<ReleaseFn>,
}

impl fmt::Debug for Acquired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquired")
            .field("value", &self.value)
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// The single normalized acquisition operation.
pub(crate) type AcquireFn =
    Arc<dyn Fn(Params) -> BoxFuture<'static, Result<Acquired>> + Send + Sync>;

/// A prepared implementation: the only shape the resolution engine touches.
#[derive(Clone)]
pub(crate) struct Prepared {
    pub name: String,
    pub params: Arc<IndexMap<String, Parameter>>,
    pub acquire: AcquireFn,
}

impl fmt::Debug for Prepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prepared")
            .field("name", &self.name)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Prepare a descriptor for the given discipline.
///
/// Fails when a suspending shape meets a blocking registry, or when a bound
/// default names a parameter the factory does not declare. Bound defaults
/// take precedence over the parameter's own declared default.
pub(crate) fn prepare(factory: Factory, discipline: Discipline) -> Result<Prepared> {
    let (name, shape, payload, mut params, bound) = factory.into_parts();

    if discipline == Discipline::Blocking && shape.is_async() {
        return Err(DiError::DisciplineMismatch {
            name,
            shape: shape.name(),
        });
    }

    for (param_name, value) in bound {
        match params.get_mut(&param_name) {
            Some(param) => param.set_default(value),
            None => {
                return Err(DiError::UnknownParam {
                    impl_name: name,
                    param: param_name,
                });
            }
        }
    }

    let acquire = normalize(&name, payload);

    Ok(Prepared {
        name,
        params: Arc::new(params),
        acquire,
    })
}

fn normalize(name: &str, payload: Payload) -> AcquireFn {
    match payload {
        Payload::Value(value) => Arc::new(move |_params| {
            let value = value.clone();
            future::ready(Ok(Acquired {
                value,
                release: None,
            }))
            .boxed()
        }),

        Payload::Func(func) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let result = func(params)
                    .map(|value| Acquired {
                        value,
                        release: None,
                    })
                    .map_err(|source| DiError::creation_failed(&name, source));
                future::ready(result).boxed()
            })
        }

        Payload::GenFunc(func) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let result = begin_generator(&name, &func, params);
                future::ready(result).boxed()
            })
        }

        Payload::Scoped(resource) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let result = resource
                    .begin(params)
                    .map_err(|source| DiError::creation_failed(&name, source))
                    .map(|value| {
                        let resource = Arc::clone(&resource);
                        let release_name = name.clone();
                        let release: ReleaseFn = Box::new(move || {
                            let result = resource.end().map_err(|source| {
                                DiError::ReleaseFailed {
                                    name: release_name,
                                    source,
                                }
                            });
                            future::ready(result).boxed()
                        });
                        Acquired {
                            value,
                            release: Some(release),
                        }
                    });
                future::ready(result).boxed()
            })
        }

        Payload::AsyncFunc(func) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let fut = func(params);
                let name = name.clone();
                async move {
                    let value = fut
                        .await
                        .map_err(|source| DiError::creation_failed(&name, source))?;
                    Ok(Acquired {
                        value,
                        release: None,
                    })
                }
                .boxed()
            })
        }

        Payload::AsyncGenFunc(func) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let mut stream = func(params);
                let name = name.clone();
                async move {
                    let value = match stream.next().await {
                        Some(Ok(value)) => value,
                        Some(Err(source)) => {
                            return Err(DiError::creation_failed(&name, source));
                        }
                        None => {
                            return Err(DiError::FactoryProtocol {
                                name,
                                reason: "generator did not yield a value".to_owned(),
                            });
                        }
                    };

                    let release: ReleaseFn = Box::new(move || {
                        async move {
                            match stream.next().await {
                                None => Ok(()),
                                Some(Err(source)) => {
                                    Err(DiError::ReleaseFailed { name, source })
                                }
                                Some(Ok(_)) => Err(DiError::FactoryProtocol {
                                    name,
                                    reason: "generator did not stop".to_owned(),
                                }),
                            }
                        }
                        .boxed()
                    });

                    Ok(Acquired {
                        value,
                        release: Some(release),
                    })
                }
                .boxed()
            })
        }

        Payload::AsyncScoped(resource) => {
            let name = name.to_owned();
            Arc::new(move |params| {
                let resource = Arc::clone(&resource);
                let name = name.clone();
                async move {
                    let value = resource
                        .begin(params)
                        .await
                        .map_err(|source| DiError::creation_failed(&name, source))?;

                    let release: ReleaseFn = Box::new(move || {
                        async move {
                            resource
                                .end()
                                .await
                                .map_err(|source| DiError::ReleaseFailed { name, source })
                        }
                        .boxed()
                    });

                    Ok(Acquired {
                        value,
                        release: Some(release),
                    })
                }
                .boxed()
            })
        }
    }
}

/// Drive a generator to its first value; the remainder of the sequence is
/// finalized on release and must complete without producing more values.
/// If the generator errors before yielding, dropping it finalizes it.
fn begin_generator(
    name: &str,
    func: &Arc<crate::factory::GeneratorFn>,
    params: Params,
) -> Result<Acquired> {
    let mut iter = func(params).map_err(|source| DiError::creation_failed(name, source))?;

    let value = match iter.next() {
        Some(Ok(value)) => value,
        Some(Err(source)) => return Err(DiError::creation_failed(name, source)),
        None => {
            return Err(DiError::FactoryProtocol {
                name: name.to_owned(),
                reason: "generator did not yield a value".to_owned(),
            });
        }
    };

    let release_name = name.to_owned();
    let release: ReleaseFn = Box::new(move || {
        let result = match iter.next() {
            None => Ok(()),
            Some(Err(source)) => Err(DiError::ReleaseFailed {
                name: release_name,
                source,
            }),
            Some(Ok(_)) => Err(DiError::FactoryProtocol {
                name: release_name,
                reason: "generator did not stop".to_owned(),
            }),
        };
        future::ready(result).boxed()
    });

    Ok(Acquired {
        value,
        release: Some(release),
    })
}
