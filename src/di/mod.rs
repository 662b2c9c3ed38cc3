//! Dependency injection.
//!
//! Dependencies are declared in a [`Registry`], instantiated lazily and cached by a
//! [`Container`], and supplied to callables by [`AutoInjecting`] wrappers. The
//! [`DependencyInjectionManager`] ties these together: one registry per [`DiContext`] and a
//! container hierarchy that mirrors how contexts are nested at runtime.

pub mod conditions;
pub mod container;
pub mod error;
pub mod factory;
pub mod graph;
pub mod injecting;
pub mod key;
pub mod manager;
pub mod params;
pub mod registry;

pub use conditions::{Condition, DependencyExpression};
pub use container::Container;
pub use error::{BoxError, DiError, DiResult};
pub use factory::{Factory, Teardown};
pub use graph::DiGraph;
pub use injecting::{AutoInjecting, BoundInjecting, with_di};
pub use key::{DependencyId, Key, Value};
pub use manager::{Contexts, DependencyInjectionManager, DiContext, current_container};
pub use params::{Arguments, INJECTED, ParamDefault, Parameter, ParameterKind, Signature};
pub use registry::Registry;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
