//! Dependency expressions: what satisfies a single parameter.
//!
//! An expression is an ordered list of [`Condition`]s, optionally terminated by a fallback.
//! Candidates are evaluated left to right and the first one that succeeds supplies the
//! value. Two policies exist:
//!
//! * [`Condition::If`] falls back only when the dependency is unknown to the container chain.
//! * [`Condition::Try`] also falls back when creating the dependency fails.

use super::{
    DiError, DiResult,
    container::Container,
    key::{DependencyId, Key, Value},
};
use std::{fmt, sync::Arc};
use tracing::debug;

/// A single candidate within a [`DependencyExpression`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Use the dependency if the container chain knows how to provide it.
    If(DependencyId),
    /// Use the dependency if it can be provided without a dependency injection error.
    Try(DependencyId),
}

impl Condition {
    /// The dependency this condition requests.
    #[must_use]
    pub const fn id(&self) -> &DependencyId {
        match self {
            Self::If(id) | Self::Try(id) => id,
        }
    }

    /// `Ok(None)` signals that the next candidate should be tried.
    async fn get_from(&self, container: &Container) -> DiResult<Option<Value>> {
        match self {
            Self::If(id) => {
                if container.contains(id) {
                    container.resolve_id(id).await.map(Some)
                } else {
                    Ok(None)
                }
            }
            Self::Try(id) => match container.resolve_id(id).await {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    debug!(dependency = %id, error = %e, "conditional dependency failed - falling back");
                    Ok(None)
                }
            },
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::If(id) => write!(f, "{id}"),
            Self::Try(id) => write!(f, "Try[{id}]"),
        }
    }
}

#[derive(Clone, Debug)]
enum Fallback {
    Required,
    Nothing,
    Value(Value),
}

/// The steps needed to resolve the value for a single parameter.
#[derive(Clone, Debug)]
pub struct DependencyExpression {
    order: Vec<Condition>,
    fallback: Fallback,
}

impl DependencyExpression {
    /// Expression requesting `key`, falling through to later candidates only if it is unknown.
    #[must_use]
    pub fn of<T: Send + Sync + 'static>(key: Key<T>) -> Self {
        Self::from_id(key.id().clone())
    }

    /// Expression requesting `key`, falling through to later candidates if it cannot be created.
    #[must_use]
    pub fn attempt<T: Send + Sync + 'static>(key: Key<T>) -> Self {
        Self {
            order: vec![Condition::Try(key.id().clone())],
            fallback: Fallback::Required,
        }
    }

    pub(crate) fn from_id(id: DependencyId) -> Self {
        Self {
            order: vec![Condition::If(id)],
            fallback: Fallback::Required,
        }
    }

    /// Appends an `If` candidate.
    #[must_use]
    pub fn or<T: Send + Sync + 'static>(mut self, key: Key<T>) -> Self {
        self.order.push(Condition::If(key.id().clone()));
        self
    }

    /// Appends a `Try` candidate.
    #[must_use]
    pub fn or_try<T: Send + Sync + 'static>(mut self, key: Key<T>) -> Self {
        self.order.push(Condition::Try(key.id().clone()));
        self
    }

    /// Resolve to nothing when no candidate succeeds, instead of failing.
    #[must_use]
    pub fn or_none(mut self) -> Self {
        self.fallback = Fallback::Nothing;
        self
    }

    /// Resolve to `value` when no candidate succeeds, instead of failing.
    #[must_use]
    pub fn or_value<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.fallback = Fallback::Value(Arc::new(value));
        self
    }

    /// Whether resolution fails when no candidate succeeds.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.fallback, Fallback::Required)
    }

    /// The candidates in evaluation order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.order
    }

    /// Every dependency id this expression may request.
    pub fn candidates(&self) -> impl Iterator<Item = &DependencyId> {
        self.order.iter().map(Condition::id)
    }

    /// Ids that must exist before a dependent using this expression can be built.
    ///
    /// Only a lone required candidate is unconditional; alternatives are resolved lazily.
    pub(crate) fn required_ids(&self) -> Option<&DependencyId> {
        match (self.order.as_slice(), &self.fallback) {
            ([only], Fallback::Required) => Some(only.id()),
            _ => None,
        }
    }

    /// Resolves the value satisfying this expression from `container`.
    ///
    /// Returns `Ok(None)` only for optional expressions with no successful candidate.
    ///
    /// # Errors
    /// Propagates the container's error for a lone required candidate, otherwise returns
    /// [`DiError::DependencyNotSatisfiable`] when no candidate or fallback applies.
    pub async fn resolve(&self, container: &Container) -> DiResult<Option<Value>> {
        if let Some(id) = self.required_ids() {
            return container.resolve_id(id).await.map(Some);
        }

        for condition in &self.order {
            if let Some(found) = condition.get_from(container).await? {
                return Ok(Some(found));
            }
        }

        match &self.fallback {
            Fallback::Required => Err(DiError::not_satisfiable(format!(
                "no dependencies can satisfy the requested type {self}"
            ))),
            Fallback::Nothing => Ok(None),
            Fallback::Value(value) => Ok(Some(Arc::clone(value))),
        }
    }
}

impl fmt::Display for DependencyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.order.iter().map(ToString::to_string).collect();
        match self.fallback {
            Fallback::Required => {}
            Fallback::Nothing => parts.push("None".to_string()),
            Fallback::Value(_) => parts.push("<default>".to_string()),
        }
        f.write_str(&parts.join(" | "))
    }
}

impl<T: Send + Sync + 'static> From<Key<T>> for DependencyExpression {
    fn from(key: Key<T>) -> Self {
        Self::of(key)
    }
}

impl<T: Send + Sync + 'static> From<&Key<T>> for DependencyExpression {
    fn from(key: &Key<T>) -> Self {
        Self::of(key.clone())
    }
}
