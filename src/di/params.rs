//! Callable signatures and argument sets.
//!
//! Rust closures cannot be introspected, so callables that take part in dependency injection
//! declare their parameters up front with a [`Signature`]. The values supplied by a caller,
//! plus anything injected, travel to the callable as [`Arguments`].

use super::{
    DiError, DiResult,
    conditions::DependencyExpression,
    key::Value,
};
use std::{collections::HashMap, sync::Arc};

/// How a parameter may be supplied by a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Only by position. Never injected.
    PositionalOnly,
    /// By position or by name.
    PositionalOrKeyword,
    /// Only by name.
    KeywordOnly,
    /// Catch-all for extra positional values. Never injected.
    VarPositional,
    /// Catch-all for extra named values. Never injected.
    VarKeyword,
}

/// Default value of a parameter.
#[derive(Clone, Debug, Default)]
pub enum ParamDefault {
    /// No default; the value must be supplied or injected.
    #[default]
    Empty,
    /// Explicit marker requesting injection.
    Injected,
    /// A literal default. Parameters with one are never injected.
    Value(Value),
}

/// Marker default requesting that a parameter be dependency injected.
pub const INJECTED: ParamDefault = ParamDefault::Injected;

/// A single declared parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    annotation: Option<DependencyExpression>,
    default: ParamDefault,
}

impl Parameter {
    fn with_kind(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            annotation: None,
            default: ParamDefault::Empty,
        }
    }

    /// A parameter that may be passed by position or by name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::PositionalOrKeyword)
    }

    /// A parameter that may only be passed by position.
    #[must_use]
    pub fn positional_only(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::PositionalOnly)
    }

    /// A parameter that may only be passed by name.
    #[must_use]
    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::KeywordOnly)
    }

    /// A catch-all for extra positional values.
    #[must_use]
    pub fn var_positional(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::VarPositional)
    }

    /// A catch-all for extra named values.
    #[must_use]
    pub fn var_keyword(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::VarKeyword)
    }

    /// Sets the dependency expression that satisfies this parameter.
    #[must_use]
    pub fn annotated(mut self, expression: impl Into<DependencyExpression>) -> Self {
        self.annotation = Some(expression.into());
        self
    }

    /// Marks the parameter as injected.
    #[must_use]
    pub fn injected(self) -> Self {
        self.with_default(INJECTED)
    }

    /// Gives the parameter a literal default, which also opts it out of injection.
    #[must_use]
    pub fn default_value<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.with_default(ParamDefault::Value(Arc::new(value)))
    }

    /// Sets the default.
    #[must_use]
    pub fn with_default(mut self, default: ParamDefault) -> Self {
        self.default = default;
        self
    }

    /// The parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the parameter may be supplied.
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// The dependency expression, if the parameter is annotated.
    #[must_use]
    pub const fn annotation(&self) -> Option<&DependencyExpression> {
        self.annotation.as_ref()
    }

    /// The declared default.
    #[must_use]
    pub const fn param_default(&self) -> &ParamDefault {
        &self.default
    }

    /// Whether the parameter can be filled from a positional argument.
    #[must_use]
    pub const fn is_positional(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword
        )
    }
}

/// The declared parameter list of a callable.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// An empty signature.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.params.push(parameter);
        self
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The positional slot `name` occupies, if it can be passed by position.
    fn position_of(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .filter(|p| p.is_positional())
            .position(|p| p.name == name)
    }
}

impl FromIterator<Parameter> for Signature {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Values passed to a callable, by position and by name.
///
/// Once bound to a [`Signature`], named lookups also see positional values in their declared
/// slots and fall back to literal parameter defaults.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    positional: Vec<Value>,
    keyword: HashMap<String, Value>,
    signature: Option<Arc<Signature>>,
}

impl Arguments {
    /// An empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional value.
    #[must_use]
    pub fn push<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.push_value(Arc::new(value))
    }

    /// Appends an already shared positional value.
    #[must_use]
    pub fn push_value(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Sets a named value.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with_value(name, Arc::new(value))
    }

    /// Sets an already shared named value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.keyword.insert(name.into(), value);
    }

    pub(crate) fn bind(mut self, signature: Arc<Signature>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Number of positional values supplied.
    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    /// Whether a value was supplied under `name`.
    #[must_use]
    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword.contains_key(name)
    }

    /// The value for `name`: supplied by name, by position, or by literal default.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.keyword.get(name) {
            return Some(value);
        }

        let signature = self.signature.as_deref()?;
        if let Some(value) = signature
            .position_of(name)
            .and_then(|index| self.positional.get(index))
        {
            return Some(value);
        }

        match signature.get(name)?.param_default() {
            ParamDefault::Value(value) => Some(value),
            ParamDefault::Empty | ParamDefault::Injected => None,
        }
    }

    /// The value for `name`, downcast to `T`.
    ///
    /// # Errors
    /// [`DiError::MissingArgument`] if no value is available, [`DiError::TypeMismatch`] if it
    /// is not a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        self.get_optional(name)?
            .ok_or_else(|| DiError::MissingArgument {
                name: name.to_string(),
            })
    }

    /// Like [`Arguments::get`], but a missing value is `Ok(None)`.
    ///
    /// # Errors
    /// [`DiError::TypeMismatch`] if the value is not a `T`.
    pub fn get_optional<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Option<Arc<T>>> {
        self.value(name)
            .map(|value| downcast_argument(name, value))
            .transpose()
    }

    /// The positional value at `index`, downcast to `T`.
    ///
    /// # Errors
    /// [`DiError::MissingArgument`] if fewer values were supplied, [`DiError::TypeMismatch`]
    /// if it is not a `T`.
    pub fn positional<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let name = format!("#{index}");
        self.positional
            .get(index)
            .ok_or_else(|| DiError::MissingArgument { name: name.clone() })
            .and_then(|value| downcast_argument(&name, value))
    }
}

fn downcast_argument<T: Send + Sync + 'static>(name: &str, value: &Value) -> DiResult<Arc<T>> {
    Arc::clone(value)
        .downcast::<T>()
        .map_err(|_| DiError::TypeMismatch {
            id: format!("argument {name:?}"),
            expected: std::any::type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::di::Key;

    fn signature() -> Arc<Signature> {
        Arc::new(
            Signature::new()
                .param(Parameter::positional_only("ctx"))
                .param(Parameter::new("count"))
                .param(Parameter::keyword_only("label").default_value("none"))
                .param(Parameter::new("db").annotated(Key::<u64>::new()).injected()),
        )
    }

    #[test]
    fn test_positional_values_bind_to_declared_slots() {
        let args = Arguments::new()
            .push("context")
            .push(3_u32)
            .bind(signature());

        assert_eq!(*args.get::<&str>("ctx").unwrap(), "context");
        assert_eq!(*args.get::<u32>("count").unwrap(), 3);
        assert_eq!(*args.positional::<u32>(1).unwrap(), 3);
    }

    #[test]
    fn test_keyword_takes_precedence_and_defaults_fill_gaps() {
        let args = Arguments::new()
            .with("label", "custom")
            .bind(signature());
        assert_eq!(*args.get::<&str>("label").unwrap(), "custom");

        let args = Arguments::new().bind(signature());
        assert_eq!(*args.get::<&str>("label").unwrap(), "none");
    }

    #[test]
    fn test_missing_and_mismatched_arguments() {
        let args = Arguments::new().push(1_u8).bind(signature());

        assert!(matches!(args.get::<u64>("db"), Err(DiError::MissingArgument { .. })));
        assert!(args.get_optional::<u64>("db").unwrap().is_none());
        assert!(matches!(args.get::<String>("ctx"), Err(DiError::TypeMismatch { .. })));
        assert!(matches!(args.positional::<u8>(4), Err(DiError::MissingArgument { .. })));
    }

    #[test]
    fn test_unbound_arguments_only_see_keywords() {
        let args = Arguments::new().push(1_u8).with("named", 2_u8);

        assert!(args.value("ctx").is_none());
        assert!(args.has_keyword("named"));
        assert_eq!(args.positional_len(), 1);
    }
}
