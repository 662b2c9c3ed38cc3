//! Dependency identity.
//!
//! A [`DependencyId`] is the single key used for graph nodes, registry lookups and the
//! container instance caches. It is derived from a Rust type plus an optional tag, so two
//! keys naming the same type and tag always produce equal ids. [`Key`] is the typed token
//! callers construct; it carries the value type so registration and resolution stay
//! statically checked.

use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

/// Type-erased dependency instance as stored by containers.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Canonical identifier of a dependency.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependencyId {
    type_id: TypeId,
    type_name: &'static str,
    tag: Option<Cow<'static, str>>,
}

impl DependencyId {
    /// Identifier for the untagged dependency of type `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: None,
        }
    }

    /// Identifier for the dependency of type `T` labelled with `tag`.
    #[must_use]
    pub fn tagged<T: 'static>(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::of::<T>()
        }
    }

    /// Fully qualified name of the underlying type, including generic arguments.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The tag distinguishing this id from other ids of the same type, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}[{tag}]", self.type_name),
            None => f.write_str(self.type_name),
        }
    }
}

/// Typed token naming a dependency of type `T`.
pub struct Key<T> {
    id: DependencyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Key<T> {
    /// Key for the plain, untagged dependency of type `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: DependencyId::of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Key for a dependency of type `T` distinguished by `tag`.
    ///
    /// Useful when several dependencies share a type, e.g. two `String` settings.
    #[must_use]
    pub fn tagged(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: DependencyId::tagged::<T>(tag),
            _marker: PhantomData,
        }
    }

    /// The identifier this key resolves to.
    #[must_use]
    pub const fn id(&self) -> &DependencyId {
        &self.id
    }

    pub(crate) fn downcast(&self, value: Value) -> super::DiResult<Arc<T>> {
        value
            .downcast::<T>()
            .map_err(|_| super::DiError::TypeMismatch {
                id: self.id.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl<T: Send + Sync + 'static> Default for Key<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Foo;

    #[test]
    fn test_same_type_produces_identical_id() {
        assert_eq!(Key::<Foo>::new().id(), Key::<Foo>::new().id());
        assert_eq!(DependencyId::of::<Foo>().to_string(), DependencyId::of::<Foo>().to_string());
    }

    #[test]
    fn test_tag_distinguishes_ids() {
        let plain = DependencyId::of::<String>();
        let tagged = DependencyId::tagged::<String>("d1");

        assert_ne!(plain, tagged);
        assert_eq!(tagged, DependencyId::tagged::<String>("d1"));
        assert_eq!(tagged.tag(), Some("d1"));
        assert!(tagged.to_string().ends_with("[d1]"));
    }

    #[test]
    fn test_generic_arguments_are_encoded() {
        let a = DependencyId::of::<HashMap<String, u32>>();
        let b = DependencyId::of::<HashMap<String, u64>>();

        assert_ne!(a, b);
        assert!(a.to_string().contains("u32"));
        assert!(a.type_name().contains("HashMap"));
    }

    #[test]
    fn test_downcast_mismatch_reports_type() {
        let key = Key::<u32>::new();
        let value: Value = Arc::new("not a number");

        let err = key.downcast(value).err();
        assert!(matches!(err, Some(crate::di::DiError::TypeMismatch { expected: "u32", .. })));
    }
}
