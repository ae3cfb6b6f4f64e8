//! Request-scoped metadata carried into command handlers.
//!
//! A [`Context`] is an immutable chain of typed entries. Setting a value
//! never changes an existing context: it returns a new one whose parent is
//! the old one, so contexts are cheap to clone and safe to share.
//!
//! The organization and application names are the two entries the config
//! pipeline reads; they parameterize every path it derives.
//!
//! ```ignore
//! let ctx = apply_context(None, [with_org_name("acme"), with_app_name("tool")]);
//! assert_eq!(org_name_of(&ctx), Some("acme"));
//! ```

use std::any::{Any, TypeId};
use std::sync::Arc;

/// A typed key for [`Context`] entries.
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;
}

/// Key for the organization name.
pub struct OrgName;

impl ContextKey for OrgName {
    type Value = String;
}

/// Key for the application name.
pub struct AppName;

impl ContextKey for AppName {
    type Value = String;
}

struct Entry {
    key: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("org_name", &self.get::<OrgName>())
            .field("app_name", &self.get::<AppName>())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// An empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new context with `value` stored under `K`. The nearest entry wins
    /// on lookup, so this shadows any value `K` had in `self`.
    pub fn with_value<K: ContextKey>(&self, value: K::Value) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key: TypeId::of::<K>(),
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// The nearest value stored under `K`, if any.
    pub fn get<K: ContextKey>(&self) -> Option<&K::Value> {
        let wanted = TypeId::of::<K>();
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if entry.key == wanted {
                return entry.value.downcast_ref::<K::Value>();
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    pub fn org_name(&self) -> Option<&str> {
        self.get::<OrgName>().map(String::as_str)
    }

    pub fn app_name(&self) -> Option<&str> {
        self.get::<AppName>().map(String::as_str)
    }
}

/// A pure function from one context to the next.
pub struct ContextTransform(Box<dyn Fn(&Context) -> Context + Send + Sync>);

impl ContextTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Context + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    pub fn apply(&self, ctx: &Context) -> Context {
        (self.0)(ctx)
    }
}

pub fn with_org_name(name: impl Into<String>) -> ContextTransform {
    let name = name.into();
    ContextTransform::new(move |ctx| ctx.with_value::<OrgName>(name.clone()))
}

pub fn with_app_name(name: impl Into<String>) -> ContextTransform {
    let name = name.into();
    ContextTransform::new(move |ctx| ctx.with_value::<AppName>(name.clone()))
}

/// Apply `transforms` in order on top of `parent` (an empty root if `None`).
pub fn apply_context(
    parent: Option<&Context>,
    transforms: impl IntoIterator<Item = ContextTransform>,
) -> Context {
    transforms
        .into_iter()
        .fold(parent.cloned().unwrap_or_default(), |ctx, t| t.apply(&ctx))
}

pub fn org_name_of(ctx: &Context) -> Option<&str> {
    ctx.org_name()
}

pub fn app_name_of(ctx: &Context) -> Option<&str> {
    ctx.app_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        let ctx = apply_context(None, [with_org_name("testorg"), with_app_name("testapp")]);
        assert_eq!(org_name_of(&ctx), Some("testorg"));
        assert_eq!(app_name_of(&ctx), Some("testapp"));
    }

    #[test]
    fn absent_parent_is_empty_root() {
        let ctx = apply_context(None, []);
        assert_eq!(org_name_of(&ctx), None);
        assert_eq!(app_name_of(&ctx), None);
    }

    #[test]
    fn unset_differs_from_empty() {
        let ctx = apply_context(None, [with_org_name("")]);
        assert_eq!(org_name_of(&ctx), Some(""));
        assert_eq!(app_name_of(&ctx), None);
    }

    #[test]
    fn parent_is_not_mutated() {
        let parent = apply_context(None, [with_org_name("acme")]);
        let child = apply_context(Some(&parent), [with_app_name("tool")]);
        assert_eq!(app_name_of(&parent), None);
        assert_eq!(org_name_of(&child), Some("acme"));
        assert_eq!(app_name_of(&child), Some("tool"));
    }

    #[test]
    fn nearest_value_shadows() {
        let first = apply_context(None, [with_org_name("old")]);
        let second = apply_context(Some(&first), [with_org_name("new")]);
        assert_eq!(org_name_of(&first), Some("old"));
        assert_eq!(org_name_of(&second), Some("new"));
    }

    #[test]
    fn transform_can_be_reused() {
        let set_org = with_org_name("acme");
        let a = set_org.apply(&Context::new());
        let b = set_org.apply(&Context::new());
        assert_eq!(a.org_name(), b.org_name());
    }

    #[test]
    fn custom_keys() {
        struct RequestId;
        impl ContextKey for RequestId {
            type Value = u64;
        }

        let ctx = Context::new().with_value::<RequestId>(42);
        assert_eq!(ctx.get::<RequestId>(), Some(&42));
        assert_eq!(ctx.org_name(), None);
    }
}
