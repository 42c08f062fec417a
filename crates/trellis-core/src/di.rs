//! Service container.
//!
//! Controllers and the services they use are registered into a [`Container`]
//! while the application is assembled. The container is then frozen into an
//! `Arc` and handed to the driver; from that point it is read-only, so every
//! request can resolve controllers without locking.
//!
//! Lifecycle: `new → register/set → freeze → serve → dispose`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::di::Container;
//!
//! struct Database { url: String }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Database { url: "postgres://localhost/db".into() }));
//! container.set("app.name", Arc::new(String::from("billing")));
//!
//! let container = container.freeze();
//! let db: Arc<Database> = container.resolve().unwrap();
//! let name: Arc<String> = container.get("app.name").unwrap();
//!
//! assert_eq!(db.url, "postgres://localhost/db");
//! assert_eq!(name.as_str(), "billing");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

type Service = Arc<dyn Any + Send + Sync>;
type DisposeHook = Box<dyn Fn() + Send + Sync>;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Failed to inject {target}: {reason}")]
pub struct InjectionError {
    /// The type or token that could not be resolved.
    pub target: String,
    /// Why resolution failed.
    pub reason: String,
}

impl InjectionError {
    /// A type was never registered.
    pub fn not_registered<T>() -> Self {
        Self {
            target: std::any::type_name::<T>().to_string(),
            reason: "service not registered".to_string(),
        }
    }

    /// A token was never set, or was set with another type.
    pub fn unknown_token<T>(token: &str) -> Self {
        Self {
            target: format!("token '{token}'"),
            reason: format!("no {} registered under this token", std::any::type_name::<T>()),
        }
    }
}

/// An explicitly constructed service container.
///
/// Services are stored as `Arc<T>` keyed either by their type or by a
/// string token. All services must be `Send + Sync`.
#[derive(Default)]
pub struct Container {
    by_type: HashMap<TypeId, Service>,
    by_token: HashMap<String, Service>,
    dispose_hooks: Vec<DisposeHook>,
    frozen: bool,
    disposed: AtomicBool,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under its type, replacing any previous one.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.by_type.insert(TypeId::of::<T>(), service);
        self
    }

    /// Registers a service under a string token.
    pub fn set<T: Send + Sync + 'static>(&mut self, token: impl Into<String>, service: Arc<T>) -> &mut Self {
        self.by_token.insert(token.into(), service);
        self
    }

    /// Adds a hook run once by [`Container::dispose`].
    pub fn on_dispose<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.dispose_hooks.push(Box::new(hook));
        self
    }

    /// Ends registration. The returned container is shared read-only.
    #[must_use]
    pub fn freeze(mut self) -> Arc<Self> {
        self.frozen = true;
        tracing::debug!(
            types = self.by_type.len(),
            tokens = self.by_token.len(),
            "container frozen"
        );
        Arc::new(self)
    }

    /// True once [`Container::freeze`] has run.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Resolves a service by type.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Resolves a service by type or fails.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// Resolves a service by token.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, token: &str) -> Option<Arc<T>> {
        self.by_token
            .get(token)
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Resolves a service by token or fails.
    pub fn get_required<T: Send + Sync + 'static>(&self, token: &str) -> Result<Arc<T>, InjectionError> {
        self.get(token)
            .ok_or_else(|| InjectionError::unknown_token::<T>(token))
    }

    /// True when a service of type `T` is registered.
    #[must_use]
    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// True when something is registered under `token`.
    #[must_use]
    pub fn has_token(&self, token: &str) -> bool {
        self.by_token.contains_key(token)
    }

    /// Number of registered services (types and tokens).
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len() + self.by_token.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the dispose hooks in registration order. Later calls do nothing.
    pub fn dispose(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        for hook in &self.dispose_hooks {
            hook();
        }
        tracing::debug!(hooks = self.dispose_hooks.len(), "container disposed");
    }

    /// True once [`Container::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("types", &self.by_type.len())
            .field("tokens", &self.by_token.len())
            .field("frozen", &self.frozen)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
