//! Request-scoped mount registries.
//!
//! Two separately-owned tables exist: the process-wide registry (created
//! once, lives forever) and per-scope registries carried by a tokio task
//! local. [`with_scope`] installs a fresh empty registry for the duration
//! of the enclosed future; everything running inside it — including
//! synchronous code on the same task — sees that registry, and nothing
//! outside it does. Concurrently running scopes are fully isolated from
//! each other, which is what lets per-request backend handles (e.g. a
//! handle keyed by a per-user credential) coexist in one process without
//! leaking across requests.

use std::sync::{Arc, LazyLock};

use crate::registry::MountRegistry;

static GLOBAL: LazyLock<Arc<MountRegistry>> = LazyLock::new(|| Arc::new(MountRegistry::new()));

tokio::task_local! {
    static SCOPE_REGISTRY: Arc<MountRegistry>;
}

/// The process-wide registry, used whenever no scope is active.
pub fn global() -> &'static Arc<MountRegistry> {
    &GLOBAL
}

/// The registry the calling context should use: the innermost active
/// scope's, or the process-wide one.
pub fn current() -> Arc<MountRegistry> {
    SCOPE_REGISTRY
        .try_with(Arc::clone)
        .unwrap_or_else(|_| Arc::clone(global()))
}

/// Run `fut` under a fresh, empty, private mount registry.
///
/// The registry is dropped (and its mounts with it) when the future
/// completes; the previously current registry is visible again afterward.
/// Nested scopes shadow their parent.
pub async fn with_scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    let registry = Arc::new(MountRegistry::new());
    tracing::debug!("entering mount scope");
    SCOPE_REGISTRY.scope(registry, fut).await
}

/// True when the calling context is inside a [`with_scope`] registry.
pub fn in_scope() -> bool {
    SCOPE_REGISTRY.try_with(|_| ()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_registry_is_private() {
        assert!(!in_scope());

        with_scope(async {
            assert!(in_scope());
            let scoped = current();
            assert!(!Arc::ptr_eq(&scoped, global()));
        })
        .await;

        assert!(!in_scope());
        assert!(Arc::ptr_eq(&current(), global()));
    }

    #[tokio::test]
    async fn nested_scopes_shadow() {
        with_scope(async {
            let outer = current();
            with_scope(async move {
                assert!(!Arc::ptr_eq(&current(), &outer));
            })
            .await;
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_scopes_each_see_their_own() {
        let a = tokio::spawn(with_scope(async {
            tokio::task::yield_now().await;
            current()
        }));
        let b = tokio::spawn(with_scope(async {
            tokio::task::yield_now().await;
            current()
        }));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
