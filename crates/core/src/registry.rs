//! Provider Registry
//!
//! A named collection of pluggable backends with a designated default. The
//! generation and synthesis registries share this implementation and differ
//! only in the provider trait they hold.
//!
//! The registry is read-mostly: registration happens at startup, dispatch
//! clones an `Arc` handle out of the read guard so that no lock is held while
//! a backend call is in flight.

use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Lifecycle shared by every provider kind.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Prepares the provider for use. Requests made before this succeeds fail
    /// with [`ProviderError::NotInitialized`].
    async fn initialize(&self) -> Result<()>;

    /// Releases provider resources.
    async fn cleanup(&self) -> Result<()>;
}

struct RegistryInner<P: ?Sized> {
    providers: BTreeMap<String, Arc<P>>,
    default_name: Option<String>,
    initialized: bool,
}

/// A thread-safe mapping from provider name to provider instance.
pub struct ProviderRegistry<P: ?Sized> {
    kind: &'static str,
    inner: RwLock<RegistryInner<P>>,
}

impl<P: Provider + ?Sized> ProviderRegistry<P> {
    /// Creates an empty registry. `kind` only labels log lines (e.g. "llm").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: RwLock::new(RegistryInner {
                providers: BTreeMap::new(),
                default_name: None,
                initialized: false,
            }),
        }
    }

    /// Inserts or replaces a provider. The first provider registered becomes
    /// the default.
    pub async fn register(&self, name: impl Into<String>, provider: Arc<P>) {
        let name = name.into();
        let mut inner = self.inner.write().await;
        if inner.providers.insert(name.clone(), provider).is_some() {
            warn!(kind = self.kind, provider = %name, "Replaced existing provider");
        }
        if inner.default_name.is_none() {
            inner.default_name = Some(name.clone());
        }
        info!(kind = self.kind, provider = %name, "Registered provider");
    }

    /// Selects the default provider.
    pub async fn set_default(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.providers.contains_key(name) {
            return Err(ProviderError::ProviderNotFound(name.to_string()));
        }
        inner.default_name = Some(name.to_string());
        Ok(())
    }

    /// Initializes every provider in name order, stopping at the first failure.
    ///
    /// On failure the registry is left not ready and providers after the
    /// failing one are never initialized.
    pub async fn initialize_all(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.initialized = false;
        for (name, provider) in &inner.providers {
            if let Err(e) = provider.initialize().await {
                warn!(kind = self.kind, provider = %name, error = %e, "Failed to initialize provider");
                return Err(e);
            }
        }
        inner.initialized = true;
        info!(kind = self.kind, count = inner.providers.len(), "Provider registry initialized");
        Ok(())
    }

    /// Cleans up every provider. Failures are logged and do not stop the rest.
    pub async fn cleanup_all(&self) {
        let mut inner = self.inner.write().await;
        for (name, provider) in &inner.providers {
            if let Err(e) = provider.cleanup().await {
                warn!(kind = self.kind, provider = %name, error = %e, "Failed to clean up provider");
            }
        }
        inner.initialized = false;
    }

    /// Looks up a provider by name.
    pub async fn get(&self, name: &str) -> Result<Arc<P>> {
        let inner = self.inner.read().await;
        if !inner.initialized {
            return Err(ProviderError::NotInitialized);
        }
        inner
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::ProviderNotFound(name.to_string()))
    }

    /// Resolves the default provider, returning its name alongside the handle.
    pub async fn default_provider(&self) -> Result<(String, Arc<P>)> {
        let inner = self.inner.read().await;
        if !inner.initialized {
            return Err(ProviderError::NotInitialized);
        }
        let name = inner
            .default_name
            .clone()
            .ok_or_else(|| ProviderError::ProviderNotFound("<default>".to_string()))?;
        let provider = inner
            .providers
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::ProviderNotFound(name.clone()))?;
        Ok((name, provider))
    }

    pub async fn default_name(&self) -> Option<String> {
        self.inner.read().await.default_name.clone()
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.providers.keys().cloned().collect()
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.initialized
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.providers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Backend {}

        #[async_trait]
        impl Provider for Backend {
            async fn initialize(&self) -> Result<()>;
            async fn cleanup(&self) -> Result<()>;
        }
    }

    fn ok_backend() -> Arc<MockBackend> {
        let mut backend = MockBackend::new();
        backend.expect_initialize().returning(|| Ok(()));
        backend.expect_cleanup().returning(|| Ok(()));
        Arc::new(backend)
    }

    fn registry() -> ProviderRegistry<dyn Provider> {
        ProviderRegistry::new("test")
    }

    #[tokio::test]
    async fn test_first_registration_becomes_default() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;
        registry.register("beta", ok_backend()).await;
        assert_eq!(registry.default_name().await.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;
        registry.register("beta", ok_backend()).await;
        registry.register("beta", ok_backend()).await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.default_name().await.as_deref(), Some("alpha"));

        // Re-registering the default keeps it as the default.
        registry.register("alpha", ok_backend()).await;
        assert_eq!(registry.default_name().await.as_deref(), Some("alpha"));
        assert_eq!(registry.names().await, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_set_default_requires_registered_name() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;

        let err = registry.set_default("missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::ProviderNotFound(name) if name == "missing"));
        assert_eq!(registry.default_name().await.as_deref(), Some("alpha"));

        registry.register("beta", ok_backend()).await;
        registry.set_default("beta").await.unwrap();
        assert_eq!(registry.default_name().await.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn test_dispatch_before_initialization_fails() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;

        assert!(matches!(
            registry.get("alpha").await,
            Err(ProviderError::NotInitialized)
        ));
        assert!(matches!(
            registry.default_provider().await,
            Err(ProviderError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_initialize_all_fails_fast() {
        let registry = registry();

        let mut first = MockBackend::new();
        first.expect_initialize().times(1).returning(|| Ok(()));
        let mut broken = MockBackend::new();
        broken
            .expect_initialize()
            .times(1)
            .returning(|| Err(ProviderError::Config("missing key".into())));
        let mut never = MockBackend::new();
        never.expect_initialize().times(0);

        registry.register("a-first", Arc::new(first)).await;
        registry.register("b-broken", Arc::new(broken)).await;
        registry.register("c-never", Arc::new(never)).await;

        let err = registry.initialize_all().await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
        assert!(!registry.is_ready().await);
        assert!(matches!(
            registry.get("a-first").await,
            Err(ProviderError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_lookup_after_initialization() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;
        registry.initialize_all().await.unwrap();

        assert!(registry.is_ready().await);
        assert!(registry.get("alpha").await.is_ok());
        assert!(matches!(
            registry.get("missing").await,
            Err(ProviderError::ProviderNotFound(_))
        ));
        let (name, _) = registry.default_provider().await.unwrap();
        assert_eq!(name, "alpha");
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_default() {
        let registry = registry();
        registry.initialize_all().await.unwrap();
        assert!(matches!(
            registry.default_provider().await,
            Err(ProviderError::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_all_marks_registry_not_ready() {
        let registry = registry();
        registry.register("alpha", ok_backend()).await;
        registry.initialize_all().await.unwrap();
        registry.cleanup_all().await;
        assert!(!registry.is_ready().await);
    }
}
