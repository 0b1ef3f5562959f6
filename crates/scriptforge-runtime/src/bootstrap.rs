//! Sidecar bootstrap.
//!
//! Some hosts freeze their module search path after initial load, so the
//! engine implementation cannot be added to it at runtime. The deployment
//! pattern for those hosts is a thin host-visible shim whose package embeds
//! the real implementation as a secondary archive. At boot the shim:
//!
//! 1. extracts the embedded archive to a process-unique temporary file,
//! 2. constructs a [`SidecarLoader`] scoped to the host's search path plus
//!    the extracted archive, and
//! 3. instantiates the implementation entry point through an explicit
//!    factory registry keyed by a known symbol string, injecting the host
//!    handle as its sole dependency.
//!
//! Failures in steps 1–3 are fatal to startup and carry distinct variants so
//! diagnostics can tell a missing symbol from a mis-shaped factory from a
//! construction failure.

use scriptforge_host_core::ModuleSearchPath;
use std::any::Any;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while bootstrapping the engine implementation.
///
/// All of these abort startup; no partial engine state is retained.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The embedded sidecar archive is absent from the shim's resources.
    #[error("embedded archive not found at resource path '{0}'")]
    ResourceMissing(String),

    /// No factory is registered under the requested symbol.
    #[error("bootstrap symbol not found: '{0}'")]
    SymbolNotFound(String),

    /// A factory exists but does not accept the supplied host handle type.
    #[error("bootstrap factory '{symbol}' expects host handle type {expected}")]
    FactoryShape { symbol: String, expected: &'static str },

    /// The factory ran but construction failed.
    #[error("bootstrap factory '{symbol}' failed to construct")]
    ConstructFailed {
        symbol: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `construct` was called before a successful `extract`.
    #[error("no extracted sidecar archive")]
    NotExtracted,

    /// `instantiate` was called before `construct`.
    #[error("sidecar loader has not been constructed")]
    LoaderNotConstructed,

    /// IO error during extraction.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Access to the resources bundled into the host-visible shim.
pub trait ResourceBundle: Send + Sync {
    /// The raw bytes of the named resource, if present.
    fn resource(&self, path: &str) -> Option<Vec<u8>>;
}

/// A loader scoped to `{parent search path, extracted archive, runtime
/// additions}`. Modules resolve from the host first, then the sidecar, then
/// anything appended at runtime.
#[derive(Debug)]
pub struct SidecarLoader {
    parent: Arc<ModuleSearchPath>,
    extras: RwLock<Vec<PathBuf>>,
}

impl SidecarLoader {
    fn new(parent: Arc<ModuleSearchPath>, extracted: &Path) -> Self {
        Self {
            parent,
            extras: RwLock::new(vec![extracted.to_path_buf()]),
        }
    }

    /// Make the code at `path` resolvable for the rest of the process
    /// lifetime.
    pub fn add_archive(&self, path: &Path) {
        let mut extras = self.extras.write().expect("sidecar extras poisoned");
        if !extras.iter().any(|p| p == path) {
            extras.push(path.to_path_buf());
        }
    }

    /// The full resolution path: parent entries first, then sidecar entries
    /// in the order they were added.
    pub fn resolution_path(&self) -> Vec<PathBuf> {
        let mut paths = self.parent.snapshot();
        let extras = self.extras.read().expect("sidecar extras poisoned");
        paths.extend(extras.iter().cloned());
        paths
    }

    /// Release runtime additions. The extracted archive itself is deleted by
    /// [`SidecarBootstrap::dispose`].
    pub fn close(&self) {
        self.extras.write().expect("sidecar extras poisoned").clear();
    }
}

/// The implementation entry point a bootstrap factory constructs.
pub trait EngineBootstrap: Send {
    /// Bring the implementation up. Called once, after construction.
    fn enable(&mut self);

    /// Tear the implementation down. Called once, at host shutdown.
    fn disable(&mut self);
}

type FactoryFn = dyn Fn(&(dyn Any + Send + Sync)) -> Result<Box<dyn EngineBootstrap>, BootstrapError>
    + Send
    + Sync;

/// Explicit factory registry keyed by symbol string.
///
/// Replaces by-name reflective instantiation: the shim registers a factory
/// for each known entry point at compile time, and `instantiate` resolves
/// the symbol through this map.
#[derive(Default)]
pub struct BootstrapRegistry {
    factories: HashMap<String, Box<FactoryFn>>,
}

impl BootstrapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `symbol`. The factory receives the host
    /// handle downcast to `H`; a handle of any other type is a shape error.
    pub fn register<H, F>(&mut self, symbol: impl Into<String>, factory: F)
    where
        H: Any + Send + Sync,
        F: Fn(&H) -> Result<Box<dyn EngineBootstrap>, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        let symbol = symbol.into();
        let symbol_inner = symbol.clone();
        self.factories.insert(
            symbol,
            Box::new(move |host| {
                let host = host.downcast_ref::<H>().ok_or_else(|| {
                    BootstrapError::FactoryShape {
                        symbol: symbol_inner.clone(),
                        expected: std::any::type_name::<H>(),
                    }
                })?;
                factory(host).map_err(|source| BootstrapError::ConstructFailed {
                    symbol: symbol_inner.clone(),
                    source,
                })
            }),
        );
    }

    fn resolve(&self, symbol: &str) -> Result<&FactoryFn, BootstrapError> {
        self.factories
            .get(symbol)
            .map(|f| f.as_ref())
            .ok_or_else(|| BootstrapError::SymbolNotFound(symbol.to_string()))
    }
}

/// Extracts the embedded implementation archive and wires up the scoped
/// loader and entry point.
pub struct SidecarBootstrap {
    extracted: Mutex<Option<tempfile::TempPath>>,
    loader: Mutex<Option<Arc<SidecarLoader>>>,
}

impl SidecarBootstrap {
    pub fn new() -> Self {
        Self {
            extracted: Mutex::new(None),
            loader: Mutex::new(None),
        }
    }

    /// Locate the embedded archive in `resources` and copy it to a fresh,
    /// process-unique temporary file. The file is deleted on `dispose` and
    /// best-effort at drop.
    pub fn extract(
        &self,
        resources: &dyn ResourceBundle,
        resource_path: &str,
    ) -> Result<PathBuf, BootstrapError> {
        let bytes = resources
            .resource(resource_path)
            .ok_or_else(|| BootstrapError::ResourceMissing(resource_path.to_string()))?;

        let mut file = NamedTempFile::with_prefix("scriptforge-sidecar-")?;
        file.write_all(&bytes)?;
        file.flush()?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        info!("extracted sidecar archive to {:?}", path);

        *self.extracted.lock().expect("bootstrap state poisoned") = Some(temp_path);
        Ok(path)
    }

    /// Build the loader scoped to the parent search path plus the extracted
    /// archive. Requires a prior successful `extract`.
    pub fn construct(
        &self,
        parent: Arc<ModuleSearchPath>,
    ) -> Result<Arc<SidecarLoader>, BootstrapError> {
        let extracted = self.extracted.lock().expect("bootstrap state poisoned");
        let path = extracted
            .as_ref()
            .map(|p| p.to_path_buf())
            .ok_or(BootstrapError::NotExtracted)?;

        let loader = Arc::new(SidecarLoader::new(parent, &path));
        *self.loader.lock().expect("bootstrap state poisoned") = Some(Arc::clone(&loader));
        debug!("constructed sidecar loader over {:?}", path);
        Ok(loader)
    }

    /// Resolve `symbol` in `registry` and construct the implementation,
    /// injecting `host` as its sole dependency.
    pub fn instantiate(
        &self,
        registry: &BootstrapRegistry,
        symbol: &str,
        host: &(dyn Any + Send + Sync),
    ) -> Result<Box<dyn EngineBootstrap>, BootstrapError> {
        if self.loader.lock().expect("bootstrap state poisoned").is_none() {
            return Err(BootstrapError::LoaderNotConstructed);
        }
        let factory = registry.resolve(symbol)?;
        factory(host)
    }

    /// Release the loader, then delete the temporary archive. Deletion
    /// failure is logged, not fatal.
    pub fn dispose(&self) {
        if let Some(loader) = self.loader.lock().expect("bootstrap state poisoned").take() {
            loader.close();
        }
        if let Some(path) = self.extracted.lock().expect("bootstrap state poisoned").take() {
            if let Err(e) = path.close() {
                warn!("failed to delete extracted sidecar archive: {}", e);
            }
        }
    }
}

impl Default for SidecarBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapBundle(HashMap<String, Vec<u8>>);

    impl ResourceBundle for MapBundle {
        fn resource(&self, path: &str) -> Option<Vec<u8>> {
            self.0.get(path).cloned()
        }
    }

    struct NullBootstrap;

    impl EngineBootstrap for NullBootstrap {
        fn enable(&mut self) {}
        fn disable(&mut self) {}
    }

    struct HostHandle {
        fail: bool,
    }

    fn bundle_with_archive() -> MapBundle {
        let mut map = HashMap::new();
        map.insert("impl/engine.sfa".to_string(), b"archive bytes".to_vec());
        MapBundle(map)
    }

    fn test_registry() -> BootstrapRegistry {
        let mut registry = BootstrapRegistry::new();
        registry.register("engine-main", |host: &HostHandle| {
            if host.fail {
                Err("construction rejected".into())
            } else {
                Ok(Box::new(NullBootstrap) as Box<dyn EngineBootstrap>)
            }
        });
        registry
    }

    #[test]
    fn test_extract_missing_resource_is_fatal() {
        let bootstrap = SidecarBootstrap::new();
        let result = bootstrap.extract(&bundle_with_archive(), "impl/missing.sfa");
        assert!(matches!(result, Err(BootstrapError::ResourceMissing(_))));
    }

    #[test]
    fn test_extract_construct_instantiate_dispose() {
        let bootstrap = SidecarBootstrap::new();
        let extracted = bootstrap
            .extract(&bundle_with_archive(), "impl/engine.sfa")
            .unwrap();
        assert!(extracted.exists());
        assert_eq!(std::fs::read(&extracted).unwrap(), b"archive bytes");

        let parent = Arc::new(ModuleSearchPath::new());
        parent.push(Path::new("/host/modules"));
        let loader = bootstrap.construct(Arc::clone(&parent)).unwrap();
        assert_eq!(loader.resolution_path().len(), 2);

        loader.add_archive(Path::new("/libs/extra.sfa"));
        assert_eq!(loader.resolution_path().len(), 3);

        let registry = test_registry();
        let host = HostHandle { fail: false };
        bootstrap
            .instantiate(&registry, "engine-main", &host)
            .unwrap();

        bootstrap.dispose();
        assert!(!extracted.exists());
    }

    #[test]
    fn test_instantiate_error_taxonomy_is_distinct() {
        let bootstrap = SidecarBootstrap::new();
        bootstrap
            .extract(&bundle_with_archive(), "impl/engine.sfa")
            .unwrap();
        bootstrap
            .construct(Arc::new(ModuleSearchPath::new()))
            .unwrap();

        let registry = test_registry();

        // Unknown symbol.
        let host = HostHandle { fail: false };
        let result = bootstrap.instantiate(&registry, "engine-aux", &host);
        assert!(matches!(result, Err(BootstrapError::SymbolNotFound(_))));

        // Wrong host handle type.
        let wrong: u32 = 7;
        let result = bootstrap.instantiate(&registry, "engine-main", &wrong);
        assert!(matches!(result, Err(BootstrapError::FactoryShape { .. })));

        // Construction failure.
        let host = HostHandle { fail: true };
        let result = bootstrap.instantiate(&registry, "engine-main", &host);
        assert!(matches!(result, Err(BootstrapError::ConstructFailed { .. })));

        bootstrap.dispose();
    }

    #[test]
    fn test_instantiate_before_construct_fails() {
        let bootstrap = SidecarBootstrap::new();
        let registry = test_registry();
        let host = HostHandle { fail: false };
        let result = bootstrap.instantiate(&registry, "engine-main", &host);
        assert!(matches!(result, Err(BootstrapError::LoaderNotConstructed)));
    }
}
