// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundle registry: the set of known bundles and their lifecycle.
//!
//! One `RwLock` guards the structural map of bundle ids. Each record carries
//! its own `Mutex` for state transitions, so unrelated bundles can activate
//! concurrently while two transitions of the same bundle are serialized.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, RwLock};

use rescon_core::{
    BundleDescriptor, BundleInfo, BundleKind, BundleState, ContainerError, EntryPointKind,
    ResourceConfig,
};

use crate::context::BundleContext;
use crate::loader::{Capabilities, LoadedModule, ModuleLoader};

struct RecordState {
    state: BundleState,
    module: Option<Box<dyn LoadedModule>>,
    capabilities: Capabilities,
}

struct BundleRecord {
    descriptor: BundleDescriptor,
    inner: Mutex<RecordState>,
}

impl BundleRecord {
    fn info(&self) -> Result<BundleInfo, ContainerError> {
        let inner = self.inner.lock().map_err(ContainerError::poisoned)?;
        Ok(BundleInfo {
            descriptor: self.descriptor.clone(),
            state: inner.state,
            capabilities: inner.capabilities.kinds(),
        })
    }
}

/// Registry of bundles keyed by id.
pub struct BundleRegistry {
    entries: RwLock<HashMap<String, Arc<BundleRecord>>>,
    loaders: HashMap<BundleKind, Arc<dyn ModuleLoader>>,
}

impl BundleRegistry {
    /// Create an empty registry with no loaders. External bundles can always be recorded.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            loaders: HashMap::new(),
        }
    }

    /// Use `loader` for bundles of `kind`.
    pub fn with_loader(mut self, kind: BundleKind, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loaders.insert(kind, loader);
        self
    }

    pub fn has_loader(&self, kind: BundleKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    fn record(&self, id: &str) -> Result<Arc<BundleRecord>, ContainerError> {
        self.entries
            .read()
            .map_err(ContainerError::poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| ContainerError::bundle_not_found(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(id))
            .unwrap_or(false)
    }

    /// Record and load a bundle.
    ///
    /// Managed bundles without a managed loader and External bundles are
    /// recorded as `Installed` without loading. Load failures leave no record.
    pub fn register(&self, descriptor: BundleDescriptor) -> Result<BundleInfo, ContainerError> {
        if self.contains(&descriptor.id) {
            return Err(ContainerError::bundle_exists(&descriptor.id));
        }

        let mut descriptor = descriptor;
        if descriptor.kind == BundleKind::Managed && !self.has_loader(BundleKind::Managed) {
            tracing::warn!(
                bundle_id = %descriptor.id,
                "no managed runtime available; recording bundle as external"
            );
            descriptor.kind = BundleKind::External;
        }

        let (state, module, capabilities) = match descriptor.kind {
            BundleKind::External => (BundleState::Installed, None, Capabilities::default()),
            kind => {
                let loader = self.loaders.get(&kind).ok_or_else(|| {
                    ContainerError::from(crate::loader::LoadError::NoLoader {
                        bundle_id: descriptor.id.clone(),
                        kind,
                    })
                })?;
                let module = loader.load(&descriptor).inspect_err(|e| {
                    tracing::error!(bundle_id = %descriptor.id, error = %e, "bundle load failed");
                })?;
                let capabilities = Capabilities::resolve(&descriptor.id, module.as_ref());
                (BundleState::Loaded, Some(module), capabilities)
            }
        };

        let record = Arc::new(BundleRecord {
            descriptor,
            inner: Mutex::new(RecordState {
                state,
                module,
                capabilities,
            }),
        });
        let info = record.info()?;

        let mut entries = self.entries.write().map_err(ContainerError::poisoned)?;
        if entries.contains_key(&record.descriptor.id) {
            drop(entries);
            Self::discard(&record);
            return Err(ContainerError::bundle_exists(&record.descriptor.id));
        }
        entries.insert(record.descriptor.id.clone(), record);
        drop(entries);

        tracing::info!(
            bundle_id = %info.descriptor.id,
            kind = %info.descriptor.kind,
            state = %info.state,
            "bundle registered"
        );
        Ok(info)
    }

    /// Unload a module that lost a registration race.
    fn discard(record: &BundleRecord) {
        if let Ok(mut inner) = record.inner.lock() {
            inner.capabilities.clear();
            if let Some(mut module) = inner.module.take() {
                if let Err(e) = module.unload() {
                    tracing::warn!(
                        bundle_id = %record.descriptor.id,
                        error = %e,
                        "discarded module did not unload"
                    );
                }
            }
        }
    }

    /// Invoke the bundle's activate entry point.
    pub fn activate(&self, id: &str, ctx: &BundleContext) -> Result<(), ContainerError> {
        let record = self.record(id)?;
        let mut inner = record.inner.lock().map_err(ContainerError::poisoned)?;
        match inner.state {
            BundleState::Installed => {
                return Err(ContainerError::invalid_state(id, "bundle is not loaded"));
            }
            BundleState::Activated => {
                return Err(ContainerError::invalid_state(id, "bundle is already activated"));
            }
            BundleState::Loaded => {}
        }
        let activate = inner
            .capabilities
            .activate()
            .cloned()
            .ok_or_else(|| unsupported(id, EntryPointKind::Activate))?;

        guarded(id, EntryPointKind::Activate, || activate(ctx)).inspect_err(|e| {
            tracing::error!(bundle_id = %id, error = %e, "bundle activation failed");
        })?;
        inner.state = BundleState::Activated;
        tracing::info!(bundle_id = %id, "bundle activated");
        Ok(())
    }

    /// Invoke the bundle's deactivate entry point. On failure the bundle stays activated.
    pub fn deactivate(&self, id: &str) -> Result<(), ContainerError> {
        let record = self.record(id)?;
        let mut inner = record.inner.lock().map_err(ContainerError::poisoned)?;
        if inner.state != BundleState::Activated {
            return Err(ContainerError::invalid_state(id, "bundle is not activated"));
        }
        let deactivate = inner
            .capabilities
            .deactivate()
            .cloned()
            .ok_or_else(|| unsupported(id, EntryPointKind::Deactivate))?;

        guarded(id, EntryPointKind::Deactivate, || deactivate()).inspect_err(|e| {
            tracing::error!(bundle_id = %id, error = %e, "bundle deactivation failed");
        })?;
        inner.state = BundleState::Loaded;
        tracing::info!(bundle_id = %id, "bundle deactivated");
        Ok(())
    }

    /// Unload and forget a bundle that is not activated.
    ///
    /// If the platform refuses to unload, the record stays `Loaded` with its
    /// entry points re-resolved.
    pub fn unregister(&self, id: &str) -> Result<BundleDescriptor, ContainerError> {
        let record = self.record(id)?;
        {
            let mut inner = record.inner.lock().map_err(ContainerError::poisoned)?;
            if inner.state == BundleState::Activated {
                return Err(ContainerError::invalid_state(id, "bundle is still activated"));
            }
            inner.capabilities.clear();
            if let Some(mut module) = inner.module.take() {
                if let Err(e) = module.unload() {
                    inner.capabilities = Capabilities::resolve(id, module.as_ref());
                    inner.module = Some(module);
                    tracing::error!(bundle_id = %id, error = %e, "bundle unload failed");
                    return Err(ContainerError::UnloadFailure {
                        bundle_id: id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.entries
            .write()
            .map_err(ContainerError::poisoned)?
            .remove(id);
        tracing::info!(bundle_id = %id, "bundle unregistered");
        Ok(record.descriptor.clone())
    }

    /// Forget a bundle regardless of state.
    ///
    /// The module is unloaded if possible; otherwise it is dropped and the
    /// shared object stays mapped until its last handle goes away.
    pub fn evict(&self, id: &str) -> Result<BundleDescriptor, ContainerError> {
        let record = self
            .entries
            .write()
            .map_err(ContainerError::poisoned)?
            .remove(id)
            .ok_or_else(|| ContainerError::bundle_not_found(id))?;
        let mut inner = record.inner.lock().map_err(ContainerError::poisoned)?;
        inner.capabilities.clear();
        if let Some(mut module) = inner.module.take() {
            if let Err(e) = module.unload() {
                tracing::warn!(bundle_id = %id, error = %e, "evicted bundle did not unload");
            }
        }
        inner.state = BundleState::Installed;
        tracing::info!(bundle_id = %id, "bundle evicted");
        Ok(record.descriptor.clone())
    }

    /// Invoke the bundle's create-resource entry point.
    pub fn create_resource(
        &self,
        id: &str,
        ctx: &BundleContext,
        config: &ResourceConfig,
    ) -> Result<(), ContainerError> {
        let record = self.record(id)?;
        let inner = record.inner.lock().map_err(ContainerError::poisoned)?;
        if inner.state != BundleState::Activated {
            return Err(ContainerError::invalid_state(id, "bundle is not activated"));
        }
        let create = inner
            .capabilities
            .create_resource()
            .cloned()
            .ok_or_else(|| unsupported(id, EntryPointKind::CreateResource))?;
        guarded(id, EntryPointKind::CreateResource, || create(ctx, config))
    }

    /// Invoke the bundle's destroy-resource entry point.
    pub fn destroy_resource(
        &self,
        id: &str,
        ctx: &BundleContext,
        uri: &str,
    ) -> Result<(), ContainerError> {
        let record = self.record(id)?;
        let inner = record.inner.lock().map_err(ContainerError::poisoned)?;
        if !inner.state.is_loaded() {
            return Err(ContainerError::invalid_state(id, "bundle is not loaded"));
        }
        let destroy = inner
            .capabilities
            .destroy_resource()
            .cloned()
            .ok_or_else(|| unsupported(id, EntryPointKind::DestroyResource))?;
        guarded(id, EntryPointKind::DestroyResource, || destroy(ctx, uri))
    }

    pub fn get(&self, id: &str) -> Result<BundleInfo, ContainerError> {
        self.record(id)?.info()
    }

    pub fn state(&self, id: &str) -> Result<BundleState, ContainerError> {
        Ok(self.get(id)?.state)
    }

    /// Snapshot of every bundle, sorted by id.
    pub fn list(&self) -> Result<Vec<BundleInfo>, ContainerError> {
        let records: Vec<Arc<BundleRecord>> = self
            .entries
            .read()
            .map_err(ContainerError::poisoned)?
            .values()
            .cloned()
            .collect();
        let mut infos = records
            .iter()
            .map(|r| r.info())
            .collect::<Result<Vec<_>, _>>()?;
        infos.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        Ok(infos)
    }

    /// Bundle ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BundleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(id: &str, kind: EntryPointKind) -> ContainerError {
    ContainerError::Unsupported {
        bundle_id: id.to_string(),
        operation: kind.to_string(),
    }
}

/// Run a bundle entry point, converting a panic into a plugin error.
fn guarded(
    id: &str,
    kind: EntryPointKind,
    call: impl FnOnce() -> Result<(), ContainerError>,
) -> Result<(), ContainerError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ContainerError::Plugin(format!(
            "bundle '{id}' panicked in {kind}: {message}"
        )))
    })
}
