// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module loading and the capability set resolved from a loaded module.
//!
//! A [`ModuleLoader`] turns a [`BundleDescriptor`] into a [`LoadedModule`].
//! The registry then resolves each of the four entry points into a
//! [`Capabilities`] set; a missing entry point is a checked absence that
//! surfaces as [`ContainerError::Unsupported`] when used.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rescon_core::{BundleDescriptor, BundleKind, ContainerError, EntryPointKind, ResourceConfig};
use thiserror::Error;

use crate::context::BundleContext;

/// Failure to bring a module into memory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open module {path}: {message}")]
    Open {
        bundle_id: String,
        path: PathBuf,
        message: String,
    },

    #[error("no loader available for {kind} bundles")]
    NoLoader { bundle_id: String, kind: BundleKind },

    #[error("{message}")]
    Rejected { bundle_id: String, message: String },
}

impl LoadError {
    pub fn bundle_id(&self) -> &str {
        match self {
            LoadError::Open { bundle_id, .. }
            | LoadError::NoLoader { bundle_id, .. }
            | LoadError::Rejected { bundle_id, .. } => bundle_id,
        }
    }
}

impl From<LoadError> for ContainerError {
    fn from(err: LoadError) -> Self {
        ContainerError::LoadFailure {
            bundle_id: err.bundle_id().to_string(),
            message: err.to_string(),
        }
    }
}

/// Failure to release a loaded module. The module stays loaded.
#[derive(Debug, Error)]
pub enum UnloadError {
    #[error("module is still referenced by {0} live handle(s)")]
    InUse(usize),

    #[error("platform refused to unload module: {0}")]
    Platform(String),
}

pub type ActivateFn = Arc<dyn Fn(&BundleContext) -> Result<(), ContainerError> + Send + Sync>;
pub type DeactivateFn = Arc<dyn Fn() -> Result<(), ContainerError> + Send + Sync>;
pub type CreateResourceFn =
    Arc<dyn Fn(&BundleContext, &ResourceConfig) -> Result<(), ContainerError> + Send + Sync>;
pub type DestroyResourceFn =
    Arc<dyn Fn(&BundleContext, &str) -> Result<(), ContainerError> + Send + Sync>;

/// One resolved entry point.
#[derive(Clone)]
pub enum EntryPoint {
    Activate(ActivateFn),
    Deactivate(DeactivateFn),
    CreateResource(CreateResourceFn),
    DestroyResource(DestroyResourceFn),
}

impl EntryPoint {
    pub fn kind(&self) -> EntryPointKind {
        match self {
            EntryPoint::Activate(_) => EntryPointKind::Activate,
            EntryPoint::Deactivate(_) => EntryPointKind::Deactivate,
            EntryPoint::CreateResource(_) => EntryPointKind::CreateResource,
            EntryPoint::DestroyResource(_) => EntryPointKind::DestroyResource,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({})", self.kind())
    }
}

/// A module held in memory on behalf of one bundle.
pub trait LoadedModule: Send + Sync {
    /// Resolve one entry point. `None` means the module does not export it.
    fn resolve(&self, kind: EntryPointKind) -> Option<EntryPoint>;

    /// Release the module. On error the module must remain usable.
    fn unload(&mut self) -> Result<(), UnloadError>;
}

/// Loads modules of one [`BundleKind`].
pub trait ModuleLoader: Send + Sync + 'static {
    fn load(&self, descriptor: &BundleDescriptor) -> Result<Box<dyn LoadedModule>, LoadError>;
}

/// The entry points a loaded bundle resolved.
#[derive(Clone, Default)]
pub struct Capabilities {
    activate: Option<ActivateFn>,
    deactivate: Option<DeactivateFn>,
    create_resource: Option<CreateResourceFn>,
    destroy_resource: Option<DestroyResourceFn>,
}

impl Capabilities {
    /// Resolve all four entry points. Misses are logged and recorded as absent.
    pub fn resolve(bundle_id: &str, module: &dyn LoadedModule) -> Self {
        let mut caps = Self::default();
        for kind in EntryPointKind::ALL {
            match module.resolve(kind) {
                Some(entry) => caps.insert(entry),
                None => tracing::warn!(
                    bundle_id = %bundle_id,
                    entry_point = %kind,
                    "entry point not resolved"
                ),
            }
        }
        caps
    }

    pub fn insert(&mut self, entry: EntryPoint) {
        match entry {
            EntryPoint::Activate(f) => self.activate = Some(f),
            EntryPoint::Deactivate(f) => self.deactivate = Some(f),
            EntryPoint::CreateResource(f) => self.create_resource = Some(f),
            EntryPoint::DestroyResource(f) => self.destroy_resource = Some(f),
        }
    }

    /// Resolved entry point kinds, in declaration order.
    pub fn kinds(&self) -> Vec<EntryPointKind> {
        EntryPointKind::ALL
            .into_iter()
            .filter(|k| self.has(*k))
            .collect()
    }

    pub fn has(&self, kind: EntryPointKind) -> bool {
        match kind {
            EntryPointKind::Activate => self.activate.is_some(),
            EntryPointKind::Deactivate => self.deactivate.is_some(),
            EntryPointKind::CreateResource => self.create_resource.is_some(),
            EntryPointKind::DestroyResource => self.destroy_resource.is_some(),
        }
    }

    pub fn activate(&self) -> Option<&ActivateFn> {
        self.activate.as_ref()
    }

    pub fn deactivate(&self) -> Option<&DeactivateFn> {
        self.deactivate.as_ref()
    }

    pub fn create_resource(&self) -> Option<&CreateResourceFn> {
        self.create_resource.as_ref()
    }

    pub fn destroy_resource(&self) -> Option<&DestroyResourceFn> {
        self.destroy_resource.as_ref()
    }

    /// Drop every entry point, releasing whatever they keep alive.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
