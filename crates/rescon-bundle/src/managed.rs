// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Managed-runtime bundles.
//!
//! The runtime itself lives behind [`ManagedBridge`]. A managed bundle only
//! exposes activate and deactivate; it registers its resources from inside
//! activation through the [`BundleContext`].

use std::sync::Arc;

use rescon_core::{BundleDescriptor, ContainerError, EntryPointKind};

use crate::context::BundleContext;
use crate::loader::{EntryPoint, LoadError, LoadedModule, ModuleLoader, UnloadError};

/// An activator object instantiated inside the managed runtime.
pub trait ManagedActivator: Send + Sync + 'static {
    fn activate(&self, ctx: &BundleContext) -> Result<(), ContainerError>;
    fn deactivate(&self) -> Result<(), ContainerError>;
}

/// Embedded runtime that can instantiate bundle activators.
pub trait ManagedBridge: Send + Sync + 'static {
    /// Instantiate the activator class named by `descriptor.activator` from
    /// `descriptor.path`, with `descriptor.library_path` on the native search path.
    fn instantiate(
        &self,
        descriptor: &BundleDescriptor,
    ) -> Result<Arc<dyn ManagedActivator>, ContainerError>;

    /// Release the runtime's state for a bundle.
    fn destroy(&self, _bundle_id: &str) -> Result<(), ContainerError> {
        Ok(())
    }
}

/// Loads managed bundles through a [`ManagedBridge`].
#[derive(Clone)]
pub struct ManagedLoader {
    bridge: Arc<dyn ManagedBridge>,
}

impl ManagedLoader {
    pub fn new(bridge: Arc<dyn ManagedBridge>) -> Self {
        Self { bridge }
    }
}

impl ModuleLoader for ManagedLoader {
    fn load(&self, descriptor: &BundleDescriptor) -> Result<Box<dyn LoadedModule>, LoadError> {
        let activator = self
            .bridge
            .instantiate(descriptor)
            .map_err(|e| LoadError::Rejected {
                bundle_id: descriptor.id.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!(
            bundle_id = %descriptor.id,
            activator = %descriptor.activator,
            "managed activator instantiated"
        );
        Ok(Box::new(ManagedModule {
            bundle_id: descriptor.id.clone(),
            activator: Some(activator),
            bridge: Arc::clone(&self.bridge),
        }))
    }
}

struct ManagedModule {
    bundle_id: String,
    activator: Option<Arc<dyn ManagedActivator>>,
    bridge: Arc<dyn ManagedBridge>,
}

impl LoadedModule for ManagedModule {
    fn resolve(&self, kind: EntryPointKind) -> Option<EntryPoint> {
        let activator = Arc::clone(self.activator.as_ref()?);
        match kind {
            EntryPointKind::Activate => Some(EntryPoint::Activate(Arc::new(
                move |ctx: &BundleContext| activator.activate(ctx),
            ))),
            EntryPointKind::Deactivate => Some(EntryPoint::Deactivate(Arc::new(move || {
                activator.deactivate()
            }))),
            EntryPointKind::CreateResource | EntryPointKind::DestroyResource => None,
        }
    }

    fn unload(&mut self) -> Result<(), UnloadError> {
        self.bridge
            .destroy(&self.bundle_id)
            .map_err(|e| UnloadError::Platform(e.to_string()))?;
        self.activator = None;
        Ok(())
    }
}
