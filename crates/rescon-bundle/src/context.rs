// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The callback target handed to bundle entry points.

use std::fmt;
use std::sync::Arc;

use rescon_core::{
    AttributeNotifier, BundleResource, ContainerError, Params, ResourceConfig, ResourceDescriptor,
};

/// Container services a bundle may call back into.
///
/// Implemented by the container; bundles only ever see it through a
/// [`BundleContext`].
pub trait BundleHost: Send + Sync + 'static {
    /// Register a resource owned by `bundle_id`. Returns the publishing side of
    /// the resource's change channel.
    fn register_resource(
        &self,
        bundle_id: &str,
        descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
    ) -> Result<AttributeNotifier, ContainerError>;

    fn unregister_resource(&self, bundle_id: &str, uri: &str) -> Result<(), ContainerError>;

    /// Resources declared for the bundle in the descriptor file.
    fn resource_configs(&self, bundle_id: &str) -> Vec<ResourceConfig>;

    /// Parameters declared for the bundle in the descriptor file.
    fn bundle_params(&self, bundle_id: &str) -> Params;
}

/// A bundle's view of the container, bound to its own id.
#[derive(Clone)]
pub struct BundleContext {
    bundle_id: String,
    host: Arc<dyn BundleHost>,
}

impl BundleContext {
    pub fn new(bundle_id: impl Into<String>, host: Arc<dyn BundleHost>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            host,
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Register a resource. The descriptor's owning bundle is always this bundle.
    pub fn register_resource(
        &self,
        mut descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
    ) -> Result<AttributeNotifier, ContainerError> {
        descriptor.bundle_id = self.bundle_id.clone();
        self.host
            .register_resource(&self.bundle_id, descriptor, resource)
    }

    pub fn unregister_resource(&self, uri: &str) -> Result<(), ContainerError> {
        self.host.unregister_resource(&self.bundle_id, uri)
    }

    pub fn resource_configs(&self) -> Vec<ResourceConfig> {
        self.host.resource_configs(&self.bundle_id)
    }

    pub fn bundle_params(&self) -> Params {
        self.host.bundle_params(&self.bundle_id)
    }
}

impl fmt::Debug for BundleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleContext")
            .field("bundle_id", &self.bundle_id)
            .finish_non_exhaustive()
    }
}
