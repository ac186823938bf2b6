// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The container facade: bundle lifecycle, resource management and request
//! entry points behind one handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use futures::FutureExt;
use rescon_bundle::{
    BundleContext, BundleHost, BundleRegistry, ManagedBridge, ManagedLoader, ModuleLoader,
    NativeLoader,
};
use rescon_config::{BundleConfig, ContainerConfig, Descriptors};
use rescon_core::{
    AttributeNotifier, Attributes, BundleDescriptor, BundleInfo, BundleKind, BundleResource,
    BundleState, ContainerError, InputBinding, Params, QueryParams, RegistryEvent,
    RequestHandlers, ResourceConfig, ResourceDescriptor, ResourceFramework, StatusCode,
};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::discovery::{BindingSnapshot, DiscoveryCoordinator};
use crate::dispatcher::RequestDispatcher;
use crate::executor::BoundedExecutor;
use crate::framework::LocalFramework;
use crate::recording;
use crate::resources::{ResourceRegistry, ResourceTable};

/// Parameter of `add_bundle` naming the native search path of a managed bundle.
pub const LIBRARY_PATH_PARAM: &str = "libraryPath";

/// Builder for [`Container`].
pub struct ContainerBuilder {
    config: ContainerConfig,
    framework: Option<Arc<dyn ResourceFramework>>,
    loaders: Vec<(BundleKind, Arc<dyn ModuleLoader>)>,
    handle: Option<Handle>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            framework: None,
            loaders: Vec::new(),
            handle: None,
        }
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Framework receiving request handlers. Defaults to [`LocalFramework`].
    pub fn framework(mut self, framework: Arc<dyn ResourceFramework>) -> Self {
        self.framework = Some(framework);
        self
    }

    /// Loader for bundles of `kind`. Native bundles use [`NativeLoader`] unless overridden.
    pub fn loader(mut self, kind: BundleKind, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loaders.push((kind, loader));
        self
    }

    /// Host managed bundles through `bridge`.
    pub fn managed_bridge(self, bridge: Arc<dyn ManagedBridge>) -> Self {
        self.loader(BundleKind::Managed, Arc::new(ManagedLoader::new(bridge)))
    }

    /// Runtime used for dispatch workers and discovery tasks. Defaults to the current one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<Container, ContainerError> {
        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| ContainerError::Internal(format!("no tokio runtime: {e}")))?,
        };
        let config = self.config;
        let framework = self
            .framework
            .unwrap_or_else(|| Arc::new(LocalFramework::new()));

        let mut bundles = BundleRegistry::new();
        if !self.loaders.iter().any(|(kind, _)| *kind == BundleKind::Native) {
            bundles = bundles.with_loader(BundleKind::Native, Arc::new(NativeLoader::new()));
        }
        for (kind, loader) in self.loaders {
            bundles = bundles.with_loader(kind, loader);
        }

        let (events, _) = broadcast::channel(config.discovery.event_buffer.max(1));
        let executor = BoundedExecutor::new(config.dispatch.timeout(), handle.clone());
        let table = ResourceTable::new();
        let discovery = Arc::new(DiscoveryCoordinator::new(
            table.clone(),
            events.clone(),
            executor.clone(),
            config.discovery.update_buffer,
        ));
        let resources = ResourceRegistry::new(
            table.clone(),
            Arc::clone(&framework),
            Arc::clone(&discovery),
            events.clone(),
        );
        let dispatcher = RequestDispatcher::new(table, executor);

        let shutdown = CancellationToken::new();
        handle.spawn(forward_notifications(
            events.subscribe(),
            Arc::clone(&framework),
            shutdown.clone(),
        ));

        tracing::debug!(
            timeout_ms = config.dispatch.timeout_ms,
            managed = bundles.has_loader(BundleKind::Managed),
            "container built"
        );

        let inner = Arc::new_cyclic(|weak: &Weak<ContainerInner>| ContainerInner {
            config,
            bundles,
            resources,
            dispatcher,
            discovery,
            framework,
            configs: RwLock::new(HashMap::new()),
            host: Arc::new(ContainerHost {
                inner: weak.clone(),
            }),
            shutdown,
        });
        Ok(Container { inner })
    }
}

struct ContainerInner {
    config: ContainerConfig,
    bundles: BundleRegistry,
    resources: ResourceRegistry,
    dispatcher: RequestDispatcher,
    discovery: Arc<DiscoveryCoordinator>,
    framework: Arc<dyn ResourceFramework>,
    /// Declared configuration of every known bundle.
    configs: RwLock<HashMap<String, BundleConfig>>,
    host: Arc<ContainerHost>,
    shutdown: CancellationToken,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl ContainerInner {
    fn table(&self) -> &ResourceTable {
        self.resources.table()
    }

    fn context(&self, bundle_id: &str) -> BundleContext {
        BundleContext::new(bundle_id, Arc::clone(&self.host) as Arc<dyn BundleHost>)
    }

    fn remember(&self, config: BundleConfig) {
        if let Ok(mut configs) = self.configs.write() {
            configs.insert(config.descriptor.id.clone(), config);
        }
    }

    fn forget(&self, bundle_id: &str) {
        if let Ok(mut configs) = self.configs.write() {
            configs.remove(bundle_id);
        }
    }

    fn bundle_params(&self, bundle_id: &str) -> Params {
        self.configs
            .read()
            .ok()
            .and_then(|c| c.get(bundle_id).map(|b| b.descriptor.params.clone()))
            .unwrap_or_default()
    }

    fn resource_configs(&self, bundle_id: &str) -> Vec<ResourceConfig> {
        self.configs
            .read()
            .ok()
            .and_then(|c| c.get(bundle_id).map(|b| b.resources.clone()))
            .unwrap_or_default()
    }

    fn inputs_for(&self, bundle_id: &str, uri: &str) -> Vec<InputBinding> {
        self.resource_configs(bundle_id)
            .into_iter()
            .find(|r| r.uri == uri)
            .map(|r| r.inputs)
            .unwrap_or_default()
    }

    fn install(&self, mut config: BundleConfig) -> Result<BundleInfo, ContainerError> {
        config.descriptor = config.descriptor.normalized();
        let info = self.bundles.register(config.descriptor.clone())?;
        recording::record_transition("registered");
        self.remember(config);
        Ok(info)
    }

    fn activate(&self, bundle_id: &str) -> Result<(), ContainerError> {
        self.bundles.activate(bundle_id, &self.context(bundle_id))?;
        recording::record_transition("activated");
        Ok(())
    }

    fn deactivate(&self, bundle_id: &str) -> Result<(), ContainerError> {
        self.bundles.deactivate(bundle_id)?;
        recording::record_transition("deactivated");
        Ok(())
    }

    fn register_resource(
        &self,
        bundle_id: &str,
        mut descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
    ) -> Result<AttributeNotifier, ContainerError> {
        // Called from inside bundle entry points while the bundle's record is
        // locked: only the structural bundle map may be consulted here.
        if !self.bundles.contains(bundle_id) {
            return Err(ContainerError::bundle_not_found(bundle_id));
        }
        descriptor.bundle_id = bundle_id.to_string();
        if descriptor.interface.is_empty() {
            descriptor.interface = self.config.bundles.default_interface.clone();
        }
        if descriptor.inputs.is_empty() {
            descriptor.inputs = self.inputs_for(bundle_id, &descriptor.uri);
        }
        let handlers = request_handlers(self.dispatcher.clone(), descriptor.uri.clone());
        self.resources.register(descriptor, resource, handlers)
    }

    /// Destroy every resource of a bundle through its destroy entry point,
    /// then drop whatever the bundle left behind.
    fn release_resources(&self, bundle_id: &str) {
        let ctx = self.context(bundle_id);
        for uri in self.table().bundle_resources(bundle_id) {
            match self.bundles.destroy_resource(bundle_id, &ctx, &uri) {
                Ok(()) | Err(ContainerError::Unsupported { .. }) => {}
                Err(e) => {
                    tracing::warn!(%bundle_id, %uri, error = %e, "destroy resource failed");
                }
            }
            if self.table().contains(&uri) {
                let _ = self.resources.unregister(&uri);
            }
        }
    }
}

/// Host side of [`BundleContext`].
struct ContainerHost {
    inner: Weak<ContainerInner>,
}

impl ContainerHost {
    fn upgrade(&self) -> Result<Arc<ContainerInner>, ContainerError> {
        self.inner
            .upgrade()
            .ok_or_else(|| ContainerError::Internal("container has been dropped".into()))
    }
}

impl BundleHost for ContainerHost {
    fn register_resource(
        &self,
        bundle_id: &str,
        descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
    ) -> Result<AttributeNotifier, ContainerError> {
        self.upgrade()?
            .register_resource(bundle_id, descriptor, resource)
    }

    fn unregister_resource(&self, bundle_id: &str, uri: &str) -> Result<(), ContainerError> {
        self.upgrade()?
            .resources
            .unregister_owned(bundle_id, uri)
            .map(|_| ())
    }

    fn resource_configs(&self, bundle_id: &str) -> Vec<ResourceConfig> {
        self.upgrade()
            .map(|inner| inner.resource_configs(bundle_id))
            .unwrap_or_default()
    }

    fn bundle_params(&self, bundle_id: &str) -> Params {
        self.upgrade()
            .map(|inner| inner.bundle_params(bundle_id))
            .unwrap_or_default()
    }
}

fn request_handlers(dispatcher: RequestDispatcher, uri: String) -> RequestHandlers {
    let get_dispatcher = dispatcher.clone();
    let get_uri = uri.clone();
    RequestHandlers::new(
        move |query: QueryParams| {
            let dispatcher = get_dispatcher.clone();
            let uri = get_uri.clone();
            async move { dispatcher.get(&uri, query).await }.boxed()
        },
        move |attributes: Attributes, query: QueryParams| {
            let dispatcher = dispatcher.clone();
            let uri = uri.clone();
            async move { dispatcher.set(&uri, query, attributes).await }.boxed()
        },
    )
}

async fn forward_notifications(
    mut events: broadcast::Receiver<RegistryEvent>,
    framework: Arc<dyn ResourceFramework>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(RegistryEvent::AttributesChanged { uri, .. }) => framework.notify(&uri),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "observer notifications dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Hosts bundles and routes requests to the resources they register.
///
/// Cheap to clone; clones share the same container.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn framework(&self) -> Arc<dyn ResourceFramework> {
        Arc::clone(&self.inner.framework)
    }

    /// Register and activate the bundles of a descriptor file, in file order.
    ///
    /// Falls back to the configured descriptor path. Individual bundle
    /// failures are logged and skipped; only an unreadable or invalid file is
    /// an error.
    pub fn start(&self, descriptor_path: Option<&Path>) -> Result<(), ContainerError> {
        let path = descriptor_path
            .map(Path::to_path_buf)
            .or_else(|| self.inner.config.container.descriptor_path.clone());
        let Some(path) = path else {
            tracing::info!("container started without bundle descriptors");
            return Ok(());
        };

        let descriptors: Descriptors =
            rescon_config::load_descriptors(&path).map_err(|errors| {
                ContainerError::Config(
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            })?;
        if descriptors.is_empty() {
            tracing::warn!(path = %path.display(), "descriptor file lists no bundles");
        }
        tracing::info!(
            path = %descriptors.source().unwrap_or(path.as_path()).display(),
            bundles = descriptors.bundles().len(),
            "container starting"
        );

        for config in descriptors.bundles() {
            let id = config.descriptor.id.clone();
            let info = match self.inner.install(config.clone()) {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!(bundle_id = %id, error = %e, "bundle skipped");
                    continue;
                }
            };
            if info.state != BundleState::Loaded {
                tracing::info!(bundle_id = %id, state = %info.state, "bundle not activatable");
                continue;
            }
            if let Err(e) = self.inner.activate(&id) {
                tracing::error!(bundle_id = %id, error = %e, "bundle left inactive");
            }
        }
        Ok(())
    }

    /// Deactivate and unregister every bundle and release every resource.
    ///
    /// Bundles that refuse to deactivate or unload are evicted anyway.
    pub fn stop(&self) {
        let inner = &self.inner;
        for id in inner.bundles.ids() {
            if matches!(inner.bundles.state(&id), Ok(BundleState::Activated)) {
                if let Err(e) = inner.deactivate(&id) {
                    tracing::warn!(bundle_id = %id, error = %e, "deactivate failed during stop");
                }
            }
            inner.release_resources(&id);
            match inner.bundles.unregister(&id) {
                Ok(_) => recording::record_transition("unregistered"),
                Err(e) => {
                    tracing::warn!(bundle_id = %id, error = %e, "evicting bundle");
                    let _ = inner.bundles.evict(&id);
                    recording::record_transition("evicted");
                }
            }
        }
        let leftovers = inner.resources.clear();
        if leftovers > 0 {
            tracing::warn!(leftovers, "released orphaned resources");
        }
        inner.discovery.stop_all();
        if let Ok(mut configs) = inner.configs.write() {
            configs.clear();
        }
        tracing::info!("container stopped");
    }

    /// Register and load a bundle.
    ///
    /// A `libraryPath` parameter sets the native search path of a managed
    /// bundle. Activators of managed bundles may be given in dotted form.
    pub fn add_bundle(
        &self,
        id: &str,
        path: impl AsRef<Path>,
        activator: &str,
        params: Params,
    ) -> Result<BundleInfo, ContainerError> {
        let mut descriptor = BundleDescriptor::new(id, path.as_ref()).with_activator(activator);
        if let Some(library_path) = params.get(LIBRARY_PATH_PARAM) {
            descriptor = descriptor.with_library_path(library_path.clone());
        }
        let descriptor = descriptor.with_params(params);
        self.inner.install(BundleConfig {
            descriptor,
            resources: Vec::new(),
        })
    }

    /// Deactivate if needed, release the bundle's resources and unregister it.
    pub fn remove_bundle(&self, id: &str) -> Result<(), ContainerError> {
        let inner = &self.inner;
        if inner.bundles.state(id)?.is_activated() {
            inner.deactivate(id)?;
        }
        inner.release_resources(id);
        inner.bundles.unregister(id)?;
        recording::record_transition("unregistered");
        inner.forget(id);
        Ok(())
    }

    pub fn start_bundle(&self, id: &str) -> Result<(), ContainerError> {
        self.inner.activate(id)
    }

    pub fn stop_bundle(&self, id: &str) -> Result<(), ContainerError> {
        self.inner.deactivate(id)
    }

    /// Ask a bundle to create a resource. `name`, `resourceType` and `address`
    /// params fill the matching fields; the rest become properties.
    pub fn add_resource(
        &self,
        bundle_id: &str,
        uri: &str,
        params: Params,
    ) -> Result<(), ContainerError> {
        let config = ResourceConfig::from_params(uri, &params);
        let inner = &self.inner;
        inner
            .bundles
            .create_resource(bundle_id, &inner.context(bundle_id), &config)?;
        if let Ok(mut configs) = inner.configs.write() {
            if let Some(bundle) = configs.get_mut(bundle_id) {
                bundle.resources.retain(|r| r.uri != config.uri);
                bundle.resources.push(config);
            }
        }
        Ok(())
    }

    /// Ask the owning bundle to destroy a resource.
    pub fn remove_resource(&self, bundle_id: &str, uri: &str) -> Result<(), ContainerError> {
        let inner = &self.inner;
        if inner.table().owner(uri).as_deref() != Some(bundle_id) {
            return Err(ContainerError::resource_not_found(uri));
        }
        inner
            .bundles
            .destroy_resource(bundle_id, &inner.context(bundle_id), uri)?;
        if inner.table().contains(uri) {
            inner.resources.unregister(uri)?;
        }
        if let Ok(mut configs) = inner.configs.write() {
            if let Some(bundle) = configs.get_mut(bundle_id) {
                bundle.resources.retain(|r| r.uri != uri);
            }
        }
        Ok(())
    }

    /// Register a resource on behalf of a bundle.
    pub fn register_resource(
        &self,
        bundle_id: &str,
        descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
    ) -> Result<AttributeNotifier, ContainerError> {
        self.inner.register_resource(bundle_id, descriptor, resource)
    }

    pub fn unregister_resource(&self, uri: &str) -> Result<(), ContainerError> {
        self.inner.resources.unregister(uri).map(|_| ())
    }

    /// Snapshot of every bundle, sorted by id.
    pub fn list_bundles(&self) -> Result<Vec<BundleInfo>, ContainerError> {
        self.inner.bundles.list()
    }

    pub fn bundle(&self, id: &str) -> Result<BundleInfo, ContainerError> {
        self.inner.bundles.get(id)
    }

    /// Uris registered by a bundle, sorted. Empty for unknown bundles.
    pub fn list_bundle_resources(&self, bundle_id: &str) -> Vec<String> {
        self.inner.table().bundle_resources(bundle_id)
    }

    pub fn resource(&self, uri: &str) -> Option<ResourceDescriptor> {
        self.inner.table().descriptor(uri)
    }

    pub fn resource_count(&self) -> usize {
        self.inner.table().len()
    }

    pub async fn handle_get(&self, uri: &str, query: QueryParams) -> (Attributes, StatusCode) {
        self.inner.dispatcher.get(uri, query).await
    }

    pub async fn handle_set(
        &self,
        uri: &str,
        query: QueryParams,
        attributes: Attributes,
    ) -> (Attributes, StatusCode) {
        self.inner.dispatcher.set(uri, query, attributes).await
    }

    /// Parameters declared for a bundle.
    pub fn bundle_configuration(&self, bundle_id: &str) -> Params {
        self.inner.bundle_params(bundle_id)
    }

    /// Resources declared for a bundle.
    pub fn resource_configuration(&self, bundle_id: &str) -> Vec<ResourceConfig> {
        self.inner.resource_configs(bundle_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.resources.subscribe()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.discovery.subscription_count()
    }

    pub fn bindings(&self, output_uri: &str) -> Vec<BindingSnapshot> {
        self.inner.discovery.bindings(output_uri)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bundles", &self.inner.bundles.len())
            .field("resources", &self.inner.table().len())
            .finish_non_exhaustive()
    }
}
