// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted bundles and the loader that serves them.
//!
//! A [`MockBundle`] behaves like a well-mannered native bundle: it creates a
//! [`MockResource`] for each create-resource call, unregisters its resources
//! when deactivated, and counts every entry point invocation.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rescon_bundle::{
    BundleContext, EntryPoint, LoadError, LoadedModule, ModuleLoader, UnloadError,
};
use rescon_core::{
    Attributes, BundleDescriptor, ContainerError, EntryPointKind, ResourceConfig,
    ResourceDescriptor,
};

use crate::lock;
use crate::mock_resource::MockResource;

/// A bundle implemented in the test process.
pub struct MockBundle {
    template: Attributes,
    missing: HashSet<EntryPointKind>,
    create_configured: bool,
    fail_activate: AtomicBool,
    fail_deactivate: AtomicBool,
    refuse_unload: AtomicBool,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    creates: AtomicUsize,
    destroys: AtomicUsize,
    activated_with: Mutex<Vec<String>>,
    context: Mutex<Option<BundleContext>>,
    resources: Mutex<HashMap<String, Arc<MockResource>>>,
}

impl MockBundle {
    /// A bundle whose resources expose the attributes in `template`.
    pub fn new(template: Attributes) -> Self {
        Self {
            template,
            missing: HashSet::new(),
            create_configured: false,
            fail_activate: AtomicBool::new(false),
            fail_deactivate: AtomicBool::new(false),
            refuse_unload: AtomicBool::new(false),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            activated_with: Mutex::new(Vec::new()),
            context: Mutex::new(None),
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Do not export `kind`.
    pub fn without(mut self, kind: EntryPointKind) -> Self {
        self.missing.insert(kind);
        self
    }

    /// Create every resource of the descriptor file on activation.
    pub fn creating_configured(mut self) -> Self {
        self.create_configured = true;
        self
    }

    pub fn fail_activate(&self, fail: bool) {
        self.fail_activate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deactivate(&self, fail: bool) {
        self.fail_deactivate.store(fail, Ordering::SeqCst);
    }

    pub fn refuse_unload(&self, refuse: bool) {
        self.refuse_unload.store(refuse, Ordering::SeqCst);
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Bundle ids passed to activate, in call order.
    pub fn activated_with(&self) -> Vec<String> {
        lock(&self.activated_with).clone()
    }

    pub fn resource(&self, uri: &str) -> Option<Arc<MockResource>> {
        lock(&self.resources).get(uri).cloned()
    }

    /// Publish an attribute change from one of this bundle's resources.
    pub fn publish(&self, uri: &str, changed: Attributes) -> usize {
        self.resource(uri)
            .map(|r| r.publish(changed))
            .unwrap_or(0)
    }

    fn activate(&self, ctx: &BundleContext) -> Result<(), ContainerError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        lock(&self.activated_with).push(ctx.bundle_id().to_string());
        if self.fail_activate.load(Ordering::SeqCst) {
            return Err(ContainerError::Plugin("activation refused".into()));
        }
        *lock(&self.context) = Some(ctx.clone());
        if self.create_configured {
            for config in ctx.resource_configs() {
                self.create(ctx, &config)?;
            }
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<(), ContainerError> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        if self.fail_deactivate.load(Ordering::SeqCst) {
            return Err(ContainerError::Plugin("deactivation refused".into()));
        }
        let ctx = lock(&self.context).take();
        let uris: Vec<String> = lock(&self.resources).keys().cloned().collect();
        if let Some(ctx) = ctx {
            for uri in uris {
                self.destroy(&ctx, &uri)?;
            }
        }
        Ok(())
    }

    fn create(&self, ctx: &BundleContext, config: &ResourceConfig) -> Result<(), ContainerError> {
        let resource = Arc::new(MockResource::new(self.template.clone()));
        let descriptor = ResourceDescriptor::new(&config.uri, &config.resource_type, ctx.bundle_id())
            .with_name(&config.name)
            .with_interface(config.interface.clone().unwrap_or_default())
            .with_inputs(config.inputs.clone());
        let notifier = ctx.register_resource(descriptor, resource.clone())?;
        resource.attach_notifier(notifier);
        lock(&self.resources).insert(config.uri.clone(), resource);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self, ctx: &BundleContext, uri: &str) -> Result<(), ContainerError> {
        if lock(&self.resources).remove(uri).is_none() {
            return Err(ContainerError::resource_not_found(uri));
        }
        ctx.unregister_resource(uri)?;
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockModule {
    bundle: Arc<MockBundle>,
    unloads: Arc<AtomicUsize>,
}

impl LoadedModule for MockModule {
    fn resolve(&self, kind: EntryPointKind) -> Option<EntryPoint> {
        if self.bundle.missing.contains(&kind) {
            return None;
        }
        let bundle = Arc::clone(&self.bundle);
        Some(match kind {
            EntryPointKind::Activate => EntryPoint::Activate(Arc::new(
                move |ctx: &BundleContext| -> Result<(), ContainerError> { bundle.activate(ctx) },
            )),
            EntryPointKind::Deactivate => EntryPoint::Deactivate(Arc::new(
                move || -> Result<(), ContainerError> { bundle.deactivate() },
            )),
            EntryPointKind::CreateResource => EntryPoint::CreateResource(Arc::new(
                move |ctx: &BundleContext, config: &ResourceConfig| -> Result<(), ContainerError> {
                    bundle.create(ctx, config)
                },
            )),
            EntryPointKind::DestroyResource => EntryPoint::DestroyResource(Arc::new(
                move |ctx: &BundleContext, uri: &str| -> Result<(), ContainerError> {
                    bundle.destroy(ctx, uri)
                },
            )),
        })
    }

    fn unload(&mut self) -> Result<(), UnloadError> {
        if self.bundle.refuse_unload.load(Ordering::SeqCst) {
            return Err(UnloadError::InUse(1));
        }
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves [`MockBundle`]s by descriptor path.
#[derive(Default)]
pub struct MockModuleLoader {
    bundles: Mutex<HashMap<PathBuf, Arc<MockBundle>>>,
    loads: AtomicUsize,
    unloads: Arc<AtomicUsize>,
}

impl MockModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(self, path: impl Into<PathBuf>, bundle: Arc<MockBundle>) -> Self {
        self.insert(path, bundle);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bundle: Arc<MockBundle>) {
        lock(&self.bundles).insert(path.into(), bundle);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for MockModuleLoader {
    fn load(&self, descriptor: &BundleDescriptor) -> Result<Box<dyn LoadedModule>, LoadError> {
        let bundle = lock(&self.bundles)
            .get(&descriptor.path)
            .cloned()
            .ok_or_else(|| LoadError::Open {
                bundle_id: descriptor.id.clone(),
                path: descriptor.path.clone(),
                message: "no mock bundle at this path".into(),
            })?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(bundle_id = %descriptor.id, "mock bundle loaded");
        Ok(Box::new(MockModule {
            bundle,
            unloads: Arc::clone(&self.unloads),
        }))
    }
}
