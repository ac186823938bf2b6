// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native bundles: shared objects loaded in-process with `libloading`.

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use libloading::Library;
use rescon_core::{BundleDescriptor, ContainerError, EntryPointKind, ResourceConfig};

use crate::context::BundleContext;
use crate::ffi::{
    self, HostBridge, RC_OK, RawActivateFn, RawCreateResourceFn, RawDeactivateFn,
    RawDestroyResourceFn,
};
use crate::loader::{EntryPoint, LoadError, LoadedModule, ModuleLoader, UnloadError};

/// Exported symbol name of an entry point for the given activator.
///
/// `.` and `::` in the activator become `_`; an empty activator yields the
/// bare suffix.
pub fn symbol_name(activator: &str, kind: EntryPointKind) -> String {
    let prefix = activator.replace("::", "_").replace('.', "_");
    if prefix.is_empty() {
        kind.symbol_suffix().to_string()
    } else {
        format!("{prefix}_{}", kind.symbol_suffix())
    }
}

/// Loads `.so` / `.dylib` / `.dll` bundles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeLoader {
    fn load(&self, descriptor: &BundleDescriptor) -> Result<Box<dyn LoadedModule>, LoadError> {
        // SAFETY: loading a bundle runs its initialisers; bundles are trusted
        // code configured by the operator.
        let library = unsafe { Library::new(&descriptor.path) }.map_err(|e| LoadError::Open {
            bundle_id: descriptor.id.clone(),
            path: descriptor.path.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            bundle_id = %descriptor.id,
            path = %descriptor.path.display(),
            "native module opened"
        );

        Ok(Box::new(NativeModule {
            bundle_id: descriptor.id.clone(),
            activator: descriptor.activator.clone(),
            library: Some(Arc::new(library)),
            bridge: Arc::new(Mutex::new(None)),
        }))
    }
}

type BridgeSlot = Arc<Mutex<Option<Box<HostBridge>>>>;

struct NativeModule {
    bundle_id: String,
    activator: String,
    library: Option<Arc<Library>>,
    bridge: BridgeSlot,
}

impl NativeModule {
    fn symbol<T: Copy>(&self, kind: EntryPointKind) -> Option<(Arc<Library>, T)> {
        let library = self.library.as_ref()?;
        let name = symbol_name(&self.activator, kind);
        // SAFETY: `T` is the entry point signature documented in `ffi`.
        match unsafe { library.get::<T>(name.as_bytes()) } {
            Ok(symbol) => Some((Arc::clone(library), *symbol)),
            Err(e) => {
                tracing::debug!(
                    bundle_id = %self.bundle_id,
                    symbol = %name,
                    error = %e,
                    "symbol lookup failed"
                );
                None
            }
        }
    }
}

fn check_rc(bundle_id: &str, op: &str, rc: i32) -> Result<(), ContainerError> {
    if rc == RC_OK {
        Ok(())
    } else {
        Err(ContainerError::Plugin(format!(
            "bundle '{bundle_id}' {op} returned {rc}"
        )))
    }
}

impl LoadedModule for NativeModule {
    fn resolve(&self, kind: EntryPointKind) -> Option<EntryPoint> {
        match kind {
            EntryPointKind::Activate => {
                let (library, raw) = self.symbol::<RawActivateFn>(kind)?;
                let slot = Arc::clone(&self.bridge);
                Some(EntryPoint::Activate(Arc::new(
                    move |ctx: &BundleContext| -> Result<(), ContainerError> {
                        let (host, bundle_id) = {
                            let mut guard = slot.lock().map_err(ContainerError::poisoned)?;
                            if guard.is_none() {
                                *guard = Some(HostBridge::new(
                                    ctx.clone(),
                                    Arc::downgrade(&library),
                                )?);
                            }
                            let bridge = guard.as_ref().ok_or_else(|| {
                                ContainerError::Internal("host bridge missing".into())
                            })?;
                            (bridge.vtable(), bridge.bundle_id_ptr())
                        };
                        // SAFETY: the bridge lives in `slot` until the module is
                        // unloaded, which cannot happen while this closure exists.
                        let rc = unsafe { raw(host, bundle_id) };
                        check_rc(ctx.bundle_id(), "activate", rc)
                    },
                )))
            }
            EntryPointKind::Deactivate => {
                let (library, raw) = self.symbol::<RawDeactivateFn>(kind)?;
                let bundle_id = self.bundle_id.clone();
                Some(EntryPoint::Deactivate(Arc::new(move || -> Result<(), ContainerError> {
                    let _mapped = &library;
                    // SAFETY: the library is kept mapped by `library`.
                    let rc = unsafe { raw() };
                    check_rc(&bundle_id, "deactivate", rc)
                })))
            }
            EntryPointKind::CreateResource => {
                let (library, raw) = self.symbol::<RawCreateResourceFn>(kind)?;
                Some(EntryPoint::CreateResource(Arc::new(
                    move |ctx: &BundleContext, config: &ResourceConfig| -> Result<(), ContainerError> {
                        let _mapped = &library;
                        let json = ffi::to_json_cstring(config)?;
                        // SAFETY: json outlives the call; the library is mapped.
                        let rc = unsafe { raw(json.as_ptr()) };
                        check_rc(ctx.bundle_id(), "create resource", rc)
                    },
                )))
            }
            EntryPointKind::DestroyResource => {
                let (library, raw) = self.symbol::<RawDestroyResourceFn>(kind)?;
                Some(EntryPoint::DestroyResource(Arc::new(
                    move |ctx: &BundleContext, uri: &str| -> Result<(), ContainerError> {
                        let _mapped = &library;
                        let uri = CString::new(uri).map_err(|_| {
                            ContainerError::resource_not_found(uri.replace('\0', ""))
                        })?;
                        // SAFETY: uri outlives the call; the library is mapped.
                        let rc = unsafe { raw(uri.as_ptr()) };
                        check_rc(ctx.bundle_id(), "destroy resource", rc)
                    },
                )))
            }
        }
    }

    fn unload(&mut self) -> Result<(), UnloadError> {
        let Some(library) = self.library.take() else {
            return Ok(());
        };
        match Arc::try_unwrap(library) {
            Ok(library) => {
                if let Ok(mut bridge) = self.bridge.lock() {
                    bridge.take();
                }
                library
                    .close()
                    .map_err(|e| UnloadError::Platform(e.to_string()))
            }
            Err(library) => {
                let holders = Arc::strong_count(&library) - 1;
                self.library = Some(library);
                Err(UnloadError::InUse(holders))
            }
        }
    }
}
