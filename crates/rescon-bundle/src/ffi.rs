// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! C ABI between the host and native bundles.
//!
//! A native bundle exports four functions named `<activator>_<suffix>`:
//!
//! ```c
//! int32_t <activator>_externalActivateBundle(const HostVTable *host, const char *bundle_id);
//! int32_t <activator>_externalDeactivateBundle(void);
//! int32_t <activator>_externalCreateResource(const char *resource_config_json);
//! int32_t <activator>_externalDestroyResource(const char *uri);
//! ```
//!
//! All return `0` on success. Structured values cross the boundary as
//! NUL-terminated UTF-8 JSON. Strings returned by the host are released with
//! `HostVTable::free_string`; strings returned by a resource are released
//! with that resource's own `free_string`.
//!
//! The host table stays valid from activation until the module is unloaded.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::sync::{Arc, Mutex, Weak};

use libloading::Library;
use rescon_core::{
    Attributes, AttributeNotifier, BundleResource, ContainerError, RequestContext,
    ResourceDescriptor,
};

use crate::context::BundleContext;

pub const RESCON_ABI_VERSION: u32 = 1;

pub const RC_OK: i32 = 0;
pub const RC_FAILED: i32 = -1;
pub const RC_NOT_FOUND: i32 = -2;
pub const RC_EXISTS: i32 = -17;
pub const RC_INVALID: i32 = -22;

pub type RawActivateFn =
    unsafe extern "C" fn(host: *const HostVTable, bundle_id: *const c_char) -> i32;
pub type RawDeactivateFn = unsafe extern "C" fn() -> i32;
pub type RawCreateResourceFn = unsafe extern "C" fn(resource_config_json: *const c_char) -> i32;
pub type RawDestroyResourceFn = unsafe extern "C" fn(uri: *const c_char) -> i32;

/// Identity of a resource being registered by a native bundle.
/// `interface` and `name` may be null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawResourceInfo {
    pub uri: *const c_char,
    pub resource_type: *const c_char,
    pub interface: *const c_char,
    pub name: *const c_char,
}

/// Callbacks implementing one native resource.
///
/// Ownership of `user_data` passes to the host on `register_resource`; the
/// host calls `release` exactly once, including when registration fails.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawResourceVTable {
    pub user_data: *mut c_void,
    /// JSON array of attribute names.
    pub attribute_names: unsafe extern "C" fn(user_data: *mut c_void) -> *mut c_char,
    /// JSON object of attributes, or null on failure.
    pub get: unsafe extern "C" fn(user_data: *mut c_void, query_json: *const c_char) -> *mut c_char,
    /// JSON object of resulting attributes, or null on failure.
    pub set: unsafe extern "C" fn(
        user_data: *mut c_void,
        attributes_json: *const c_char,
        query_json: *const c_char,
    ) -> *mut c_char,
    pub free_string: unsafe extern "C" fn(s: *mut c_char),
    pub release: unsafe extern "C" fn(user_data: *mut c_void),
}

/// Services the host offers a native bundle.
#[repr(C)]
#[derive(Debug)]
pub struct HostVTable {
    pub abi_version: u32,
    pub host_ctx: *mut c_void,
    pub register_resource: unsafe extern "C" fn(
        host_ctx: *mut c_void,
        info: *const RawResourceInfo,
        resource: RawResourceVTable,
    ) -> i32,
    pub unregister_resource: unsafe extern "C" fn(host_ctx: *mut c_void, uri: *const c_char) -> i32,
    pub notify_attributes: unsafe extern "C" fn(
        host_ctx: *mut c_void,
        uri: *const c_char,
        attributes_json: *const c_char,
    ) -> i32,
    /// JSON array of the bundle's declared resource configs.
    pub resource_configs: unsafe extern "C" fn(host_ctx: *mut c_void) -> *mut c_char,
    /// JSON object of the bundle's declared parameters.
    pub bundle_params: unsafe extern "C" fn(host_ctx: *mut c_void) -> *mut c_char,
    pub free_string: unsafe extern "C" fn(s: *mut c_char),
}

/// Host-side state behind `HostVTable::host_ctx`.
pub(crate) struct HostBridge {
    vtable: HostVTable,
    bundle_id: CString,
    ctx: BundleContext,
    library: Weak<Library>,
    notifiers: Mutex<HashMap<String, AttributeNotifier>>,
}

// SAFETY: the only raw pointer is `vtable.host_ctx`, which points back at this
// boxed bridge. Mutable state sits behind a Mutex.
unsafe impl Send for HostBridge {}
// SAFETY: see above.
unsafe impl Sync for HostBridge {}

impl HostBridge {
    pub(crate) fn new(
        ctx: BundleContext,
        library: Weak<Library>,
    ) -> Result<Box<Self>, ContainerError> {
        let bundle_id = CString::new(ctx.bundle_id()).map_err(|_| {
            ContainerError::invalid_state(ctx.bundle_id(), "bundle id contains a NUL byte")
        })?;
        let mut bridge = Box::new(Self {
            vtable: HostVTable {
                abi_version: RESCON_ABI_VERSION,
                host_ctx: ptr::null_mut(),
                register_resource: host_register_resource,
                unregister_resource: host_unregister_resource,
                notify_attributes: host_notify_attributes,
                resource_configs: host_resource_configs,
                bundle_params: host_bundle_params,
                free_string: host_free_string,
            },
            bundle_id,
            ctx,
            library,
            notifiers: Mutex::new(HashMap::new()),
        });
        let self_ptr: *mut HostBridge = &mut *bridge;
        bridge.vtable.host_ctx = self_ptr.cast();
        Ok(bridge)
    }

    pub(crate) fn vtable(&self) -> *const HostVTable {
        &self.vtable
    }

    pub(crate) fn bundle_id_ptr(&self) -> *const c_char {
        self.bundle_id.as_ptr()
    }

    /// Remember the notifier of a new registration, dropping revoked ones.
    fn track(&self, notifier: AttributeNotifier) {
        if let Ok(mut notifiers) = self.notifiers.lock() {
            notifiers.retain(|_, n| !n.is_revoked());
            notifiers.insert(notifier.uri().to_string(), notifier);
        }
    }

    /// Notifier of a live registration of `uri`.
    ///
    /// Resources the container removed on its own leave a revoked notifier
    /// behind; it is forgotten here.
    fn live_notifier(&self, uri: &str) -> Option<AttributeNotifier> {
        let mut notifiers = self.notifiers.lock().ok()?;
        if notifiers.get(uri)?.is_revoked() {
            notifiers.remove(uri);
            return None;
        }
        notifiers.get(uri).cloned()
    }
}

/// A resource implemented by native code.
pub(crate) struct NativeResource {
    vtable: RawResourceVTable,
    _library: Arc<Library>,
}

// SAFETY: native resources must tolerate calls from any thread; this is part
// of the bundle ABI contract. The library stays mapped while this value lives.
unsafe impl Send for NativeResource {}
// SAFETY: see above.
unsafe impl Sync for NativeResource {}

impl NativeResource {
    fn call_json(&self, call: impl FnOnce() -> *mut c_char) -> Result<String, ContainerError> {
        let raw = call();
        if raw.is_null() {
            return Err(ContainerError::Plugin("native resource returned no data".into()));
        }
        // SAFETY: non-null, NUL-terminated string produced by the resource.
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        // SAFETY: released with the allocator that produced it.
        unsafe { (self.vtable.free_string)(raw) };
        Ok(text)
    }

    fn parse_attributes(text: &str) -> Result<Attributes, ContainerError> {
        serde_json::from_str(text)
            .map_err(|e| ContainerError::Plugin(format!("invalid attribute JSON from resource: {e}")))
    }
}

impl BundleResource for NativeResource {
    fn attribute_names(&self) -> Vec<String> {
        let names = self
            .call_json(|| {
                // SAFETY: user_data is owned by this resource until release.
                unsafe { (self.vtable.attribute_names)(self.vtable.user_data) }
            })
            .and_then(|text| {
                serde_json::from_str::<Vec<String>>(&text)
                    .map_err(|e| ContainerError::Plugin(e.to_string()))
            });
        names.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "native resource attribute names unavailable");
            Vec::new()
        })
    }

    fn get_attributes(&self, ctx: &RequestContext) -> Result<Attributes, ContainerError> {
        let query = to_json_cstring(ctx.query())?;
        let text = self.call_json(|| {
            // SAFETY: user_data is owned by this resource; query outlives the call.
            unsafe { (self.vtable.get)(self.vtable.user_data, query.as_ptr()) }
        })?;
        Self::parse_attributes(&text)
    }

    fn set_attributes(
        &self,
        attributes: Attributes,
        ctx: &RequestContext,
    ) -> Result<Attributes, ContainerError> {
        let attributes = to_json_cstring(&attributes)?;
        let query = to_json_cstring(ctx.query())?;
        let text = self.call_json(|| {
            // SAFETY: both strings outlive the call.
            unsafe { (self.vtable.set)(self.vtable.user_data, attributes.as_ptr(), query.as_ptr()) }
        })?;
        Self::parse_attributes(&text)
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        // SAFETY: release is called exactly once, before the library reference drops.
        unsafe { (self.vtable.release)(self.vtable.user_data) };
    }
}

pub(crate) fn to_json_cstring<T: serde::Serialize + ?Sized>(
    value: &T,
) -> Result<CString, ContainerError> {
    let json = serde_json::to_string(value)
        .map_err(|e| ContainerError::Internal(format!("JSON encoding failed: {e}")))?;
    CString::new(json).map_err(|_| ContainerError::Internal("JSON contains a NUL byte".into()))
}

/// Run a host callback body, converting a panic into an error code.
fn guarded(op: &'static str, body: impl FnOnce() -> i32) -> i32 {
    catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        tracing::error!(op, "host callback panicked");
        RC_FAILED
    })
}

/// # Safety
/// `host_ctx` must be null or the pointer installed by [`HostBridge::new`].
unsafe fn bridge_ref<'a>(host_ctx: *mut c_void) -> Option<&'a HostBridge> {
    // SAFETY: guaranteed by the caller.
    unsafe { host_ctx.cast::<HostBridge>().as_ref() }
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
unsafe fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn release_raw(resource: &RawResourceVTable) {
    // SAFETY: ownership of user_data was handed to the host, which now gives it back.
    unsafe { (resource.release)(resource.user_data) };
}

unsafe extern "C" fn host_register_resource(
    host_ctx: *mut c_void,
    info: *const RawResourceInfo,
    resource: RawResourceVTable,
) -> i32 {
    guarded("register_resource", || {
        // SAFETY: host_ctx comes from the vtable we handed out.
        let Some(bridge) = (unsafe { bridge_ref(host_ctx) }) else {
            release_raw(&resource);
            return RC_INVALID;
        };
        let Some(library) = bridge.library.upgrade() else {
            release_raw(&resource);
            return RC_INVALID;
        };
        let native = NativeResource {
            vtable: resource,
            _library: library,
        };

        // SAFETY: info is null or points to a RawResourceInfo valid for this call.
        let Some(info) = (unsafe { info.as_ref() }) else {
            return RC_INVALID;
        };
        // SAFETY: the string fields are null or NUL-terminated.
        let (uri, resource_type, interface, name) = unsafe {
            (
                read_str(info.uri),
                read_str(info.resource_type),
                read_str(info.interface),
                read_str(info.name),
            )
        };
        let Some(uri) = uri.filter(|u| !u.is_empty()) else {
            return RC_INVALID;
        };

        let descriptor = ResourceDescriptor::new(
            uri,
            resource_type.unwrap_or_default(),
            bridge.ctx.bundle_id(),
        )
        .with_interface(interface.unwrap_or_default())
        .with_name(name.unwrap_or_default());

        match bridge.ctx.register_resource(descriptor, Arc::new(native)) {
            Ok(notifier) => {
                bridge.track(notifier);
                RC_OK
            }
            Err(e) if e.is_already_exists() => RC_EXISTS,
            Err(e) => {
                tracing::warn!(
                    bundle_id = %bridge.ctx.bundle_id(),
                    uri,
                    error = %e,
                    "native resource registration failed"
                );
                RC_FAILED
            }
        }
    })
}

unsafe extern "C" fn host_unregister_resource(host_ctx: *mut c_void, uri: *const c_char) -> i32 {
    guarded("unregister_resource", || {
        // SAFETY: host_ctx comes from the vtable we handed out; uri is a C string.
        let (Some(bridge), Some(uri)) = (unsafe { (bridge_ref(host_ctx), read_str(uri)) }) else {
            return RC_INVALID;
        };
        if let Ok(mut notifiers) = bridge.notifiers.lock() {
            notifiers.remove(uri);
        }
        match bridge.ctx.unregister_resource(uri) {
            Ok(()) => RC_OK,
            Err(e) if e.is_not_found() => RC_NOT_FOUND,
            Err(_) => RC_FAILED,
        }
    })
}

unsafe extern "C" fn host_notify_attributes(
    host_ctx: *mut c_void,
    uri: *const c_char,
    attributes_json: *const c_char,
) -> i32 {
    guarded("notify_attributes", || {
        // SAFETY: pointers come from the bundle per the ABI contract.
        let (Some(bridge), Some(uri), Some(json)) = (unsafe {
            (bridge_ref(host_ctx), read_str(uri), read_str(attributes_json))
        }) else {
            return RC_INVALID;
        };
        let Ok(attributes) = serde_json::from_str::<Attributes>(json) else {
            return RC_INVALID;
        };
        match bridge.live_notifier(uri) {
            Some(notifier) => {
                notifier.publish(attributes);
                RC_OK
            }
            None => RC_NOT_FOUND,
        }
    })
}

fn host_string<T: serde::Serialize>(value: &T) -> *mut c_char {
    to_json_cstring(value)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

unsafe extern "C" fn host_resource_configs(host_ctx: *mut c_void) -> *mut c_char {
    // SAFETY: host_ctx comes from the vtable we handed out.
    match unsafe { bridge_ref(host_ctx) } {
        Some(bridge) => catch_unwind(AssertUnwindSafe(|| host_string(&bridge.ctx.resource_configs())))
            .unwrap_or(ptr::null_mut()),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn host_bundle_params(host_ctx: *mut c_void) -> *mut c_char {
    // SAFETY: host_ctx comes from the vtable we handed out.
    match unsafe { bridge_ref(host_ctx) } {
        Some(bridge) => catch_unwind(AssertUnwindSafe(|| host_string(&bridge.ctx.bundle_params())))
            .unwrap_or(ptr::null_mut()),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn host_free_string(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: every string the host hands out comes from CString::into_raw.
        drop(unsafe { CString::from_raw(s) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_strings_have_no_interior_nul() {
        let mut attrs = Attributes::new();
        attrs.insert("label".into(), serde_json::json!("a\u{0}b"));
        let encoded = to_json_cstring(&attrs).expect("escaped NUL should encode");
        assert!(encoded.to_str().unwrap().contains("\\u0000"));
    }

    #[test]
    fn host_strings_round_trip_through_free() {
        let raw = host_string(&vec!["a", "b"]);
        assert!(!raw.is_null());
        // SAFETY: raw was just produced by host_string.
        let text = unsafe { CStr::from_ptr(raw) }.to_str().unwrap().to_string();
        assert_eq!(text, r#"["a","b"]"#);
        // SAFETY: raw came from CString::into_raw.
        unsafe { host_free_string(raw) };
    }

    struct NullHost;

    impl crate::context::BundleHost for NullHost {
        fn register_resource(
            &self,
            _bundle_id: &str,
            descriptor: ResourceDescriptor,
            _resource: Arc<dyn rescon_core::BundleResource>,
        ) -> Result<AttributeNotifier, ContainerError> {
            let (tx, _) = tokio::sync::broadcast::channel(4);
            Ok(AttributeNotifier::new(descriptor.uri, tx))
        }

        fn unregister_resource(&self, _bundle_id: &str, _uri: &str) -> Result<(), ContainerError> {
            Ok(())
        }

        fn resource_configs(&self, _bundle_id: &str) -> Vec<rescon_core::ResourceConfig> {
            Vec::new()
        }

        fn bundle_params(&self, _bundle_id: &str) -> rescon_core::Params {
            rescon_core::Params::new()
        }
    }

    #[test]
    fn revoked_notifiers_are_forgotten() {
        let ctx = BundleContext::new("b1", Arc::new(NullHost));
        let bridge = HostBridge::new(ctx, Weak::new()).unwrap();
        let (tx, _rx) = tokio::sync::broadcast::channel(4);

        let old = tokio_util::sync::CancellationToken::new();
        bridge.track(AttributeNotifier::for_registration("/a", tx.clone(), old.clone()));
        bridge.track(AttributeNotifier::for_registration(
            "/b",
            tx.clone(),
            tokio_util::sync::CancellationToken::new(),
        ));
        assert!(bridge.live_notifier("/a").is_some());

        old.cancel();
        assert!(bridge.live_notifier("/a").is_none());
        assert!(bridge.live_notifier("/b").is_some());
        assert_eq!(bridge.notifiers.lock().unwrap().len(), 1);

        let gone = tokio_util::sync::CancellationToken::new();
        bridge.track(AttributeNotifier::for_registration("/c", tx.clone(), gone.clone()));
        gone.cancel();
        bridge.track(AttributeNotifier::new("/d", tx));
        let mut uris: Vec<String> = bridge.notifiers.lock().unwrap().keys().cloned().collect();
        uris.sort();
        assert_eq!(uris, ["/b", "/d"]);
    }

    #[test]
    fn callbacks_reject_null_context() {
        // SAFETY: a null host context is explicitly handled.
        let rc = unsafe { host_unregister_resource(ptr::null_mut(), c"/a".as_ptr()) };
        assert_eq!(rc, RC_INVALID);
        // SAFETY: as above.
        let configs = unsafe { host_resource_configs(ptr::null_mut()) };
        assert!(configs.is_null());
    }
}
