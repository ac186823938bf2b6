// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundle hosting for the rescon resource container.
//!
//! Bundles are loaded by a [`ModuleLoader`] chosen by [`BundleKind`]:
//! [`NativeLoader`] for shared objects, [`ManagedLoader`] for bundles that run
//! inside an embedded runtime. Each loaded module resolves up to four entry
//! points into a [`Capabilities`] set. The [`BundleRegistry`] drives the
//! lifecycle state machine and serializes transitions per bundle.
//!
//! [`BundleKind`]: rescon_core::BundleKind

pub mod context;
pub mod ffi;
pub mod loader;
pub mod managed;
pub mod native;
pub mod registry;

pub use context::{BundleContext, BundleHost};
pub use loader::{
    Capabilities, EntryPoint, LoadError, LoadedModule, ModuleLoader, UnloadError,
};
pub use managed::{ManagedActivator, ManagedBridge, ManagedLoader};
pub use native::NativeLoader;
pub use registry::BundleRegistry;
