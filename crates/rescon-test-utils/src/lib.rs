// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for rescon integration tests.
//!
//! Provides scripted bundles, resources and a recording framework so the
//! container can be exercised without shared objects on disk.
//!
//! # Components
//!
//! - [`MockResource`] - Resource with configurable attributes and failure modes
//! - [`MockBundle`] / [`MockModuleLoader`] - Scripted bundles served by path
//! - [`MockFramework`] - Resource framework that records attach/detach/notify
//! - [`TestHarness`] - Container wired to the mocks

pub mod harness;
pub mod mock_bundle;
pub mod mock_framework;
pub mod mock_resource;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_bundle::{MockBundle, MockModuleLoader};
pub use mock_framework::MockFramework;
pub use mock_resource::{Behavior, MockResource};

/// Build an attribute map from `(name, value)` pairs.
pub fn attrs<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> rescon_core::Attributes {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Lock a mutex, recovering the data if a panicking test poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
