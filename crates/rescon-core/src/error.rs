// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the rescon resource container.

use thiserror::Error;

/// The primary error type returned by container, registry, and bundle operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A bundle id or resource uri is already registered.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// A bundle id or resource uri is not known to the container.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A module could not be loaded or a required symbol is missing.
    #[error("failed to load bundle '{bundle_id}': {message}")]
    LoadFailure { bundle_id: String, message: String },

    /// The underlying platform refused to unload a module.
    #[error("failed to unload bundle '{bundle_id}': {message}")]
    UnloadFailure { bundle_id: String, message: String },

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state for '{id}': {message}")]
    InvalidState { id: String, message: String },

    /// The bundle never resolved the entry point this operation needs.
    #[error("bundle '{bundle_id}' does not support {operation}")]
    Unsupported { bundle_id: String, operation: String },

    /// A bounded operation did not complete in time.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Plugin code reported a failure or panicked.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Descriptor or container configuration problems.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ContainerError {
    pub fn bundle_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "bundle",
            id: id.into(),
        }
    }

    pub fn resource_exists(uri: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "resource",
            id: uri.into(),
        }
    }

    pub fn bundle_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "bundle",
            id: id.into(),
        }
    }

    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "resource",
            id: uri.into(),
        }
    }

    pub fn invalid_state(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Map a poisoned lock into an internal error.
    pub fn poisoned<T>(_: std::sync::PoisonError<T>) -> Self {
        Self::Internal("registry lock poisoned".to_string())
    }

    /// Returns true for the `AlreadyExists` variant.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
