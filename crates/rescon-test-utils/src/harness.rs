// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling a container around the mocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rescon_bundle::ManagedBridge;
use rescon_config::ContainerConfig;
use rescon_container::Container;
use rescon_core::{BundleKind, ContainerError};
use tempfile::TempDir;

use crate::mock_bundle::{MockBundle, MockModuleLoader};
use crate::mock_framework::MockFramework;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    config: ContainerConfig,
    bundles: Vec<(PathBuf, Arc<MockBundle>)>,
    descriptors: Option<String>,
    bridge: Option<Arc<dyn ManagedBridge>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ContainerConfig::default();
        config.dispatch.timeout_ms = 2_000;
        Self {
            config,
            bundles: Vec::new(),
            descriptors: None,
            bridge: None,
        }
    }

    /// Serve `bundle` for descriptors whose path is `path`.
    pub fn with_bundle(mut self, path: impl Into<PathBuf>, bundle: Arc<MockBundle>) -> Self {
        self.bundles.push((path.into(), bundle));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.dispatch.timeout_ms = timeout_ms;
        self
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Host managed bundles through `bridge`.
    pub fn with_managed_bridge(mut self, bridge: Arc<dyn ManagedBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Descriptor file content, written to a temp file on build.
    pub fn with_descriptors(mut self, toml: impl Into<String>) -> Self {
        self.descriptors = Some(toml.into());
        self
    }

    /// Build the harness. Must run inside a tokio runtime.
    pub fn build(self) -> Result<TestHarness, ContainerError> {
        let temp_dir =
            TempDir::new().map_err(|e| ContainerError::Internal(format!("temp dir: {e}")))?;
        let descriptor_path = match self.descriptors {
            Some(content) => {
                let path = temp_dir.path().join("bundles.toml");
                std::fs::write(&path, content)
                    .map_err(|e| ContainerError::Internal(format!("write descriptors: {e}")))?;
                Some(path)
            }
            None => None,
        };

        let loader = Arc::new(MockModuleLoader::new());
        for (path, bundle) in self.bundles {
            loader.insert(path, bundle);
        }
        let framework = Arc::new(MockFramework::new());

        let mut builder = Container::builder()
            .config(self.config)
            .framework(framework.clone())
            .loader(BundleKind::Native, loader.clone());
        if let Some(bridge) = self.bridge {
            builder = builder.managed_bridge(bridge);
        }
        let container = builder.build()?;

        Ok(TestHarness {
            container,
            loader,
            framework,
            descriptor_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A container wired to a [`MockModuleLoader`] and a [`MockFramework`].
pub struct TestHarness {
    pub container: Container,
    pub loader: Arc<MockModuleLoader>,
    pub framework: Arc<MockFramework>,
    descriptor_path: Option<PathBuf>,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Path of the written descriptor file, if descriptors were given.
    pub fn descriptor_path(&self) -> Option<&Path> {
        self.descriptor_path.as_deref()
    }

    /// Start the container from the harness descriptors.
    pub fn start(&self) -> Result<(), ContainerError> {
        self.container.start(self.descriptor_path())
    }
}
