// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundle descriptor file: the ordered list of bundles to host, their
//! parameters, and the resources each bundle creates on activation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rescon_core::{BundleDescriptor, BundleKind, InputBinding, Params, ResourceConfig};
use serde::Deserialize;

use crate::diagnostic::{ConfigError, toml_to_config_error};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorFile {
    #[serde(default, rename = "bundle")]
    bundles: Vec<BundleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleEntry {
    id: String,
    path: PathBuf,
    #[serde(default)]
    version: String,
    #[serde(default)]
    kind: Option<BundleKind>,
    #[serde(default)]
    activator: String,
    #[serde(default)]
    library_path: Option<String>,
    #[serde(default)]
    params: Params,
    #[serde(default, rename = "resource")]
    resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceEntry {
    uri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    properties: Params,
    #[serde(default, rename = "input")]
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputEntry {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    attribute_name: String,
}

/// One bundle entry of a descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleConfig {
    pub descriptor: BundleDescriptor,
    /// Resources the bundle creates when it is activated.
    pub resources: Vec<ResourceConfig>,
}

impl From<BundleEntry> for BundleConfig {
    fn from(entry: BundleEntry) -> Self {
        let kind = entry
            .kind
            .unwrap_or_else(|| BundleKind::from_path(&entry.path));
        let descriptor = BundleDescriptor {
            id: entry.id,
            path: entry.path,
            version: entry.version,
            kind,
            activator: entry.activator,
            library_path: entry.library_path,
            params: entry.params,
        };
        let resources = entry
            .resources
            .into_iter()
            .map(|r| ResourceConfig {
                uri: r.uri,
                name: r.name,
                resource_type: r.resource_type,
                interface: r.interface.filter(|i| !i.is_empty()),
                address: r.address,
                properties: r.properties,
                inputs: r
                    .inputs
                    .into_iter()
                    .map(|i| InputBinding::new(i.uri, i.resource_type, i.attribute_name))
                    .collect(),
            })
            .collect();
        Self {
            descriptor,
            resources,
        }
    }
}

/// A parsed and validated descriptor file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptors {
    source: Option<PathBuf>,
    bundles: Vec<BundleConfig>,
}

impl Descriptors {
    pub fn new(bundles: Vec<BundleConfig>) -> Self {
        Self {
            source: None,
            bundles,
        }
    }

    /// File the descriptors were read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn bundles(&self) -> &[BundleConfig] {
        &self.bundles
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// Parse descriptor TOML. `origin` names the source in diagnostics.
pub fn parse_descriptors(content: &str, origin: &str) -> Result<Descriptors, Vec<ConfigError>> {
    let file: DescriptorFile =
        toml::from_str(content).map_err(|e| vec![toml_to_config_error(&e, origin, content)])?;
    let bundles: Vec<BundleConfig> = file.bundles.into_iter().map(BundleConfig::from).collect();
    validate_descriptors(&bundles)?;
    Ok(Descriptors::new(bundles))
}

/// Read and parse a descriptor file.
pub fn load_descriptors(path: &Path) -> Result<Descriptors, Vec<ConfigError>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        vec![ConfigError::Descriptor {
            message: format!("cannot read {}: {e}", path.display()),
            span: None,
            src: None,
        }]
    })?;
    let mut descriptors = parse_descriptors(&content, &path.display().to_string())?;
    descriptors.source = Some(path.to_path_buf());
    tracing::debug!(
        path = %path.display(),
        bundles = descriptors.bundles.len(),
        "bundle descriptors loaded"
    );
    Ok(descriptors)
}

/// Semantic checks over parsed descriptors. Collects every error.
pub fn validate_descriptors(bundles: &[BundleConfig]) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut uris = HashSet::new();

    for (i, bundle) in bundles.iter().enumerate() {
        let desc = &bundle.descriptor;
        if desc.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "bundle[{i}].id must not be empty"
            )));
        } else if !ids.insert(desc.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate bundle id `{}`",
                desc.id
            )));
        }

        if desc.path.as_os_str().is_empty() {
            errors.push(ConfigError::validation(format!(
                "bundle `{}` path must not be empty",
                desc.id
            )));
        }

        if !desc.version.is_empty() && semver::Version::parse(&desc.version).is_err() {
            errors.push(ConfigError::validation(format!(
                "bundle `{}` version `{}` is not a semantic version",
                desc.id, desc.version
            )));
        }

        for resource in &bundle.resources {
            if resource.uri.trim().is_empty() {
                errors.push(ConfigError::validation(format!(
                    "bundle `{}` declares a resource with an empty uri",
                    desc.id
                )));
                continue;
            }
            if !uris.insert(resource.uri.as_str()) {
                errors.push(ConfigError::validation(format!(
                    "duplicate resource uri `{}`",
                    resource.uri
                )));
            }
            for input in &resource.inputs {
                if input.attribute_name.trim().is_empty() {
                    errors.push(ConfigError::validation(format!(
                        "resource `{}` has an input without attribute_name",
                        resource.uri
                    )));
                }
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
