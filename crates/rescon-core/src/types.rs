// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the bundle host, the registries, and the dispatcher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Attribute set of a resource, keyed by attribute name.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Query parameters of a GET or SET request.
pub type QueryParams = BTreeMap<String, String>;

/// Free-form string parameters attached to bundles and resources.
pub type Params = BTreeMap<String, String>;

/// Interface assigned to resources that do not declare one.
pub const BASELINE_INTERFACE: &str = "oic.if.baseline";

/// Request kinds the container dispatches to resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Operation {
    Get,
    Set,
}

/// Status returned alongside every dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum StatusCode {
    /// The request reached the resource (possibly with a degraded, empty result).
    Ok,
    /// No resource is registered under the requested uri.
    NotFound,
}

impl StatusCode {
    /// Numeric form used by request/response frameworks.
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotFound => 404,
        }
    }
}

/// How a bundle is hosted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    /// Native shared object loaded in-process.
    Native,
    /// Bundle running inside an embedded managed runtime.
    Managed,
    /// Opaque bundle loaded by some other host; recorded but never loaded here.
    External,
}

impl BundleKind {
    /// Classify a bundle by the suffix of its module path.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("so") | Some("dylib") | Some("dll") => BundleKind::Native,
            Some("jar") => BundleKind::Managed,
            _ => BundleKind::External,
        }
    }
}

/// Lifecycle state of a bundle record held by the registry.
///
/// Bundles that are not in the registry are unregistered (or unloaded);
/// records only ever show one of these states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BundleState {
    /// Recorded without a loaded module (external bundles).
    Installed,
    /// Module loaded and entry points resolved.
    Loaded,
    /// Activate entry point completed successfully.
    Activated,
}

impl BundleState {
    pub fn is_loaded(self) -> bool {
        matches!(self, BundleState::Loaded | BundleState::Activated)
    }

    pub fn is_activated(self) -> bool {
        self == BundleState::Activated
    }
}

/// The four entry points a bundle may export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryPointKind {
    Activate,
    Deactivate,
    CreateResource,
    DestroyResource,
}

impl EntryPointKind {
    pub const ALL: [EntryPointKind; 4] = [
        EntryPointKind::Activate,
        EntryPointKind::Deactivate,
        EntryPointKind::CreateResource,
        EntryPointKind::DestroyResource,
    ];

    /// Exported symbol suffix for native bundles.
    pub fn symbol_suffix(self) -> &'static str {
        match self {
            EntryPointKind::Activate => "externalActivateBundle",
            EntryPointKind::Deactivate => "externalDeactivateBundle",
            EntryPointKind::CreateResource => "externalCreateResource",
            EntryPointKind::DestroyResource => "externalDestroyResource",
        }
    }
}

/// Identity and load parameters of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub version: String,
    pub kind: BundleKind,
    #[serde(default)]
    pub activator: String,
    #[serde(default)]
    pub library_path: Option<String>,
    #[serde(default)]
    pub params: Params,
}

impl BundleDescriptor {
    /// Build a descriptor whose kind is classified from the path suffix.
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            kind: BundleKind::from_path(&path),
            path,
            version: String::new(),
            activator: String::new(),
            library_path: None,
            params: Params::new(),
        }
    }

    pub fn with_activator(mut self, activator: impl Into<String>) -> Self {
        self.activator = activator.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_kind(mut self, kind: BundleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_library_path(mut self, library_path: impl Into<String>) -> Self {
        self.library_path = Some(library_path.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Whether the activator names a class on a class path: managed bundles
    /// and bundles given a native library path.
    pub fn uses_class_path(&self) -> bool {
        self.kind == BundleKind::Managed || self.library_path.is_some()
    }

    /// Rewrite a dotted activator class name into `/` form for class-path
    /// bundles. Other bundles are returned unchanged.
    pub fn normalized(mut self) -> Self {
        if self.uses_class_path() {
            self.activator = self.activator.replace('.', "/");
        }
        self
    }
}

/// Snapshot of a bundle record returned by `list_bundles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub descriptor: BundleDescriptor,
    pub state: BundleState,
    /// Entry points that resolved at load time.
    pub capabilities: Vec<EntryPointKind>,
}

impl BundleInfo {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

/// One declared input of a soft-sensor resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputBinding {
    /// Uri of the source resource; `*` matches any run of characters, empty matches all.
    #[serde(default)]
    pub uri_pattern: String,
    /// Required resource type of the source; empty matches any type.
    #[serde(default)]
    pub resource_type: String,
    /// Attribute of the source forwarded into the output resource.
    pub attribute_name: String,
}

impl InputBinding {
    pub fn new(
        uri_pattern: impl Into<String>,
        resource_type: impl Into<String>,
        attribute_name: impl Into<String>,
    ) -> Self {
        Self {
            uri_pattern: uri_pattern.into(),
            resource_type: resource_type.into(),
            attribute_name: attribute_name.into(),
        }
    }
}

/// A registered resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    pub resource_type: String,
    pub interface: String,
    pub bundle_id: String,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
}

impl ResourceDescriptor {
    pub fn new(
        uri: impl Into<String>,
        resource_type: impl Into<String>,
        bundle_id: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: String::new(),
            resource_type: resource_type.into(),
            interface: BASELINE_INTERFACE.to_string(),
            bundle_id: bundle_id.into(),
            inputs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the interface; an empty string keeps the baseline interface.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !interface.is_empty() {
            self.interface = interface;
        }
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputBinding>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }
}

/// Creation parameters handed to a bundle's create-resource entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub properties: Params,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
}

impl ResourceConfig {
    /// Build a config from `add_resource` parameters.
    ///
    /// `name`, `resourceType` and `address` map to their fields; every other
    /// parameter becomes a property.
    pub fn from_params(uri: impl Into<String>, params: &Params) -> Self {
        let mut config = ResourceConfig {
            uri: uri.into(),
            ..Default::default()
        };
        for (key, value) in params {
            match key.as_str() {
                "name" => config.name = value.clone(),
                "resourceType" => config.resource_type = value.clone(),
                "address" => config.address = value.clone(),
                _ => {
                    config.properties.insert(key.clone(), value.clone());
                }
            }
        }
        config
    }
}

/// Change notifications published by the resource registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered {
        uri: String,
        resource_type: String,
    },
    Unregistered {
        uri: String,
    },
    AttributesChanged {
        uri: String,
        attributes: Attributes,
    },
}

impl RegistryEvent {
    pub fn uri(&self) -> &str {
        match self {
            RegistryEvent::Registered { uri, .. }
            | RegistryEvent::Unregistered { uri }
            | RegistryEvent::AttributesChanged { uri, .. } => uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_is_classified_by_suffix() {
        assert_eq!(BundleKind::from_path(Path::new("./b1.so")), BundleKind::Native);
        assert_eq!(
            BundleKind::from_path(Path::new("/opt/b/libsensor.dylib")),
            BundleKind::Native
        );
        assert_eq!(BundleKind::from_path(Path::new("b.jar")), BundleKind::Managed);
        assert_eq!(BundleKind::from_path(Path::new("b.apk")), BundleKind::External);
        assert_eq!(BundleKind::from_path(Path::new("noext")), BundleKind::External);
    }

    #[test]
    fn class_path_activators_use_slash_form() {
        let managed = BundleDescriptor::new("hue", "hue.jar")
            .with_activator("org.rescon.hue.Activator")
            .normalized();
        assert_eq!(managed.activator, "org/rescon/hue/Activator");

        let with_library = BundleDescriptor::new("lamp", "lamp.so")
            .with_activator("org.rescon.Lamp")
            .with_library_path("/opt/lamp")
            .normalized();
        assert_eq!(with_library.activator, "org/rescon/Lamp");

        let native = BundleDescriptor::new("b1", "b1.so")
            .with_activator("org.rescon.B1")
            .normalized();
        assert_eq!(native.activator, "org.rescon.B1");
    }

    #[test]
    fn empty_interface_keeps_baseline() {
        let desc = ResourceDescriptor::new("/a", "oic.r.a", "b1").with_interface("");
        assert_eq!(desc.interface, BASELINE_INTERFACE);
        let desc = desc.with_interface("oic.if.s");
        assert_eq!(desc.interface, "oic.if.s");
    }

    #[test]
    fn resource_config_from_params_splits_known_keys() {
        let mut params = Params::new();
        params.insert("name".into(), "Temp".into());
        params.insert("resourceType".into(), "oic.r.temperature".into());
        params.insert("address".into(), "http://x".into());
        params.insert("unit".into(), "C".into());

        let config = ResourceConfig::from_params("/res/temp", &params);
        assert_eq!(config.uri, "/res/temp");
        assert_eq!(config.name, "Temp");
        assert_eq!(config.resource_type, "oic.r.temperature");
        assert_eq!(config.address, "http://x");
        assert_eq!(config.properties.get("unit").map(String::as_str), Some("C"));
        assert_eq!(config.properties.len(), 1);
    }

    #[test]
    fn entry_point_names_round_trip() {
        for kind in EntryPointKind::ALL {
            let parsed = EntryPointKind::from_str(&kind.to_string()).expect("should parse back");
            assert_eq!(parsed, kind);
        }
        assert_eq!(EntryPointKind::CreateResource.to_string(), "create_resource");
    }

    #[test]
    fn status_codes() {
        assert_eq!(StatusCode::Ok.code(), 200);
        assert_eq!(StatusCode::NotFound.code(), 404);
        assert_eq!(Operation::Get.to_string(), "GET");
    }
}
