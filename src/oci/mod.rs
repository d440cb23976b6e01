//! # OCI Types
//!
//! The small subset of the OCI image-spec that provenance generation touches:
//! platforms (used as capture keys, in package URLs and in export paths),
//! content descriptors (layers, manifests, statement blobs) and the
//! index / manifest documents the image exporter links attestations into.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_IMAGE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_IN_TOTO: &str = "application/vnd.in-toto+json";

/// Target platform of a build, `os/architecture[/variant]`.
///
/// Always normalized, including when read from records or image indexes,
/// so `linux/arm64/v8` and `linux/aarch64` compare equal to `linux/arm64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PlatformFields")]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Deserialize)]
struct PlatformFields {
    os: String,
    architecture: String,
    #[serde(default)]
    variant: Option<String>,
}

impl From<PlatformFields> for Platform {
    fn from(fields: PlatformFields) -> Self {
        let mut platform = Self {
            os: fields.os,
            architecture: fields.architecture,
            variant: fields.variant.filter(|v| !v.is_empty()),
        };
        platform.normalize();
        platform
    }
}

impl Platform {
    pub fn new(os: &str, architecture: &str) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: None,
        }
    }

    /// Platform of attestation manifests in an image index.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown")
    }

    /// Parses and normalizes a platform specifier.
    ///
    /// ```
    /// use buildprov::oci::Platform;
    ///
    /// assert_eq!(Platform::parse("linux/x86_64").unwrap().to_string(), "linux/amd64");
    /// assert_eq!(Platform::parse("linux/arm64/v8").unwrap().to_string(), "linux/arm64");
    /// assert_eq!(Platform::parse("linux/arm").unwrap().to_string(), "linux/arm/v7");
    /// assert!(Platform::parse("").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.iter().any(|p| p.is_empty()) || parts.len() > 3 {
            return Err(Error::Validation(format!("invalid platform '{s}'")));
        }

        let mut platform = match parts.as_slice() {
            [os] => Self::new(os, std::env::consts::ARCH),
            [os, arch] => Self::new(os, arch),
            [os, arch, variant] => Self {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: Some(variant.to_string()),
            },
            _ => return Err(Error::Validation(format!("invalid platform '{s}'"))),
        };
        platform.normalize();
        Ok(platform)
    }

    /// Platform of the running process.
    pub fn host() -> Self {
        let mut platform = Self::new(std::env::consts::OS, std::env::consts::ARCH);
        platform.normalize();
        platform
    }

    fn normalize(&mut self) {
        self.os = self.os.to_lowercase();
        if self.os == "macos" {
            self.os = "darwin".to_string();
        }

        let arch = self.architecture.to_lowercase();
        let variant = self.variant.take().map(|v| v.to_lowercase());
        let (arch, variant) = match (arch.as_str(), variant.as_deref()) {
            ("i386", _) => ("386", None),
            ("x86_64" | "x86-64" | "amd64", v) => ("amd64", v.filter(|v| *v != "v1")),
            ("aarch64" | "arm64", v) => ("arm64", v.filter(|v| *v != "v8" && *v != "8")),
            ("armhf", _) => ("arm", Some("v7")),
            ("armel", _) => ("arm", Some("v6")),
            ("arm", None) => ("arm", Some("v7")),
            ("arm", Some(v)) => ("arm", Some(v.strip_prefix('v').unwrap_or(v))),
            (a, v) => (a, v),
        };
        self.architecture = arch.to_string();
        self.variant = variant.map(|v| {
            if arch == "arm" && !v.starts_with('v') {
                format!("v{v}")
            } else {
                v.to_string()
            }
        });
    }

    /// `linux/arm64/v8` style rendering with slashes replaced by underscores,
    /// used for per-platform export paths.
    pub fn path_component(&self) -> String {
        self.to_string().replace('/', "_")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}/{}/{}", self.os, self.architecture, v),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

/// OCI content descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    pub fn new(media_type: &str, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest: digest.into(),
            size,
            annotations: BTreeMap::new(),
            platform: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ImageIndex {
    fn default() -> Self {
        Self {
            schema_version: 2,
            media_type: MEDIA_TYPE_IMAGE_INDEX.to_string(),
            manifests: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
