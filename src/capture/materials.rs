//! Resolved build inputs and their package-URL identities.

use crate::error::{Error, Result};
use crate::hash::parse_digest;
use crate::oci::Platform;
use crate::redact::redact_credentials;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const IMAGE_SCHEME: &str = "docker-image://";

/// A resolved input: an identifying URI plus one or more digests keyed by
/// algorithm name. Digest values are bare hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub uri: String,
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

/// Container image pulled during the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub url: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSource {
    pub url: String,
    pub digest: String,
}

/// Image read from a named OCI layout store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciLayoutSource {
    pub store_id: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// A parsed image reference, `[domain/]path[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub domain: String,
    pub path: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let s = reference.strip_prefix(IMAGE_SCHEME).unwrap_or(reference);
        let invalid = |why: &str| Error::Validation(format!("invalid image reference '{reference}': {why}"));

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                parse_digest(digest)?;
                (name, Some(digest.to_string()))
            }
            None => (s, None),
        };

        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if tag.as_deref().is_some_and(|t| t.is_empty() || t.len() > 128) {
            return Err(invalid("bad tag"));
        }

        let (domain, path) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
        };
        let domain = if domain == LEGACY_DEFAULT_DOMAIN {
            DEFAULT_DOMAIN.to_string()
        } else {
            domain
        };
        let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
            format!("{OFFICIAL_REPO_PREFIX}{path}")
        } else {
            path
        };

        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(invalid("empty path component"));
        }
        if path.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository name must be lowercase"));
        }

        Ok(Self {
            domain,
            path,
            tag,
            digest,
        })
    }

    /// Short form used by the docker CLI: `busybox`, `user/app`,
    /// `ghcr.io/org/app`.
    pub fn familiar_name(&self) -> String {
        if self.domain == DEFAULT_DOMAIN {
            self.path
                .strip_prefix(OFFICIAL_REPO_PREFIX)
                .unwrap_or(&self.path)
                .to_string()
        } else {
            format!("{}/{}", self.domain, self.path)
        }
    }

    /// `pkg:docker` package URL for this reference.
    ///
    /// ```
    /// use buildprov::capture::materials::ImageReference;
    /// use buildprov::oci::Platform;
    ///
    /// let r = ImageReference::parse("docker.io/library/busybox:latest").unwrap();
    /// let p = Platform::parse("linux/amd64").unwrap();
    /// assert_eq!(r.purl(Some(&p)), "pkg:docker/busybox@latest?platform=linux%2Famd64");
    /// ```
    pub fn purl(&self, platform: Option<&Platform>) -> String {
        let version = match (&self.tag, &self.digest) {
            (Some(tag), _) => tag.clone(),
            (None, Some(digest)) => digest.clone(),
            (None, None) => "latest".to_string(),
        };

        // qualifier keys are emitted in lexical order
        let mut qualifiers = Vec::new();
        if let (Some(_), Some(digest)) = (&self.tag, &self.digest) {
            qualifiers.push(format!("digest={}", escape(digest)));
        }
        if let Some(platform) = platform {
            qualifiers.push(format!("platform={}", escape(&platform.to_string())));
        }

        let mut purl = format!("pkg:docker/{}@{}", self.familiar_name(), version);
        if !qualifiers.is_empty() {
            purl.push('?');
            purl.push_str(&qualifiers.join("&"));
        }
        purl
    }
}

fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn digest_map(digest: &str) -> Result<BTreeMap<String, String>> {
    if digest.is_empty() {
        return Err(Error::Resolution("resolved input has no digest".to_string()));
    }
    let (algorithm, hex) = parse_digest(digest)?;
    Ok(BTreeMap::from([(algorithm.as_str().to_string(), hex.to_string())]))
}

/// Ordered, deduplicated material list for one platform.
///
/// Frontend materials (the gateway image that ran the build) always sort
/// ahead of build inputs; within each group insertion order is kept.
#[derive(Debug, Clone, Default)]
pub struct MaterialSet {
    frontend: Vec<Material>,
    inputs: Vec<Material>,
}

impl MaterialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&mut self, source: &ImageSource) -> Result<()> {
        let material = image_material(source)?;
        self.push(material, false);
        Ok(())
    }

    /// Records the image of the frontend that produced the build.
    pub fn add_frontend_image(&mut self, source: &ImageSource) -> Result<()> {
        let material = image_material(source)?;
        self.push(material, true);
        Ok(())
    }

    pub fn add_git(&mut self, source: &GitSource) -> Result<()> {
        let commit = source.commit.trim();
        let algorithm = match commit.len() {
            40 => "sha1",
            64 => "sha256",
            0 => {
                return Err(Error::Resolution(format!(
                    "git source {} has no commit",
                    redact_credentials(&source.url)
                )));
            }
            _ => {
                return Err(Error::Resolution(format!(
                    "git source {} has malformed commit '{commit}'",
                    redact_credentials(&source.url)
                )));
            }
        };
        hex::decode(commit)?;

        let mut uri = redact_credentials(&source.url);
        if let Some(reference) = source.reference.as_deref().filter(|r| !r.is_empty()) {
            if !uri.contains('#') {
                uri = format!("{uri}#{reference}");
            }
        }

        self.push(
            Material {
                uri,
                digest: BTreeMap::from([(algorithm.to_string(), commit.to_string())]),
            },
            false,
        );
        Ok(())
    }

    pub fn add_http(&mut self, source: &HttpSource) -> Result<()> {
        let digest = digest_map(&source.digest)?;
        self.push(
            Material {
                uri: redact_credentials(&source.url),
                digest,
            },
            false,
        );
        Ok(())
    }

    pub fn add_oci_layout(&mut self, source: &OciLayoutSource) -> Result<()> {
        if source.store_id.is_empty() {
            return Err(Error::Resolution(
                "OCI layout source has no store id".to_string(),
            ));
        }
        let digest = digest_map(&source.digest)?;
        let mut uri = format!("pkg:oci/{}@{}", source.store_id, source.digest);
        if let Some(platform) = &source.platform {
            uri.push_str(&format!("?platform={}", escape(&platform.to_string())));
        }
        self.push(Material { uri, digest }, false);
        Ok(())
    }

    fn push(&mut self, material: Material, frontend: bool) {
        if self.contains(&material) {
            log::debug!("skipping duplicate material {}", material.uri);
            return;
        }
        if frontend {
            self.frontend.push(material);
        } else {
            self.inputs.push(material);
        }
    }

    pub fn contains(&self, material: &Material) -> bool {
        self.frontend.iter().chain(&self.inputs).any(|m| m == material)
    }

    /// Digest of the first material with the given URI.
    pub fn digest_for(&self, uri: &str) -> Option<&BTreeMap<String, String>> {
        self.frontend
            .iter()
            .chain(&self.inputs)
            .find(|m| m.uri == uri)
            .map(|m| &m.digest)
    }

    pub fn len(&self) -> usize {
        self.frontend.len() + self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Material> {
        let mut all = self.frontend;
        all.extend(self.inputs);
        all
    }
}

fn image_material(source: &ImageSource) -> Result<Material> {
    if source.digest.is_empty() {
        return Err(Error::Resolution(format!(
            "image {} was resolved without a digest",
            source.reference
        )));
    }
    let reference = ImageReference::parse(&source.reference)?;
    Ok(Material {
        uri: reference.purl(source.platform.as_ref()),
        digest: digest_map(&source.digest)?,
    })
}
