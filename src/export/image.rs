//! Links statements into an OCI image index.
//!
//! Each statement is stored as the single layer of an attestation manifest.
//! The manifest's index entry sits directly after the image manifest it
//! describes, carries the `unknown/unknown` platform so runtimes never pull
//! it, and points back at its subject through the `vnd.docker.reference.*`
//! annotations.

use crate::capture::materials::ImageReference;
use crate::error::{Error, Result};
use crate::hash::parse_digest;
use crate::in_toto::{Attestation, make_minimal_resource_descriptor};
use crate::oci::{
    Descriptor, ImageIndex, ImageManifest, MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_IMAGE_MANIFEST,
    MEDIA_TYPE_IN_TOTO, Platform,
};
use crate::storage::traits::ContentStore;
use in_toto_attestation::v1::resource_descriptor::ResourceDescriptor;
use serde_json::json;
use std::collections::BTreeMap;

pub const ANNOTATION_REFERENCE_DIGEST: &str = "vnd.docker.reference.digest";
pub const ANNOTATION_REFERENCE_TYPE: &str = "vnd.docker.reference.type";
pub const ANNOTATION_PREDICATE_TYPE: &str = "in-toto.io/predicate-type";
pub const ATTESTATION_MANIFEST_TYPE: &str = "attestation-manifest";

const UNNAMED_SUBJECT: &str = "_";

/// Describes the image manifest a statement is about.
///
/// Named images become `pkg:docker` package URLs; unnamed ones use `_`.
///
/// ```
/// use buildprov::export::image::image_subject;
/// use buildprov::oci::Platform;
///
/// let platform = Platform::parse("linux/amd64").unwrap();
/// let digest = format!("sha256:{}", "ab".repeat(32));
/// let subject = image_subject(Some("busybox:1.36"), &platform, &digest).unwrap();
/// assert_eq!(subject.name, "pkg:docker/busybox@1.36?platform=linux%2Famd64");
/// assert_eq!(subject.digest["sha256"], "ab".repeat(32));
/// ```
pub fn image_subject(
    image_name: Option<&str>,
    platform: &Platform,
    manifest_digest: &str,
) -> Result<ResourceDescriptor> {
    let (algorithm, hex) = parse_digest(manifest_digest)?;
    let name = match image_name.filter(|n| !n.is_empty()) {
        Some(name) => ImageReference::parse(name)?.purl(Some(platform)),
        None => UNNAMED_SUBJECT.to_string(),
    };
    Ok(make_minimal_resource_descriptor(&name, algorithm.as_str(), hex))
}

/// Finds the image manifest for `platform` in `index`.
pub fn find_platform_manifest<'a>(index: &'a ImageIndex, platform: &Platform) -> Result<&'a Descriptor> {
    index
        .manifests
        .iter()
        .filter(|d| !is_attestation(d))
        .find(|d| d.platform.as_ref() == Some(platform))
        .ok_or_else(|| Error::Export(format!("no image manifest for {platform} in the index")))
}

/// Checks that the image manifest `subject` points at is stored intact in
/// the layout before anything is linked to it.
pub fn verify_subject(store: &dyn ContentStore, subject: &Descriptor) -> Result<()> {
    if !store.exists(&subject.digest) {
        return Err(Error::Export(format!(
            "image manifest {} is listed in the index but missing from the layout",
            subject.digest
        )));
    }
    let data = store.read_blob(&subject.digest)?;
    if data.len() as u64 != subject.size {
        return Err(Error::Export(format!(
            "image manifest {} is {} bytes, the index says {}",
            subject.digest,
            data.len(),
            subject.size
        )));
    }
    Ok(())
}

fn is_attestation(descriptor: &Descriptor) -> bool {
    descriptor
        .annotations
        .get(ANNOTATION_REFERENCE_TYPE)
        .is_some_and(|t| t == ATTESTATION_MANIFEST_TYPE)
}

/// Stores the statement, its config and the attestation manifest in
/// `store`. Returns the manifest descriptor, not yet linked to a subject.
pub fn write_attestation_manifest(store: &dyn ContentStore, attestation: &Attestation) -> Result<Descriptor> {
    let layer_digest = store.write_blob(&attestation.statement)?;
    if layer_digest != attestation.digest {
        return Err(Error::Export(format!(
            "statement digest mismatch: stored {layer_digest}, expected {}",
            attestation.digest
        )));
    }
    let mut layer = Descriptor::new(
        MEDIA_TYPE_IN_TOTO,
        layer_digest.clone(),
        attestation.statement.len() as u64,
    );
    layer.annotations.insert(
        ANNOTATION_PREDICATE_TYPE.to_string(),
        attestation.predicate_type.to_string(),
    );

    let unknown = Platform::unknown();
    let config = serde_json::to_vec(&json!({
        "architecture": unknown.architecture,
        "os": unknown.os,
        "config": {},
        "rootfs": {
            "type": "layers",
            "diff_ids": [layer_digest],
        },
    }))?;
    let config_digest = store.write_blob(&config)?;

    let manifest = ImageManifest {
        schema_version: 2,
        media_type: MEDIA_TYPE_IMAGE_MANIFEST.to_string(),
        config: Descriptor::new(MEDIA_TYPE_IMAGE_CONFIG, config_digest, config.len() as u64),
        layers: vec![layer],
        annotations: BTreeMap::new(),
    };
    let manifest_bytes = serde_json::to_vec(&manifest)?;
    let manifest_digest = store.write_blob(&manifest_bytes)?;
    log::debug!(
        "attestation manifest for {} stored as {manifest_digest}",
        attestation.platform
    );

    Ok(Descriptor::new(
        MEDIA_TYPE_IMAGE_MANIFEST,
        manifest_digest,
        manifest_bytes.len() as u64,
    ))
}

/// Links `manifest` to `subject_digest` and places it right after the
/// subject in `index`, replacing an earlier attestation for that subject.
pub fn attach_to_index(index: &mut ImageIndex, subject_digest: &str, mut manifest: Descriptor) -> Result<()> {
    index.manifests.retain(|d| {
        !(is_attestation(d)
            && d.annotations.get(ANNOTATION_REFERENCE_DIGEST).map(String::as_str) == Some(subject_digest))
    });

    let position = index
        .manifests
        .iter()
        .position(|d| d.digest == subject_digest)
        .ok_or_else(|| Error::Export(format!("subject {subject_digest} is not in the index")))?;

    manifest.platform = Some(Platform::unknown());
    manifest.annotations.insert(
        ANNOTATION_REFERENCE_DIGEST.to_string(),
        subject_digest.to_string(),
    );
    manifest.annotations.insert(
        ANNOTATION_REFERENCE_TYPE.to_string(),
        ATTESTATION_MANIFEST_TYPE.to_string(),
    );
    index.manifests.insert(position + 1, manifest);
    Ok(())
}
