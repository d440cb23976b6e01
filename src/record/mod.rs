//! # Build Records
//!
//! A [`BuildRecord`] is a serialized account of one build: the request,
//! and for every target platform the graph it solved, the inputs it
//! resolved, the source documents it was compiled from and the layers it
//! exported. [`replay`] feeds a record through a [`BuildSession`] exactly
//! the way a live solver would, one scoped thread per platform, and
//! returns the finished predicates.
//!
//! Records are JSON or YAML:
//!
//! ```yaml
//! frontend: dockerfile.v0
//! attrs:
//!   attest:provenance: mode=max,version=v1
//!   build-arg:FOO: bar
//! platforms:
//!   - platform: linux/amd64
//!     sources:
//!       - type: image
//!         reference: docker.io/library/busybox:latest
//!         digest: sha256:...
//!     definition:
//!       ops: [...]
//! ```

use crate::capture::args::FrontendRequest;
use crate::capture::graph::{Definition, LayerRecord, Location, Range, SourceDocument};
use crate::capture::materials::{GitSource, HttpSource, ImageSource, OciLayoutSource};
use crate::capture::{InvocationContext, ProvenanceCapture};
use crate::error::{Error, Result};
use crate::hash::parse_digest;
use crate::in_toto::make_minimal_resource_descriptor;
use crate::oci::Platform;
use crate::session::{BuildSession, PlatformProvenance};
use crate::slsa::ProvenanceOptions;
use crate::utils::safe_open_file;

use in_toto_attestation::v1::resource_descriptor::ResourceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Registered frontend id; empty for a client that solved a raw graph.
    #[serde(default)]
    pub frontend: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_platform: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub started_on: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<OffsetDateTime>,
    #[serde(default)]
    pub platforms: Vec<PlatformRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRecord {
    pub platform: String,
    #[serde(default)]
    pub frontend_images: Vec<ImageSource>,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub missing_locals: Vec<String>,
    pub definition: Definition,
    #[serde(default)]
    pub sub_builds: Vec<SubBuildRecord>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
    #[serde(default)]
    pub subjects: Vec<SubjectRecord>,
}

/// A resolved build input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceRecord {
    Image(ImageSource),
    Git(GitSource),
    Http(HttpSource),
    OciLayout(OciLayoutSource),
    Local { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubBuildRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<FrontendRequest>,
    pub definition: Definition,
}

/// A source document with the ops it produced, keyed by op digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub filename: String,
    #[serde(default)]
    pub language: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub locations: BTreeMap<String, Vec<Range>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub name: String,
    /// `<algorithm>:<hex>`
    pub digest: String,
}

impl SubjectRecord {
    pub fn to_resource_descriptor(&self) -> Result<ResourceDescriptor> {
        let (algorithm, hex) = parse_digest(&self.digest)?;
        Ok(make_minimal_resource_descriptor(&self.name, algorithm.as_str(), hex))
    }
}

impl BuildRecord {
    /// Loads a record, as YAML for `.yaml`/`.yml` files and JSON otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let mut content = String::new();
        safe_open_file(path, false)?.read_to_string(&mut content)?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Serialization(format!("Failed to parse build record: {e}")))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Serialization(format!("Failed to parse build record: {e}")))
        }
    }

    /// Invocation context of the recorded build. Fields the record leaves
    /// out take their live defaults.
    pub fn context(&self) -> InvocationContext {
        let mut context = InvocationContext::new(Some(FrontendRequest {
            frontend: self.frontend.clone(),
            attrs: self.attrs.clone(),
        }));
        if let Some(id) = &self.invocation_id {
            context.id = id.clone();
        }
        if let Some(builder_id) = &self.builder_id {
            context.builder_id = builder_id.clone();
        }
        if let Some(platform) = &self.builder_platform {
            context.builder_platform = platform.clone();
        }
        if let Some(started_on) = self.started_on {
            context.started_on = started_on;
        }
        context.finished_on = self.finished_on;
        context
    }

    /// Subjects recorded for `platform`.
    pub fn subjects_for(&self, platform: &Platform) -> Result<Vec<ResourceDescriptor>> {
        let mut subjects = Vec::new();
        for record in &self.platforms {
            if Platform::parse(&record.platform)? != *platform {
                continue;
            }
            for subject in &record.subjects {
                subjects.push(subject.to_resource_descriptor()?);
            }
        }
        Ok(subjects)
    }
}

/// Replays `record` and returns one predicate per distinct platform.
///
/// `options` overrides the record's `attest:provenance` attribute. Returns
/// `None` when neither asks for provenance.
pub fn replay(
    record: &BuildRecord,
    options: Option<ProvenanceOptions>,
    builder_id: Option<&str>,
) -> Result<Option<Vec<PlatformProvenance>>> {
    let mut context = record.context();
    if context.builder_id.is_empty() {
        if let Some(id) = builder_id {
            context.builder_id = id.to_string();
        }
    }

    let options = match options {
        Some(options) => options,
        None => match ProvenanceOptions::from_attrs(&record.attrs)? {
            Some(options) => options,
            None => return Ok(None),
        },
    };

    let platforms = record
        .platforms
        .iter()
        .map(|p| Platform::parse(&p.platform))
        .collect::<Result<Vec<_>>>()?;
    let session = BuildSession::new(context, options, &platforms)?;

    let jobs = record
        .platforms
        .iter()
        .zip(&platforms)
        .map(|(rec, platform)| {
            session
                .capture(platform)
                .map(|capture| (rec, capture))
                .ok_or_else(|| Error::Capture(format!("no capture for {platform}")))
        })
        .collect::<Result<Vec<_>>>()?;

    std::thread::scope(|s| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(rec, capture)| s.spawn(move || replay_platform(&capture, rec)))
            .collect();
        handles.into_iter().try_for_each(|handle| {
            handle
                .join()
                .map_err(|_| Error::Capture("platform replay panicked".to_string()))?
        })
    })?;

    session.finish().map(Some)
}

fn replay_platform(capture: &ProvenanceCapture, record: &PlatformRecord) -> Result<()> {
    log::debug!("replaying build for {}", capture.platform());

    for image in &record.frontend_images {
        capture.add_frontend_image(image)?;
    }
    for source in &record.sources {
        match source {
            SourceRecord::Image(image) => capture.add_image(image)?,
            SourceRecord::Git(git) => capture.add_git(git)?,
            SourceRecord::Http(http) => capture.add_http(http)?,
            SourceRecord::OciLayout(oci) => capture.add_oci_layout(oci)?,
            SourceRecord::Local { name } => capture.add_local(name)?,
        }
    }
    for name in &record.missing_locals {
        capture.mark_missing_local(name)?;
    }

    for sub in &record.sub_builds {
        capture.record_sub_build(sub.request.clone(), &sub.definition)?;
    }
    capture.record_definition(&record.definition)?;

    for document in &record.documents {
        capture.add_source_document(SourceDocument {
            filename: document.filename.clone(),
            language: document.language.clone(),
            data: document.data.clone().into_bytes(),
            definition: document.definition.clone(),
        })?;
        for (digest, ranges) in &document.locations {
            capture.add_location(
                digest,
                Location {
                    filename: document.filename.clone(),
                    ranges: ranges.clone(),
                },
            )?;
        }
    }

    for layers in &record.layers {
        capture.record_layers(layers)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::graph::{Input, Op};
    use std::fs;
    use tempfile::tempdir;

    fn busybox_record() -> BuildRecord {
        let mut def = Definition::new();
        let base = def.push(Op::source("docker-image://docker.io/library/busybox:latest")).unwrap();
        def.push(Op::terminal(Input::new(base, 0))).unwrap();

        BuildRecord {
            frontend: "dockerfile.v0".to_string(),
            attrs: BTreeMap::from([("attest:provenance".to_string(), "mode=max".to_string())]),
            platforms: vec![PlatformRecord {
                platform: "linux/amd64".to_string(),
                frontend_images: Vec::new(),
                sources: vec![SourceRecord::Image(ImageSource {
                    reference: "docker.io/library/busybox:latest".to_string(),
                    platform: Some(Platform::parse("linux/amd64").unwrap()),
                    digest: format!("sha256:{}", "b".repeat(64)),
                })],
                missing_locals: Vec::new(),
                definition: def,
                sub_builds: Vec::new(),
                documents: Vec::new(),
                layers: Vec::new(),
                subjects: vec![SubjectRecord {
                    name: "out.tar".to_string(),
                    digest: format!("sha256:{}", "c".repeat(64)),
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_json() -> Result<()> {
        let dir = tempdir()?;
        let record = busybox_record();

        let json_path = dir.path().join("build.json");
        fs::write(&json_path, serde_json::to_string(&record)?)?;
        assert_eq!(BuildRecord::load(&json_path)?, record);
        Ok(())
    }

    #[test]
    fn test_load_yaml() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("build.yml");
        fs::write(
            &path,
            r#"
frontend: dockerfile.v0
startedOn: 2024-03-01T10:00:00Z
attrs:
  attest:provenance: version=v1
platforms:
  - platform: linux/arm64
    definition:
      ops:
        - digest: sha256:base
          op:
            source:
              identifier: docker-image://docker.io/library/alpine:3.19
        - digest: sha256:result
          inputs:
            - digest: sha256:base
              index: 0
"#,
        )?;

        let record = BuildRecord::load(&path)?;
        assert_eq!(record.frontend, "dockerfile.v0");
        assert_eq!(record.started_on.map(|t| t.unix_timestamp()), Some(1_709_287_200));
        let ops = record.platforms[0].definition.resolve()?;
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].1.source_identifier(), Some("docker-image://docker.io/library/alpine:3.19"));
        assert_eq!(ops[1].1.inputs[0].digest, "sha256:base");
        Ok(())
    }

    #[test]
    fn test_load_rejects_garbage() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("build.json");
        fs::write(&path, "not json")?;
        assert!(matches!(BuildRecord::load(&path), Err(Error::Serialization(_))));
        Ok(())
    }

    #[test]
    fn test_source_record_tags() {
        let yaml = r#"
- type: git
  url: https://github.com/org/repo.git
  ref: main
  commit: 0123456789abcdef0123456789abcdef01234567
- type: local
  name: context
- type: oci-layout
  storeId: cache
  digest: sha256:aaaa
"#;
        let sources: Vec<SourceRecord> = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(&sources[0], SourceRecord::Git(g) if g.reference.as_deref() == Some("main")));
        assert_eq!(sources[1], SourceRecord::Local { name: "context".to_string() });
        assert!(matches!(&sources[2], SourceRecord::OciLayout(o) if o.store_id == "cache"));
    }

    #[test]
    fn test_replay_without_provenance_request() -> Result<()> {
        let mut record = busybox_record();
        record.attrs.clear();
        assert!(replay(&record, None, None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_replay_produces_predicate() -> Result<()> {
        let record = busybox_record();
        let results = replay(&record, None, Some("https://builder.example"))?.unwrap();
        assert_eq!(results.len(), 1);

        let json = serde_json::to_value(&results[0].predicate)?;
        assert_eq!(json["builder"]["id"], "https://builder.example");
        assert_eq!(json["materials"].as_array().map(Vec::len), Some(1));

        let subjects = record.subjects_for(&results[0].platform)?;
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].digest["sha256"], "c".repeat(64));
        Ok(())
    }
}
