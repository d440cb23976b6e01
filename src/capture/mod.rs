//! # Provenance Capture
//!
//! A [`ProvenanceCapture`] accumulates everything a build reveals about one
//! target platform while it runs: resolved materials, the op graph, source
//! documents and locations, exported layers and the locals it read. Solver
//! workers share it through an `Arc` and record concurrently.
//!
//! When the build completes the capture is consumed by
//! [`ProvenanceCapture::finalize`], which assigns step identifiers, applies
//! argument filtering and produces an immutable [`CaptureSnapshot`]. Nothing
//! downstream of the snapshot mutates capture state.
//!
//! ## Examples
//!
//! ```
//! use buildprov::capture::{InvocationContext, ProvenanceCapture};
//! use buildprov::capture::graph::{Definition, Input, Op};
//! use buildprov::oci::Platform;
//!
//! let capture = ProvenanceCapture::new(Platform::parse("linux/amd64").unwrap());
//! let mut def = Definition::new();
//! let ctx = def.push(Op::source("local://context")).unwrap();
//! def.push(Op::terminal(Input::new(ctx, 0))).unwrap();
//! capture.record_definition(&def).unwrap();
//! capture.add_local("context").unwrap();
//!
//! let snapshot = capture.finalize(&InvocationContext::new(None)).unwrap();
//! assert_eq!(snapshot.graph.steps(false).len(), 2);
//! assert_eq!(snapshot.locals[0].name, "context");
//! ```

pub mod args;
pub mod graph;
pub mod materials;

use crate::error::{Error, Result};
use crate::oci::Platform;
use args::{CapturedRequest, FrontendRequest, filter_args};
use graph::{Definition, GraphRecorder, GraphSnapshot, LayerRecord, Location, MountType, SourceDocument};
use materials::{GitSource, HttpSource, ImageSource, Material, MaterialSet, OciLayoutSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use time::{Duration, OffsetDateTime};

const DEFAULT_SSH_ID: &str = "default";

/// Request-level metadata shared by every platform of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
    pub id: String,
    pub builder_id: String,
    pub builder_platform: String,
    pub started_on: OffsetDateTime,
    /// Fixed completion time, used when replaying recorded builds.
    pub finished_on: Option<OffsetDateTime>,
    /// Top-level request. A custom client that submits a raw graph has no
    /// frontend, only build attributes.
    pub request: Option<FrontendRequest>,
}

impl InvocationContext {
    pub fn new(request: Option<FrontendRequest>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            builder_id: String::new(),
            builder_platform: Platform::host().to_string(),
            started_on: OffsetDateTime::now_utc(),
            finished_on: None,
            request,
        }
    }

    /// Attributes of the top-level request.
    pub fn attrs(&self) -> Option<&BTreeMap<String, String>> {
        self.request.as_ref().map(|r| &r.attrs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Secret {
    pub id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ssh {
    pub id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalSource {
    pub name: String,
}

/// Invocation-level facts of a finished capture.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInvocationMetadata {
    pub invocation_id: String,
    pub builder_id: String,
    pub builder_platform: String,
    pub started_on: OffsetDateTime,
    pub finished_on: OffsetDateTime,
    /// Filtered top-level frontend request.
    pub request: Option<CapturedRequest>,
    /// Filtered frontend request a custom client delegated the result to.
    pub delegated: Option<CapturedRequest>,
}

/// Immutable result of a finalized capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSnapshot {
    pub platform: Platform,
    pub invocation: BuildInvocationMetadata,
    pub materials: Vec<Material>,
    pub graph: GraphSnapshot,
    pub secrets: Vec<Secret>,
    pub ssh: Vec<Ssh>,
    pub locals: Vec<LocalSource>,
    /// Some input could not be identified.
    pub incomplete_materials: bool,
    /// Some step of the result could reach the network.
    pub network_access: bool,
}

#[derive(Debug, Default)]
struct CaptureState {
    materials: MaterialSet,
    graph: GraphRecorder,
    locals: BTreeSet<String>,
    missing_locals: BTreeSet<String>,
    sub_requests: Vec<(String, FrontendRequest)>,
}

/// Per-platform provenance accumulator.
#[derive(Debug)]
pub struct ProvenanceCapture {
    platform: Platform,
    state: Mutex<CaptureState>,
}

impl ProvenanceCapture {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(CaptureState::default()),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    fn state(&self) -> Result<MutexGuard<'_, CaptureState>> {
        self.state
            .lock()
            .map_err(|_| Error::Capture(format!("capture for {} is poisoned", self.platform)))
    }

    pub fn add_image(&self, source: &ImageSource) -> Result<()> {
        self.state()?.materials.add_image(source)
    }

    /// Records the image of the frontend that ran the build.
    pub fn add_frontend_image(&self, source: &ImageSource) -> Result<()> {
        self.state()?.materials.add_frontend_image(source)
    }

    pub fn add_git(&self, source: &GitSource) -> Result<()> {
        self.state()?.materials.add_git(source)
    }

    pub fn add_http(&self, source: &HttpSource) -> Result<()> {
        self.state()?.materials.add_http(source)
    }

    pub fn add_oci_layout(&self, source: &OciLayoutSource) -> Result<()> {
        self.state()?.materials.add_oci_layout(source)
    }

    pub fn add_local(&self, name: &str) -> Result<()> {
        self.state()?.locals.insert(name.to_string());
        Ok(())
    }

    /// Marks a local that the build referenced but the client never sent.
    pub fn mark_missing_local(&self, name: &str) -> Result<()> {
        log::warn!(
            "local {name} for {} could not be resolved, materials are incomplete",
            self.platform
        );
        self.state()?.missing_locals.insert(name.to_string());
        Ok(())
    }

    /// Records the graph that produced this platform's result.
    pub fn record_definition(&self, definition: &Definition) -> Result<()> {
        self.state()?.graph.record_result(definition)?;
        Ok(())
    }

    /// Records a graph solved on the way to the result, optionally with the
    /// frontend request a custom client delegated it to.
    pub fn record_sub_build(
        &self,
        request: Option<FrontendRequest>,
        definition: &Definition,
    ) -> Result<()> {
        let mut state = self.state()?;
        let root = state.graph.record_sub_build(definition)?;
        if let Some(request) = request {
            state.sub_requests.push((root, request));
        }
        Ok(())
    }

    pub fn add_source_document(&self, document: SourceDocument) -> Result<()> {
        self.state()?.graph.add_document(document);
        Ok(())
    }

    pub fn add_location(&self, op_digest: &str, location: Location) -> Result<()> {
        self.state()?.graph.add_location(op_digest, location)
    }

    pub fn record_layers(&self, root: &LayerRecord) -> Result<()> {
        self.state()?.graph.record_layers(root);
        Ok(())
    }

    /// Consumes the capture into an immutable snapshot.
    pub fn finalize(self, context: &InvocationContext) -> Result<CaptureSnapshot> {
        let platform = self.platform;
        let state = self
            .state
            .into_inner()
            .map_err(|_| Error::Capture(format!("capture for {platform} is poisoned")))?;

        let result_root = state.graph.result().map(str::to_string);
        let delegated = result_root.as_deref().and_then(|root| {
            state
                .sub_requests
                .iter()
                .rev()
                .find(|(r, _)| r == root)
                .map(|(_, request)| request.clone())
        });

        let graph = state.graph.finish()?;

        let mut locals = state.locals;
        let mut secrets: BTreeMap<String, bool> = BTreeMap::new();
        let mut ssh: BTreeMap<String, bool> = BTreeMap::new();
        let mut network_access = false;
        for step in graph.steps(false) {
            if let Some(name) = step.op.local_name() {
                locals.insert(name.to_string());
            }
            let Some(exec) = step.op.as_exec() else {
                continue;
            };
            network_access |= exec.has_network();
            for mount in &exec.mounts {
                match (mount.mount_type, &mount.secret, &mount.ssh) {
                    (MountType::Secret, Some(secret), _) => {
                        merge_optional(&mut secrets, &secret.id, secret.optional);
                    }
                    (MountType::Ssh, _, Some(opt)) => {
                        let id = if opt.id.is_empty() {
                            DEFAULT_SSH_ID
                        } else {
                            opt.id.as_str()
                        };
                        merge_optional(&mut ssh, id, opt.optional);
                    }
                    (MountType::Ssh, _, None) => merge_optional(&mut ssh, DEFAULT_SSH_ID, false),
                    _ => {}
                }
            }
        }

        let materials = state.materials;
        let mut request = context
            .request
            .as_ref()
            .filter(|r| !r.frontend.is_empty())
            .map(filter_args);
        let mut delegated = delegated.as_ref().map(filter_args);
        for captured in request.iter_mut().chain(delegated.iter_mut()) {
            resolve_config_digest(captured, &materials);
        }

        let finished_on = finish_time(context)?;
        let incomplete_materials = !state.missing_locals.is_empty();

        Ok(CaptureSnapshot {
            platform,
            invocation: BuildInvocationMetadata {
                invocation_id: context.id.clone(),
                builder_id: context.builder_id.clone(),
                builder_platform: context.builder_platform.clone(),
                started_on: context.started_on,
                finished_on,
                request,
                delegated,
            },
            materials: materials.into_vec(),
            graph,
            secrets: secrets
                .into_iter()
                .map(|(id, optional)| Secret { id, optional })
                .collect(),
            ssh: ssh
                .into_iter()
                .map(|(id, optional)| Ssh { id, optional })
                .collect(),
            locals: locals
                .into_iter()
                .map(|name| LocalSource { name })
                .collect(),
            incomplete_materials,
            network_access,
        })
    }
}

// A secret stays optional only while every use of it is optional.
fn merge_optional(into: &mut BTreeMap<String, bool>, id: &str, optional: bool) {
    into.entry(id.to_string())
        .and_modify(|o| *o &= optional)
        .or_insert(optional);
}

fn resolve_config_digest(captured: &mut CapturedRequest, materials: &MaterialSet) {
    if let Some(uri) = &captured.config_source.uri {
        match materials.digest_for(uri) {
            Some(digest) => captured.config_source.digest = digest.clone(),
            None => log::debug!("no material matches config source {uri}"),
        }
    }
}

fn finish_time(context: &InvocationContext) -> Result<OffsetDateTime> {
    match context.finished_on {
        Some(finished) if finished <= context.started_on => Err(Error::Validation(format!(
            "build finished at {finished} before it started at {}",
            context.started_on
        ))),
        Some(finished) => Ok(finished),
        None => {
            let now = OffsetDateTime::now_utc();
            if now > context.started_on {
                Ok(now)
            } else {
                Ok(context.started_on + Duration::milliseconds(1))
            }
        }
    }
}
