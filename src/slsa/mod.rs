//! # SLSA Build Provenance
//!
//! Assembles SLSA provenance predicates from finalized captures. Two
//! mutually exclusive schemas are supported:
//!
//! - **v0.2** ([`v02`]), `https://slsa.dev/provenance/v0.2`, the default
//! - **v1** ([`v1`]), `https://slsa.dev/provenance/v1`
//!
//! The schema and the capture mode are chosen once per build through the
//! `attest:provenance` build option, e.g. `mode=max,version=v1`, and parsed
//! into [`ProvenanceOptions`]. Both schemas are assembled from the same
//! schema-neutral intermediate, so they always agree on content.
//!
//! ## Capture modes
//!
//! - `min`: no step graph, no layer attribution, no source documents, and
//!   `build-arg:*` / `label:*` arguments are left out. The request is never
//!   claimed complete.
//! - `max` (default): everything the build revealed.
//! - `full`: `max`, plus sub-build graphs solved by a custom client are kept
//!   as steps, and a frontend request the client delegated its result to is
//!   recorded as the build's request.
//!
//! ## Examples
//!
//! ```
//! use buildprov::slsa::{ProvenanceMode, ProvenanceOptions, ProvenanceVersion};
//!
//! let options = ProvenanceOptions::parse("mode=min,version=v1").unwrap();
//! assert_eq!(options.mode, ProvenanceMode::Min);
//! assert_eq!(options.version, ProvenanceVersion::V1);
//!
//! let defaults = ProvenanceOptions::parse("").unwrap();
//! assert_eq!(defaults.mode, ProvenanceMode::Max);
//! assert_eq!(defaults.version, ProvenanceVersion::V02);
//! ```

pub mod common;
pub mod completeness;
pub mod v02;
pub mod v1;

use crate::capture::CaptureSnapshot;
use crate::capture::args::{CapturedRequest, ConfigSourceInfo};
use crate::capture::materials::Material;
use crate::error::{Error, Result};
use common::{BuildConfig, BuildKitMetadata, Parameters, Source};
use completeness::Completeness;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

pub use v02::PREDICATE_TYPE_V02;
pub use v1::PREDICATE_TYPE_V1;

/// Build option carrying provenance sub-options.
pub const ATTEST_PROVENANCE_KEY: &str = "attest:provenance";

const BUILD_ARG_PREFIX: &str = "build-arg:";
const LABEL_PREFIX: &str = "label:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceVersion {
    #[default]
    V02,
    V1,
}

impl ProvenanceVersion {
    pub fn predicate_type(&self) -> &'static str {
        match self {
            ProvenanceVersion::V02 => PREDICATE_TYPE_V02,
            ProvenanceVersion::V1 => PREDICATE_TYPE_V1,
        }
    }
}

impl fmt::Display for ProvenanceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvenanceVersion::V02 => f.write_str("v0.2"),
            ProvenanceVersion::V1 => f.write_str("v1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceMode {
    Min,
    #[default]
    Max,
    Full,
}

impl fmt::Display for ProvenanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvenanceMode::Min => f.write_str("min"),
            ProvenanceMode::Max => f.write_str("max"),
            ProvenanceMode::Full => f.write_str("full"),
        }
    }
}

/// Parsed `attest:provenance` value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProvenanceOptions {
    pub version: ProvenanceVersion,
    pub mode: ProvenanceMode,
    /// Overrides the configured builder id.
    pub builder_id: Option<String>,
}

impl ProvenanceOptions {
    /// Parses comma-separated `key=value` sub-options. Unknown keys are
    /// ignored with a warning; invalid values are errors.
    pub fn parse(value: &str) -> Result<Self> {
        let mut options = Self::default();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, val) = part.split_once('=').ok_or_else(|| {
                Error::Validation(format!("invalid provenance option '{part}', expected key=value"))
            })?;
            match key.trim().to_lowercase().as_str() {
                "version" => {
                    options.version = match val.trim() {
                        "" | "v0.2" => ProvenanceVersion::V02,
                        "v1" => ProvenanceVersion::V1,
                        other => {
                            return Err(Error::Validation(format!(
                                "unsupported provenance version '{other}'"
                            )));
                        }
                    }
                }
                "mode" => {
                    options.mode = match val.trim() {
                        "" | "max" => ProvenanceMode::Max,
                        "min" => ProvenanceMode::Min,
                        "full" => ProvenanceMode::Full,
                        other => {
                            return Err(Error::Validation(format!(
                                "unsupported provenance mode '{other}'"
                            )));
                        }
                    }
                }
                "builder-id" => options.builder_id = Some(val.trim().to_string()),
                other => log::warn!("ignoring unknown provenance option '{other}'"),
            }
        }
        Ok(options)
    }

    /// Options from a request's build attributes, `None` when provenance
    /// was not requested.
    pub fn from_attrs(attrs: &BTreeMap<String, String>) -> Result<Option<Self>> {
        attrs
            .get(ATTEST_PROVENANCE_KEY)
            .map(|value| Self::parse(value))
            .transpose()
    }
}

/// A provenance predicate in exactly one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Predicate {
    V02(v02::ProvenancePredicate),
    V1(v1::ProvenancePredicate),
}

impl Predicate {
    pub fn version(&self) -> ProvenanceVersion {
        match self {
            Predicate::V02(_) => ProvenanceVersion::V02,
            Predicate::V1(_) => ProvenanceVersion::V1,
        }
    }

    pub fn predicate_type(&self) -> &'static str {
        self.version().predicate_type()
    }
}

/// Schema-neutral predicate content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PredicateParts {
    pub builder_id: String,
    pub builder_platform: String,
    pub invocation_id: String,
    pub started_on: OffsetDateTime,
    pub finished_on: OffsetDateTime,
    pub parameters: Parameters,
    pub config_source: ConfigSourceInfo,
    pub materials: Vec<Material>,
    pub build_config: Option<BuildConfig>,
    pub metadata: BuildKitMetadata,
    pub completeness: Completeness,
}

/// Builds the predicate for one finalized platform capture.
pub fn build_predicate(snapshot: &CaptureSnapshot, options: &ProvenanceOptions) -> Predicate {
    let parts = prepare(snapshot, options);
    log::debug!(
        "assembling {} provenance for {} (mode {})",
        options.version,
        snapshot.platform,
        options.mode
    );
    match options.version {
        ProvenanceVersion::V02 => Predicate::V02(v02::assemble(parts)),
        ProvenanceVersion::V1 => Predicate::V1(v1::assemble(parts)),
    }
}

fn effective_request<'a>(
    snapshot: &'a CaptureSnapshot,
    mode: ProvenanceMode,
) -> Option<&'a CapturedRequest> {
    match (&snapshot.invocation.request, &snapshot.invocation.delegated) {
        (Some(request), _) => Some(request),
        (None, Some(delegated)) if mode == ProvenanceMode::Full => Some(delegated),
        _ => None,
    }
}

fn prepare(snapshot: &CaptureSnapshot, options: &ProvenanceOptions) -> PredicateParts {
    let mode = options.mode;
    let request = effective_request(snapshot, mode);
    let full = mode == ProvenanceMode::Full;

    let mut args = request.map(|r| r.args.clone()).unwrap_or_default();
    if mode == ProvenanceMode::Min {
        args.retain(|k, _| !k.starts_with(BUILD_ARG_PREFIX) && !k.starts_with(LABEL_PREFIX));
    }

    let parameters = Parameters {
        frontend: request.map(|r| r.frontend.clone()).unwrap_or_default(),
        args,
        secrets: snapshot.secrets.clone(),
        ssh: snapshot.ssh.clone(),
        locals: snapshot.locals.clone(),
    };

    let graph = &snapshot.graph;
    let included = |step: &str| full || graph.is_result_step(step);

    let (build_config, layers, source) = if mode == ProvenanceMode::Min {
        (None, BTreeMap::new(), None)
    } else {
        let build_config = BuildConfig {
            llb_definition: graph.steps(full).to_vec(),
        };
        let layers = graph
            .layers
            .iter()
            .filter(|(key, _)| key.split(':').next().is_some_and(|step| included(step)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let source = (!graph.infos.is_empty()).then(|| Source {
            locations: graph
                .locations
                .iter()
                .filter(|(id, _)| included(id))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            infos: graph.infos.clone(),
        });
        (Some(build_config), layers, source)
    };

    let completeness = completeness::evaluate(snapshot, request.is_some(), mode);

    PredicateParts {
        builder_id: options
            .builder_id
            .clone()
            .unwrap_or_else(|| snapshot.invocation.builder_id.clone()),
        builder_platform: snapshot.invocation.builder_platform.clone(),
        invocation_id: snapshot.invocation.invocation_id.clone(),
        started_on: snapshot.invocation.started_on,
        finished_on: snapshot.invocation.finished_on,
        parameters,
        config_source: request.map(|r| r.config_source.clone()).unwrap_or_default(),
        materials: snapshot.materials.clone(),
        build_config,
        metadata: BuildKitMetadata {
            vcs: request.map(|r| r.vcs.clone()).unwrap_or_default(),
            source,
            layers,
        },
        completeness,
    }
}
