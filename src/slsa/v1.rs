//! SLSA provenance v1 predicate.
//!
//! Same information as v0.2, regrouped into a build definition (what was
//! asked for) and run details (what happened). BuildKit-specific claims
//! live under `buildkit_*` keys in the run metadata.

use super::PredicateParts;
use super::common::{BuildConfig, BuildKitMetadata, Builder, Parameters};
use crate::capture::materials::Material;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

pub const PREDICATE_TYPE_V1: &str = "https://slsa.dev/provenance/v1";
pub const BUILD_TYPE_V1: &str =
    "https://github.com/moby/buildkit/blob/master/docs/attestations/slsa-definitions.md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenancePredicate {
    pub build_definition: BuildDefinition,
    pub run_details: RunDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinition {
    pub build_type: String,
    pub external_parameters: ExternalParameters,
    pub internal_parameters: InternalParameters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_dependencies: Vec<Material>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalParameters {
    pub config_source: ConfigSource,
    pub request: Parameters,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digest: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
    pub builder_platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub builder: Builder,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "invocationID")]
    pub invocation_id: String,
    #[serde(rename = "startedOn", with = "time::serde::rfc3339")]
    pub started_on: OffsetDateTime,
    #[serde(rename = "finishedOn", with = "time::serde::rfc3339")]
    pub finished_on: OffsetDateTime,
    #[serde(rename = "buildkit_completeness")]
    pub completeness: Completeness,
    #[serde(rename = "buildkit_reproducible")]
    pub reproducible: bool,
    #[serde(rename = "buildkit_hermetic")]
    pub hermetic: bool,
    #[serde(rename = "buildkit_metadata", default)]
    pub buildkit_metadata: BuildKitMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completeness {
    pub request: bool,
    pub resolved_dependencies: bool,
}

pub(crate) fn assemble(parts: PredicateParts) -> ProvenancePredicate {
    ProvenancePredicate {
        build_definition: BuildDefinition {
            build_type: BUILD_TYPE_V1.to_string(),
            external_parameters: ExternalParameters {
                config_source: ConfigSource {
                    uri: parts.config_source.uri,
                    digest: parts.config_source.digest,
                    path: parts.config_source.path,
                },
                request: parts.parameters,
            },
            internal_parameters: InternalParameters {
                build_config: parts.build_config,
                builder_platform: parts.builder_platform,
            },
            resolved_dependencies: parts.materials,
        },
        run_details: RunDetails {
            builder: Builder {
                id: parts.builder_id,
            },
            metadata: Metadata {
                invocation_id: parts.invocation_id,
                started_on: parts.started_on,
                finished_on: parts.finished_on,
                completeness: Completeness {
                    request: parts.completeness.parameters,
                    resolved_dependencies: parts.completeness.materials,
                },
                reproducible: parts.completeness.reproducible,
                hermetic: parts.completeness.hermetic,
                buildkit_metadata: parts.metadata,
            },
        },
    }
}
