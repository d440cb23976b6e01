//! SLSA provenance v0.2 predicate.

use super::PredicateParts;
use super::common::{BuildConfig, BuildKitMetadata, Builder, Parameters};
use crate::capture::materials::Material;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

pub const PREDICATE_TYPE_V02: &str = "https://slsa.dev/provenance/v0.2";
pub const BUILD_TYPE_V02: &str = "https://mobyproject.org/buildkit@v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenancePredicate {
    pub builder: Builder,
    pub build_type: String,
    pub invocation: Invocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<Material>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub config_source: ConfigSource,
    pub parameters: Parameters,
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digest: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "buildInvocationID")]
    pub build_invocation_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub build_started_on: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub build_finished_on: OffsetDateTime,
    pub completeness: Completeness,
    pub reproducible: bool,
    #[serde(rename = "https://mobyproject.org/buildkit@v1#hermetic")]
    pub hermetic: bool,
    #[serde(rename = "https://mobyproject.org/buildkit@v1#metadata", default)]
    pub buildkit_metadata: BuildKitMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Completeness {
    pub parameters: bool,
    pub environment: bool,
    pub materials: bool,
}

pub(crate) fn assemble(parts: PredicateParts) -> ProvenancePredicate {
    ProvenancePredicate {
        builder: Builder {
            id: parts.builder_id,
        },
        build_type: BUILD_TYPE_V02.to_string(),
        invocation: Invocation {
            config_source: ConfigSource {
                uri: parts.config_source.uri,
                digest: parts.config_source.digest,
                entry_point: parts.config_source.path,
            },
            parameters: parts.parameters,
            environment: Environment {
                platform: parts.builder_platform,
            },
        },
        build_config: parts.build_config,
        materials: parts.materials,
        metadata: Metadata {
            build_invocation_id: parts.invocation_id,
            build_started_on: parts.started_on,
            build_finished_on: parts.finished_on,
            completeness: Completeness {
                parameters: parts.completeness.parameters,
                environment: parts.completeness.environment,
                materials: parts.completeness.materials,
            },
            reproducible: parts.completeness.reproducible,
            hermetic: parts.completeness.hermetic,
            buildkit_metadata: parts.metadata,
        },
    }
}
