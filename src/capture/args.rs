//! Frontend argument capture.
//!
//! Raw frontend attributes mix build parameters with host-specific knobs,
//! attestation requests and credentials. [`filter_args`] splits them into
//! what belongs in a provenance document and where.

use crate::redact::redact_credentials;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FRONTEND_DOCKERFILE: &str = "dockerfile.v0";
pub const FRONTEND_GATEWAY: &str = "gateway.v0";

const HOST_SPECIFIC_ARGS: &[&str] = &["platform", "cgroup-parent", "image-resolve-mode", "cache-imports"];
const ATTEST_PREFIX: &str = "attest:";
const CONTEXT_KEY: &str = "context";
const FILENAME_KEY: &str = "filename";
const VCS_PREFIX: &str = "vcs:";

/// A frontend invocation: registered frontend id plus its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrontendRequest {
    pub frontend: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl FrontendRequest {
    pub fn new(frontend: &str) -> Self {
        Self {
            frontend: frontend.to_string(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }
}

/// Where the build instructions came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigSourceInfo {
    pub uri: Option<String>,
    pub digest: BTreeMap<String, String>,
    pub path: Option<String>,
}

/// Frontend request after filtering, ready for a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedRequest {
    pub frontend: String,
    pub args: BTreeMap<String, String>,
    pub config_source: ConfigSourceInfo,
    pub vcs: BTreeMap<String, String>,
    /// The configuration was read from a remote git repository.
    pub git_context: bool,
}

/// Splits raw frontend attributes into recorded args, config source and
/// VCS metadata.
///
/// Host-specific and `attest:*` keys are dropped, `filename` moves to the
/// config source path, `vcs:*` keys move to VCS metadata, and a remote
/// `context` becomes the config source URI. Every URL that is kept has its
/// credentials redacted.
pub fn filter_args(request: &FrontendRequest) -> CapturedRequest {
    let mut captured = CapturedRequest {
        frontend: request.frontend.clone(),
        ..CapturedRequest::default()
    };

    for (key, value) in &request.attrs {
        if HOST_SPECIFIC_ARGS.contains(&key.as_str()) || key.starts_with(ATTEST_PREFIX) {
            continue;
        }

        if key == FILENAME_KEY {
            if !value.is_empty() {
                captured.config_source.path = Some(value.clone());
            }
            continue;
        }

        if let Some(name) = key.strip_prefix(VCS_PREFIX) {
            if value.is_empty() {
                continue;
            }
            captured.vcs.insert(name.to_string(), redact_credentials(value));
            continue;
        }

        if key == CONTEXT_KEY && is_remote(value) {
            captured.config_source.uri = Some(redact_credentials(value));
            captured.git_context = is_git(value);
            continue;
        }

        captured.args.insert(key.clone(), redact_credentials(value));
    }

    if captured.git_context && !captured.vcs.is_empty() {
        log::debug!("dropping vcs metadata, configuration comes from a git context");
        captured.vcs.clear();
    }

    captured
}

fn is_remote(value: &str) -> bool {
    ["http://", "https://", "git://", "ssh://", "git@"]
        .iter()
        .any(|p| value.starts_with(p))
}

fn is_git(value: &str) -> bool {
    if value.starts_with("git://") || value.starts_with("git@") || value.starts_with("ssh://") {
        return true;
    }
    let without_fragment = value.split('#').next().unwrap_or(value);
    without_fragment.ends_with(".git")
}
