//! # buildprov
//!
//! Build provenance for container image builds.
//!
//! While a build runs, one [`capture::ProvenanceCapture`] per target
//! platform accumulates the resolved inputs, the op graph, source
//! locations and exported layers. When the build finishes the captures are
//! frozen into snapshots and rendered as SLSA provenance predicates
//! (v0.2 or v1), wrapped in in-toto statements and exported as files, as
//! a tar archive, or as attestation manifests in an OCI image index.
//!
//! ## Quick Start
//!
//! Replay a recorded build and write its provenance:
//! ```bash
//! buildprov provenance generate \
//!     --record=build.yaml \
//!     --attest="mode=max,version=v1" \
//!     --output=./out
//! ```
//!
//! ## Library use
//!
//! ```
//! use buildprov::capture::InvocationContext;
//! use buildprov::capture::args::{FrontendRequest, FRONTEND_DOCKERFILE};
//! use buildprov::capture::graph::{Definition, Input, Op};
//! use buildprov::capture::materials::ImageSource;
//! use buildprov::session::BuildSession;
//!
//! let request = FrontendRequest::new(FRONTEND_DOCKERFILE)
//!     .with_attr("attest:provenance", "mode=max")
//!     .with_attr("platform", "linux/amd64");
//! let session = BuildSession::from_request(InvocationContext::new(Some(request)))
//!     .unwrap()
//!     .unwrap();
//!
//! let platform = session.platforms()[0].clone();
//! let capture = session.capture(&platform).unwrap();
//! let mut def = Definition::new();
//! let base = def.push(Op::source("docker-image://docker.io/library/busybox:latest")).unwrap();
//! def.push(Op::terminal(Input::new(base, 0))).unwrap();
//! capture.record_definition(&def).unwrap();
//! capture
//!     .add_image(&ImageSource {
//!         reference: "docker.io/library/busybox:latest".to_string(),
//!         platform: Some(platform.clone()),
//!         digest: format!("sha256:{}", "0".repeat(64)),
//!     })
//!     .unwrap();
//! drop(capture);
//!
//! let provenance = session.finish().unwrap();
//! assert_eq!(provenance[0].predicate.predicate_type(), "https://slsa.dev/provenance/v0.2");
//! ```

pub mod capture;
pub mod cli;
pub mod error;
pub mod export;
pub mod hash;
pub mod in_toto;
pub mod oci;
pub mod record;
pub mod redact;
pub mod session;
pub mod slsa;
pub mod storage;
#[cfg(test)]
mod tests;
pub mod utils;

use in_toto::StatementVersion;

// Re-export error types
pub use error::{Error, Result};

/// Generator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Builder identity recorded when the provenance options carry none
    pub builder_id: String,
    /// in-toto statement layout
    pub statement_version: StatementVersion,
    /// Encoding of printed statements (json or cbor)
    pub output_encoding: String,
    /// Whether printed JSON is indented
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            builder_id: String::new(),
            statement_version: StatementVersion::default(),
            output_encoding: "json".to_string(),
            pretty: true,
        }
    }
}

/// Initialize logging for the CLI
///
/// # Examples
///
/// ```
/// use buildprov::init_logging;
///
/// // Initialize with default settings
/// let result = init_logging();
/// // Note: This might fail if already initialized
/// assert!(result.is_ok() || result.is_err());
/// ```
pub fn init_logging() -> Result<()> {
    env_logger::try_init().map_err(|e| Error::InitializationError(e.to_string()))
}

// Re-export commonly used types and traits
pub use session::{BuildSession, PlatformProvenance};
pub use slsa::{Predicate, ProvenanceMode, ProvenanceOptions, ProvenanceVersion};
pub use storage::traits::ContentStore;
