//! Completeness claims derived from what a capture did and did not see.

use super::ProvenanceMode;
use crate::capture::CaptureSnapshot;

/// Derived completeness claims. Not independently settable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completeness {
    /// The recorded request is the whole request.
    pub parameters: bool,
    pub environment: bool,
    pub materials: bool,
    pub hermetic: bool,
    pub reproducible: bool,
}

/// Evaluates completeness for `snapshot` under `mode`.
///
/// `request_captured` is whether a registered frontend's argument set is
/// part of the predicate. Local inputs are not content addressed, so any
/// local makes the material list incomplete. A hermetic build additionally
/// had no network access in any step.
pub fn evaluate(snapshot: &CaptureSnapshot, request_captured: bool, mode: ProvenanceMode) -> Completeness {
    let materials = snapshot.locals.is_empty() && !snapshot.incomplete_materials;

    Completeness {
        parameters: request_captured && mode != ProvenanceMode::Min,
        environment: !snapshot.invocation.builder_platform.is_empty(),
        materials,
        hermetic: materials && !snapshot.network_access,
        // never claimed
        reproducible: false,
    }
}
