//! # in-toto Statement Packaging
//!
//! Wraps provenance predicates in in-toto statements and computes the
//! digest exporters use to address them. Subjects are described with the
//! in-toto attestation library's `ResourceDescriptor`.
//!
//! Two statement layouts are supported:
//!
//! - **v0.1** (`https://in-toto.io/Statement/v0.1`), the default, serialized
//!   directly from the typed predicate
//! - **v1** (`https://in-toto.io/Statement/v1`), generated by the in-toto
//!   attestation library from a protobuf `Struct` rendering of the predicate
//!
//! ## Examples
//!
//! ```
//! use buildprov::in_toto::{make_minimal_resource_descriptor, STATEMENT_TYPE_V01};
//!
//! let subject = make_minimal_resource_descriptor("app.tar", "sha256", "abc123");
//! assert_eq!(subject.name, "app.tar");
//! assert_eq!(STATEMENT_TYPE_V01, "https://in-toto.io/Statement/v0.1");
//! ```

use crate::error::{Error, Result};
use crate::hash::{self, DigestAlgorithm};
use crate::oci::Platform;
use crate::redact::{has_unmasked_credentials, redact_credentials};
use crate::session::PlatformProvenance;
use crate::slsa::Predicate;

use in_toto_attestation::generate_statement_v1;
use in_toto_attestation::v1::resource_descriptor::ResourceDescriptor;
use protobuf::well_known_types::struct_::Struct;
use protobuf_json_mapping::{parse_from_str, print_to_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const STATEMENT_TYPE_V01: &str = "https://in-toto.io/Statement/v0.1";
pub const STATEMENT_TYPE_V1: &str = "https://in-toto.io/Statement/v1";

/// Which in-toto statement layout to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatementVersion {
    #[default]
    #[serde(rename = "v0.1")]
    V01,
    #[serde(rename = "v1")]
    V1,
}

impl StatementVersion {
    pub fn statement_type(&self) -> &'static str {
        match self {
            StatementVersion::V01 => STATEMENT_TYPE_V01,
            StatementVersion::V1 => STATEMENT_TYPE_V1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub digest: BTreeMap<String, String>,
}

impl From<&ResourceDescriptor> for Subject {
    fn from(rd: &ResourceDescriptor) -> Self {
        Self {
            name: rd.name.clone(),
            digest: rd
                .digest
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// An in-toto v0.1 statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement<'a> {
    #[serde(rename = "_type")]
    pub statement_type: &'static str,
    pub predicate_type: &'static str,
    pub subject: Vec<Subject>,
    pub predicate: &'a Predicate,
}

/// A serialized statement ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct Attestation {
    pub platform: Platform,
    pub predicate_type: &'static str,
    pub statement: Vec<u8>,
    /// `sha256:<hex>` of `statement`.
    pub digest: String,
}

/// Converts a JSON string to a protobuf Struct.
///
/// # Errors
///
/// Returns a `Serialization` error if the input is not a JSON object.
///
/// # Examples
///
/// ```
/// use buildprov::in_toto::json_to_struct_proto;
///
/// let struct_proto = json_to_struct_proto(r#"{"name": "test", "version": "1.0"}"#).unwrap();
/// assert_eq!(struct_proto.fields.len(), 2);
/// ```
pub fn json_to_struct_proto(json_str: &str) -> Result<Struct> {
    parse_from_str::<Struct>(json_str)
        .map_err(|e| Error::Serialization(format!("Failed to convert predicate to Struct: {e}")))
}

/// Creates a resource descriptor carrying only a name and one digest.
///
/// # Examples
///
/// ```
/// use buildprov::in_toto::make_minimal_resource_descriptor;
///
/// let descriptor = make_minimal_resource_descriptor("provenance.json", "sha256", "a1b2c3");
/// assert!(descriptor.digest.contains_key("sha256"));
/// ```
pub fn make_minimal_resource_descriptor(name: &str, alg: &str, digest: &str) -> ResourceDescriptor {
    let mut rd = ResourceDescriptor::new();
    rd.name = name.to_string();
    rd.digest = HashMap::from([(alg.to_string(), digest.to_string())]);
    rd
}

/// Serializes `predicate` as an in-toto statement about `subjects`.
///
/// # Errors
///
/// Returns a `Serialization` error if the predicate cannot be rendered in
/// the requested layout.
pub fn generate_statement(
    subjects: &[ResourceDescriptor],
    predicate: &Predicate,
    version: StatementVersion,
) -> Result<Vec<u8>> {
    match version {
        StatementVersion::V01 => {
            let statement = Statement {
                statement_type: STATEMENT_TYPE_V01,
                predicate_type: predicate.predicate_type(),
                subject: subjects.iter().map(Subject::from).collect(),
                predicate,
            };
            Ok(serde_json::to_vec(&statement)?)
        }
        StatementVersion::V1 => {
            let predicate_struct = json_to_struct_proto(&serde_json::to_string(predicate)?)?;
            let statement =
                generate_statement_v1(subjects, predicate.predicate_type(), &predicate_struct)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
            let serialized =
                print_to_string(&statement).map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(serialized.into_bytes())
        }
    }
}

/// Wraps one platform's predicate into an [`Attestation`].
pub fn package(
    provenance: &PlatformProvenance,
    subjects: &[ResourceDescriptor],
    version: StatementVersion,
) -> Result<Attestation> {
    let statement = generate_statement(subjects, &provenance.predicate, version)?;
    ensure_redacted(&statement)?;
    let digest = hash::digest_string(&statement, DigestAlgorithm::Sha256);
    log::debug!(
        "packaged {} statement for {} as {digest}",
        provenance.predicate.predicate_type(),
        provenance.platform
    );
    Ok(Attestation {
        platform: provenance.platform.clone(),
        predicate_type: provenance.predicate.predicate_type(),
        statement,
        digest,
    })
}

/// Refuses a serialized statement in which any string value is a URL with
/// unmasked userinfo.
pub fn ensure_redacted(statement: &[u8]) -> Result<()> {
    let value: Value = serde_json::from_slice(statement)?;
    let mut stack = vec![&value];
    while let Some(value) = stack.pop() {
        match value {
            Value::String(s) if has_unmasked_credentials(s) => {
                return Err(Error::Validation(format!(
                    "statement carries credentials for {}",
                    redact_credentials(s)
                )));
            }
            Value::Array(items) => stack.extend(items),
            Value::Object(fields) => stack.extend(fields.values()),
            _ => {}
        }
    }
    Ok(())
}
