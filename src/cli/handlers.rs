use crate::error::{Error, Result};

use super::commands::ProvenanceCommands;
use crate::Config;
use crate::export::ExportKind;
use crate::export::image::{
    attach_to_index, find_platform_manifest, image_subject, verify_subject, write_attestation_manifest,
};
use crate::export::local::write_local;
use crate::export::tarball::write_tar_file;
use crate::in_toto::{self, Attestation};
use crate::record::{self, BuildRecord};
use crate::slsa::ProvenanceOptions;
use crate::storage::filesystem::FilesystemStore;

use serde_json::json;
use std::path::PathBuf;

/// Everything `provenance generate` needs, independent of clap.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub record: PathBuf,
    pub attest: Option<String>,
    pub export: ExportKind,
    pub output: Option<PathBuf>,
    pub platform_split: Option<bool>,
    pub image_name: Option<String>,
    pub config: Config,
}

/// Result of a generate run.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub attestations: Vec<Attestation>,
    /// Files written by the local exporter, the tar archive, or the
    /// layout's `index.json`.
    pub written: Vec<PathBuf>,
}

pub fn handle_provenance_command(cmd: ProvenanceCommands) -> Result<()> {
    match cmd {
        ProvenanceCommands::Generate {
            record,
            attest,
            builder_id,
            export,
            output,
            platform_split,
            image_name,
            statement_version,
            print,
            format,
        } => {
            let mut config = Config::default();
            if let Some(builder_id) = builder_id {
                config.builder_id = builder_id;
            }
            config.statement_version = statement_version.to_statement_version();
            config.output_encoding = format;

            let request = GenerateRequest {
                record,
                attest,
                export: export.parse()?,
                output,
                platform_split,
                image_name,
                config,
            };
            if !print && request.output.is_none() {
                return Err(Error::Validation(
                    "nothing to do: pass --output, --print or both".to_string(),
                ));
            }

            let outcome = run_generate(&request)?;
            if print {
                for attestation in &outcome.attestations {
                    println!("{}", render_statement(attestation, &request.config)?);
                }
            }
            for path in &outcome.written {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }
        ProvenanceCommands::Options { attest } => {
            let options = ProvenanceOptions::parse(&attest)?;
            let summary = json!({
                "version": options.version.to_string(),
                "predicateType": options.version.predicate_type(),
                "mode": options.mode.to_string(),
                "builderId": options.builder_id,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

/// Replays the recorded build, packages one statement per platform and
/// exports them when an output is given.
pub fn run_generate(request: &GenerateRequest) -> Result<GenerateOutcome> {
    let record = BuildRecord::load(&request.record)?;
    let options = request
        .attest
        .as_deref()
        .map(ProvenanceOptions::parse)
        .transpose()?;
    let builder_id = Some(request.config.builder_id.as_str()).filter(|id| !id.is_empty());

    let provenances = record::replay(&record, options, builder_id)?.ok_or_else(|| {
        Error::Validation(
            "the build record does not request provenance, pass --attest to generate it".to_string(),
        )
    })?;

    let version = request.config.statement_version;
    match request.export {
        ExportKind::Local | ExportKind::Tar => {
            let attestations = provenances
                .iter()
                .map(|p| in_toto::package(p, &record.subjects_for(&p.platform)?, version))
                .collect::<Result<Vec<_>>>()?;
            let written = match (&request.output, request.export) {
                (Some(path), ExportKind::Tar) => {
                    vec![write_tar_file(path, &attestations, request.platform_split)?]
                }
                (Some(dir), _) => write_local(dir, &attestations, request.platform_split)?,
                (None, _) => Vec::new(),
            };
            Ok(GenerateOutcome {
                attestations,
                written,
            })
        }
        ExportKind::Image => {
            let output = request.output.as_ref().ok_or_else(|| {
                Error::Validation("the image exporter needs --output pointing at an OCI layout".to_string())
            })?;
            let store = FilesystemStore::new(output)?;
            let mut index = store.read_index()?;

            let mut attestations = Vec::with_capacity(provenances.len());
            for provenance in &provenances {
                let subject_manifest = find_platform_manifest(&index, &provenance.platform)?;
                verify_subject(&store, subject_manifest)?;
                let subject_digest = subject_manifest.digest.clone();
                let subject = image_subject(
                    request.image_name.as_deref(),
                    &provenance.platform,
                    &subject_digest,
                )?;
                let attestation = in_toto::package(provenance, &[subject], version)?;
                let manifest = write_attestation_manifest(&store, &attestation)?;
                attach_to_index(&mut index, &subject_digest, manifest)?;
                attestations.push(attestation);
            }
            store.write_index(&index)?;
            log::info!(
                "linked {} attestation manifest(s) into {}",
                attestations.len(),
                output.display()
            );

            Ok(GenerateOutcome {
                attestations,
                written: vec![store.base_path().join("index.json")],
            })
        }
    }
}

/// Renders a statement in the configured output encoding.
pub fn render_statement(attestation: &Attestation, config: &Config) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(&attestation.statement)?;
    match config.output_encoding.to_lowercase().as_str() {
        "json" if config.pretty => Ok(serde_json::to_string_pretty(&value)?),
        "json" => Ok(serde_json::to_string(&value)?),
        "cbor" => {
            let cbor = serde_cbor::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(hex::encode(cbor))
        }
        other => Err(Error::Validation(format!(
            "Invalid output encoding '{other}'. Valid options are: json, cbor"
        ))),
    }
}
