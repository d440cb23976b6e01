use clap::Subcommand;
use std::path::PathBuf;

use crate::in_toto::StatementVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatementVersionChoice {
    #[value(name = "v0.1")]
    V01,
    #[value(name = "v1")]
    V1,
}

impl StatementVersionChoice {
    pub fn to_statement_version(self) -> StatementVersion {
        match self {
            StatementVersionChoice::V01 => StatementVersion::V01,
            StatementVersionChoice::V1 => StatementVersion::V1,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ProvenanceCommands {
    /// Generate provenance attestations by replaying a recorded build
    Generate {
        /// Build record to replay (JSON, or YAML with a .yaml/.yml extension)
        #[arg(long = "record")]
        record: PathBuf,

        /// Provenance options, overriding the record's attest:provenance
        /// attribute (e.g. "mode=max,version=v1")
        #[arg(long = "attest")]
        attest: Option<String>,

        /// Builder identity to record when the options do not set one
        #[arg(long = "builder-id")]
        builder_id: Option<String>,

        /// Exporter (local, tar or image)
        #[arg(long = "export", default_value = "local")]
        export: String,

        /// Output directory; the archive file for the tar exporter, an OCI
        /// image layout for the image exporter
        #[arg(long = "output")]
        output: Option<PathBuf>,

        /// Write each platform's statement into its own directory
        #[arg(long = "platform-split")]
        platform_split: Option<bool>,

        /// Image name used for statement subjects with the image exporter
        #[arg(long = "image-name")]
        image_name: Option<String>,

        /// in-toto statement layout
        #[arg(long = "statement-version", value_enum, default_value = "v0.1")]
        statement_version: StatementVersionChoice,

        /// Print the statements
        #[arg(long = "print")]
        print: bool,

        /// Output format for printed statements (json or cbor)
        #[arg(long = "format", default_value = "json")]
        format: String,
    },
    /// Show how an attest:provenance value is interpreted
    Options {
        /// Value of the attest:provenance attribute
        #[arg(long = "attest", default_value = "")]
        attest: String,
    },
}
