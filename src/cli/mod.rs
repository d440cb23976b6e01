pub mod commands;
pub mod handlers;
use crate::error::Error;

pub use commands::ProvenanceCommands;
pub use handlers::{GenerateRequest, handle_provenance_command, run_generate};

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLI_NAME: &str = "buildprov";

pub fn format_error(error: &Error) -> String {
    match error {
        Error::Io(err) => format!("IO error: {err}"),
        Error::Resolution(msg) => format!("Resolution error: {msg}"),
        Error::SourceMapping(msg) => format!("Source mapping error (this is a bug): {msg}"),
        Error::Capture(msg) => format!("Capture error: {msg}"),
        Error::Storage(msg) => format!("Storage error: {msg}"),
        Error::Export(msg) => format!("Export error: {msg}"),
        Error::Validation(msg) => format!("Validation error: {msg}"),
        Error::Serialization(msg) => format!("Serialization error: {msg}"),
        Error::InitializationError(msg) => format!("Initialization error: {msg}"),
        Error::HexDecode(err) => format!("Hex decode error: {err}"),
        Error::Json(err) => format!("JSON error: {err}"),
    }
}
