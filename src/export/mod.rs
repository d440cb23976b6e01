//! # Attestation Export
//!
//! Places packaged statements where consumers look for them:
//!
//! - [`local`] writes statement files into a directory, one per platform
//! - [`tarball`] packs the same files into a single tar archive
//! - [`image`] links each statement into an OCI image index as an
//!   attestation manifest next to the image manifest it describes

pub mod image;
pub mod local;
pub mod tarball;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Export destination kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Local,
    Tar,
    Image,
}

impl FromStr for ExportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "tar" => Ok(Self::Tar),
            "image" | "oci" => Ok(Self::Image),
            other => Err(Error::Validation(format!("unknown exporter '{other}'"))),
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportKind::Local => write!(f, "local"),
            ExportKind::Tar => write!(f, "tar"),
            ExportKind::Image => write!(f, "image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_kind_parse() {
        assert_eq!("local".parse::<ExportKind>().unwrap(), ExportKind::Local);
        assert_eq!("OCI".parse::<ExportKind>().unwrap(), ExportKind::Image);
        assert_eq!("tar".parse::<ExportKind>().unwrap(), ExportKind::Tar);
        assert_eq!(ExportKind::Tar.to_string(), "tar");
        assert!("registry".parse::<ExportKind>().is_err());
    }
}
