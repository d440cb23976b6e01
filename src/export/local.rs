use crate::error::{Error, Result};
use crate::in_toto::Attestation;
use crate::oci::Platform;
use crate::utils::safe_create_file;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const PROVENANCE_FILENAME: &str = "provenance.json";

/// Relative path of a platform's statement in a local export.
///
/// `platform_split` defaults to splitting whenever more than one platform
/// is exported. A split export puts each statement under a per-platform
/// directory; an unsplit multi-platform export suffixes the file name
/// instead.
///
/// ```
/// use buildprov::export::local::local_path;
/// use buildprov::oci::Platform;
///
/// let arm = Platform::parse("linux/arm/v7").unwrap();
/// assert_eq!(local_path(&arm, 1, None).to_str(), Some("provenance.json"));
/// assert_eq!(local_path(&arm, 2, None).to_str(), Some("linux_arm_v7/provenance.json"));
/// assert_eq!(local_path(&arm, 2, Some(false)).to_str(), Some("provenance.linux_arm_v7.json"));
/// ```
pub fn local_path(platform: &Platform, platform_count: usize, platform_split: Option<bool>) -> PathBuf {
    let multi = platform_count > 1;
    match platform_split.unwrap_or(multi) {
        true => PathBuf::from(platform.path_component()).join(PROVENANCE_FILENAME),
        false if multi => PathBuf::from(format!("provenance.{}.json", platform.path_component())),
        false => PathBuf::from(PROVENANCE_FILENAME),
    }
}

/// Relative path of every statement, in order. Fails when two statements
/// would land on the same path.
pub fn export_paths(attestations: &[Attestation], platform_split: Option<bool>) -> Result<Vec<PathBuf>> {
    let mut seen = BTreeSet::new();
    attestations
        .iter()
        .map(|attestation| {
            let relative = local_path(&attestation.platform, attestations.len(), platform_split);
            if !seen.insert(relative.clone()) {
                return Err(Error::Export(format!(
                    "more than one statement would be written to {}",
                    relative.display()
                )));
            }
            Ok(relative)
        })
        .collect()
}

/// Writes every statement under `dir` and returns the written paths.
pub fn write_local(
    dir: &Path,
    attestations: &[Attestation],
    platform_split: Option<bool>,
) -> Result<Vec<PathBuf>> {
    let relative_paths = export_paths(attestations, platform_split)?;
    let mut written = Vec::with_capacity(attestations.len());

    for (attestation, relative) in attestations.iter().zip(relative_paths) {
        let path = dir.join(relative);
        let mut file = safe_create_file(&path, false)?;
        file.write_all(&attestation.statement)?;
        log::info!(
            "wrote {} provenance for {} to {}",
            attestation.predicate_type,
            attestation.platform,
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slsa::ProvenanceVersion;
    use tempfile::tempdir;

    fn attestation(platform: &str, body: &str) -> Attestation {
        Attestation {
            platform: Platform::parse(platform).unwrap(),
            predicate_type: ProvenanceVersion::V02.predicate_type(),
            statement: body.as_bytes().to_vec(),
            digest: String::new(),
        }
    }

    #[test]
    fn test_single_platform_layout() -> Result<()> {
        let dir = tempdir()?;
        let paths = write_local(dir.path(), &[attestation("linux/amd64", "{}")], None)?;
        assert_eq!(paths, vec![dir.path().join("provenance.json")]);
        assert_eq!(std::fs::read_to_string(&paths[0])?, "{}");
        Ok(())
    }

    #[test]
    fn test_single_platform_forced_split() -> Result<()> {
        let dir = tempdir()?;
        let paths = write_local(dir.path(), &[attestation("linux/amd64", "{}")], Some(true))?;
        assert_eq!(paths, vec![dir.path().join("linux_amd64/provenance.json")]);
        Ok(())
    }

    #[test]
    fn test_multi_platform_layouts() -> Result<()> {
        let attestations = [attestation("linux/amd64", "a"), attestation("linux/arm64", "b")];

        let split = tempdir()?;
        write_local(split.path(), &attestations, None)?;
        assert_eq!(
            std::fs::read_to_string(split.path().join("linux_arm64/provenance.json"))?,
            "b"
        );
        assert!(!split.path().join("provenance.json").exists());

        let flat = tempdir()?;
        write_local(flat.path(), &attestations, Some(false))?;
        assert_eq!(
            std::fs::read_to_string(flat.path().join("provenance.linux_amd64.json"))?,
            "a"
        );
        assert!(!flat.path().join("linux_amd64").exists());
        Ok(())
    }

    #[test]
    fn test_colliding_paths_rejected() -> Result<()> {
        let dir = tempdir()?;
        let attestations = [attestation("linux/amd64", "a"), attestation("linux/amd64", "b")];
        assert!(matches!(
            write_local(dir.path(), &attestations, None),
            Err(Error::Export(_))
        ));
        Ok(())
    }
}
