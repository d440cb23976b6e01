//! Packs statements into a tar archive with the same layout the local
//! exporter writes to disk.

use crate::error::Result;
use crate::export::local::export_paths;
use crate::in_toto::Attestation;
use crate::utils::safe_create_file;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

fn header_for(size: u64, kind: EntryType) -> Header {
    let mut h = Header::new_gnu();
    h.set_size(size);
    h.set_entry_type(kind);
    h.set_mode(if kind == EntryType::Directory {
        0o755
    } else {
        0o644
    });
    h.set_uid(0);
    h.set_gid(0);
    h.set_mtime(0);
    h
}

/// Writes one archive entry per statement into `writer` and returns the
/// entry paths. Per-platform directories get their own entries.
pub fn write_tar<W: Write>(
    writer: W,
    attestations: &[Attestation],
    platform_split: Option<bool>,
) -> Result<Vec<PathBuf>> {
    let entries = export_paths(attestations, platform_split)?;
    let mut tar = Builder::new(writer);

    for (attestation, path) in attestations.iter().zip(&entries) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let mut dir = header_for(0, EntryType::Directory);
            tar.append_data(&mut dir, parent, std::io::empty())?;
        }
        let mut file = header_for(attestation.statement.len() as u64, EntryType::Regular);
        tar.append_data(&mut file, path, attestation.statement.as_slice())?;
        log::debug!(
            "added {} provenance for {} as {}",
            attestation.predicate_type,
            attestation.platform,
            path.display()
        );
    }

    tar.into_inner()?.flush()?;
    Ok(entries)
}

/// Writes the archive to `path`.
pub fn write_tar_file(
    path: &Path,
    attestations: &[Attestation],
    platform_split: Option<bool>,
) -> Result<PathBuf> {
    let file = safe_create_file(path, false)?;
    let entries = write_tar(file, attestations, platform_split)?;
    log::info!(
        "wrote {} provenance statement(s) to {}",
        entries.len(),
        path.display()
    );
    Ok(path.to_path_buf())
}
