//! Staging directory archival.
//!
//! Thin wrapper over the tar/gzip codec: compresses the staging directory
//! contents (not the directory itself) into a single `.tgz`.

use crate::error::BundleError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use tar::Builder;

/// Compress the contents of `staging_dir` into `out_file`.
///
/// A failure never leaves a partial archive on disk.
///
/// # Errors
/// Returns `ARCHIVE` if the archive cannot be written.
pub fn create_archive(staging_dir: &Path, out_file: &Path) -> Result<(), BundleError> {
    match write_archive(staging_dir, out_file) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = std::fs::remove_file(out_file);
            Err(err)
        }
    }
}

fn write_archive(staging_dir: &Path, out_file: &Path) -> Result<(), BundleError> {
    let file = File::create(out_file).map_err(|e| {
        BundleError::archive(format!("Failed to create {}: {e}", out_file.display()))
    })?;

    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    builder
        .append_dir_all(".", staging_dir)
        .map_err(|e| BundleError::archive(format!("Failed to add staged files: {e}")))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| BundleError::archive(format!("Failed to finish archive: {e}")))?;

    encoder
        .finish()
        .map_err(|e| BundleError::archive(format!("Failed to finish compression: {e}")))?;

    Ok(())
}
