//! Export Service
//!
//! Writes downloaded export blobs to disk. The blob is written to a temporary
//! file next to the target and renamed into place, so a failed export never
//! leaves a partial file behind.

use crate::api::types::ExportRequest;
use crate::api::CollectionApi;
use crate::error::{AppError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Download an export of `collection` into `dir/{file_name}.{ext}`
pub async fn export_collection(
    api: &dyn CollectionApi,
    collection: &str,
    request: &ExportRequest,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    validate_file_name(file_name)?;
    info!(
        "ExportService::export_collection {}/{} as {:?}",
        api.domain(),
        collection,
        request.file_format
    );

    let bytes = api.export(collection, request).await?;
    save_blob(dir, file_name, request.file_format.extension(), &bytes)
}

/// Persist `bytes` as `dir/{file_name}.{extension}`, replacing any existing file
pub fn save_blob(dir: &Path, file_name: &str, extension: &str, bytes: &[u8]) -> Result<PathBuf> {
    validate_file_name(file_name)?;
    std::fs::create_dir_all(dir)?;

    let target = dir.join(format!("{}.{}", file_name, extension));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(&target).map_err(|e| AppError::Io(e.error))?;

    info!("Saved {} bytes to {}", bytes.len(), target.display());
    Ok(target)
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.trim().is_empty() {
        return Err(AppError::Validation("Export file name is required".to_string()));
    }
    if file_name.contains(['/', '\\']) || file_name == "." || file_name == ".." {
        return Err(AppError::Validation(format!(
            "Export file name must not contain a path: {}",
            file_name
        )));
    }
    Ok(())
}
