use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::logging::{SanitizedFilename, SecurityEvent};

pub const MAX_UPLOAD_BYTES: usize = 5_000_000;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SOI: &[u8] = b"\xff\xd8";
const JPEG_EOI: &[u8] = b"\xff\xd9";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file too large: {size} bytes (max {max} bytes)", max = MAX_UPLOAD_BYTES)]
    FileTooLarge { size: usize },
    #[error("unsupported file type")]
    UnsupportedFileType,
    #[error("path traversal attempt detected")]
    PathTraversal,
    #[error("symlinks not allowed in upload path")]
    SymlinkNotAllowed,
    #[error("failed to store upload: {0}")]
    Storage(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
}

impl ImageType {
    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Png => ".png",
            ImageType::Jpeg => ".jpg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafeUploadResult {
    pub content_type: ImageType,
    pub generated_filename: String,
    pub resolved_path: PathBuf,
    pub size: usize,
}

/// Detects the image type from magic bytes alone.
pub fn sniff_content_type(data: &[u8]) -> Option<ImageType> {
    if data.starts_with(PNG_SIGNATURE) {
        Some(ImageType::Png)
    } else if data.starts_with(JPEG_SOI) && data.ends_with(JPEG_EOI) {
        Some(ImageType::Jpeg)
    } else {
        None
    }
}

/// Admits an uploaded image into `root` under a freshly generated name.
///
/// The caller's `suggested_name` is only logged; it never reaches the
/// filesystem. Checks run in order: size, signature, confinement of the
/// resolved path to the canonical root, then symlinks on the root and its
/// ancestors.
pub fn admit(root: &Path, data: &[u8], suggested_name: &str) -> Result<SafeUploadResult, UploadError> {
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::FileTooLarge { size: data.len() });
    }

    let content_type = sniff_content_type(data).ok_or(UploadError::UnsupportedFileType)?;
    let generated_filename = format!("{}{}", Uuid::new_v4(), content_type.extension());

    let canonical_root = root.canonicalize()?;
    let resolved_path = confine(&canonical_root, &generated_filename)?;

    ensure_no_symlinks(root)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&resolved_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    crate::log_security_event!(
        SecurityEvent::UploadAccepted,
        suggested_name = %SanitizedFilename::new(suggested_name),
        saved_as = %generated_filename,
        content_type = content_type.mime(),
        size = data.len(),
        "Upload admitted"
    );

    Ok(SafeUploadResult {
        content_type,
        generated_filename,
        resolved_path,
        size: data.len(),
    })
}

/// Resolves `name` under the canonical root, rejecting any result that
/// lands outside it.
fn confine(canonical_root: &Path, name: &str) -> Result<PathBuf, UploadError> {
    let resolved = resolve_candidate(canonical_root, name)?;
    if resolved.starts_with(canonical_root) {
        Ok(resolved)
    } else {
        Err(UploadError::PathTraversal)
    }
}

/// Resolves `root/name` without requiring the file to exist yet.
fn resolve_candidate(canonical_root: &Path, name: &str) -> Result<PathBuf, UploadError> {
    let candidate = canonical_root.join(name);

    if candidate.symlink_metadata().is_ok() {
        // Something already sits at this name; follow it to see where it leads.
        return Ok(candidate.canonicalize()?);
    }

    let parent = candidate.parent().ok_or(UploadError::PathTraversal)?;
    let file_name = candidate.file_name().ok_or(UploadError::PathTraversal)?;
    Ok(parent.canonicalize()?.join(file_name))
}

/// Rejects a root that is, or sits below, a symbolic link. The root is made
/// absolute without resolving links so the walk sees them.
fn ensure_no_symlinks(root: &Path) -> Result<(), UploadError> {
    let absolute = std::path::absolute(root)?;

    for ancestor in absolute.ancestors() {
        let metadata = match ancestor.symlink_metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        if metadata.file_type().is_symlink() {
            return Err(UploadError::SymlinkNotAllowed);
        }
    }

    Ok(())
}

/// True when `file` resolves to a location inside `root`. Missing paths are
/// never inside.
#[cfg(test)]
pub fn is_within_root(root: &Path, file: &Path) -> bool {
    match (root.canonicalize(), file.canonicalize()) {
        (Ok(root), Ok(file)) => file.starts_with(root),
        _ => false,
    }
}
