//! Content signatures for incremental-skip decisions.
//!
//! A signature is the full SHA-256 of a path's content. Files hash their
//! bytes; directories hash their structure and every file within, sorted by
//! path so two identical trees always produce the same signature.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A content signature: lowercase hex SHA-256 (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub String);

impl std::fmt::Display for Signature {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while computing a signature.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Compute the signature of a path, dispatching on its kind.
///
/// The caller is expected to have checked existence; a vanished path
/// surfaces as a `ReadFile` error.
pub fn signature_of_path(path: &Path) -> Result<Signature, HashError> {
  if path.is_dir() {
    hash_directory(path)
  } else {
    hash_file(path)
  }
}

/// Compute a deterministic signature of a directory's contents.
///
/// The signature covers file contents, directory structure, and symlink
/// targets; metadata such as timestamps and permissions is excluded.
/// Entries are sorted by path for determinism.
pub fn hash_directory(path: &Path) -> Result<Signature, HashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|e| HashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .to_string();

    // Skip the root directory itself
    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      let content_hash = hash_file(entry_path)?;
      format!("F:{}:{}", rel_path, content_hash.0)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| HashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      let target_hash = hash_bytes(target.to_string_lossy().as_bytes());
      format!("L:{}:{}", rel_path, target_hash.0)
    } else {
      // Skip special files (sockets, devices, etc.)
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  // Sort by path for determinism (WalkDir sorts, but be explicit)
  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  Ok(Signature(format!("{:x}", hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<Signature, HashError> {
  let mut file = fs::File::open(path).map_err(|e| HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| HashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(Signature(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Signature {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Signature(format!("{:x}", hasher.finalize()))
}
