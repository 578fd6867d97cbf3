//! Release archive retrieval and extraction.
//!
//! The external library arrives as a versioned `.tar.gz` release archive.
//! This module downloads it over HTTPS and unpacks it; everything else
//! (which version, where to put it, when to re-fetch) is decided by the
//! pipeline's task declarations.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Errors during artifact retrieval.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The HTTP request itself failed (connection, TLS, ...).
  #[error("failed to fetch '{url}': {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-success status.
  #[error("fetch of '{url}' returned status {status}")]
  Status { url: String, status: u16 },

  /// Failed to create a directory for the artifact.
  #[error("failed to create directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Failed to write the downloaded archive.
  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Failed to unpack the archive.
  #[error("failed to extract '{archive}': {source}")]
  Extract {
    archive: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Download `url` to `dest`, replacing any existing file.
///
/// The write goes through a temporary sibling and a rename, so an
/// interrupted download never leaves a plausible-looking partial archive.
pub fn download(url: &str, dest: &Path) -> Result<(), FetchError> {
  info!(url, dest = %dest.display(), "downloading");

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(|e| FetchError::CreateDir {
      path: parent.to_path_buf(),
      source: e,
    })?;
  }

  let mut response = reqwest::blocking::get(url)
    .map_err(|e| FetchError::Http {
      url: url.to_string(),
      source: e,
    })?
    .error_for_status()
    .map_err(|e| FetchError::Status {
      url: url.to_string(),
      status: e.status().map(|s| s.as_u16()).unwrap_or(0),
    })?;

  let temp_path = dest.with_extension("part");
  let mut file = fs::File::create(&temp_path).map_err(|e| FetchError::Write {
    path: temp_path.clone(),
    source: e,
  })?;

  response.copy_to(&mut file).map_err(|e| FetchError::Http {
    url: url.to_string(),
    source: e,
  })?;
  drop(file);

  fs::rename(&temp_path, dest).map_err(|e| FetchError::Write {
    path: dest.to_path_buf(),
    source: e,
  })?;

  info!(dest = %dest.display(), "download complete");
  Ok(())
}

/// Unpack a `.tar.gz` archive into `dest_dir`.
///
/// GitHub tag archives unpack into a `<name>-<version>/` top-level
/// directory; callers account for that in their declared output paths.
pub fn extract_tar_gz(archive: &Path, dest_dir: &Path) -> Result<(), FetchError> {
  info!(archive = %archive.display(), dest = %dest_dir.display(), "extracting");

  fs::create_dir_all(dest_dir).map_err(|e| FetchError::CreateDir {
    path: dest_dir.to_path_buf(),
    source: e,
  })?;

  let file = fs::File::open(archive).map_err(|e| FetchError::Extract {
    archive: archive.to_path_buf(),
    source: e,
  })?;

  let decoder = flate2::read::GzDecoder::new(file);
  let mut tar = tar::Archive::new(decoder);
  tar.unpack(dest_dir).map_err(|e| FetchError::Extract {
    archive: archive.to_path_buf(),
    source: e,
  })?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use flate2::Compression;
  use flate2::write::GzEncoder;
  use tempfile::TempDir;

  /// Build a small in-memory tar.gz containing `dir/file.txt`.
  fn sample_archive() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let content = b"int main(void) { return 0; }\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, "flecs-9.9.9/distr/flecs.c", content.as_slice())
      .unwrap();

    builder.into_inner().unwrap().finish().unwrap()
  }

  #[test]
  fn download_writes_the_body() {
    let mut server = mockito::Server::new();
    let mock = server
      .mock("GET", "/archive/v9.9.9.tar.gz")
      .with_status(200)
      .with_body("archive-bytes")
      .create();

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("cache/release.tar.gz");

    download(&format!("{}/archive/v9.9.9.tar.gz", server.url()), &dest).unwrap();

    mock.assert();
    assert_eq!(fs::read_to_string(&dest).unwrap(), "archive-bytes");
    assert!(!dest.with_extension("part").exists());
  }

  #[test]
  fn download_rejects_http_error_status() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/missing.tar.gz").with_status(404).create();

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("release.tar.gz");

    let err = download(&format!("{}/missing.tar.gz", server.url()), &dest).unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!dest.exists());
  }

  #[test]
  fn extract_unpacks_the_versioned_directory() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("release.tar.gz");
    fs::write(&archive, sample_archive()).unwrap();

    let dest = temp.path().join("sources");
    extract_tar_gz(&archive, &dest).unwrap();

    let unpacked = dest.join("flecs-9.9.9/distr/flecs.c");
    assert!(unpacked.exists());
    assert!(fs::read_to_string(&unpacked).unwrap().contains("int main"));
  }

  #[test]
  fn extract_of_garbage_is_an_extract_error() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.tar.gz");
    fs::write(&archive, "this is not a gzip stream").unwrap();

    let err = extract_tar_gz(&archive, &temp.path().join("out")).unwrap_err();
    assert!(matches!(err, FetchError::Extract { .. }));
  }
}
