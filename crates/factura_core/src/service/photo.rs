//! Inline photo loading.
//!
//! The file is read and encoded before any save request is built, so a read
//! failure aborts the save without touching the store.

use crate::model::photo::Photo;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Photo file could not be turned into an inline payload.
#[derive(Debug)]
pub enum PhotoError {
    /// File could not be read.
    Read { path: PathBuf, source: std::io::Error },
    /// File exists but holds no bytes.
    Empty(PathBuf),
}

impl PhotoError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "photo_read_failed",
            Self::Empty(_) => "photo_empty",
        }
    }
}

impl Display for PhotoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "cannot read photo `{}`: {source}", path.display())
            }
            Self::Empty(path) => write!(f, "photo file is empty: `{}`", path.display()),
        }
    }
}

impl Error for PhotoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Empty(_) => None,
        }
    }
}

/// Reads `path` and wraps its bytes as an inline photo.
pub async fn load_inline_photo(path: impl AsRef<Path>) -> Result<Photo, PhotoError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|source| {
        warn!(
            "event=photo_load module=service status=error kind={:?}",
            source.kind()
        );
        PhotoError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if data.is_empty() {
        warn!("event=photo_load module=service status=error kind=empty");
        return Err(PhotoError::Empty(path.to_path_buf()));
    }

    info!(
        "event=photo_load module=service status=ok bytes={}",
        data.len()
    );
    Ok(Photo::inline_from_path(path, data))
}

#[cfg(test)]
mod tests {
    use super::{load_inline_photo, PhotoError};
    use crate::model::photo::Photo;

    #[tokio::test]
    async fn reads_file_as_inline_photo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("receipt.jpg");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).expect("write photo");

        let photo = load_inline_photo(&path).await.expect("load");
        assert_eq!(
            photo,
            Photo::Inline {
                mime: "image/jpeg".to_string(),
                data: vec![0xff, 0xd8, 0xff],
            }
        );
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_inline_photo(dir.path().join("absent.png"))
            .await
            .expect_err("missing file must fail");
        assert!(matches!(err, PhotoError::Read { .. }));
        assert_eq!(err.code(), "photo_read_failed");
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blank.png");
        std::fs::write(&path, b"").expect("write photo");

        let err = load_inline_photo(&path).await.expect_err("empty must fail");
        assert!(matches!(err, PhotoError::Empty(_)));
    }
}
