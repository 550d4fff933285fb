//! Invoice photo payload.
//!
//! A photo is either a reference the backend can resolve on its own (URL) or
//! a self-contained inline image. Inline images travel as base64 data-URIs
//! (`data:<mime>;base64,<payload>`) because the backends have no separate
//! upload channel.

use crate::model::validation::ValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Photo {
    /// Externally hosted image.
    Url(String),
    /// Image bytes embedded in the record.
    Inline { mime: String, data: Vec<u8> },
}

impl Photo {
    /// Wraps raw image bytes, picking the mime type from the file extension.
    pub fn inline_from_path(path: &Path, data: Vec<u8>) -> Self {
        Self::Inline {
            mime: mime_for_path(path).to_string(),
            data,
        }
    }

    /// Encodes this photo into its single-string wire form.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Inline { mime, data } => {
                format!("{DATA_URI_PREFIX}{mime}{BASE64_MARKER},{}", STANDARD.encode(data))
            }
        }
    }

    /// Decodes the wire form produced by [`Photo::to_wire`] or by a backend.
    ///
    /// Strings that do not start with `data:` are treated as URLs.
    pub fn from_wire(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let Some(rest) = trimmed.strip_prefix(DATA_URI_PREFIX) else {
            return Ok(Self::Url(trimmed.to_string()));
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ValidationError::InvalidPhoto("data uri has no payload".to_string()))?;
        let mime = header.strip_suffix(BASE64_MARKER).ok_or_else(|| {
            ValidationError::InvalidPhoto("only base64 data uris are supported".to_string())
        })?;
        let data = STANDARD
            .decode(payload)
            .map_err(|err| ValidationError::InvalidPhoto(format!("base64 decode failed: {err}")))?;

        Ok(Self::Inline {
            mime: if mime.is_empty() {
                FALLBACK_MIME.to_string()
            } else {
                mime.to_string()
            },
            data,
        })
    }

    /// Like [`Photo::from_wire`], but maps absent or blank values to `None`.
    pub fn from_wire_opt(value: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match value {
            Some(raw) if !raw.trim().is_empty() => Self::from_wire(raw).map(Some),
            _ => Ok(None),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

impl From<Photo> for String {
    fn from(value: Photo) -> Self {
        value.to_wire()
    }
}

impl TryFrom<String> for Photo {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Photo::from_wire(&value)
    }
}

/// Returns the image mime type implied by `path`'s extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => FALLBACK_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::{mime_for_path, Photo};
    use crate::model::validation::ValidationError;
    use std::path::Path;

    #[test]
    fn plain_strings_are_urls() {
        let photo = Photo::from_wire("https://cdn.example.com/a.png").unwrap();
        assert_eq!(photo, Photo::Url("https://cdn.example.com/a.png".to_string()));
        assert!(!photo.is_inline());
    }

    #[test]
    fn inline_photo_encodes_as_data_uri() {
        let photo = Photo::Inline {
            mime: "image/png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        };
        let wire = photo.to_wire();
        assert_eq!(wire, "data:image/png;base64,iVBORw==");
        assert_eq!(Photo::from_wire(&wire).unwrap(), photo);
    }

    #[test]
    fn data_uri_without_base64_marker_is_rejected() {
        let err = Photo::from_wire("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPhoto(_)));
    }

    #[test]
    fn blank_wire_value_means_no_photo() {
        assert_eq!(Photo::from_wire_opt(Some("  ")).unwrap(), None);
        assert_eq!(Photo::from_wire_opt(None).unwrap(), None);
    }

    #[test]
    fn mime_follows_extension_case_insensitively() {
        assert_eq!(mime_for_path(Path::new("receipt.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("scan.png")), "image/png");
        assert_eq!(
            mime_for_path(Path::new("notes.txt")),
            "application/octet-stream"
        );
    }
}
