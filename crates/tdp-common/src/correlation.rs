//! Correlation between media artifacts and their owning messages
//!
//! A media artifact is stored at `{media_root}/{channel}/{date}/{messageId}_{epochSeconds}{ext}`.
//! The filename is the only carrier of the owning message id once the artifact
//! leaves the collector, so extraction has to be strict: anything that does not
//! start with a parseable integer is rejected rather than guessed at.
//!
//! The loader also records an explicit `raw.media_artifacts` row per download,
//! which is the preferred correlation path. Filename parsing remains the
//! fallback for artifacts collected before that table existed.

use std::path::Path;
use thiserror::Error;

/// Error extracting a message id from an artifact path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("artifact path has no file name: {0}")]
    MissingFileName(String),

    #[error("file name does not start with a message id: {0}")]
    UnparseableFileName(String),
}

/// Extract the owning message id from a media artifact path.
///
/// The id is the token before the first `_` in the file stem. Extraction
/// fails for filenames following any other naming convention
/// (e.g. `photo_unnamed.jpg`).
pub fn message_id_from_path(path: &Path) -> Result<i64, CorrelationError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CorrelationError::MissingFileName(path.display().to_string()))?;

    let stem = file_name.split('.').next().unwrap_or(file_name);
    let token = stem.split('_').next().unwrap_or(stem);

    token
        .parse::<i64>()
        .map_err(|_| CorrelationError::UnparseableFileName(file_name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_extracts_message_id_from_artifact_name() {
        let path = PathBuf::from("media/CheMed123/2022-09-05/482913_1662371829.jpg");
        assert_eq!(message_id_from_path(&path).unwrap(), 482913);
    }

    #[test]
    fn test_extracts_id_without_extension() {
        let path = PathBuf::from("media/CheMed123/2022-09-05/17_1662371829");
        assert_eq!(message_id_from_path(&path).unwrap(), 17);
    }

    #[test]
    fn test_rejects_alternate_naming_convention() {
        let path = PathBuf::from("media/CheMed123/2022-09-05/photo_unnamed.jpg");
        let err = message_id_from_path(&path).unwrap_err();
        assert!(matches!(err, CorrelationError::UnparseableFileName(_)));
    }

    #[test]
    fn test_rejects_bare_extension() {
        let path = PathBuf::from(".jpg");
        assert!(message_id_from_path(&path).is_err());
    }

    #[test]
    fn test_rejects_empty_path() {
        let path = PathBuf::from("");
        assert!(matches!(
            message_id_from_path(&path),
            Err(CorrelationError::MissingFileName(_))
        ));
    }
}
