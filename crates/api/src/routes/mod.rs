pub mod confirm;
pub mod enroll;
pub mod identify;
pub mod meeting;
pub mod speakers;
pub mod summary;

use std::path::Path;

/// File suffix for a multipart upload, defaulting to `.wav`. The suffix
/// drives container detection in the audio decoder.
pub(crate) fn upload_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".wav".to_string())
}
