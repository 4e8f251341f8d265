use std::path::Path;

pub const GENERIC_MIME: &str = "application/octet-stream";

/// Picks the MIME type for an upload.
///
/// Priority: a caller-supplied type (unless it is the generic fallback), then a guess from the
/// original file name, then a guess from the on-disk path, then [`GENERIC_MIME`].
pub fn resolve_mime_type(
    path: &Path,
    original_name: Option<&str>,
    provided: Option<&str>,
) -> String {
    if let Some(provided) = provided.map(str::trim) {
        if !provided.is_empty() && !provided.eq_ignore_ascii_case(GENERIC_MIME) {
            return provided.to_string();
        }
    }
    if let Some(guess) = original_name.and_then(|name| guess(Path::new(name))) {
        return guess;
    }
    guess(path).unwrap_or_else(|| GENERIC_MIME.to_string())
}

fn guess(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first_raw()
        .map(|mime| mime.to_string())
}
