//! Documents named on the command line.

use std::fs;
use std::path::{self, Path};

use gdoc_lsp_client::TextDocument;
use url::Url;

use crate::AppError;

/// Language id for files the host does not recognise.
pub const PLAIN_TEXT: &str = "plaintext";

/// Maps a file extension to the language id reported to the server.
#[must_use]
pub fn language_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) if extension.eq_ignore_ascii_case("gdoc") => "gdoc",
        Some(extension) if extension.eq_ignore_ascii_case("md") => "markdown",
        _ => PLAIN_TEXT,
    }
}

/// Reads a document and describes it as version 1 of a `file:` URI.
///
/// # Errors
///
/// Returns [`AppError::ReadDocument`] when the file cannot be read and
/// [`AppError::DocumentUri`] when its path has no URI form.
pub fn load(path: &Path) -> Result<TextDocument, AppError> {
    let read_error = |source| AppError::ReadDocument {
        path: path.to_path_buf(),
        source,
    };
    let text = fs::read_to_string(path).map_err(read_error)?;
    let absolute = path::absolute(path).map_err(read_error)?;
    let uri = Url::from_file_path(&absolute).map_err(|()| AppError::DocumentUri {
        path: path.to_path_buf(),
    })?;
    Ok(TextDocument::new(uri, language_for_path(path), 1, text))
}
