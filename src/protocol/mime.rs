//! Extension → media type table.

use std::path::Path;

/// Sentinel media type that routes a resource to the dynamic handler.
pub const CGI: &str = "application/cgi";

/// Served for anything the table does not know.
pub const DEFAULT: &str = "application/octet-stream";

pub const GEMTEXT: &str = "text/gemini";

static TYPES: &[(&str, &str)] = &[
    ("gmi", GEMTEXT),
    ("gemini", GEMTEXT),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("xml", "text/xml"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("m4a", "audio/mp4"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("pdf", "application/pdf"),
    ("cgi", CGI),
];

/// Look up the media type for a path by its extension.
pub fn lookup(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT;
    };

    TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT)
}
