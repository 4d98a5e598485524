use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Characters a stored filename may keep
    /// - Kept: ASCII letters, digits, `_`, `.`, `-`
    /// - Dropped: everything else, including quotes and shell metacharacters
    static ref FILENAME_STRIP_REGEX: Regex = Regex::new(r"[^A-Za-z0-9_.\-]").unwrap();

    /// Device names Windows refuses as filenames
    static ref WINDOWS_DEVICE_REGEX: Regex =
        Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[0-9]|LPT[0-9])(\..*)?$").unwrap();
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Non-ASCII is dropped, path separators become spaces, whitespace runs are
/// joined with `_` and leading/trailing dots and underscores are stripped.
/// An empty result means nothing usable was left.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let stripped = FILENAME_STRIP_REGEX.replace_all(&joined, "");
    let trimmed = stripped.trim_matches(|c| c == '.' || c == '_');

    if WINDOWS_DEVICE_REGEX.is_match(trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Lower-cased extension after the last dot, if any
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn allowed_extension(filename: &str, allowed: &[String]) -> bool {
    file_extension(filename).is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}
