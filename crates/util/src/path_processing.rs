use std::path::PathBuf;

use dirs_next::home_dir;

/// Expands a leading `~` to the user's home directory.
///
/// Paths without a leading `~` and platforms without a home directory leave
/// the input untouched.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let Some(home) = home_dir() else {
        return PathBuf::from(trimmed);
    };

    match trimmed.strip_prefix('~') {
        Some("") => home,
        Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => home.join(&rest[1..]),
        _ => PathBuf::from(trimmed),
    }
}
