use std::path::PathBuf;

use walkdir::WalkDir;

/// Expand the first `*` in `path`.
///
/// The text between the previous `/` and the `*` is a name prefix. It is
/// replaced, together with the `*`, by the first entry of the parent
/// directory (in name order) that starts with that prefix. Anything after
/// the `*` is kept as is, so `/dump/Game v*/Sound` can become
/// `/dump/Game v1.2.0/Sound`.
///
/// The path is returned unchanged if it has no `*`, starts with one, or
/// nothing in the parent directory matches.
pub fn resolve_wildcard(path: &str) -> PathBuf {
    let Some(star) = path.find('*').filter(|&pos| pos > 0) else {
        return PathBuf::from(path);
    };

    let head = &path[..star];
    let (dir, prefix) = match head.rfind('/') {
        Some(slash) => (&head[..=slash], &head[slash + 1..]),
        None => ("", head),
    };
    let search_dir = if dir.is_empty() { "." } else { dir };

    let found = WalkDir::new(search_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .find(|name| name.starts_with(prefix));

    match found {
        Some(name) => PathBuf::from(format!("{dir}{name}{}", &path[star + 1..])),
        None => PathBuf::from(path),
    }
}
