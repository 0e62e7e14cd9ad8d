//! Manifest-relative path handling.
//!
//! Bundle paths are always `/`-separated and relative to the manifest base
//! prefix; nothing here touches the filesystem.

/// Resolves an include directive argument against the including file's directory.
///
/// Strips one stray `{`/`}` pair left over from directive capture, appends
/// `.tex` when the file name has no extension, then joins and normalizes.
/// An empty argument resolves to an empty string, which never names a file.
///
/// ```
/// use ferrotex_bundle::paths::resolve_include;
///
/// assert_eq!(resolve_include("chapters", "intro"), "chapters/intro.tex");
/// assert_eq!(resolve_include("chapters", "../refs.bib"), "refs.bib");
/// assert_eq!(resolve_include("", "{./a/b}"), "a/b.tex");
/// ```
pub fn resolve_include(current_dir: &str, raw: &str) -> String {
    let mut arg = raw.trim();
    arg = arg.strip_prefix('{').unwrap_or(arg);
    arg = arg.strip_suffix('}').unwrap_or(arg);
    let arg = arg.trim();
    if arg.is_empty() {
        return String::new();
    }

    let file = if has_extension(arg) {
        arg.to_string()
    } else {
        format!("{arg}.tex")
    };

    if current_dir.is_empty() {
        normalize(&file)
    } else {
        normalize(&format!("{current_dir}/{file}"))
    }
}

/// Collapses `.` and empty segments and applies `..` where a parent exists.
/// A `..` that would climb above the root is kept, so it can never match a
/// manifest path.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of a bundle path; empty for top-level files.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Whether the last path segment carries an extension (`notes.txt`, not
/// `notes` or `.hidden`).
pub fn has_extension(path: &str) -> bool {
    extension(path).is_some()
}

/// Lowercase-preserving extension of the last segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => Some(&name[idx + 1..]),
        _ => None,
    }
}

/// Whether a requested path tries to climb out of the bundle.
pub fn contains_traversal(path: &str) -> bool {
    path.contains("..")
}

/// Whether a package-relative path would land outside the output directory:
/// a `..` segment or an absolute path. Dots inside a segment are fine.
pub fn escapes_root(path: &str) -> bool {
    path.starts_with(['/', '\\']) || path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Joins a storage prefix and a relative path with exactly one separator.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}
