//! Name-sanitizing transforms for package names and tags.
//!
//! Both transforms produce lowercase, ASCII-safe, URL-safe, length-bounded
//! strings so that a record guid maps deterministically onto the same
//! catalog name across runs.

/// Maximum length of a derived package name or tag.
pub const MAX_NAME_LENGTH: usize = 100;

/// Derives a catalog package name from an arbitrary title or guid.
///
/// Lowercases, maps every character outside `[a-z0-9-_]` to `-`, collapses
/// runs of dashes, trims leading/trailing dashes and truncates to
/// [`MAX_NAME_LENGTH`].
pub fn munge_title_to_name(title: &str) -> String {
    sanitize(title)
}

/// Sanitizes a tag name with the same rules as package names.
pub fn munge_tag(tag: &str) -> String {
    sanitize(tag)
}

fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            ch
        } else {
            '-'
        };
        if mapped == '-' {
            if !last_dash && !out.is_empty() {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.push(mapped);
            last_dash = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(MAX_NAME_LENGTH);
    out
}
