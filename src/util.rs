/// Makes `label` match `^[A-Za-z_][A-Za-z0-9_]*$`, which the API requires for `fileLabel`.
pub fn to_safe_file_label(label: &str) -> String {
    let mut safe: String = label
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if !safe.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        safe.insert(0, '_');
    }
    safe
}

/// The TMY API caps file labels at 10 characters.
pub fn to_safe_tmy_file_label(label: &str) -> String {
    to_safe_file_label(label).chars().take(10).collect()
}

/// Strips the format noise the API appends to download file names.
pub fn prettify_file_label(label: &str) -> String {
    let label = label.strip_suffix(".json").unwrap_or(label);
    let label = label.strip_suffix("_SOLARGIS_JSON").unwrap_or(label);
    label.to_string()
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    })
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
