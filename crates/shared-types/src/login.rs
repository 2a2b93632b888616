//! Profile login normalization.
//!
//! Logins arrive from on-chain profile metadata and are untrusted: they may
//! carry control characters or stray whitespace. Rows only ever store the
//! sanitized form.

/// Drop non-printable characters, trim, and lowercase. Returns None when
/// nothing printable remains.
pub fn sanitize_login(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| (' '..='~').contains(ch))
        .collect::<String>()
        .trim()
        .to_lowercase();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Search key stored next to each place: login followed by the place number.
pub fn search_index(login: &str, place_number: u32) -> String {
    format!("{login}{place_number}")
}
