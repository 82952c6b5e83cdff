// Document identifiers: short random tokens stored in each document header.

use uuid::Uuid;

/// Length of freshly generated identifiers.
pub const IDENTIFIER_LEN: usize = 8;

/// Longest identifier accepted from an existing header.
const MAX_IDENTIFIER_LEN: usize = 64;

/// Generate a new identifier: the first 8 hex digits of a random v4 UUID.
pub fn generate() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(IDENTIFIER_LEN);
    id
}

/// Generate an identifier for which `taken` returns false.
///
/// With 32 bits of randomness a clash is rare, so this loops until it finds
/// a free token.
pub fn generate_unique(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = generate();
        if !taken(&candidate) {
            return candidate;
        }
    }
}

/// Whether a header value can be used as an identifier as-is.
///
/// Identifiers written by older tooling use other alphabets and lengths, so
/// anything made of ASCII alphanumerics, `-` and `_` is kept.
pub fn is_well_formed(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_IDENTIFIER_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// First character of the identifier, used to fan out asset directories.
pub fn bucket(id: &str) -> &str {
    id.char_indices().nth(1).map_or(id, |(end, _)| &id[..end])
}
