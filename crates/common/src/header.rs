// Front-matter header block: parse, query and edit without disturbing the
// rest of the document.
//
// A header is a block delimited by `---` lines at the very top of the file
// (an optional UTF-8 BOM may precede it). It closes on `---` or `...`.
// Only simple `key: value` lines are interpreted; every other line is kept
// byte-for-byte.

use thiserror::Error;

use crate::identifier;

const DELIMITER: &str = "---";
const ALT_CLOSE: &str = "...";
const BOM: char = '\u{feff}';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header block opened on the first line is never closed")]
    Unterminated,
}

/// Header keys under which the indexer stores its three fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderKeys {
    pub identifier: String,
    pub root_marker: String,
    pub asset_target: String,
}

impl Default for HeaderKeys {
    fn default() -> Self {
        Self {
            identifier: "serial".into(),
            root_marker: "typora-root-url".into(),
            asset_target: "typora-copy-images-to".into(),
        }
    }
}

/// Values the indexer wants present in a document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFields {
    pub identifier: String,
    pub root_marker: String,
    pub asset_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderLine {
    Field { key: String, value: String, raw: String },
    Other(String),
}

#[derive(Debug, Clone)]
struct Header {
    open: String,
    lines: Vec<HeaderLine>,
    close: String,
}

/// A parsed document: optional header plus the untouched body.
#[derive(Debug, Clone)]
pub struct FrontMatter<'a> {
    bom: bool,
    header: Option<Header>,
    body: &'a str,
    newline: &'static str,
}

impl<'a> FrontMatter<'a> {
    pub fn parse(content: &'a str) -> Result<Self, HeaderError> {
        let (bom, text) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };
        let newline = detect_newline(text);

        let mut segments = text.split_inclusive('\n');
        let Some(first) = segments.next() else {
            return Ok(Self { bom, header: None, body: text, newline });
        };
        if first.trim_end() != DELIMITER {
            return Ok(Self { bom, header: None, body: text, newline });
        }

        let mut consumed = first.len();
        let mut lines = Vec::new();
        for segment in segments {
            consumed += segment.len();
            let trimmed = segment.trim_end();
            if trimmed == DELIMITER || trimmed == ALT_CLOSE {
                let header = Header { open: first.to_string(), lines, close: segment.to_string() };
                return Ok(Self { bom, header: Some(header), body: &text[consumed..], newline });
            }
            lines.push(parse_line(segment));
        }
        Err(HeaderError::Unterminated)
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    /// Value of `key` with surrounding quotes removed. First occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.header.as_ref()?.lines.iter().find_map(|line| match line {
            HeaderLine::Field { key: k, value, .. } if k == key => Some(unquote(value)),
            _ => None,
        })
    }

    /// Set `key` to `value`, editing the existing line in place or appending
    /// a new one before the closing delimiter. Returns whether anything changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let newline = self.newline;
        let header = self.header.get_or_insert_with(|| Header {
            open: format!("{DELIMITER}{newline}"),
            lines: Vec::new(),
            close: format!("{DELIMITER}{newline}"),
        });

        for line in header.lines.iter_mut() {
            if let HeaderLine::Field { key: k, value: v, raw } = line {
                if k.as_str() != key {
                    continue;
                }
                if unquote(v) == value {
                    return false;
                }
                let eol = line_ending(raw).to_string();
                *raw = render_field(key, value, &eol);
                *v = value.to_string();
                return true;
            }
        }

        header.lines.push(HeaderLine::Field {
            key: key.to_string(),
            value: value.to_string(),
            raw: render_field(key, value, newline),
        });
        true
    }

    /// Reassemble the document.
    ///
    /// A header that did not exist when parsing is separated from the body by
    /// one blank line.
    pub fn render(&self, had_header: bool) -> String {
        let mut out = String::with_capacity(self.body.len() + 128);
        if self.bom {
            out.push(BOM);
        }
        if let Some(header) = &self.header {
            out.push_str(&header.open);
            for line in &header.lines {
                match line {
                    HeaderLine::Field { raw, .. } | HeaderLine::Other(raw) => out.push_str(raw),
                }
            }
            out.push_str(&header.close);
            if !had_header {
                out.push_str(self.newline);
            }
        }
        out.push_str(self.body);
        out
    }
}

/// Read the identifier stored under `keys.identifier`, if well formed.
pub fn read_identifier(content: &str, keys: &HeaderKeys) -> Result<Option<String>, HeaderError> {
    let doc = FrontMatter::parse(content)?;
    Ok(doc.get(&keys.identifier).filter(|id| identifier::is_well_formed(id)).map(str::to_string))
}

/// Write `fields` into the header of `content`.
///
/// Returns `None` when the header already holds exactly these values, so the
/// caller can skip the write entirely.
pub fn apply_fields(
    content: &str,
    keys: &HeaderKeys,
    fields: &IndexFields,
) -> Result<Option<String>, HeaderError> {
    let mut doc = FrontMatter::parse(content)?;
    let had_header = doc.has_header();

    let mut changed = doc.set(&keys.identifier, &fields.identifier);
    changed |= doc.set(&keys.root_marker, &fields.root_marker);
    changed |= doc.set(&keys.asset_target, &fields.asset_target);

    Ok(changed.then(|| doc.render(had_header)))
}

fn parse_line(segment: &str) -> HeaderLine {
    let text = segment.trim_end_matches(['\r', '\n']);
    let starts_plain = text.chars().next().is_some_and(|c| !c.is_whitespace() && c != '#');
    if starts_plain {
        if let Some((key, value)) = text.split_once(':') {
            let key = key.trim_end();
            let separated = value.is_empty() || value.starts_with([' ', '\t']);
            if !key.is_empty() && separated {
                return HeaderLine::Field {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                    raw: segment.to_string(),
                };
            }
        }
    }
    HeaderLine::Other(segment.to_string())
}

fn render_field(key: &str, value: &str, eol: &str) -> String {
    if value.is_empty() {
        format!("{key}:{eol}")
    } else {
        format!("{key}: {value}{eol}")
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

fn line_ending(raw: &str) -> &str {
    if raw.ends_with("\r\n") {
        "\r\n"
    } else if raw.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn detect_newline(text: &str) -> &'static str {
    match text.find('\n') {
        Some(pos) if pos > 0 && text.as_bytes()[pos - 1] == b'\r' => "\r\n",
        _ => "\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields(id: &str, marker: &str) -> IndexFields {
        IndexFields {
            identifier: id.into(),
            root_marker: marker.into(),
            asset_target: format!("{marker}.assets/{}/{id}", identifier::bucket(id)),
        }
    }

    // ── Parsing ────────────────────────────────────────────────────

    #[test]
    fn document_without_header() {
        let doc = FrontMatter::parse("# Title\n\nbody\n").unwrap();
        assert!(!doc.has_header());
        assert_eq!(doc.get("serial"), None);
    }

    #[test]
    fn empty_document() {
        let doc = FrontMatter::parse("").unwrap();
        assert!(!doc.has_header());
        assert_eq!(doc.render(false), "");
    }

    #[test]
    fn reads_fields_and_strips_quotes() {
        let content = "---\nserial: abc123\ntitle: \"Hello: world\"\ntags: 'x'\n---\nbody\n";
        let doc = FrontMatter::parse(content).unwrap();
        assert_eq!(doc.get("serial"), Some("abc123"));
        assert_eq!(doc.get("title"), Some("Hello: world"));
        assert_eq!(doc.get("tags"), Some("x"));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn dot_close_is_accepted() {
        let doc = FrontMatter::parse("---\nserial: a1\n...\nbody").unwrap();
        assert_eq!(doc.get("serial"), Some("a1"));
    }

    #[test]
    fn indented_and_comment_lines_are_not_fields() {
        let doc = FrontMatter::parse("---\n  serial: nested\n# serial: c\n---\n").unwrap();
        assert_eq!(doc.get("serial"), None);
    }

    #[test]
    fn url_value_is_not_split_as_key() {
        let doc = FrontMatter::parse("---\nhttp://example.com\n---\n").unwrap();
        assert_eq!(doc.get("http"), None);
    }

    #[test]
    fn unterminated_header_is_an_error() {
        let err = FrontMatter::parse("---\nserial: abc\nno close here\n").unwrap_err();
        assert_eq!(err, HeaderError::Unterminated);
    }

    #[test]
    fn bom_before_header_is_tolerated() {
        let content = "\u{feff}---\nserial: abc\n---\nbody";
        assert_eq!(read_identifier(content, &HeaderKeys::default()).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_identifier_reads_as_none() {
        let content = "---\nserial: not valid!\n---\n";
        assert_eq!(read_identifier(content, &HeaderKeys::default()).unwrap(), None);
    }

    // ── Editing ────────────────────────────────────────────────────

    #[test]
    fn new_header_is_prepended_with_blank_line() {
        let out =
            apply_fields("# A\n", &HeaderKeys::default(), &fields("3f9a01bc", "../")).unwrap();
        assert_eq!(
            out.unwrap(),
            "---\nserial: 3f9a01bc\ntypora-root-url: ../\ntypora-copy-images-to: ../.assets/3/3f9a01bc\n---\n\n# A\n"
        );
    }

    #[test]
    fn empty_root_marker_renders_bare_key() {
        let out = apply_fields("", &HeaderKeys::default(), &fields("ab", "")).unwrap().unwrap();
        assert!(out.contains("\ntypora-root-url:\n"));
        assert!(out.contains("\ntypora-copy-images-to: .assets/a/ab\n"));
    }

    #[test]
    fn existing_header_keeps_other_lines_and_body() {
        let content = "---\ntitle: Notes\n# comment\ntags:\n  - a\n---\nline one\r\n\n  spaced  \n";
        let out = apply_fields(content, &HeaderKeys::default(), &fields("abcd1234", "../"))
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            "---\ntitle: Notes\n# comment\ntags:\n  - a\nserial: abcd1234\ntypora-root-url: ../\ntypora-copy-images-to: ../.assets/a/abcd1234\n---\nline one\r\n\n  spaced  \n"
        );
    }

    #[test]
    fn stale_root_marker_is_rewritten_in_place() {
        let content = "---\nserial: abcd1234\ntypora-root-url: ../\ntypora-copy-images-to: ../.assets/a/abcd1234\nauthor: me\n---\nbody";
        let out = apply_fields(content, &HeaderKeys::default(), &fields("abcd1234", "../../"))
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            "---\nserial: abcd1234\ntypora-root-url: ../../\ntypora-copy-images-to: ../../.assets/a/abcd1234\nauthor: me\n---\nbody"
        );
    }

    #[test]
    fn up_to_date_header_is_untouched() {
        let content = "---\nserial: abcd1234\ntypora-root-url: ../\ntypora-copy-images-to: ../.assets/a/abcd1234\n---\nbody";
        let out = apply_fields(content, &HeaderKeys::default(), &fields("abcd1234", "../")).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn quoted_values_count_as_equal() {
        let content = "---\nserial: \"abcd1234\"\ntypora-root-url: '../'\ntypora-copy-images-to: ../.assets/a/abcd1234\n---\n";
        let out = apply_fields(content, &HeaderKeys::default(), &fields("abcd1234", "../")).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn crlf_documents_get_crlf_lines() {
        let content = "---\r\ntitle: x\r\n---\r\nbody\r\n";
        let out =
            apply_fields(content, &HeaderKeys::default(), &fields("ab", "")).unwrap().unwrap();
        assert_eq!(
            out,
            "---\r\ntitle: x\r\nserial: ab\r\ntypora-root-url:\r\ntypora-copy-images-to: .assets/a/ab\r\n---\r\nbody\r\n"
        );
    }

    #[test]
    fn bom_is_preserved_when_prepending() {
        let out =
            apply_fields("\u{feff}body", &HeaderKeys::default(), &fields("ab", "")).unwrap().unwrap();
        assert!(out.starts_with("\u{feff}---\n"));
        assert!(out.ends_with("---\n\nbody"));
    }

    #[test]
    fn custom_keys_are_honoured() {
        let keys = HeaderKeys {
            identifier: "id".into(),
            root_marker: "root".into(),
            asset_target: "assets".into(),
        };
        let out = apply_fields("x", &keys, &fields("ab", "../")).unwrap().unwrap();
        assert!(out.starts_with("---\nid: ab\nroot: ../\nassets: ../.assets/a/ab\n---\n"));
        assert_eq!(read_identifier(&out, &keys).unwrap().as_deref(), Some("ab"));
    }

    #[test]
    fn unterminated_header_is_not_rewritten() {
        let err = apply_fields("---\ntitle: x\n", &HeaderKeys::default(), &fields("ab", ""));
        assert_eq!(err, Err(HeaderError::Unterminated));
    }

    // ── Properties ─────────────────────────────────────────────────

    proptest! {
        #[test]
        fn applying_twice_is_idempotent(body in "[a-z #\\-\n]{0,80}", depth in 0usize..4) {
            let keys = HeaderKeys::default();
            let f = fields("deadbeef", &"../".repeat(depth));
            prop_assume!(FrontMatter::parse(&body).is_ok_and(|doc| !doc.has_header()));
            let once = apply_fields(&body, &keys, &f).unwrap().unwrap_or_else(|| body.clone());
            let twice = apply_fields(&once, &keys, &f).unwrap();
            prop_assert_eq!(twice, None);
            prop_assert!(once.ends_with(&body));
        }
    }
}
