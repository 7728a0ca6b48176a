use std::sync::OnceLock;

use regex::Regex;

use crate::models::OgMetadata;

use super::MetadataParser;

static META_TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ATTRIBUTE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn meta_tag_re() -> Option<&'static Regex> {
    META_TAG_RE
        .get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").ok())
        .as_ref()
}

fn attribute_re() -> Option<&'static Regex> {
    ATTRIBUTE_RE
        .get_or_init(|| {
            Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#).ok()
        })
        .as_ref()
}

/// Reads `<meta property="og:..." content="...">` tags from raw HTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGraphParser;

impl OpenGraphParser {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataParser for OpenGraphParser {
    fn parse_open_graph(&self, raw: &str) -> OgMetadata {
        let mut metadata = OgMetadata::new();
        let (Some(tag_re), Some(attr_re)) = (meta_tag_re(), attribute_re()) else {
            return metadata;
        };

        for tag in tag_re.find_iter(raw) {
            let mut property = None;
            let mut content = None;

            for cap in attr_re.captures_iter(tag.as_str()) {
                let name = cap[1].to_ascii_lowercase();
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .or_else(|| cap.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                match name.as_str() {
                    "property" => property = Some(value.to_string()),
                    "content" => content = Some(decode_entities(value)),
                    _ => {}
                }
            }

            if let Some(key) = property.as_deref().and_then(|p| p.strip_prefix("og:")) {
                metadata.insert(key.to_string(), content.unwrap_or_default());
            }
        }

        metadata
    }
}

/// Decode the handful of entities that commonly appear in attribute values.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_og_properties_by_suffix() {
        let html = r#"<head>
            <meta property="og:title" content="Hello &amp; welcome">
            <meta content="A short description" property="og:description" />
            <meta property='og:image' content='https://example.com/a.png'>
            <meta name="description" content="not open graph">
            <meta property="twitter:card" content="summary">
            <meta property="og:site_name">
        </head>"#;

        let metadata = OpenGraphParser::new().parse_open_graph(html);

        assert_eq!(metadata.len(), 4);
        assert_eq!(metadata["title"], "Hello & welcome");
        assert_eq!(metadata["description"], "A short description");
        assert_eq!(metadata["image"], "https://example.com/a.png");
        assert_eq!(metadata["site_name"], "");
    }

    #[test]
    fn page_without_og_tags_gives_empty_mapping() {
        let metadata = OpenGraphParser::new().parse_open_graph("<html><body>plain</body></html>");
        assert!(metadata.is_empty());
    }

    #[test]
    fn decodes_numeric_entities_and_leaves_stray_ampersands() {
        assert_eq!(decode_entities("It&#39;s &#x2014; ok"), "It's \u{2014} ok");
        assert_eq!(decode_entities("A & B"), "A & B");
        assert_eq!(decode_entities("&bogus; &lt;"), "&bogus; <");
    }
}
