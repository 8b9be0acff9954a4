//! Minimal, allocation-light HTML scanning.
//!
//! Rendering never needs a DOM: the localizer only has to find start tags and the byte
//! ranges of their attribute values so it can splice replacements into the original text.

use std::ops::Range;

/// A start tag found in a document. `range` covers `<` through `>` inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub range: Range<usize>,
    pub attrs: Vec<Attr>,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

/// An attribute with a value. `value_range` indexes the whole document, not the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
    pub value_range: Range<usize>,
}

/// Yields every start tag in document order. Comments, doctypes, end tags and
/// processing instructions are skipped; malformed trailing markup ends the scan.
pub fn start_tags(html: &str) -> Vec<StartTag> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;

        if html[lt..].starts_with("<!--") {
            match html[lt + 4..].find("-->") {
                Some(end) => {
                    cursor = lt + 4 + end + 3;
                    continue;
                }
                None => break,
            }
        }

        let Some(gt) = find_tag_end(bytes, lt + 1) else {
            break;
        };

        if bytes
            .get(lt + 1)
            .is_some_and(|b| matches!(b, b'!' | b'?' | b'/'))
        {
            cursor = gt + 1;
            continue;
        }

        let name_start = lt + 1;
        let mut name_end = name_start;
        while name_end < gt && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'-')
        {
            name_end += 1;
        }
        if name_end == name_start || !bytes[name_start].is_ascii_alphabetic() {
            cursor = lt + 1;
            continue;
        }

        let name = html[name_start..name_end].to_ascii_lowercase();
        let attrs = parse_attrs(html, name_end, gt);
        tags.push(StartTag {
            name,
            range: lt..gt + 1,
            attrs,
        });

        // Raw text elements: their bodies are not markup.
        let tag_name = &tags[tags.len() - 1].name;
        if tag_name == "script" || tag_name == "style" {
            let close = format!("</{tag_name}");
            cursor = match find_ascii_case_insensitive(html, &close, gt + 1) {
                Some(pos) => pos,
                None => html.len(),
            };
            continue;
        }

        cursor = gt + 1;
    }

    tags
}

/// Byte range of the raw text between a `<style>`/`<script>` start tag and its end tag.
pub fn raw_text_body(html: &str, tag: &StartTag) -> Range<usize> {
    let start = tag.range.end;
    let close = format!("</{}", tag.name);
    let end = find_ascii_case_insensitive(html, &close, start).unwrap_or(html.len());
    start..end
}

fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut in_quote: Option<u8> = None;
    let mut pos = from;
    while pos < bytes.len() {
        let b = bytes[pos];
        if let Some(q) = in_quote {
            if b == q {
                in_quote = None;
            }
            pos += 1;
            continue;
        }
        if b == b'"' || b == b'\'' {
            in_quote = Some(b);
        } else if b == b'>' {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

fn parse_attrs(html: &str, from: usize, gt: usize) -> Vec<Attr> {
    let bytes = html.as_bytes();
    let mut attrs = Vec::new();
    let mut pos = from;

    loop {
        while pos < gt && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        if pos >= gt {
            break;
        }

        let name_start = pos;
        while pos < gt && !bytes[pos].is_ascii_whitespace() && !matches!(bytes[pos], b'=' | b'/')
        {
            pos += 1;
        }
        let name = html[name_start..pos].to_ascii_lowercase();

        while pos < gt && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= gt || bytes[pos] != b'=' {
            // Boolean attribute; nothing to rewrite.
            continue;
        }
        pos += 1;
        while pos < gt && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= gt {
            break;
        }

        let value_range = match bytes[pos] {
            quote @ (b'"' | b'\'') => {
                let start = pos + 1;
                let end = html[start..gt]
                    .find(quote as char)
                    .map_or(gt, |rel| start + rel);
                pos = (end + 1).min(gt);
                start..end
            }
            _ => {
                let start = pos;
                while pos < gt && !bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                start..pos
            }
        };

        attrs.push(Attr {
            name,
            value: html[value_range.clone()].to_owned(),
            value_range,
        });
    }

    attrs
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || needle.len() > hay.len() || from >= hay.len() {
        return None;
    }
    (from..=hay.len().saturating_sub(needle.len()))
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

pub fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Decodes the handful of entities that show up inside URL-valued attributes.
pub fn decode_attr_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_owned();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_attribute_ranges_in_document_coordinates() {
        let html = r#"<p>日本語</p><img alt='x' src="https://cdn.example.com/a.png" loading=lazy>"#;
        let tags = start_tags(html);
        let img = tags.iter().find(|t| t.name == "img").expect("img tag");

        let src = img.attr("src").expect("src attr");
        assert_eq!(src.value, "https://cdn.example.com/a.png");
        assert_eq!(&html[src.value_range.clone()], src.value);
        assert_eq!(img.attr("loading").map(|a| a.value.as_str()), Some("lazy"));
        assert_eq!(img.attr("alt").map(|a| a.value.as_str()), Some("x"));
    }

    #[test]
    fn skips_comments_end_tags_and_script_bodies() {
        let html = r#"<!-- <img src="a.png"> --><script>if (a<b) { x = "<img src='b.png'>"; }</script><img src="c.png"></p>"#;
        let names = start_tags(html)
            .into_iter()
            .map(|t| (t.name, t.attrs.len()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![("script".to_owned(), 0), ("img".to_owned(), 1)]
        );
    }

    #[test]
    fn quoted_gt_does_not_end_tag() {
        let html = r#"<img title="a > b" src="x.png">"#;
        let tags = start_tags(html);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].attr("src").map(|a| a.value.as_str()), Some("x.png"));
    }

    #[test]
    fn raw_text_body_spans_style_contents() {
        let html = "<style>.a{background:url(x.png)}</STYLE><p>";
        let tags = start_tags(html);
        let style = &tags[0];
        assert_eq!(&html[raw_text_body(html, style)], ".a{background:url(x.png)}");
        assert_eq!(tags[1].name, "p");
    }

    #[test]
    fn escape_and_decode() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(decode_attr_entities("a?x=1&amp;y=2"), "a?x=1&y=2");
    }
}
