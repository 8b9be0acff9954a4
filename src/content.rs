use std::sync::LazyLock;

use regex::Regex;

static EMPTY_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p>(?:\s|<!--.*?-->)*</p>").expect("valid empty paragraph regex")
});
static BREAK_ONLY_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p>\s*<br\s*/?>\s*</p>").expect("valid br paragraph regex"));
static DOUBLE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p>(\s*<p>)").expect("valid nested open regex"));
static DOUBLE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p>(\s*</p>)").expect("valid nested close regex"));

/// Cleans up authoring artifacts in article bodies: empty paragraphs, `<br>`-only
/// paragraphs, and doubled `<p>` / `</p>` tags left by nested paragraphs.
pub fn tidy(content: &str) -> String {
    let out = EMPTY_PARAGRAPH.replace_all(content, "");
    let out = BREAK_ONLY_PARAGRAPH.replace_all(&out, "");
    let out = DOUBLE_OPEN.replace_all(&out, "$1");
    let out = DOUBLE_CLOSE.replace_all(&out, "$1");
    out.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_empty_and_comment_only_paragraphs() {
        let input = "<p>Keep</p><p> \n </p><p><!-- note --> </p><p><br/></p><p>Also</p>";
        assert_eq!(tidy(input), "<p>Keep</p><p>Also</p>");
    }

    #[test]
    fn collapses_nested_paragraph_tags() {
        let input = "<p>\n<p>Inner</p>\n</p>";
        assert_eq!(tidy(input), "\n<p>Inner\n</p>");
    }

    #[test]
    fn leaves_regular_markup_alone() {
        let input = r#"<div class="tabs"><pre><code>int main() {}</code></pre></div><p>Text</p>"#;
        assert_eq!(tidy(input), input);
    }
}
