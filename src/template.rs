use std::path::Path;

use anyhow::Context as _;

use crate::error::ItemError;
use crate::formats::ArticleRecord;
use crate::html::escape;

/// Placeholder tokens recognized in page templates. Anything else in braces
/// (CSS rules, inline scripts) is kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Slug,
    Content,
    Topics,
    TopicTitle,
}

impl Field {
    const ALL: [(&'static str, Field); 5] = [
        ("{TITLE}", Field::Title),
        ("{SLUG}", Field::Slug),
        ("{CONTENT}", Field::Content),
        ("{TOPICS}", Field::Topics),
        ("{TOPIC_TITLE}", Field::TopicTitle),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(ItemError::NotFound(path.to_path_buf()).into());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read template: {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let candidate = &rest[open..];
            match Field::ALL
                .iter()
                .find(|(token, _)| candidate.starts_with(*token))
            {
                Some((token, field)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(*field));
                    rest = &candidate[token.len()..];
                }
                None => {
                    literal.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(field) => Some(*field),
            Segment::Literal(_) => None,
        })
    }

    /// Pure substitution. Title-like fields are escaped, `CONTENT` is inserted as-is.
    pub fn render(&self, record: &ArticleRecord) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Title) => out.push_str(&escape(&record.title)),
                Segment::Field(Field::Slug) => out.push_str(&escape(&record.slug)),
                Segment::Field(Field::Content) => out.push_str(&record.content),
                Segment::Field(Field::Topics) => out.push_str(&render_breadcrumbs(record)),
                Segment::Field(Field::TopicTitle) => {
                    if let Some(topic) = record.primary_topic() {
                        out.push_str(&escape(&topic.topic_title));
                    }
                }
            }
        }
        out
    }
}

fn render_breadcrumbs(record: &ArticleRecord) -> String {
    let topics = record
        .topics
        .iter()
        .filter(|t| !t.topic_title.trim().is_empty() || !t.topic_id.trim().is_empty())
        .collect::<Vec<_>>();
    if topics.is_empty() {
        return String::new();
    }

    let mut out = String::from("<nav class=\"breadcrumbs\"><ol>");
    for topic in topics {
        let label = if topic.topic_title.trim().is_empty() {
            &topic.topic_id
        } else {
            &topic.topic_title
        };
        out.push_str(&format!(
            "<li data-topic=\"{}\">{}</li>",
            escape(&topic.topic_id),
            escape(label)
        ));
    }
    out.push_str("</ol></nav>");
    out
}
