use serde::{Deserialize, Deserializer, Serialize};

/// One article as stored on disk. Missing or `null` fields read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub topics: Vec<TopicRef>,
}

impl ArticleRecord {
    pub fn primary_topic(&self) -> Option<&TopicRef> {
        self.topics.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicRef {
    #[serde(
        rename = "topic-id",
        alias = "topic_id",
        deserialize_with = "null_as_default"
    )]
    pub topic_id: String,
    #[serde(
        rename = "topic-title",
        alias = "topic_title",
        deserialize_with = "null_as_default"
    )]
    pub topic_title: String,
}

/// Top-level curriculum entry: steps → sub-steps → topics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumStep {
    pub step_title: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub sub_steps: Vec<SubStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubStep {
    pub sub_step_title: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub topics: Vec<CurriculumTopic>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumTopic {
    /// Numeric in some exports, string in others.
    pub id: Option<serde_json::Value>,
    pub question_title: Option<String>,
    pub post_link: Option<String>,
    pub yt_link: Option<String>,
    pub plus_link: Option<String>,
    pub lc_link: Option<String>,
}

/// Collects every non-empty `post_link` in curriculum order.
pub fn curriculum_post_links(steps: &[CurriculumStep]) -> Vec<String> {
    steps
        .iter()
        .flat_map(|step| &step.sub_steps)
        .flat_map(|sub| &sub.topics)
        .filter_map(|topic| topic.post_link.as_deref())
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .map(str::to_owned)
        .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
