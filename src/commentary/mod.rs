//! Optional LLM commentary for archive replies.
//!
//! [`CommentaryGenerator::generate`] never fails: provider errors and
//! malformed responses produce low-confidence fallbacks that the reply
//! composer drops.

mod providers;

pub use providers::{from_config, AnthropicModel, OpenAiModel};

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::twitter::Post;

/// Confidence assigned when the model answered but not in valid JSON.
pub const DEGRADED_CONFIDENCE: f64 = 0.2;
/// Confidence assigned when the model could not be reached.
pub const FAILED_CONFIDENCE: f64 = 0.1;

const DEFAULT_CONFIDENCE: f64 = 0.5;
const RAW_EXCERPT_CHARS: usize = 100;

static COMMENTARY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""commentary":\s*"([^"]+)""#).unwrap());

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Model identifier for logs.
    fn name(&self) -> &str;
}

/// A media attachment as described to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSummary {
    pub kind: &'static str,
    pub url: Option<String>,
    pub description: Option<String>,
}

/// The parts of a post the prompt is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostContent {
    pub text: String,
    pub username: String,
    /// RFC 3339 timestamp.
    pub timestamp: Option<String>,
    pub media: Vec<MediaSummary>,
}

impl PostContent {
    #[must_use]
    pub fn from_post(post: &Post) -> Self {
        let timestamp = post
            .timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true));

        let photos = post.photos.iter().map(|p| MediaSummary {
            kind: "photo",
            url: p.url.clone(),
            description: p.description.clone(),
        });
        let videos = post.videos.iter().map(|v| MediaSummary {
            kind: "video",
            url: v.url.clone(),
            description: v.description.clone(),
        });

        Self {
            text: post.text.clone().unwrap_or_default(),
            username: post.username_or_unknown().to_string(),
            timestamp,
            media: photos.chain(videos).collect(),
        }
    }

    /// `photo: desc, video: desc`, or `No media`.
    #[must_use]
    pub fn media_summary(&self) -> String {
        if self.media.is_empty() {
            return "No media".to_string();
        }
        self.media
            .iter()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.kind,
                    m.description.as_deref().unwrap_or("No description")
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Model output for one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commentary {
    pub commentary: String,
    pub confidence: f64,
    pub topics: Vec<String>,
}

/// How a commentary request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentaryOutcome {
    /// The model returned well-formed JSON.
    Generated(Commentary),
    /// The model answered but the JSON could not be parsed.
    Degraded { commentary: Commentary, raw: String },
    /// The model could not be reached.
    Failed { commentary: Commentary, error: String },
}

impl CommentaryOutcome {
    #[must_use]
    pub fn commentary(&self) -> &Commentary {
        match self {
            Self::Generated(c) => c,
            Self::Degraded { commentary, .. } | Self::Failed { commentary, .. } => commentary,
        }
    }

    #[must_use]
    pub fn into_commentary(self) -> Commentary {
        match self {
            Self::Generated(c) => c,
            Self::Degraded { commentary, .. } | Self::Failed { commentary, .. } => commentary,
        }
    }
}

/// Builds prompts, calls the model and interprets its answer.
#[derive(Clone)]
pub struct CommentaryGenerator {
    model: Arc<dyn LanguageModel>,
}

impl CommentaryGenerator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn generate(&self, content: &PostContent) -> CommentaryOutcome {
        info!(username = %content.username, model = %self.model.name(), "Generating commentary");

        let prompt = build_prompt(content);
        let raw = match self.model.invoke(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(username = %content.username, "Commentary generation failed: {e:#}");
                return CommentaryOutcome::Failed {
                    commentary: fallback_commentary(&content.username),
                    error: format!("{e:#}"),
                };
            }
        };

        match parse_commentary(&raw) {
            Some(commentary) => {
                info!(
                    confidence = commentary.confidence,
                    topics = ?commentary.topics,
                    "Generated commentary"
                );
                CommentaryOutcome::Generated(commentary)
            }
            None => {
                warn!(raw = %raw, "Model returned unparseable commentary");
                CommentaryOutcome::Degraded {
                    commentary: salvage_commentary(&raw),
                    raw,
                }
            }
        }
    }

    /// Send a trivial prompt to verify credentials and connectivity.
    pub async fn check_connection(&self) -> bool {
        match self
            .model
            .invoke("Test connection - respond with \"OK\"")
            .await
        {
            Ok(_) => {
                info!(model = %self.model.name(), "LLM connection test successful");
                true
            }
            Err(e) => {
                error!(model = %self.model.name(), "LLM connection test failed: {e:#}");
                false
            }
        }
    }
}

impl std::fmt::Debug for CommentaryGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentaryGenerator")
            .field("model", &self.model.name())
            .finish()
    }
}

/// Remove surrounding Markdown code fences from a model answer.
#[must_use]
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse a strict JSON answer. `None` if it is not JSON or has no commentary.
#[must_use]
pub fn parse_commentary(raw: &str) -> Option<Commentary> {
    let value: Value = serde_json::from_str(strip_code_blocks(raw)).ok()?;

    let commentary = value
        .get("commentary")?
        .as_str()
        .filter(|c| !c.is_empty())?
        .to_string();

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Commentary {
        commentary,
        confidence,
        topics,
    })
}

/// Best-effort commentary from an answer that was not valid JSON.
#[must_use]
pub fn salvage_commentary(raw: &str) -> Commentary {
    let commentary = COMMENTARY_FIELD
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or_else(
            || raw.chars().take(RAW_EXCERPT_CHARS).collect(),
            |m| m.as_str().to_string(),
        );

    Commentary {
        commentary,
        confidence: DEGRADED_CONFIDENCE,
        topics: vec!["general".to_string()],
    }
}

#[must_use]
pub fn fallback_commentary(username: &str) -> Commentary {
    Commentary {
        commentary: format!(
            "Interesting content from @{username} worth preserving for future reference."
        ),
        confidence: FAILED_CONFIDENCE,
        topics: vec!["general".to_string()],
    }
}

#[must_use]
pub fn build_prompt(content: &PostContent) -> String {
    format!(
        r#"You are an AI assistant helping to create engaging commentary for posts that are being archived on the Autonomys network.

Your task is to analyze the provided post content and generate relevant, insightful commentary that would be valuable when sharing the archive link.

The commentary should:
- Be concise (under 200 characters)
- Highlight key insights or important aspects of the post
- Be relevant and add value to the original content
- Be engaging and encourage interaction
- Reference why this content is worth preserving/archiving
- Be appropriate for a professional social media response

Post Content:
Username: {username}
Text: {text}
Timestamp: {timestamp}
Media: {media}

Additional Context:
- This post is being archived on Autonomys, a blockchain-based permanent decentralized storage network
- The archive will be permanently accessible via the provided link
- Your commentary will be part of a response post that includes the archive link

Generate commentary that would make people interested in viewing the archived content. Focus on what makes this post significant, interesting, or worth preserving.

IMPORTANT: You must respond with ONLY valid JSON. Do not include any explanatory text before or after the JSON.

Required JSON format:
{{
  "commentary": "Your engaging commentary here (under 200 characters)",
  "confidence": 0.85,
  "topics": ["topic1", "topic2", "topic3"]
}}

Where:
- commentary: string (required, under 200 characters)
- confidence: number between 0 and 1 (required)
- topics: array of 2-5 strings representing key themes (required)

Respond with valid JSON only:"#,
        username = content.username,
        text = content.text,
        timestamp = content.timestamp.as_deref().unwrap_or("Unknown"),
        media = content.media_summary(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twitter::MediaAsset;

    struct ScriptedModel(Result<String, String>);

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn generator(answer: Result<&str, &str>) -> CommentaryGenerator {
        let answer = answer.map(ToString::to_string).map_err(ToString::to_string);
        CommentaryGenerator::new(Arc::new(ScriptedModel(answer)))
    }

    fn content() -> PostContent {
        PostContent {
            text: "decentralized storage is here".to_string(),
            username: "alice".to_string(),
            ..PostContent::default()
        }
    }

    #[tokio::test]
    async fn test_generated_from_fenced_json() {
        let outcome = generator(Ok(
            "```json\n{\"commentary\":\"Worth keeping\",\"confidence\":0.9,\"topics\":[\"storage\"]}\n```",
        ))
        .generate(&content())
        .await;

        assert_eq!(
            outcome,
            CommentaryOutcome::Generated(Commentary {
                commentary: "Worth keeping".to_string(),
                confidence: 0.9,
                topics: vec!["storage".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_degraded_extracts_commentary_field() {
        let raw = r#"Sure! {"commentary": "A milestone post", "confidence": high}"#;
        let outcome = generator(Ok(raw)).generate(&content()).await;

        let CommentaryOutcome::Degraded { commentary, raw: kept } = outcome else {
            panic!("expected degraded outcome");
        };
        assert_eq!(commentary.commentary, "A milestone post");
        assert!((commentary.confidence - 0.2).abs() < f64::EPSILON);
        assert_eq!(commentary.topics, vec!["general"]);
        assert_eq!(kept, raw);
    }

    #[tokio::test]
    async fn test_degraded_uses_raw_prefix() {
        let raw = "x".repeat(150);
        let outcome = generator(Ok(raw.as_str())).generate(&content()).await;
        assert_eq!(outcome.commentary().commentary.len(), 100);
    }

    #[tokio::test]
    async fn test_failed_uses_fallback() {
        let outcome = generator(Err("401 unauthorized")).generate(&content()).await;

        assert!(matches!(outcome, CommentaryOutcome::Failed { .. }));
        let commentary = outcome.into_commentary();
        assert_eq!(
            commentary.commentary,
            "Interesting content from @alice worth preserving for future reference."
        );
        assert!((commentary.confidence - 0.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_check_connection() {
        assert!(generator(Ok("OK")).check_connection().await);
        assert!(!generator(Err("down")).check_connection().await);
    }

    #[test]
    fn test_missing_confidence_defaults() {
        let c = parse_commentary(r#"{"commentary":"hi"}"#).unwrap();
        assert!((c.confidence - 0.5).abs() < f64::EPSILON);
        assert!(c.topics.is_empty());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let c = parse_commentary(r#"{"commentary":"hi","confidence":7}"#).unwrap();
        assert!((c.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_commentary_is_rejected() {
        assert!(parse_commentary(r#"{"commentary":"","confidence":0.9}"#).is_none());
        assert!(parse_commentary("not json").is_none());
    }

    #[test]
    fn test_post_content_from_post() {
        let post = Post {
            id: "1".to_string(),
            text: Some("look".to_string()),
            timestamp: Some(1_700_000_000),
            photos: vec![MediaAsset {
                description: Some("a cat".to_string()),
                ..MediaAsset::default()
            }],
            videos: vec![MediaAsset::default()],
            ..Post::default()
        };

        let content = PostContent::from_post(&post);
        assert_eq!(content.username, "unknown");
        assert_eq!(content.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(content.media_summary(), "photo: a cat, video: No description");
    }

    #[test]
    fn test_prompt_mentions_post_fields() {
        let prompt = build_prompt(&content());
        assert!(prompt.contains("Username: alice"));
        assert!(prompt.contains("Timestamp: Unknown"));
        assert!(prompt.contains("Media: No media"));
    }
}
