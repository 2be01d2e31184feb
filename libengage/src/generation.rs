//! Comment text generation
//!
//! The language model sits behind [`TextGenerator`]. Whatever it returns is
//! passed through [`sanitize_generated`] before it reaches the page, and the
//! static [`CommentTemplates`] double as the fallback when generation fails.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::automation::PostContext;
use crate::config::CommentsConfig;
use crate::error::{ConfigError, GenerationError, Result};

/// Everything the generator is told about the comment it should write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentContext {
    pub post: PostContext,
    pub style: String,
    pub emoji_count: u8,
    pub max_chars: usize,
}

impl CommentContext {
    pub fn new(post: PostContext, config: &CommentsConfig) -> Self {
        Self {
            post,
            style: config.style.clone(),
            emoji_count: config.emoji_count,
            max_chars: config.max_chars,
        }
    }
}

/// Text-generation collaborator
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Draft a comment for the post described by `context`.
    ///
    /// `template_hint` is one of the configured templates, given as an example
    /// of tone and length.
    async fn generate_comment(
        &self,
        context: &CommentContext,
        template_hint: &str,
    ) -> std::result::Result<String, GenerationError>;
}

/// Render the instruction prompt sent to a language model
pub fn build_prompt(context: &CommentContext, template_hint: &str) -> String {
    let mut prompt = format!(
        "Write a short, engaging comment for an Instagram post. \
         Keep it {style}, include {emojis} emoji{plural}, and stay under {max} characters.",
        style = context.style,
        emojis = context.emoji_count,
        plural = if context.emoji_count == 1 { "" } else { "s" },
        max = context.max_chars,
    );

    if let Some(author) = &context.post.author {
        prompt.push_str(&format!("\nAuthor: @{}", author));
    }
    if let Some(caption) = &context.post.caption {
        prompt.push_str(&format!("\nPost content: {}", caption));
    }
    prompt.push_str(&format!("\nExample of the tone: {}", template_hint));
    prompt.push_str("\nReply with the comment text only.");
    prompt
}

/// Trim generated text, strip wrapping quotes and enforce the length bound
pub fn sanitize_generated(
    text: &str,
    max_chars: usize,
) -> std::result::Result<String, GenerationError> {
    let mut cleaned = text.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if cleaned.len() >= 2 && cleaned.starts_with(open) && cleaned.ends_with(close) {
            cleaned = cleaned[open.len_utf8()..cleaned.len() - close.len_utf8()].trim();
            break;
        }
    }

    if cleaned.is_empty() {
        return Err(GenerationError::Empty);
    }
    let len = cleaned.chars().count();
    if len > max_chars {
        return Err(GenerationError::TooLong {
            len,
            max: max_chars,
        });
    }
    Ok(cleaned.to_string())
}

/// Configured static comment templates
#[derive(Debug, Clone)]
pub struct CommentTemplates {
    templates: Vec<String>,
}

impl CommentTemplates {
    /// Keep the non-blank templates; at least one is required
    pub fn new(templates: &[String]) -> Result<Self> {
        let templates: Vec<String> = templates
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if templates.is_empty() {
            return Err(ConfigError::MissingField("comments.templates".to_string()).into());
        }
        Ok(Self { templates })
    }

    pub fn from_config(config: &CommentsConfig) -> Result<Self> {
        Self::new(&config.templates)
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.templates
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(self.templates[0].as_str())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Generator that answers with the template hint itself.
///
/// Used when no language model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate_comment(
        &self,
        context: &CommentContext,
        template_hint: &str,
    ) -> std::result::Result<String, GenerationError> {
        sanitize_generated(template_hint, context.max_chars)
    }
}
