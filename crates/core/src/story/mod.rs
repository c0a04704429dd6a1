//! Generated stories and the adapter that produces them.
//!
//! A story is requested in three strictly sequential stages: one chat
//! completion returning the chapter plan as JSON, then per chapter one speech
//! synthesis call and one image generation call per image prompt. Any failure
//! aborts the whole run; nothing partial is returned and nothing is retried.

mod client;

use serde::{Deserialize, Serialize};

pub use client::OpenAiClient;

use crate::{assets::AssetRef, config::StoryConfig, Result, SphereError};

const STORY_INSTRUCTIONS: &str = "All text need to be in french, try to generate between 3 and \
5 chapters. Generate a JSON object with a story about Roman history, including chapters with \
titles, narration and image prompts, based on this json template : {
  \"chapters\": [
    {
      \"title\": \"Chapitre X: Title X\",
      \"content\": \"the story of this chapter, between 5 and 10 lines\",
      \"images\": [
        \"in english: prompt for the first image about this chapter, very precise on the details\",
        \"in english: prompt for the second image about this chapter, very precise on the details\"
      ]
    }
  ]
}
put only the content of the json in the response, no other text";

const IMAGE_PREAMBLE: &str = "artistic drawing set in Ancient Rome, The scene is vibrant, full \
of life, and rich in historical details. The style is semi-realistic with soft lines, capturing \
the grandeur of Roman civilization and the elegance of its art you need to focus on :";

/// One narrated chapter: title, narration audio and illustrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub title: String,
    #[serde(rename = "mp3")]
    pub audio: AssetRef,
    pub images: Vec<AssetRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub chapters: Vec<ChapterRecord>,
}

impl Story {
    pub fn from_json(raw: &str) -> Result<Self> {
        let story: Story = serde_json::from_str(raw)?;
        if story.chapters.is_empty() {
            return Err(SphereError::MalformedStory("story has no chapters".to_string()));
        }
        Ok(story)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Read-only walk over a story's chapters, advanced by narration ending.
#[derive(Debug, Clone)]
pub struct ChapterCursor {
    story: Story,
    index: usize,
}

impl ChapterCursor {
    pub fn new(story: Story) -> Result<Self> {
        if story.chapters.is_empty() {
            return Err(SphereError::InvalidInput("a story needs at least one chapter"));
        }
        Ok(Self { story, index: 0 })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &ChapterRecord {
        &self.story.chapters[self.index]
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.story.chapters.len()
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    /// Moves to the next chapter when the current narration ends. Returns
    /// `None` on the last chapter; the cursor stays put.
    pub fn on_audio_ended(&mut self) -> Option<&ChapterRecord> {
        if self.is_last() {
            tracing::debug!(chapter = self.index, "last chapter finished");
            return None;
        }
        self.index += 1;
        let chapter = &self.story.chapters[self.index];
        tracing::info!(chapter = self.index, title = %chapter.title, "chapter advanced");
        Some(chapter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub response_format: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub response_format: String,
}

/// The hosted text, speech and image generation service.
pub trait GenerativeApi {
    /// Returns the content of the first completion choice.
    fn chat(&mut self, request: &ChatRequest) -> Result<String>;
    /// Returns the encoded audio bytes.
    fn speech(&mut self, request: &SpeechRequest) -> Result<Vec<u8>>;
    /// Returns the base64-encoded PNG of the first generated image.
    fn image(&mut self, request: &ImageRequest) -> Result<String>;
}

/// Chapter plan returned by the chat completion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoryPlan {
    pub chapters: Vec<PlannedChapter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlannedChapter {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Validates the chat output against the chapter template. Tolerates a
/// markdown code fence around the JSON.
pub fn parse_story_plan(content: &str) -> Result<StoryPlan> {
    let body = strip_code_fence(content);
    let plan: StoryPlan = serde_json::from_str(body)
        .map_err(|err| SphereError::MalformedStory(format!("{err}")))?;

    if plan.chapters.is_empty() {
        return Err(SphereError::MalformedStory("no chapters in plan".to_string()));
    }
    for (index, chapter) in plan.chapters.iter().enumerate() {
        if chapter.content.trim().is_empty() {
            return Err(SphereError::MalformedStory(format!(
                "chapter {index} has no narration"
            )));
        }
    }
    Ok(plan)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Drives the three-stage generation against a [`GenerativeApi`].
#[derive(Debug)]
pub struct StoryGenerator<A> {
    api: A,
    config: StoryConfig,
}

impl<A: GenerativeApi> StoryGenerator<A> {
    pub fn new(api: A, config: StoryConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn generate(&mut self, prompt: &str) -> Result<Story> {
        if prompt.trim().is_empty() {
            return Err(SphereError::InvalidInput("story prompt is empty"));
        }

        match self.run(prompt) {
            Ok(story) => {
                tracing::info!(chapters = story.chapters.len(), "story generated");
                Ok(story)
            }
            Err(err) => {
                tracing::error!(%err, "story generation aborted");
                Err(err)
            }
        }
    }

    fn run(&mut self, prompt: &str) -> Result<Story> {
        let content = self.api.chat(&ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "developer".to_string(),
                    content: STORY_INSTRUCTIONS.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        })?;
        tracing::debug!(bytes = content.len(), "story plan received");
        let plan = parse_story_plan(&content)?;

        let mut chapters = Vec::with_capacity(plan.chapters.len());
        for (index, chapter) in plan.chapters.into_iter().enumerate() {
            tracing::info!(chapter = index, title = %chapter.title, "synthesising chapter");
            let audio = self.api.speech(&SpeechRequest {
                model: self.config.speech_model.clone(),
                input: chapter.content.clone(),
                voice: self.config.voice.clone(),
                response_format: "mp3".to_string(),
                instructions: self.config.narration_instructions.clone(),
            })?;

            let mut images = Vec::with_capacity(chapter.images.len());
            for image_prompt in &chapter.images {
                let encoded = self.api.image(&ImageRequest {
                    model: self.config.image_model.clone(),
                    prompt: format!("{IMAGE_PREAMBLE}{image_prompt}"),
                    n: 1,
                    size: self.config.image_size.clone(),
                    response_format: "b64_json".to_string(),
                })?;
                images.push(AssetRef::from_base64("image/png", &encoded));
            }

            chapters.push(ChapterRecord {
                title: chapter.title,
                audio: AssetRef::data_uri("audio/mp3", &audio),
                images,
            });
        }

        Ok(Story { chapters })
    }
}
