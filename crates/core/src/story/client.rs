use std::{io::Read, time::Duration};

use serde::Serialize;
use serde_json::Value;

use super::{ChatRequest, GenerativeApi, ImageRequest, SpeechRequest};
use crate::{config::StoryConfig, Result, SphereError};

/// Blocking client for the OpenAI-compatible REST endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    agent: ureq::Agent,
    api_base: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &StoryConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SphereError::InvalidInput("an API key is required"));
        }

        let mut builder = ureq::AgentBuilder::new();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            agent: builder.build(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<ureq::Response> {
        let url = format!("{}/{path}", self.api_base);
        let payload = serde_json::to_string(body)?;
        tracing::debug!(%url, bytes = payload.len(), "calling generative API");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_string(&payload);

        response.map_err(request_error)
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        let text = self
            .post(path, body)?
            .into_string()
            .map_err(|err| SphereError::Transport(err.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|err| SphereError::MalformedStory(format!("{path} returned invalid JSON: {err}")))
    }
}

/// Splits ureq failures into status replies and unreachable hosts.
fn request_error(err: ureq::Error) -> SphereError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            SphereError::Http { status, body }
        }
        other => SphereError::Transport(other.to_string()),
    }
}

impl GenerativeApi for OpenAiClient {
    fn chat(&mut self, request: &ChatRequest) -> Result<String> {
        let reply = self.post_json("chat/completions", request)?;
        reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SphereError::MalformedStory("completion has no content".to_string()))
    }

    fn speech(&mut self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let mut audio = Vec::new();
        self.post("audio/speech", request)?
            .into_reader()
            .read_to_end(&mut audio)?;
        if audio.is_empty() {
            return Err(SphereError::MalformedStory("speech response was empty".to_string()));
        }
        Ok(audio)
    }

    fn image(&mut self, request: &ImageRequest) -> Result<String> {
        let reply = self.post_json("images/generations", request)?;
        reply
            .pointer("/data/0/b64_json")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SphereError::MalformedStory("image response has no b64_json".to_string()))
    }
}
