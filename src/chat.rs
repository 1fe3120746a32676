//! Chat Responder.
//!
//! Answers a user's prompt with a retrieval-augmented assistant bound to the
//! user's vector stores, inside a persisted session:
//!
//! 1. Read the user's store ids (none is fine: the assistant then runs
//!    without retrieval).
//! 2. Build the [`AssistantSpec`].
//! 3. Create or touch the session.
//! 4. Return the stored reply when `clientMessageId` was already answered;
//!    otherwise run one turn over the recent transcript and append it.
//!
//! [`ChatResponder::respond`] never fails: errors become a failure
//! [`Envelope`].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::OpenAIConfig;
use crate::models::{Envelope, TranscriptItem};
use crate::openai::OpenAIClient;
use crate::store::{IndexRegistry, SessionStore, SessionTouch, TranscriptStore};

pub const ASSISTANT_NAME: &str = "Chat Assistant";

pub const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful assistant specialized in answering questions about the user's documents. \
You have access to the tool: FileSearchTool. \
Use this tool to search for information in the user's vector stores. \
Prioritize using the FileSearchTool to answer the user's question. \
Provide clear, accurate, and concise responses. \
Provide the source of your information in the format: [Source: <file_name>, page number].";

pub const DEFAULT_SESSION_ID: &str = "default";

/// Retrieval over a fixed set of vector stores.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSearch {
    pub vector_store_ids: Vec<String>,
    pub max_num_results: u32,
}

/// A single-turn assistant configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub temperature: f32,
    pub file_search: Option<FileSearch>,
}

/// Executes one conversational turn and returns the final text output.
#[async_trait]
pub trait ChatRuntime: Send + Sync {
    async fn run(
        &self,
        assistant: &AssistantSpec,
        history: &[TranscriptItem],
        prompt: &str,
    ) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_num_results: u32,
    pub history_limit: usize,
}

impl From<&OpenAIConfig> for ChatSettings {
    fn from(config: &OpenAIConfig) -> Self {
        Self {
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_num_results: config.max_num_results,
            history_limit: config.history_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub session_id: String,
    pub client_message_id: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
            client_message_id: None,
        }
    }

    pub fn with_client_message_id(mut self, id: Option<String>) -> Self {
        self.client_message_id = id.filter(|s| !s.is_empty());
        self
    }
}

pub struct ChatResponder {
    registry: Arc<dyn IndexRegistry>,
    sessions: Arc<dyn SessionStore>,
    transcripts: Arc<dyn TranscriptStore>,
    runtime: Arc<dyn ChatRuntime>,
    settings: ChatSettings,
}

impl ChatResponder {
    pub fn new(
        registry: Arc<dyn IndexRegistry>,
        sessions: Arc<dyn SessionStore>,
        transcripts: Arc<dyn TranscriptStore>,
        runtime: Arc<dyn ChatRuntime>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            registry,
            sessions,
            transcripts,
            runtime,
            settings,
        }
    }

    pub fn assistant_for(&self, vector_store_ids: Vec<String>) -> AssistantSpec {
        let file_search = (!vector_store_ids.is_empty()).then(|| FileSearch {
            vector_store_ids,
            max_num_results: self.settings.max_num_results,
        });
        AssistantSpec {
            name: ASSISTANT_NAME.to_string(),
            instructions: ASSISTANT_INSTRUCTIONS.to_string(),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            file_search,
        }
    }

    pub async fn respond(&self, user_id: &str, request: &ChatRequest) -> Envelope<String> {
        tracing::info!(
            user_id,
            session_id = %request.session_id,
            prompt_chars = request.prompt.len(),
            "Processing chat"
        );
        match self.turn(user_id, request).await {
            Ok(reply) => Envelope::ok("Agent run completed successfully", reply)
                .with_session(request.session_id.clone()),
            Err(e) => {
                tracing::error!(
                    user_id,
                    session_id = %request.session_id,
                    error = %format!("{:#}", e),
                    "Error processing chat"
                );
                Envelope::failure(format!("Error processing chat: {:#}", e))
            }
        }
    }

    async fn turn(&self, user_id: &str, request: &ChatRequest) -> Result<String> {
        let vector_store_ids = self
            .registry
            .get(user_id)
            .await
            .context("Failed to read index registry")?
            .map(|record| record.vector_store_ids)
            .unwrap_or_default();
        let assistant = self.assistant_for(vector_store_ids);

        let touch = self
            .sessions
            .touch_session(&request.session_id, user_id)
            .await?;
        if touch == SessionTouch::Created {
            tracing::info!(user_id, session_id = %request.session_id, "Session created");
        }

        if let Some(ref client_id) = request.client_message_id {
            if let Some(reply) = self
                .transcripts
                .reply_for(&request.session_id, client_id)
                .await?
            {
                tracing::info!(
                    session_id = %request.session_id,
                    client_message_id = %client_id,
                    "Returning stored reply for repeated message"
                );
                return Ok(reply);
            }
        }

        let history = self
            .transcripts
            .recent(&request.session_id, self.settings.history_limit)
            .await?;
        let reply = self
            .runtime
            .run(&assistant, &history, &request.prompt)
            .await?;

        self.transcripts
            .append_turn(
                &request.session_id,
                &TranscriptItem::user(&request.prompt, request.client_message_id.clone()),
                &TranscriptItem::assistant(&reply),
            )
            .await?;

        Ok(reply)
    }
}

/// [`ChatRuntime`] backed by the OpenAI Responses API, with the hosted
/// `file_search` tool for retrieval.
pub struct OpenAIResponses {
    client: OpenAIClient,
}

impl OpenAIResponses {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatRuntime for OpenAIResponses {
    async fn run(
        &self,
        assistant: &AssistantSpec,
        history: &[TranscriptItem],
        prompt: &str,
    ) -> Result<String> {
        let body = responses_request(assistant, history, prompt);
        let json = self.client.post_json("responses", &body).await?;
        Ok(output_text(&json))
    }
}

pub fn responses_request(assistant: &AssistantSpec, history: &[TranscriptItem], prompt: &str) -> Value {
    let mut input: Vec<Value> = history
        .iter()
        .map(|item| json!({ "role": item.role.as_str(), "content": item.content }))
        .collect();
    input.push(json!({ "role": "user", "content": prompt }));

    let mut body = json!({
        "model": assistant.model,
        "instructions": assistant.instructions,
        "temperature": assistant.temperature,
        "input": input,
    });
    if let Some(ref search) = assistant.file_search {
        body["tools"] = json!([{
            "type": "file_search",
            "vector_store_ids": search.vector_store_ids,
            "max_num_results": search.max_num_results,
        }]);
    }
    body
}

/// Concatenated `output_text` parts of every message in a response.
/// Empty when the model produced no text.
pub fn output_text(response: &Value) -> String {
    response
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}
