//! Hand-written fakes for every remote collaborator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;

use chat_with_it::blob::MemoryBlobStore;
use chat_with_it::chat::{AssistantSpec, ChatRuntime};
use chat_with_it::config::Config;
use chat_with_it::extract::{DocumentProcessor, Page, ProcessedDocument, TextBlock, VisionModel};
use chat_with_it::models::TranscriptItem;
use chat_with_it::services::{Remotes, Repositories, Services};
use chat_with_it::store::InMemoryStore;
use chat_with_it::vector_store::{AttachmentState, AttachmentStatus, IndexService};

pub const BUCKET: &str = "docs";

/// Two pages, three blocks; the first block reads as a heading.
pub fn report_document() -> ProcessedDocument {
    ProcessedDocument {
        title: None,
        pages: vec![
            Page {
                blocks: vec![
                    TextBlock {
                        text: "Annual Report".to_string(),
                        confidence: 0.98,
                    },
                    TextBlock {
                        text: "Revenue grew 12% year over year.".to_string(),
                        confidence: 0.71,
                    },
                ],
            },
            Page {
                blocks: vec![TextBlock {
                    text: "Headcount remained flat.".to_string(),
                    confidence: 0.64,
                }],
            },
        ],
    }
}

pub const REPORT_MARKDOWN: &str = "## Page 1\n\n### Annual Report\n\nRevenue grew 12% year over year.\n\n## Page 2\n\nHeadcount remained flat.\n";

pub struct FakeDocuments {
    pub document: ProcessedDocument,
    pub calls: Mutex<u32>,
}

impl FakeDocuments {
    pub fn new(document: ProcessedDocument) -> Self {
        Self {
            document,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DocumentProcessor for FakeDocuments {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    async fn process(&self, _content: Bytes, mime_type: &str) -> Result<ProcessedDocument> {
        assert_eq!(mime_type, "application/pdf");
        *self.calls.lock().unwrap() += 1;
        Ok(self.document.clone())
    }
}

pub struct FakeVision {
    pub markdown: Option<String>,
}

#[async_trait]
impl VisionModel for FakeVision {
    fn model_name(&self) -> &str {
        "fake-vision"
    }

    async fn describe(&self, _image: Bytes, _mime_type: &str) -> Result<Option<String>> {
        Ok(self.markdown.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub content: Bytes,
}

/// Vector-index service that replays a status script per attached file.
pub struct FakeIndex {
    script: Vec<AttachmentStatus>,
    pending: Mutex<VecDeque<AttachmentStatus>>,
    pub uploads: Mutex<Vec<Upload>>,
    pub created: Mutex<Vec<String>>,
    pub attached: Mutex<Vec<(String, String)>>,
    pub calls: Mutex<u32>,
    next_store: Mutex<u32>,
}

impl FakeIndex {
    /// Completes after `k` in-progress polls.
    pub fn completing_after(k: usize) -> Self {
        let mut script = vec![AttachmentStatus::in_progress(); k];
        script.push(AttachmentStatus::completed());
        Self::with_script(script)
    }

    pub fn never_completing() -> Self {
        Self::with_script(vec![AttachmentStatus::in_progress()])
    }

    pub fn failing(detail: &str) -> Self {
        Self::with_script(vec![AttachmentStatus {
            state: AttachmentState::Failed,
            last_error: Some(detail.to_string()),
        }])
    }

    pub fn with_script(script: Vec<AttachmentStatus>) -> Self {
        Self {
            script,
            pending: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
            next_store: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    fn count(&self) {
        *self.calls.lock().unwrap() += 1;
    }
}

#[async_trait]
impl IndexService for FakeIndex {
    async fn upload_file(&self, file_name: &str, mime_type: &str, content: Bytes) -> Result<String> {
        self.count();
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(Upload {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            content,
        });
        Ok(format!("file-{}", uploads.len()))
    }

    async fn create_vector_store(&self, name: &str, _expires_after_days: u32) -> Result<String> {
        self.count();
        self.created.lock().unwrap().push(name.to_string());
        let mut next = self.next_store.lock().unwrap();
        *next += 1;
        Ok(format!("vs-{}", next))
    }

    async fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        self.count();
        self.attached
            .lock()
            .unwrap()
            .push((vector_store_id.to_string(), file_id.to_string()));
        *self.pending.lock().unwrap() = self.script.iter().cloned().collect();
        Ok(())
    }

    async fn attachment_status(&self, _vector_store_id: &str, _file_id: &str) -> Result<AttachmentStatus> {
        self.count();
        let mut pending = self.pending.lock().unwrap();
        match pending.len() {
            0 => bail!("status requested before attach"),
            1 => Ok(pending[0].clone()),
            _ => Ok(pending.pop_front().unwrap()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCall {
    pub assistant: AssistantSpec,
    pub history: Vec<TranscriptItem>,
    pub prompt: String,
}

/// Chat runtime that answers `Answer: <prompt>` and records each call.
#[derive(Default)]
pub struct FakeChat {
    pub calls: Mutex<Vec<ChatCall>>,
    pub fail: bool,
}

impl FakeChat {
    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatRuntime for FakeChat {
    async fn run(
        &self,
        assistant: &AssistantSpec,
        history: &[TranscriptItem],
        prompt: &str,
    ) -> Result<String> {
        if self.fail {
            bail!("model overloaded");
        }
        self.calls.lock().unwrap().push(ChatCall {
            assistant: assistant.clone(),
            history: history.to_vec(),
            prompt: prompt.to_string(),
        });
        Ok(format!("Answer: {}", prompt))
    }
}

/// A fully faked deployment backed by an in-memory store.
pub struct Harness {
    pub config: Config,
    pub blobs: Arc<MemoryBlobStore>,
    pub documents: Arc<FakeDocuments>,
    pub index: Arc<FakeIndex>,
    pub chat: Arc<FakeChat>,
    pub store: Arc<InMemoryStore>,
    pub services: Services,
}

pub struct HarnessBuilder {
    config: Config,
    index: FakeIndex,
    chat: FakeChat,
    vision: Option<String>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::with_db_path("unused.sqlite"),
            index: FakeIndex::completing_after(0),
            chat: FakeChat::default(),
            vision: Some("# Chart\n\nMonthly sales, rising.".to_string()),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn index(mut self, index: FakeIndex) -> Self {
        self.index = index;
        self
    }

    pub fn chat(mut self, chat: FakeChat) -> Self {
        self.chat = chat;
        self
    }

    pub fn build(self) -> Harness {
        let blobs = Arc::new(MemoryBlobStore::new());
        let documents = Arc::new(FakeDocuments::new(report_document()));
        let index = Arc::new(self.index);
        let chat = Arc::new(self.chat);
        let store = Arc::new(InMemoryStore::new());

        let remotes = Remotes {
            blobs: blobs.clone(),
            documents: documents.clone(),
            vision: Arc::new(FakeVision {
                markdown: self.vision,
            }),
            index: index.clone(),
            chat: chat.clone(),
        };
        let services = Services::assemble(&self.config, remotes, Repositories::shared(store.clone()))
            .expect("assemble services");

        Harness {
            config: self.config,
            blobs,
            documents,
            index,
            chat,
            store,
            services,
        }
    }
}

impl Harness {
    pub async fn put(&self, path: &str, data: &'static [u8]) {
        self.blobs.put(BUCKET, path, Bytes::from_static(data)).await;
    }
}
