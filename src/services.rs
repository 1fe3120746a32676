//! Wiring: builds the orchestrator and the chat responder from configuration.
//!
//! [`Remotes`] groups every external collaborator and [`Repositories`] every
//! store the backend owns. [`Services::assemble`] takes both explicitly, so
//! tests can substitute fakes for any of them; [`Services::from_config`]
//! builds the production set.

use std::sync::Arc;

use anyhow::Result;

use crate::blob::{create_blob_store, BlobStore};
use crate::chat::{ChatResponder, ChatRuntime, ChatSettings, OpenAIResponses};
use crate::config::Config;
use crate::extract::vision::OpenAIVision;
use crate::extract::{create_document_processor, ContentExtractor, DocumentProcessor, VisionModel};
use crate::index_client::RemoteIndexClient;
use crate::openai::OpenAIClient;
use crate::pipeline::{Pipeline, UploadMode};
use crate::status::StatusRecorder;
use crate::store::{
    IndexRegistry, SessionStore, SqliteStore, StatusStore, TranscriptStore,
};
use crate::vector_store::{IndexService, OpenAIVectorStores};
use crate::{db, migrate};

#[derive(Clone)]
pub struct Repositories {
    pub registry: Arc<dyn IndexRegistry>,
    pub statuses: Arc<dyn StatusStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
}

impl Repositories {
    /// All four repositories served by one store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: IndexRegistry + StatusStore + SessionStore + TranscriptStore + 'static,
    {
        Self {
            registry: store.clone(),
            statuses: store.clone(),
            sessions: store.clone(),
            transcripts: store,
        }
    }

    pub async fn sqlite(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::shared(Arc::new(SqliteStore::new(pool))))
    }
}

#[derive(Clone)]
pub struct Remotes {
    pub blobs: Arc<dyn BlobStore>,
    pub documents: Arc<dyn DocumentProcessor>,
    pub vision: Arc<dyn VisionModel>,
    pub index: Arc<dyn IndexService>,
    pub chat: Arc<dyn ChatRuntime>,
}

impl Remotes {
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai = OpenAIClient::from_config(&config.openai)?;
        Ok(Self {
            blobs: create_blob_store(&config.storage)?,
            documents: create_document_processor(&config.extraction)?,
            vision: Arc::new(OpenAIVision::new(
                openai.clone(),
                config.openai.vision_model.clone(),
                config.openai.vision_max_tokens,
            )),
            index: Arc::new(OpenAIVectorStores::new(openai.clone())),
            chat: Arc::new(OpenAIResponses::new(openai)),
        })
    }
}

#[derive(Clone)]
pub struct Services {
    pub pipeline: Arc<Pipeline>,
    pub chat: Arc<ChatResponder>,
    pub repos: Repositories,
}

impl Services {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let repos = Repositories::sqlite(config).await?;
        let remotes = Remotes::from_config(config)?;
        Self::assemble(config, remotes, repos)
    }

    pub fn assemble(config: &Config, remotes: Remotes, repos: Repositories) -> Result<Self> {
        let extractor = Arc::new(ContentExtractor::new(
            remotes.documents,
            remotes.vision,
            config.extraction.heading_confidence,
        ));
        let index = RemoteIndexClient::from_config(remotes.index, &config.pipeline);
        let upload_mode: UploadMode = config.pipeline.upload_mode.parse()?;

        let pipeline = Pipeline::new(
            remotes.blobs,
            extractor,
            index,
            repos.registry.clone(),
            StatusRecorder::new(repos.statuses.clone()),
        )
        .with_upload_mode(upload_mode)
        .with_images(config.pipeline.accept_images);

        let chat = ChatResponder::new(
            repos.registry.clone(),
            repos.sessions.clone(),
            repos.transcripts.clone(),
            remotes.chat,
            ChatSettings::from(&config.openai),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            chat: Arc::new(chat),
            repos,
        })
    }
}
