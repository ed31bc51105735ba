#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod error;
pub mod indexing;
pub mod pipeline;
pub mod poller;
pub mod progress;
pub mod retry;

pub use error::{ErrorKind, IngestionError};
pub use indexing::IndexingClient;
pub use pipeline::{
    ContentStoreClient, IndexingTrigger, IngestionConfig, IngestionOrchestrator,
    IngestionOutcome, IngestionTuning, Locator, MetadataRecorder, PipelineServices,
    ReadinessCheck, SessionState, SessionTicket, SourceFile, SourceInfo, UploadSession,
};
