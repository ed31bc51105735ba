use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_scope")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_scope")]
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Prefix joined with an object key to form its public download URL.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_upload_bucket")]
    pub upload_bucket: String,
    /// Cache lifetime in seconds attached to stored objects.
    #[serde(default = "default_upload_cache_control")]
    pub upload_cache_control: u32,
    #[serde(default = "default_upload_chunk_bytes")]
    pub upload_chunk_bytes: usize,
    #[serde(default = "default_accepted_media_types")]
    pub accepted_media_types: Vec<String>,
    #[serde(default = "default_ingest_max_file_bytes")]
    pub ingest_max_file_bytes: usize,
    #[serde(default = "default_indexing_base_url")]
    pub indexing_base_url: String,
    #[serde(default = "default_indexing_request_timeout_ms")]
    pub indexing_request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_scope() -> String {
    "studybuddy".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:3000/api/v1/files/".to_string()
}

fn default_upload_bucket() -> String {
    "uploads".to_string()
}

fn default_upload_cache_control() -> u32 {
    3600
}

fn default_upload_chunk_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_accepted_media_types() -> Vec<String> {
    vec!["application/pdf".to_string()]
}

fn default_ingest_max_file_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_indexing_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_indexing_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_poll_max_attempts() -> u32 {
    30
}

fn default_poll_timeout_ms() -> u64 {
    300_000
}

fn default_progress_tick_ms() -> u64 {
    200
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_credential(),
            surrealdb_password: default_surrealdb_credential(),
            surrealdb_namespace: default_surrealdb_scope(),
            surrealdb_database: default_surrealdb_scope(),
            data_dir: default_data_dir(),
            storage: default_storage_kind(),
            http_port: default_http_port(),
            public_base_url: default_public_base_url(),
            upload_bucket: default_upload_bucket(),
            upload_cache_control: default_upload_cache_control(),
            upload_chunk_bytes: default_upload_chunk_bytes(),
            accepted_media_types: default_accepted_media_types(),
            ingest_max_file_bytes: default_ingest_max_file_bytes(),
            indexing_base_url: default_indexing_base_url(),
            indexing_request_timeout_ms: default_indexing_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            poll_timeout_ms: default_poll_timeout_ms(),
            progress_tick_ms: default_progress_tick_ms(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("accepted_media_types"),
        )
        .build()?;

    config.try_deserialize()
}
