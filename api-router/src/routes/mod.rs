pub mod events;
pub mod files;
pub mod index_readiness;
pub mod ingest;
pub mod health;
pub mod uploads;
