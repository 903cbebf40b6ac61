pub mod advisor;
pub mod backoff;
pub mod cache;
pub mod gateway;
pub mod mock;
pub mod ollama;
pub mod oracle_model;
