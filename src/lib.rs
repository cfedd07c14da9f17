//! onebox — mail ingestion, classification, indexing, and reply
//! suggestion.
//!
//! Two independent pipelines:
//! - ingestion: IMAP sync → normalize → classify → index → notify
//! - suggestion: knowledge-base lookup → generative oracle → replies

pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod kb;
pub mod llm;
pub mod mail;
pub mod model;
pub mod notify;
pub mod store;
pub mod suggest;
pub mod sync;
pub mod vector;
