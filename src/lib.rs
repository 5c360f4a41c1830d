// Kagami Image Handler Library
//
// Maps inbound image requests (opaque base64, Thumbor-style paths, custom
// rewrites and OSS-style action pipelines) onto an edit set and renders it.

pub mod config;
pub mod edits;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
pub mod handler;
pub mod logging;
pub mod processor;
pub mod request;
pub mod security;
pub mod store;
pub mod thumbor;
pub mod vision;
