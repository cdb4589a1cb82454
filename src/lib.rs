// PiVision - Multimodal chat session engine for locally hosted language models
// Library exports

// Core modules
pub mod backend;
pub mod chat;
pub mod config;
pub mod engine;
pub mod export;
pub mod session_log;
