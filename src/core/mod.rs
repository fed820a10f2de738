pub mod chat_stream;
pub mod config;
pub mod error;
pub mod event_parser;
pub mod frame_decoder;
pub mod message;
pub mod orchestrator;
pub mod session;
pub mod transcript;
