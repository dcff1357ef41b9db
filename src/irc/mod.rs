pub mod client;
pub mod event;

pub use client::{ChatSettings, run_chat_ingest};
