pub mod client;
pub mod types;

pub use client::{GeminiLiveClient, LiveConfig, LiveEvent, connect};
