//! Command-line front end for the tl;dr pipeline: configuration layering and
//! an OpenAI-compatible summarizer.

pub mod config;
pub mod events;
pub mod provider;

pub use config::{ConfigError, Overrides, ProviderConfig, ProviderKind, TldrConfig};
pub use events::stream_events;
pub use provider::{check_endpoint, OpenAiSummarizer};
