//! Diagnostic events for pipeline runs
//!
//! Every chunk call, retry, merge level and terminal outcome is published
//! as a [`PipelineEvent`] on an [`EventBus`]. The pipeline also logs each of
//! them through `tracing`; the bus is for callers that want structured
//! progress (CLI `--events`, dashboards, tests).
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Pipeline   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::PipelineEvent;
