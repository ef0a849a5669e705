//! # vigil-server
//!
//! The automation server of the
//! [vigil](https://crates.io/crates/vigil-automation) analytics runtime:
//! concurrent video sources, a per-source pipeline of plug-in steps,
//! independent scripting threads and a shared host variable store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   AutomationServer                       │
//! │                                                          │
//! │  added ─▶ running ─▶ finalizing ─▶ (reaped by janitor)   │
//! │                                                          │
//! │  ┌──────────────── per video source ─────────────────┐   │
//! │  │ producer thread          consumer thread          │   │
//! │  │ (inside the plug-in)     (owned by the runtime)   │   │
//! │  │                                                   │   │
//! │  │ on_new_image ──▶ slot 0 ──▶ step 1 ─▶ … ─▶ step N │   │
//! │  │      │                        │                   │   │
//! │  │  drop / stall            reuse ring               │   │
//! │  └───────────────────────────────┬───────────────────┘   │
//! │                                  ▼                       │
//! │                              listeners                   │
//! │                                                          │
//! │  scripting threads ──▶ shared variable store ◀── steps   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames flow through a per-source buffer reuse ring: repeated frames of
//! stable geometry allocate nothing. Backpressure toward the producer is a
//! policy per source - stall it, or drop frames while the consumer is busy.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_server::{AutomationServer, ServerConfig};
//!
//! let server = AutomationServer::new(ServerConfig::default())?
//!     .with_registry(registry);
//! server.start()?;
//!
//! let id = server.add_video_source(descriptor, source);
//! server.set_processing_graph(id, graph)?;
//! server.start_video_source(id)?;
//! server.add_video_source_listener(id, listener, true)?;
//! // ...
//! server.signal_to_stop();
//! server.wait_for_stop();
//! ```

pub mod config;
pub mod graph;
pub mod server;
pub mod stats;
pub mod sync;
pub mod variables;

mod hosts;
mod pipeline;
mod script_thread;
mod source;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use graph::{ProcessingGraph, ProcessingStep};
pub use server::AutomationServer;
pub use source::VideoSourceListener;
pub use stats::{FrameInfo, PERFORMANCE_HISTORY_LENGTH};
pub use sync::ManualResetEvent;
pub use variables::{VariableStore, VariablesListener};

/// The error kind shared across the runtime (re-exported from
/// [`vigil_plugin`])
pub use vigil_plugin::PluginError as AutomationError;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_server_lifecycle_is_idempotent() {
        let server = AutomationServer::new(ServerConfig::default()).unwrap();
        assert!(!server.is_running());

        server.start().unwrap();
        assert!(server.is_running());
        server.start().unwrap(); // second start is a no-op

        server.signal_to_stop();
        server.wait_for_stop();
        assert!(!server.is_running());
        assert_eq!(server.video_source_count(), (0, 0, 0));
    }
}
