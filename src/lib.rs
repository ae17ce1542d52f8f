//! Prometheus exporter for OpenConfig streaming telemetry.
//!
//! The exporter subscribes to devices speaking the OpenConfig telemetry
//! gRPC service, keeps each device's latest state in a hierarchical tree,
//! and renders the trees as Prometheus metrics on scrape.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Device (gRPC)   │────>│  StreamSession  │────>│  Tree (device)  │
//! │ TelemetrySubscr.│     │ (batch routing) │     │  (live state)   │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │ scrape
//!                                                 ┌────────▼────────┐
//!                                                 │    Collector    │
//!                                                 │  + HTTP server  │
//!                                                 └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! openconfig-telemetry-exporter --config exporter.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::Config`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod id_cache;
pub mod metric;
pub mod path;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod tree;

/// Generated OpenConfig telemetry gRPC bindings.
pub mod proto {
    tonic::include_proto!("telemetry");
}

pub use collector::Collector;
pub use config::Config;
pub use http::HttpServer;
pub use session::StreamSession;
pub use transport::{GrpcTransport, TelemetryStream, Transport};
pub use tree::Tree;
