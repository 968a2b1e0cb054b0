//! Engage Flux - Per-session engagement signal engine for live video streams
//!
//! Engage Flux turns per-frame vision classifier outputs into a behavioral
//! engagement signal through a deterministic pipeline: facial geometry →
//! temporal smoothing → blink/yawn event detection → frame aggregation →
//! session report.
//!
//! ## Modules
//!
//! - **Engine**: `EngagementEngine` starts sessions, analyzes frames and ends
//!   sessions with a report; safe to share across request threads
//! - **Adapters**: capability traits for the face, landmark and object
//!   classifiers the engine consumes

pub mod adapters;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod smoother;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::{ClassifierError, EngineError};
pub use pipeline::{parse_session_id, Collaborators, EngagementEngine};
pub use store::SessionStore;
pub use types::{
    EngagementLabel, FaceLandmarks, FaceRegion, Frame, FrameInput, FrameObservation, FrameResult,
    Point, SessionReport,
};

/// Engine version embedded in reports and CLI output
pub const ENGAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for emitted payloads
pub const PRODUCER_NAME: &str = "engage-flux";
