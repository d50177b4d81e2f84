//! Relapse Risk - On-device relapse-risk estimation and intervention triggering
//!
//! Estimates how likely a user is to experience an urge right now, explains
//! why, and decides whether an intervention should be offered automatically.
//! Everything is computed from a local event log through a read-only store
//! contract:
//!
//! onboarding profile → hourly baseline curve → peak window / safe harbor
//! screen-on frequency + baseline → live risk → intervention gate
//! feature vector → logistic prediction with explanation
//!
//! ## Modules
//!
//! - **Estimators**: `profile`, `peak`, `live`, `harbor`, `predictor`
//! - **Decisions**: `gate`, `recommend`
//! - **Storage**: `store` (in-memory event log, SQLite behind the `sqlite` feature)
//! - **Facade**: `engine` ties one store, config and clock together

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod harbor;
pub mod live;
pub mod peak;
pub mod predictor;
pub mod profile;
pub mod recommend;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{RiskEngine, RiskReport};
pub use error::RiskError;
pub use store::{EventLog, EventStore, MemoryStore};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

pub use types::{
    HourlyRiskProfile, OnboardingProfile, PeakWindow, PredictionResult, Recommendation,
    RiskLevel, SafeHarbor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
