//! Staged update lifecycle.
//!
//! # Overview
//!
//! ```text
//!   stage(files, source)          resolve / redeem(handle)
//!          │                              │
//!          ▼                              ▼
//!   <root>/temp/<handle>/...  ◄──  HandleRegistry (.handles.json)
//!          ▲                              ▲
//!          └──────── sweep() ─────────────┘
//!            reclaims both once expired
//! ```
//!
//! Each handle owns exactly one staging directory and one registration.
//! Expiry is purely time based: a handle is live until `expires_at`, after
//! which lookups report it missing and the sweep deletes it.

mod clock;
mod registry;
mod stager;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::{HandleRegistry, ResourceRef, StagedUpdate, REGISTRY_FILE};
pub use stager::{SweepReport, UpdateStager};
pub use sweeper::StagingSweeper;
