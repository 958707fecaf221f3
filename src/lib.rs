//! Nest camera clip sync
//!
//! Mirrors motion/person event clips from Google Nest cameras into a local
//! directory tree, one file per event, grouped by device and local date.
//!
//! # Flow
//!
//! 1. `auth::TokenCache` trades a long-lived master credential for a session
//!    token, then for scoped access tokens, caching both tiers.
//! 2. `device::DeviceCatalog` lists the Nest cameras in the user's home graph.
//! 3. `nest::EventFetcher` lists each camera's recent events (a DASH manifest)
//!    and downloads individual clips.
//! 4. `sync::SyncEngine` skips events already on disk and persists the rest
//!    through `layout::ClipLayout`.
//! 5. `scheduler::Scheduler` repeats the cycle on a fixed interval.
//!
//! # Module Structure
//!
//! - `auth`: token tiers and the Google login exchange
//! - `config`: file + environment settings
//! - `device`: camera discovery
//! - `event`: `EventRecord` and ISO-8601 helpers
//! - `layout`: deterministic clip paths and atomic writes
//! - `nest`: camera frontend client (manifest parsing, listing, download)
//! - `sync`: per-device state machine and reports
//! - `scheduler`: the daemon loop

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod layout;
pub mod nest;
pub mod scheduler;
pub mod sync;

pub use auth::{AccessToken, MasterToken, TokenCache, TokenExchange};
pub use config::SyncConfig;
pub use device::{Device, DeviceCatalog, HomeGraphSource};
pub use error::{Result, SyncError};
pub use event::EventRecord;
pub use layout::ClipLayout;
pub use nest::{EventFetcher, FetchScopes, HttpTransport};
pub use scheduler::Scheduler;
pub use sync::{CycleReport, SyncEngine, SyncReport};
