//! Nest camera frontend client.
//!
//! - `manifest`: DASH event manifests -> `EventRecord`s
//! - `fetcher`: windowed event listing and clip downloads
//! - `transport`: bearer-authenticated HTTP GET seam

pub mod fetcher;
pub mod manifest;
pub mod transport;

pub use fetcher::{EventFetcher, FetchScopes, FetchWindow, DEFAULT_API_BASE};
pub use manifest::parse_manifest;
pub use transport::{HttpTransport, TransportError, UreqTransport};
