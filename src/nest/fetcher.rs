use chrono::{DateTime, Duration, Utc};
use url::Url;

use super::manifest::parse_manifest;
use super::transport::{HttpTransport, TransportError};
use crate::auth::{TokenCache, NEST_SCOPE};
use crate::device::Device;
use crate::error::{Result, SyncError};
use crate::event::EventRecord;

pub const DEFAULT_API_BASE: &str = "https://nest-camera-frontend.googleapis.com";
const NAMESPACE: &str = "nest-phoenix-prod";
const EVENTS_ROOT: &str = "dashmanifest";
const CLIP_ROOT: &str = "mp4clip";
const EVENT_TYPES_QUERY: &str = "4";
const MANIFEST_VARIANT: &str = "2";

/// Access scopes used for each class of call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchScopes {
    pub events: String,
    pub download: String,
}

impl Default for FetchScopes {
    fn default() -> Self {
        Self {
            events: NEST_SCOPE.to_string(),
            download: NEST_SCOPE.to_string(),
        }
    }
}

/// `[start, end]` bounds of one listing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Fails when `minutes` does not fit a representable window.
    pub fn ending_at(end: DateTime<Utc>, minutes: i64) -> Result<Self> {
        let start = Duration::try_minutes(minutes)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                SyncError::Fetch(format!("fetch window of {} minutes is out of range", minutes))
            })?;
        Ok(Self { start, end })
    }

    /// UTC bounds at whole-second precision; sub-second parts are truncated.
    pub fn query_bounds(&self) -> (String, String) {
        (format_query_time(self.start), format_query_time(self.end))
    }
}

fn format_query_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct EventFetcher {
    api_base: Url,
    transport: Box<dyn HttpTransport>,
    scopes: FetchScopes,
}

impl EventFetcher {
    pub fn new(api_base: Url, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            api_base,
            transport,
            scopes: FetchScopes::default(),
        }
    }

    pub fn with_scopes(mut self, scopes: FetchScopes) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn scopes(&self) -> &FetchScopes {
        &self.scopes
    }

    pub fn list_events(
        &mut self,
        tokens: &mut TokenCache,
        device: &Device,
        window_end: DateTime<Utc>,
        window_minutes: i64,
    ) -> Result<Vec<EventRecord>> {
        let window = FetchWindow::ending_at(window_end, window_minutes)?;
        let (start, end) = window.query_bounds();
        let url = self.device_url(EVENTS_ROOT, &device.id)?;
        let query = [
            ("start_time", start),
            ("end_time", end),
            ("types", EVENT_TYPES_QUERY.to_string()),
            ("variant", MANIFEST_VARIANT.to_string()),
        ];
        let scope = self.scopes.events.clone();
        let body = self.get(tokens, &scope, &url, &query)?;
        parse_manifest(&body, &device.id, &device.name)
    }

    /// Downloads one clip. Always asks the cache for the download scope, so a
    /// cached listing token for another scope is never reused.
    pub fn download_clip(
        &mut self,
        tokens: &mut TokenCache,
        device: &Device,
        event: &EventRecord,
    ) -> Result<Vec<u8>> {
        let url = self.device_url(CLIP_ROOT, &device.id)?;
        let query = [
            ("start_time", event.start_time().timestamp_millis().to_string()),
            ("end_time", event.end_time().timestamp_millis().to_string()),
        ];
        let scope = self.scopes.download.clone();
        let clip = self.get(tokens, &scope, &url, &query)?;
        if clip.is_empty() {
            return Err(SyncError::Fetch(format!(
                "empty clip for event {}",
                event.event_id()
            )));
        }
        Ok(clip)
    }

    fn device_url(&self, root: &str, device_id: &str) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SyncError::Fetch(format!("invalid api base '{}'", self.api_base)))?;
            segments
                .pop_if_empty()
                .extend([root, "namespace", NAMESPACE, "device"])
                .push(device_id);
        }
        Ok(url)
    }

    fn get(
        &mut self,
        tokens: &mut TokenCache,
        scope: &str,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let token = tokens.access_token(scope)?;
        match self.transport.get(url, &token, query) {
            Ok(body) => Ok(body),
            Err(TransportError::Status(401)) => {
                tokens.invalidate();
                Err(SyncError::Fetch(format!(
                    "{} rejected the access token (HTTP 401)",
                    url.path()
                )))
            }
            Err(e) => Err(SyncError::Fetch(format!("GET {} failed: {}", url.path(), e))),
        }
    }
}
