//! Per-device incremental sync.
//!
//! One device cycle walks `Idle -> Listing -> Filtering -> Downloading(i) -> Done`.
//! A failure while listing aborts only that device; a failure for one clip
//! aborts only that clip. The clip archive on disk is the sole dedup ledger, so
//! re-running a cycle immediately downloads nothing new. A stop request is
//! honored between clips, never during a write.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::TokenCache;
use crate::device::Device;
use crate::error::Result;
use crate::event::EventRecord;
use crate::layout::ClipLayout;
use crate::nest::EventFetcher;

/// 3 hours of free-tier event history plus 1 hour of slack.
pub const DEFAULT_FETCH_RANGE_MINUTES: i64 = 240;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Listing,
    Filtering,
    Downloading(usize),
    Done,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    /// Clips that failed to download or persist; counted as neither of the above.
    pub failed: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: &SyncReport) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
pub struct DeviceOutcome {
    pub device: Device,
    pub result: Result<SyncReport>,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<DeviceOutcome>,
}

impl CycleReport {
    pub fn totals(&self) -> SyncReport {
        let mut totals = SyncReport::default();
        for outcome in &self.outcomes {
            if let Ok(report) = &outcome.result {
                totals.absorb(report);
            }
        }
        totals
    }

    pub fn failed_devices(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

pub struct SyncEngine {
    layout: ClipLayout,
    fetch_range_minutes: i64,
}

impl SyncEngine {
    pub fn new(layout: ClipLayout, fetch_range_minutes: i64) -> Self {
        Self {
            layout,
            fetch_range_minutes,
        }
    }

    pub fn layout(&self) -> &ClipLayout {
        &self.layout
    }

    pub fn fetch_range_minutes(&self) -> i64 {
        self.fetch_range_minutes
    }

    /// Syncs every device in order. Device failures are logged and recorded,
    /// never propagated.
    pub fn run_cycle(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        devices: &[Device],
    ) -> CycleReport {
        self.run_cycle_until(fetcher, tokens, devices, &AtomicBool::new(false))
    }

    /// Like `run_cycle`, but stops before the next device or clip once `stop`
    /// is set. Clips already written stay counted.
    pub fn run_cycle_until(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        devices: &[Device],
        stop: &AtomicBool,
    ) -> CycleReport {
        let mut cycle = CycleReport::default();
        for device in devices {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop requested, ending cycle before {}", device.name);
                break;
            }
            let result = self.sync_device_until(fetcher, tokens, device, Utc::now(), stop);
            cycle.outcomes.push(DeviceOutcome {
                device: device.clone(),
                result,
            });
        }
        cycle
    }

    pub fn sync_device(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        device: &Device,
    ) -> Result<SyncReport> {
        self.sync_device_at(fetcher, tokens, device, Utc::now())
    }

    /// Runs one device cycle with the fetch window ending at `now`.
    pub fn sync_device_at(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        self.sync_device_until(fetcher, tokens, device, now, &AtomicBool::new(false))
    }

    fn sync_device_until(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        device: &Device,
        now: DateTime<Utc>,
        stop: &AtomicBool,
    ) -> Result<SyncReport> {
        let mut state = SyncState::Idle;
        let result = self.drive(&mut state, fetcher, tokens, device, now, stop);
        if let Err(e) = &result {
            log::error!(
                "sync of {} ({}) aborted while {:?}: [{}] {}",
                device.name,
                device.id,
                state,
                e.kind(),
                e
            );
        }
        result
    }

    fn drive(
        &self,
        state: &mut SyncState,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        device: &Device,
        now: DateTime<Utc>,
        stop: &AtomicBool,
    ) -> Result<SyncReport> {
        *state = SyncState::Listing;
        log::info!("syncing {} ({})", device.name, device.id);
        let events = fetcher.list_events(tokens, device, now, self.fetch_range_minutes)?;
        log::info!("found {} events for {}", events.len(), device.name);

        *state = SyncState::Filtering;
        let (to_fetch, skipped) = self.partition(events);
        let mut report = SyncReport {
            skipped,
            ..SyncReport::default()
        };

        for (idx, (event, duplicates)) in to_fetch.iter().enumerate() {
            if stop.load(Ordering::SeqCst) {
                log::info!(
                    "stop requested, leaving {} clips of {} for the next cycle",
                    to_fetch.len() - idx,
                    device.name
                );
                break;
            }
            *state = SyncState::Downloading(idx);
            match self.fetch_one(fetcher, tokens, device, event) {
                Ok(path) => {
                    report.downloaded += 1;
                    report.skipped += duplicates;
                    log::info!("downloaded {}", path.display());
                }
                Err(e) => {
                    report.failed += 1 + duplicates;
                    log::error!(
                        "download failed for {} ({}) event {}: [{}] {}",
                        device.name,
                        device.id,
                        event.event_id(),
                        e.kind(),
                        e
                    );
                }
            }
        }

        *state = SyncState::Done;
        log::info!(
            "{}: downloaded {}, skipped {}, failed {}",
            device.name,
            report.downloaded,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Splits events into those still to fetch (in received order) and a count
    /// of those already archived. Later events mapping to a path claimed earlier
    /// in the same listing are the same artifact: each fetched event carries
    /// the number of such duplicates, which share its outcome (skipped when it
    /// lands, failed when it does not).
    fn partition(&self, events: Vec<EventRecord>) -> (Vec<(EventRecord, usize)>, usize) {
        let mut claimed: HashMap<PathBuf, usize> = HashMap::new();
        let mut to_fetch: Vec<(EventRecord, usize)> = Vec::new();
        let mut skipped = 0;
        for event in events {
            let path = self.layout.clip_path(&event);
            if let Some(&idx) = claimed.get(&path) {
                to_fetch[idx].1 += 1;
            } else if path.exists() {
                skipped += 1;
            } else {
                claimed.insert(path, to_fetch.len());
                to_fetch.push((event, 0));
            }
        }
        (to_fetch, skipped)
    }

    fn fetch_one(
        &self,
        fetcher: &mut EventFetcher,
        tokens: &mut TokenCache,
        device: &Device,
        event: &EventRecord,
    ) -> Result<PathBuf> {
        let clip = fetcher.download_clip(tokens, device, event)?;
        self.layout.persist(event, &clip)
    }
}
