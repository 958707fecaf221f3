//! Outer supervisory loop: discover, sync every device, sleep, repeat.
//!
//! The loop never exits on a device or clip failure. An unexpected cycle
//! error sleeps a fixed backoff and retries the whole cycle. All sleeps are
//! sliced so a shutdown request is honored promptly. The engine checks the
//! same flag between devices and between clips, never during a write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{GpsOAuthExchange, TokenCache};
use crate::config::SyncConfig;
use crate::device::{Device, DeviceCatalog, FoyerHomeGraph};
use crate::error::Result;
use crate::layout::ClipLayout;
use crate::nest::{EventFetcher, UreqTransport};
use crate::sync::{CycleReport, SyncEngine};

pub const ERROR_BACKOFF: Duration = Duration::from_secs(60);
const SLEEP_SLICE: Duration = Duration::from_millis(250);

pub struct Scheduler {
    engine: SyncEngine,
    fetcher: EventFetcher,
    tokens: TokenCache,
    catalog: DeviceCatalog,
    devices: Vec<Device>,
    refresh_interval: Duration,
    error_backoff: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        engine: SyncEngine,
        fetcher: EventFetcher,
        tokens: TokenCache,
        catalog: DeviceCatalog,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            engine,
            fetcher,
            tokens,
            catalog,
            devices: Vec::new(),
            refresh_interval,
            error_backoff: ERROR_BACKOFF,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wires the production identity provider, home graph and camera frontend.
    pub fn from_config(cfg: &SyncConfig) -> Self {
        let tokens = TokenCache::new(
            cfg.google_username.clone(),
            cfg.master_token.clone(),
            Box::new(GpsOAuthExchange::new(cfg.request_timeout)),
        );
        let fetcher = EventFetcher::new(
            cfg.api_base.clone(),
            Box::new(UreqTransport::new(cfg.request_timeout)),
        );
        let catalog = match &cfg.devices {
            Some(devices) => DeviceCatalog::fixed(devices.clone()),
            None => DeviceCatalog::from_home_graph(Box::new(FoyerHomeGraph::new(
                cfg.request_timeout,
            ))),
        };
        let engine = SyncEngine::new(
            ClipLayout::new(cfg.base_path.clone(), cfg.local_timezone),
            cfg.fetch_range_minutes,
        );
        Self::new(engine, fetcher, tokens, catalog, cfg.refresh_interval)
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Forgets the discovered devices so the next cycle discovers again.
    pub fn rediscover(&mut self) {
        self.devices.clear();
    }

    /// One full cycle. Discovery runs only while no devices are known; a
    /// discovery failure yields an empty cycle, not an error.
    pub fn run_once(&mut self) -> Result<CycleReport> {
        std::fs::create_dir_all(self.engine.layout().base_path())?;

        if self.devices.is_empty() {
            match self.catalog.list_camera_devices(&mut self.tokens) {
                Ok(devices) if devices.is_empty() => {
                    log::warn!("no nest camera devices found");
                }
                Ok(devices) => {
                    log::info!("discovered {} camera devices", devices.len());
                    self.devices = devices;
                }
                Err(e) => {
                    log::error!("device discovery failed: [{}] {}", e.kind(), e);
                    return Ok(CycleReport::default());
                }
            }
        }

        let report = self.engine.run_cycle_until(
            &mut self.fetcher,
            &mut self.tokens,
            &self.devices,
            &self.shutdown,
        );
        let totals = report.totals();
        log::info!(
            "cycle complete: {} devices ({} failed), downloaded {}, skipped {}, failed {}",
            report.outcomes.len(),
            report.failed_devices(),
            totals.downloaded,
            totals.skipped,
            totals.failed
        );
        Ok(report)
    }

    /// Runs until the shutdown flag is raised.
    pub fn run(&mut self) {
        log::info!("starting sync loop");
        while !self.shutdown.load(Ordering::SeqCst) {
            log::info!("checking for new clips...");
            let wait = match self.run_once() {
                Ok(_) => {
                    log::info!(
                        "waiting {} minutes until next check...",
                        self.refresh_interval.as_secs() / 60
                    );
                    self.refresh_interval
                }
                Err(e) => {
                    log::error!("error in sync loop: [{}] {}", e.kind(), e);
                    log::info!(
                        "waiting {} seconds before retrying...",
                        self.error_backoff.as_secs()
                    );
                    self.error_backoff
                }
            };
            self.sleep_interruptibly(wait);
        }
        log::info!("sync loop stopped");
    }

    fn sleep_interruptibly(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
