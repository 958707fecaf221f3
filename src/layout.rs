//! On-disk clip layout.
//!
//! Clips live at `{base}/{device}/{YYYY}/{MM}/{DD}/{YYYY-MM-DD_HH-MM-SS}_{s}s{ms}ms.mp4`,
//! with every date component taken from the event start in the configured local
//! timezone. Existence at that path is the only download ledger, so the shape
//! here is load-bearing for downstream tooling and for dedup.

use chrono::Datelike;
use chrono_tz::Tz;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::event::EventRecord;

const CLIP_EXTENSION: &str = "mp4";
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Clone, Debug)]
pub struct ClipLayout {
    base_path: PathBuf,
    timezone: Tz,
}

impl ClipLayout {
    pub fn new(base_path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            base_path: base_path.into(),
            timezone,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Directory and file name for an event. Only the device name, the start
    /// instant and the duration participate.
    pub fn directory_and_file_name(&self, event: &EventRecord) -> (PathBuf, String) {
        let local = event.start_time().with_timezone(&self.timezone);
        let directory = self
            .base_path
            .join(sanitize_device_name(event.device_name()))
            .join(format!("{}", local.year()))
            .join(format!("{:02}", local.month()))
            .join(format!("{:02}", local.day()));

        let total_ms = event.duration().num_milliseconds();
        let file_name = format!(
            "{}_{}s{:03}ms.{}",
            local.format("%Y-%m-%d_%H-%M-%S"),
            total_ms / 1000,
            total_ms % 1000,
            CLIP_EXTENSION
        );
        (directory, file_name)
    }

    pub fn clip_path(&self, event: &EventRecord) -> PathBuf {
        let (directory, file_name) = self.directory_and_file_name(event);
        directory.join(file_name)
    }

    pub fn is_archived(&self, event: &EventRecord) -> bool {
        self.clip_path(event).exists()
    }

    /// Writes a clip through a sibling `.part` file and renames it into place,
    /// so the final name only ever refers to a complete file.
    pub fn persist(&self, event: &EventRecord, data: &[u8]) -> Result<PathBuf> {
        let (directory, file_name) = self.directory_and_file_name(event);
        fs::create_dir_all(&directory)?;
        let path = directory.join(file_name);
        write_atomic(&path, data)?;
        Ok(path)
    }
}

/// Replaces path separators so a device name always stays one path component.
pub fn sanitize_device_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = partial_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
