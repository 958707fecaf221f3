//! DASH time-series manifest parsing.
//!
//! The event listing is an MPD document whose `Period` elements (in the DASH
//! 2011 namespace) each describe one camera event through `programDateTime`
//! and `duration` attributes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::{Result, SyncError};
use crate::event::{parse_iso8601_duration, parse_program_date_time, EventRecord};

pub const DASH_NAMESPACE: &[u8] = b"urn:mpeg:dash:schema:mpd:2011";

/// Probed in order; the first attribute present with a non-empty value wins.
pub const EVENT_TYPE_ATTRIBUTES: &[&str] = &["eventType", "type", "eventTypes", "nest:eventType"];

pub fn parse_manifest(xml: &[u8], device_id: &str, device_name: &str) -> Result<Vec<EventRecord>> {
    let text = std::str::from_utf8(xml)
        .map_err(|e| SyncError::Parse(format!("manifest is not UTF-8: {}", e)))?;
    let mut reader = NsReader::from_str(text);

    let mut saw_root = false;
    let mut depth = 0usize;
    let mut events = Vec::new();
    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| SyncError::Parse(format!("malformed manifest: {}", e)))?;
        let (element, opens) = match event {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if !saw_root {
            if element.local_name().as_ref() != b"MPD" {
                return Err(SyncError::Parse(format!(
                    "expected MPD root element, found '{}'",
                    String::from_utf8_lossy(element.name().as_ref())
                )));
            }
            saw_root = true;
        } else if element.local_name().as_ref() == b"Period" && is_dash(&ns) {
            events.push(period_to_event(&element, device_id, device_name)?);
        }
        if opens {
            depth += 1;
        }
    }

    if !saw_root {
        return Err(SyncError::Parse("manifest has no root element".to_string()));
    }
    if depth != 0 {
        return Err(SyncError::Parse("manifest is truncated".to_string()));
    }
    Ok(events)
}

fn is_dash(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == DASH_NAMESPACE)
}

fn period_to_event(period: &BytesStart, device_id: &str, device_name: &str) -> Result<EventRecord> {
    let mut attrs = Vec::new();
    for attr in period.attributes() {
        let attr = attr.map_err(|e| SyncError::Parse(format!("bad Period attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| SyncError::Parse(format!("bad value for '{}': {}", key, e)))?
            .into_owned();
        attrs.push((key, value));
    }
    let lookup = |name: &str| {
        attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    let start_raw = lookup("programDateTime")
        .ok_or_else(|| SyncError::Parse("Period is missing programDateTime".to_string()))?;
    let duration_raw = lookup("duration")
        .ok_or_else(|| SyncError::Parse("Period is missing duration".to_string()))?;
    let event_type = EVENT_TYPE_ATTRIBUTES
        .iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
        .map(str::to_string);

    Ok(EventRecord::new(
        device_id,
        device_name,
        parse_program_date_time(start_raw)?,
        parse_iso8601_duration(duration_raw)?,
        event_type,
    ))
}
