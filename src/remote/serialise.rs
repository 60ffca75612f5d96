//! MessagePack encoding of log batches.

use std::{
    io,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rmp_serde::Serializer;
use serde::{Deserialize, Serialize};

use crate::{
    level::Severity,
    log_entry::{LogEntry, LogEntryList},
};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Wall-clock instant as seconds and nanoseconds since the Unix epoch.
///
/// `nanos` is always in `0..1_000_000_000`, also for instants before the
/// epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl From<SystemTime> for WireTimestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self {
                seconds: after.as_secs() as i64,
                nanos: after.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let seconds = -(before.as_secs() as i64);
                match before.subsec_nanos() {
                    0 => Self { seconds, nanos: 0 },
                    nanos => Self {
                        seconds: seconds - 1,
                        nanos: NANOS_PER_SEC - nanos,
                    },
                }
            }
        }
    }
}

impl From<WireTimestamp> for SystemTime {
    fn from(ts: WireTimestamp) -> Self {
        let nanos = Duration::from_nanos(u64::from(ts.nanos));
        if ts.seconds >= 0 {
            UNIX_EPOCH + Duration::from_secs(ts.seconds as u64) + nanos
        } else {
            UNIX_EPOCH - Duration::from_secs(ts.seconds.unsigned_abs()) + nanos
        }
    }
}

#[derive(Serialize)]
struct WireEntry<'a> {
    timestamp: WireTimestamp,
    severity: Severity,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instruction_reference: Option<&'a str>,
}

impl<'a> From<&'a LogEntry> for WireEntry<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        Self {
            timestamp: entry.timestamp().into(),
            severity: entry.severity(),
            message: entry.message(),
            log_location: entry.location(),
            instruction_reference: entry.instruction_ref(),
        }
    }
}

#[derive(Serialize)]
struct WireList<'a> {
    log_entries: Vec<WireEntry<'a>>,
}

#[derive(Deserialize)]
struct DecodedEntry {
    timestamp: WireTimestamp,
    severity: Severity,
    message: String,
    #[serde(default)]
    log_location: Option<String>,
    #[serde(default)]
    instruction_reference: Option<String>,
}

impl From<DecodedEntry> for LogEntry {
    fn from(wire: DecodedEntry) -> Self {
        let mut entry = LogEntry::new(wire.timestamp.into(), wire.severity, wire.message);
        if let Some(location) = wire.log_location {
            entry = entry.with_location(location);
        }
        if let Some(id) = wire.instruction_reference {
            entry = entry.with_instruction_ref(id);
        }
        entry
    }
}

#[derive(Deserialize)]
struct DecodedList {
    log_entries: Vec<DecodedEntry>,
}

/// Serialise a batch into a MessagePack payload.
pub fn serialise_batch(batch: &LogEntryList) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128 * batch.entries.len().max(1));
    let wire = WireList {
        log_entries: batch.entries.iter().map(WireEntry::from).collect(),
    };
    wire.serialize(&mut Serializer::new(&mut buf).with_struct_map())
        .map_err(io::Error::other)?;
    Ok(buf)
}

/// Decode a MessagePack payload produced by [`serialise_batch`].
pub fn decode_batch(payload: &[u8]) -> io::Result<LogEntryList> {
    let decoded: DecodedList = rmp_serde::from_slice(payload)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(LogEntryList {
        entries: decoded.log_entries.into_iter().map(LogEntry::from).collect(),
    })
}

/// Frame the payload with a big-endian length prefix.
pub fn frame_payload(payload: &[u8], max_size: usize) -> Option<Vec<u8>> {
    if payload.len() > max_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;
    let capacity = payload.len().checked_add(4)?;
    let mut framed = Vec::with_capacity(capacity);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Some(framed)
}
