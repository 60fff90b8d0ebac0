//! Binary record decoding
//!
//! Turns raw perf samples into [`Event`]s. Decoding never fails loudly: a
//! sample that is too short yields `None` and the caller drops it.

use podscope_common::{
    DETAILS_LEN, OFFSET_CATEGORY, OFFSET_DETAILS, OFFSET_ERROR, OFFSET_LATENCY, OFFSET_PID,
    OFFSET_TARGET, OFFSET_TIMESTAMP, RECORD_LEN, TARGET_LEN,
};

use crate::domain::{Category, Event, Pid};

/// Decode one record. Trailing bytes past the fixed layout are ignored.
///
/// The process name is left empty; the pipeline fills it in.
#[must_use]
pub fn decode(data: &[u8]) -> Option<Event> {
    if data.len() < RECORD_LEN {
        return None;
    }

    Some(Event {
        timestamp_ns: u64::from_le_bytes(field(data, OFFSET_TIMESTAMP)?),
        pid: Pid(u32::from_le_bytes(field(data, OFFSET_PID)?)),
        process_name: String::new(),
        category: Category::from_tag(u32::from_le_bytes(field(data, OFFSET_CATEGORY)?)),
        latency_ns: u64::from_le_bytes(field(data, OFFSET_LATENCY)?),
        error: i32::from_le_bytes(field(data, OFFSET_ERROR)?),
        target: padded_str(data.get(OFFSET_TARGET..OFFSET_TARGET + TARGET_LEN)?),
        details: padded_str(data.get(OFFSET_DETAILS..OFFSET_DETAILS + DETAILS_LEN)?),
    })
}

/// Encode an event into the kernel layout. Strings longer than their field
/// are truncated.
#[must_use]
pub fn encode(event: &Event) -> Vec<u8> {
    let mut out = vec![0u8; RECORD_LEN];
    out[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&event.timestamp_ns.to_le_bytes());
    out[OFFSET_PID..OFFSET_PID + 4].copy_from_slice(&event.pid.0.to_le_bytes());
    out[OFFSET_CATEGORY..OFFSET_CATEGORY + 4].copy_from_slice(&event.category.tag().to_le_bytes());
    out[OFFSET_LATENCY..OFFSET_LATENCY + 8].copy_from_slice(&event.latency_ns.to_le_bytes());
    out[OFFSET_ERROR..OFFSET_ERROR + 4].copy_from_slice(&event.error.to_le_bytes());
    put_padded(&mut out[OFFSET_TARGET..OFFSET_TARGET + TARGET_LEN], &event.target);
    put_padded(&mut out[OFFSET_DETAILS..OFFSET_DETAILS + DETAILS_LEN], &event.details);
    out
}

fn field<const N: usize>(data: &[u8], offset: usize) -> Option<[u8; N]> {
    data.get(offset..offset + N)?.try_into().ok()
}

/// Strip trailing NUL padding. Invalid UTF-8 is replaced, not rejected.
fn padded_str(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn put_padded(dst: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(dst.len());
    dst[..len].copy_from_slice(&bytes[..len]);
}
