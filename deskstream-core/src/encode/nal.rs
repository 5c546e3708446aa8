//! Annex B NAL unit framing
//!
//! The compressor emits access units as Annex B byte streams. Depending on the
//! [`NalMode`], a delivery is either everything one encode call produced, or
//! one NAL unit with or without its start code.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::EncodedPacket;
use crate::sink::Sink;

/// How compressed output is handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NalMode {
    /// All bytes of one encode call in a single delivery
    #[default]
    WholeBulk,
    /// One delivery per NAL unit, start code included
    WithStartCodes,
    /// One delivery per NAL unit, start code removed
    ///
    /// Units that are empty once the start code is gone are skipped.
    WithoutStartCodes,
}

impl NalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WholeBulk => "whole-bulk",
            Self::WithStartCodes => "with-start-codes",
            Self::WithoutStartCodes => "without-start-codes",
        }
    }
}

impl std::fmt::Display for NalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "whole-bulk" | "bulk" => Ok(Self::WholeBulk),
            "with-start-codes" | "annexb" => Ok(Self::WithStartCodes),
            "without-start-codes" | "raw" => Ok(Self::WithoutStartCodes),
            _ => Err(format!("Unknown NAL mode: {}", s)),
        }
    }
}

/// Split an Annex B stream into NAL units
///
/// Each unit keeps its start code. A zero byte right before `00 00 01` makes
/// it a 4-byte start code. Bytes before the first start code form a unit of
/// their own.
pub fn split_units(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            starts.push(start);
            i += 3;
        } else {
            i += 1;
        }
    }
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(data.len());
            &data[start..end]
        })
        .collect()
}

/// Remove a leading `00 00 01` or `00 00 00 01`
///
/// Units without a recognized prefix are returned unchanged.
pub fn strip_start_code(unit: &[u8]) -> &[u8] {
    match unit {
        [0, 0, 1, rest @ ..] => rest,
        [0, 0, 0, 1, rest @ ..] => rest,
        _ => unit,
    }
}

/// Hand the output of one encode call to `sink`
///
/// Empty deliveries are skipped. Returns the number of deliveries made.
pub fn deliver(mode: NalMode, packets: &[EncodedPacket], sink: &mut dyn Sink) -> usize {
    match mode {
        NalMode::WholeBulk => {
            let bulk: Vec<u8> = packets.iter().flat_map(|p| p.data.iter().copied()).collect();
            if bulk.is_empty() {
                return 0;
            }
            trace!("Delivering {} bytes of encoded data", bulk.len());
            sink.consume(&bulk);
            1
        }
        NalMode::WithStartCodes | NalMode::WithoutStartCodes => {
            let mut count = 0;
            for unit in packets.iter().flat_map(|p| split_units(&p.data)) {
                let unit = if mode == NalMode::WithoutStartCodes {
                    strip_start_code(unit)
                } else {
                    unit
                };
                if unit.is_empty() {
                    continue;
                }
                trace!("Delivering NAL unit of {} bytes", unit.len());
                sink.consume(unit);
                count += 1;
            }
            count
        }
    }
}
