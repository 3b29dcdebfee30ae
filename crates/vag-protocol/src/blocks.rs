//! DPF Measuring Blocks
//!
//! Identifiers and decoding for the engine ECU measuring blocks read with
//! ReadDataByIdentifier. A positive reply is `62 <id hi> <id lo>` followed by
//! the data bytes, so block data starts at byte 3.

use crate::service;
use obd_protocol::response::find_payload;
use serde::{Deserialize, Serialize};

/// Measuring blocks read every poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasuringBlock {
    /// Calculated soot mass
    SootMass,
    /// Regeneration status byte
    RegenStatus,
    /// DPF and exhaust temperature pair
    DpfTemperatures,
    /// Distance since last regeneration
    DistanceSinceRegen,
}

impl MeasuringBlock {
    /// Data identifier
    pub fn id(&self) -> u16 {
        match self {
            MeasuringBlock::SootMass => 0x3278,
            MeasuringBlock::RegenStatus => 0x3282,
            MeasuringBlock::DpfTemperatures => 0x3972,
            MeasuringBlock::DistanceSinceRegen => 0x3274,
        }
    }

    /// Request string, e.g. `223278`
    pub fn request(&self) -> String {
        format!("{:02X}{:04X}", service::READ_DATA_BY_IDENTIFIER, self.id())
    }

    /// Positive response prefix `62 <id hi> <id lo>`
    pub fn positive_prefix(&self) -> [u8; 3] {
        let [hi, lo] = self.id().to_be_bytes();
        [
            service::READ_DATA_BY_IDENTIFIER + service::POSITIVE_RESPONSE_OFFSET,
            hi,
            lo,
        ]
    }

    /// Minimum reply length including the 3-byte prefix
    pub fn min_len(&self) -> usize {
        match self {
            MeasuringBlock::SootMass | MeasuringBlock::DistanceSinceRegen => 5,
            MeasuringBlock::RegenStatus => 4,
            MeasuringBlock::DpfTemperatures => 7,
        }
    }

    /// Locate and length-check this block's positive reply in a cleaned response
    pub fn extract(&self, response: &str) -> Option<Vec<u8>> {
        find_payload(response, &self.positive_prefix()).filter(|p| p.len() >= self.min_len())
    }
}

fn word(payload: &[u8], offset: usize) -> Option<u16> {
    let bytes = payload.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Soot mass in grams: `((b3 << 8) + b4) / 100`
pub fn decode_soot_mass(payload: &[u8]) -> Option<f64> {
    word(payload, 3).map(|raw| f64::from(raw) / 100.0)
}

/// Raw regeneration status (0 idle, 1 passive, 2 active, 3 service)
pub fn decode_regen_status(payload: &[u8]) -> Option<u8> {
    payload.get(3).copied()
}

/// DPF and exhaust temperature in °C: `((hi << 8) + lo) / 10 - 40` each
pub fn decode_temperature_pair(payload: &[u8]) -> Option<(f64, f64)> {
    let dpf = word(payload, 3)?;
    let exhaust = word(payload, 5)?;
    Some((
        f64::from(dpf) / 10.0 - 40.0,
        f64::from(exhaust) / 10.0 - 40.0,
    ))
}

/// Distance since last regeneration in km
pub fn decode_distance(payload: &[u8]) -> Option<u32> {
    word(payload, 3).map(u32::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_requests() {
        assert_eq!(MeasuringBlock::SootMass.request(), "223278");
        assert_eq!(MeasuringBlock::RegenStatus.request(), "223282");
        assert_eq!(MeasuringBlock::DpfTemperatures.request(), "223972");
        assert_eq!(MeasuringBlock::DistanceSinceRegen.request(), "223274");
    }

    #[test]
    fn test_soot_mass_decode() {
        // 0x0A28 = 2600 -> 26.00 g
        let payload = [0x62, 0x32, 0x78, 0x0A, 0x28];
        assert_eq!(decode_soot_mass(&payload), Some(26.0));
    }

    #[test]
    fn test_temperature_pair_decode() {
        // 0x1B58 = 7000 -> 660 °C, 0x1194 = 4500 -> 410 °C
        let payload = [0x62, 0x39, 0x72, 0x1B, 0x58, 0x11, 0x94];
        assert_eq!(decode_temperature_pair(&payload), Some((660.0, 410.0)));
    }

    #[test]
    fn test_distance_decode() {
        let payload = [0x62, 0x32, 0x74, 0x01, 0x2C];
        assert_eq!(decode_distance(&payload), Some(300));
    }

    #[test]
    fn test_extract_rejects_short_reply() {
        assert!(MeasuringBlock::DpfTemperatures
            .extract("62 39 72 1B 58 11")
            .is_none());
        assert!(MeasuringBlock::RegenStatus.extract("62 32 82 02").is_some());
    }

    #[test]
    fn test_extract_rejects_negative_reply() {
        assert!(MeasuringBlock::SootMass.extract("7F 22 31").is_none());
        // Right service, wrong identifier
        assert!(MeasuringBlock::SootMass.extract("62 32 74 01 2C").is_none());
    }

    proptest! {
        #[test]
        fn prop_soot_transform(hi in any::<u8>(), lo in any::<u8>()) {
            let payload = [0x62, 0x32, 0x78, hi, lo];
            let expected = (((hi as u32) << 8) + lo as u32) as f64 / 100.0;
            prop_assert_eq!(decode_soot_mass(&payload), Some(expected));
        }

        #[test]
        fn prop_temperature_transform(a in any::<u16>(), b in any::<u16>()) {
            let [a0, a1] = a.to_be_bytes();
            let [b0, b1] = b.to_be_bytes();
            let payload = [0x62, 0x39, 0x72, a0, a1, b0, b1];
            let expected = (a as f64 / 10.0 - 40.0, b as f64 / 10.0 - 40.0);
            prop_assert_eq!(decode_temperature_pair(&payload), Some(expected));
        }
    }
}
