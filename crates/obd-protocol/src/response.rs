//! Response Cleaning and Hex Payload Extraction
//!
//! Everything above the adapter session sees responses only in the cleaned form
//! produced here: no prompt markers, no carriage returns, no `SEARCHING...` or
//! `NO DATA` tokens, single spaces.

use regex::Regex;
use std::sync::LazyLock;

static STATUS_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SEARCHING\.\.\.|NO DATA").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Negative response service identifier (UDS / ISO 14229)
pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

/// Strip framing artifacts from a raw adapter response
pub fn clean_response(raw: &str) -> String {
    let without_prompt = raw.replace('>', "").replace('\r', "").replace('\n', " ");
    let without_status = STATUS_TOKENS.replace_all(&without_prompt, "");
    WHITESPACE.replace_all(&without_status, " ").trim().to_string()
}

/// Remove all whitespace and upper-case a response for prefix matching
pub fn compact_hex(response: &str) -> String {
    response
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Parse a hex response into bytes, two characters per byte.
///
/// Pairs that are not valid hex are skipped.
pub fn parse_hex_bytes(response: &str) -> Vec<u8> {
    let compact = compact_hex(response);
    compact
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter(|pair| pair.len() == 2)
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

/// Check whether a response carries the given hex sequence (spaces ignored)
pub fn contains_hex(response: &str, hex: &str) -> bool {
    compact_hex(response).contains(&compact_hex(hex))
}

/// Locate `prefix` in the response and decode the bytes starting at it.
///
/// The prefix is matched on the compacted response so that CAN header bytes
/// printed by `ATH1` in front of the payload are skipped. The search runs at
/// any hex digit offset, not per byte: with `ATS0` an 11-bit header is three
/// digits (`7E8`), which leaves every payload byte at an odd offset. A prefix
/// may therefore also match across two data bytes; callers use prefixes of
/// at least two bytes (service + identifier) to keep that unlikely.
pub fn find_payload(response: &str, prefix: &[u8]) -> Option<Vec<u8>> {
    if prefix.is_empty() {
        return None;
    }
    let compact = compact_hex(response);
    let needle: String = prefix.iter().map(|b| format!("{b:02X}")).collect();
    let start = compact.find(&needle)?;
    Some(parse_hex_bytes(&compact[start..]))
}

/// Check whether a response is a negative response to `service`
pub fn is_negative_response(response: &str, service: u8) -> bool {
    find_payload(response, &[NEGATIVE_RESPONSE_SID, service]).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_after_odd_length_header() {
        // 11-bit header `7E8` and PCI `05` without spaces
        let payload = find_payload("7E8056232780A28", &[0x62, 0x32, 0x78]).unwrap();
        assert_eq!(payload, vec![0x62, 0x32, 0x78, 0x0A, 0x28]);
    }

    #[test]
    fn test_clean_strips_framing() {
        let raw = "SEARCHING...\r\n41 00 BE 3E B8 11\r\n\r\n>";
        assert_eq!(clean_response(raw), "41 00 BE 3E B8 11");
    }

    #[test]
    fn test_clean_no_data_case_insensitive() {
        assert_eq!(clean_response("no data\r\r>"), "");
        assert_eq!(clean_response("ELM327   v1.5\r>"), "ELM327 v1.5");
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("62 32 78 0A 28"), vec![0x62, 0x32, 0x78, 0x0A, 0x28]);
        assert_eq!(parse_hex_bytes("623278"), vec![0x62, 0x32, 0x78]);
        assert!(parse_hex_bytes("").is_empty());
    }

    #[test]
    fn test_parse_skips_invalid_pairs() {
        assert_eq!(parse_hex_bytes("41 ZZ 0C"), vec![0x41, 0x0C]);
    }

    #[test]
    fn test_find_payload_skips_header() {
        let payload = find_payload("7E8 05 62 32 78 0A 28", &[0x62, 0x32, 0x78]).unwrap();
        assert_eq!(payload, vec![0x62, 0x32, 0x78, 0x0A, 0x28]);
        assert!(find_payload("7E8 03 7F 22 31", &[0x62, 0x32, 0x78]).is_none());
    }

    #[test]
    fn test_negative_response() {
        assert!(is_negative_response("7F 10 12", 0x10));
        assert!(!is_negative_response("50 03 00 32 01 F4", 0x10));
        // 7F for a different service is not a rejection of this one
        assert!(!is_negative_response("7F 22 31", 0x10));
    }

    #[test]
    fn test_contains_hex() {
        assert!(contains_hex("41 00 BE 3E", "4100"));
        assert!(contains_hex("4100BE3E", "41 00"));
        assert!(!contains_hex("NO DATA", "41 00"));
    }
}
