//! Regeneration Detection
//!
//! Rule-based heuristics deciding whether the diesel particulate filter is
//! regenerating. Status byte and soot mass are unreliable on many engines,
//! so temperature evidence backs them up, with hysteresis to avoid flicker.

mod config;
mod rules;

pub use config::DetectorConfig;
pub use rules::{Detection, DetectionSource, DetectorInput, RegenDetector, RegenPhase};
