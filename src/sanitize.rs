//! Input Validation and Numeric Guards
//!
//! Malformed records are rejected here, synchronously, before any state is
//! mutated. Numeric helpers keep downstream formulas stable against NaN/Inf.

use crate::error::EngineError;
use crate::types::{ResponseEvent, MAX_CUE_LEVEL};

/// Check whether a slice contains NaN or Inf.
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Replace NaN/Inf with a fallback and clamp into [lo, hi].
pub fn clamp_finite(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_nan() || value.is_infinite() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

/// Validate a response record from the session collaborator.
///
/// Rejects empty object ids, out-of-range cue levels, negative response
/// times, and negative timestamps. Returns the record untouched on success so
/// callers can chain into state updates.
pub fn validate_response(event: &ResponseEvent) -> Result<(), EngineError> {
    if event.object_id.trim().is_empty() {
        return Err(EngineError::InvalidResponse(
            "objectId must be a non-empty string".to_string(),
        ));
    }
    if event.cue_level > MAX_CUE_LEVEL {
        return Err(EngineError::InvalidResponse(format!(
            "cueLevel {} out of range 0..={}",
            event.cue_level, MAX_CUE_LEVEL
        )));
    }
    if event.response_time_ms < 0 {
        return Err(EngineError::InvalidResponse(format!(
            "responseTimeMs must be >= 0, got {}",
            event.response_time_ms
        )));
    }
    if event.timestamp_ms < 0 {
        return Err(EngineError::InvalidResponse(format!(
            "timestamp must be >= 0, got {}",
            event.timestamp_ms
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinguisticComponent;
    use proptest::prelude::*;

    fn valid_event() -> ResponseEvent {
        ResponseEvent {
            object_id: "word-1".to_string(),
            component: LinguisticComponent::Lexicon,
            correct: true,
            cue_level: 0,
            response_time_ms: 2400,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_has_invalid_values() {
        assert!(!has_invalid_values(&[1.0, 2.0, -3.0]));
        assert!(!has_invalid_values(&[]));
        assert!(has_invalid_values(&[1.0, f64::NAN]));
        assert!(has_invalid_values(&[f64::INFINITY]));
        assert!(has_invalid_values(&[f64::NEG_INFINITY, 0.0]));
    }

    #[test]
    fn test_clamp_finite() {
        assert_eq!(clamp_finite(0.5, 0.0, 1.0, 0.0), 0.5);
        assert_eq!(clamp_finite(2.0, 0.0, 1.0, 0.0), 1.0);
        assert_eq!(clamp_finite(-2.0, 0.0, 1.0, 0.0), 0.0);
        assert_eq!(clamp_finite(f64::NAN, 0.0, 1.0, 0.25), 0.25);
        assert_eq!(clamp_finite(f64::INFINITY, 0.0, 1.0, 0.25), 0.25);
    }

    #[test]
    fn test_validate_response_accepts_valid() {
        assert!(validate_response(&valid_event()).is_ok());
    }

    #[test]
    fn test_validate_response_rejects_empty_object_id() {
        let mut event = valid_event();
        event.object_id = "  ".to_string();
        assert!(validate_response(&event).is_err());
    }

    #[test]
    fn test_validate_response_rejects_cue_level_out_of_range() {
        let mut event = valid_event();
        event.cue_level = 4;
        assert!(validate_response(&event).is_err());
        event.cue_level = 3;
        assert!(validate_response(&event).is_ok());
    }

    #[test]
    fn test_validate_response_rejects_negative_time() {
        let mut event = valid_event();
        event.response_time_ms = -1;
        assert!(validate_response(&event).is_err());

        let mut event = valid_event();
        event.timestamp_ms = -5;
        assert!(validate_response(&event).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_ranges_always_accepted(
            cue_level in 0u8..=3,
            response_time_ms in 0i64..10_000_000,
            timestamp_ms in 0i64..i64::MAX / 2,
        ) {
            let event = ResponseEvent {
                cue_level,
                response_time_ms,
                timestamp_ms,
                ..valid_event()
            };
            prop_assert!(validate_response(&event).is_ok());
        }

        #[test]
        fn prop_clamp_finite_always_in_bounds(value in proptest::num::f64::ANY) {
            let out = clamp_finite(value, -1.0, 1.0, 0.0);
            prop_assert!((-1.0..=1.0).contains(&out));
        }
    }
}
