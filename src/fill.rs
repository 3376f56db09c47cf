/// Fill sentinels shared by every output variable, and the coercions that
/// produce them.
///
/// Float fields carry NaN while in memory and become `FLOAT_FILL` only in
/// the single normalization pass in `dense`. Flag fields are integers from
/// the moment they are built, with `INT_FILL` for anything missing or
/// unparseable.

use crate::model::FieldValue;

/// Fill value for floating-point variables.
pub const FLOAT_FILL: f64 = -999_999_999_999.0;

/// Fill value for integer (flag / count) variables.
pub const INT_FILL: i32 = -999;

/// Fill value for string variables, also the "no observation" time label.
pub const STR_FILL: &str = "no_data";

/// Pixel-count fill used by older SWOT product versions.
pub const LEGACY_PIXEL_FILL: f64 = -99_999_999.0;

/// True if `v` is the float fill. Upstream products round-trip the fill
/// through single precision, so compare with a relative tolerance.
pub fn is_float_fill(v: f64) -> bool {
    (v - FLOAT_FILL).abs() <= FLOAT_FILL.abs() * 1e-6
}

/// True if `v` stands for "no value": NaN or the float fill.
pub fn is_missing(v: f64) -> bool {
    v.is_nan() || is_float_fill(v)
}

/// Coerces a raw numeric value to a flag integer.
///
/// Missing, non-finite, fill-valued or out-of-range values become
/// `INT_FILL`. Fractional values truncate toward zero.
pub fn coerce_flag(value: Option<f64>) -> i32 {
    let Some(v) = value else {
        return INT_FILL;
    };
    if !v.is_finite() || is_float_fill(v) || v == LEGACY_PIXEL_FILL {
        return INT_FILL;
    }
    let truncated = v.trunc();
    if truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
        return INT_FILL;
    }
    truncated as i32
}

/// Flag coercion straight from a raw record value.
pub fn coerce_flag_value(value: Option<&FieldValue>) -> i32 {
    coerce_flag(value.and_then(FieldValue::as_f64))
}

/// Maps an in-memory float to its persisted form.
pub fn persist_float(v: f64) -> f64 {
    if v.is_finite() { v } else { FLOAT_FILL }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_tolerance_catches_single_precision_round_trip() {
        assert!(is_float_fill(FLOAT_FILL));
        assert!(is_float_fill((FLOAT_FILL as f32) as f64));
        assert!(!is_float_fill(-1000.0));
    }

    #[test]
    fn test_flag_coercion() {
        assert_eq!(coerce_flag(Some(2.0)), 2);
        assert_eq!(coerce_flag(Some(1.9)), 1);
        assert_eq!(coerce_flag(None), INT_FILL);
        assert_eq!(coerce_flag(Some(f64::NAN)), INT_FILL);
        assert_eq!(coerce_flag(Some(FLOAT_FILL)), INT_FILL);
        assert_eq!(coerce_flag(Some(LEGACY_PIXEL_FILL)), INT_FILL);
        assert_eq!(coerce_flag(Some(1e12)), INT_FILL);
        assert_eq!(coerce_flag(Some(529_297_055.0)), 529_297_055);
    }

    #[test]
    fn test_flag_coercion_from_text_cells() {
        assert_eq!(coerce_flag_value(Some(&FieldValue::Text("3".into()))), 3);
        assert_eq!(coerce_flag_value(Some(&FieldValue::Text("bad".into()))), INT_FILL);
        assert_eq!(coerce_flag_value(Some(&FieldValue::Missing)), INT_FILL);
        assert_eq!(coerce_flag_value(None), INT_FILL);
    }

    #[test]
    fn test_persist_float() {
        assert_eq!(persist_float(f64::NAN), FLOAT_FILL);
        assert_eq!(persist_float(f64::INFINITY), FLOAT_FILL);
        assert_eq!(persist_float(12.5), 12.5);
    }
}
