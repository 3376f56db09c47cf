/// Change in cross-sectional area (`d_x_area`).
///
/// Upstream products sometimes ship `d_x_area` entirely fill-valued. In that
/// case it is rebuilt at reach level as `width * (wse - median(wse))` and the
/// single reach series is copied to every node row; node widths vary too much
/// within a reach for a per-node estimate to mean anything.

use ndarray::{Array1, Array2};

use crate::fill::is_missing;
use crate::model::InputError;

/// True when the supplied series carries no upstream value at all.
pub fn needs_derivation(supplied: &[f64]) -> bool {
    supplied.iter().all(|v| is_missing(*v))
}

/// Median of the non-missing values; even counts average the middle pair.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !is_missing(*v)).collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// `width[i] * (wse[i] - median(wse))`, NaN wherever either input is missing.
pub fn derive_area_change(width: &[f64], wse: &[f64]) -> Result<Vec<f64>, InputError> {
    if width.len() != wse.len() {
        return Err(InputError::ShapeMismatch {
            field: "d_x_area".to_string(),
            expected: wse.len(),
            found: width.len(),
        });
    }
    let Some(med) = median(wse) else {
        return Ok(vec![f64::NAN; wse.len()]);
    };
    Ok(width
        .iter()
        .zip(wse)
        .map(|(&w, &h)| {
            if is_missing(w) || is_missing(h) {
                f64::NAN
            } else {
                w * (h - med)
            }
        })
        .collect())
}

/// Returns the derived series when `supplied` is all fill, otherwise `None`
/// and the supplied series stands.
pub fn resolve_area_change(
    supplied: &[f64],
    width: &[f64],
    wse: &[f64],
) -> Result<Option<Vec<f64>>, InputError> {
    if !needs_derivation(supplied) {
        return Ok(None);
    }
    derive_area_change(width, wse).map(Some)
}

/// Replicates one reach-level series into `node_count` identical rows.
pub fn broadcast_to_nodes<T: Clone>(series: &Array1<T>, node_count: usize) -> Array2<T> {
    Array2::from_shape_fn((node_count, series.len()), |(_, t)| series[t].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::FLOAT_FILL;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[103.0, 102.0, 101.0, 102.0, 104.0]), Some(102.0));
        assert_eq!(median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, FLOAT_FILL]), None);
    }

    #[test]
    fn test_missing_inputs_do_not_contribute_and_stay_missing() {
        let width = [100.0, 100.0, f64::NAN, 100.0];
        let wse = [10.0, FLOAT_FILL, 12.0, 14.0];
        // median of {10, 12, 14} = 12
        let out = derive_area_change(&width, &wse).unwrap();
        assert_abs_diff_eq!(out[0], -200.0);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert_abs_diff_eq!(out[3], 200.0);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        assert!(derive_area_change(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_resolve_leaves_partially_supplied_series() {
        let supplied = [FLOAT_FILL, 5.0, FLOAT_FILL];
        let out = resolve_area_change(&supplied, &[1.0; 3], &[1.0, 2.0, 3.0]).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_nan_counts_as_not_supplied() {
        assert!(needs_derivation(&[f64::NAN, FLOAT_FILL]));
        assert!(!needs_derivation(&[f64::NAN, 0.0]));
    }

    #[test]
    fn test_broadcast_rows_identical() {
        let series = Array1::from(vec![1.0, 2.0, 3.0]);
        let grid = broadcast_to_nodes(&series, 4);
        assert_eq!(grid.dim(), (4, 3));
        for row in grid.rows() {
            assert_eq!(row, series);
        }
    }
}
