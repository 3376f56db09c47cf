/// Gage discharge statistics.
///
/// All statistics are computed over the usable daily values of one gage:
/// values that are present and not flagged `Ice`, converted from cfs to
/// m³/s. A gage without usable values keeps every statistic as NaN.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::gage::nwis::DailyValue;
use crate::model::InputError;

/// Cubic feet per second to cubic metres per second.
pub const CFS_TO_CMS: f64 = 0.0283168;

/// Exceedance probabilities (percent) of the flow-duration curve.
pub const FDC_PROBABILITIES: [f64; 20] = [
    1.0, 6.0, 11.0, 16.0, 21.0, 26.0, 31.0, 36.0, 41.0, 46.0, 51.0, 56.0, 61.0, 66.0, 71.0, 76.0,
    81.0, 86.0, 91.0, 96.0,
];

// ---------------------------------------------------------------------------
// Date window
// ---------------------------------------------------------------------------

/// Inclusive range of days a gage pull covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<DateWindow, InputError> {
        if end < start {
            return Err(InputError::Config(format!(
                "gage window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(DateWindow { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days, both ends included.
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// A window always holds at least one day.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Position of `date` in the window.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.start || date > self.end {
            return None;
        }
        Some((date - self.start).num_days() as usize)
    }
}

/// Day number written alongside each daily value: the proleptic Gregorian
/// ordinal (1 Jan of year 1 is day 1) plus one.
pub fn day_number(date: NaiveDate) -> f64 {
    (date.num_days_from_ce() + 1) as f64
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GageStatistics {
    pub mean_q: f64,
    pub min_q: f64,
    pub max_q: f64,
    /// Mean discharge per calendar month, January first.
    pub monthly_q: [f64; 12],
    /// Discharge at each of `FDC_PROBABILITIES`.
    pub flow_duration_q: [f64; 20],
    pub two_year_return_q: f64,
    /// Daily discharge over the window, NaN on days without a usable value.
    pub usgs_q: Vec<f64>,
    /// `day_number` of each day with a usable value, NaN elsewhere.
    pub usgs_qt: Vec<f64>,
}

impl GageStatistics {
    /// All-missing statistics for a window of `days` days.
    pub fn empty(days: usize) -> GageStatistics {
        GageStatistics {
            mean_q: f64::NAN,
            min_q: f64::NAN,
            max_q: f64::NAN,
            monthly_q: [f64::NAN; 12],
            flow_duration_q: [f64::NAN; 20],
            two_year_return_q: f64::NAN,
            usgs_q: vec![f64::NAN; days],
            usgs_qt: vec![f64::NAN; days],
        }
    }

    pub fn has_data(&self) -> bool {
        !self.mean_q.is_nan()
    }
}

/// True when a value is present and not ice-affected.
pub fn is_usable(value: &DailyValue) -> bool {
    value.value_cfs.is_some()
        && !value.qualifiers.is_empty()
        && !value.qualifiers.iter().any(|q| q.contains("Ice"))
}

/// Linear interpolation with clamping at both ends. `xp` must be ascending.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let i = xp[..n].partition_point(|p| *p <= x) - 1;
    let (x0, x1, y0, y1) = (xp[i], xp[i + 1], fp[i], fp[i + 1]);
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Flow-duration curve: discharge sorted descending against Weibull
/// plotting positions `100·(j+1)/(n+1)`, sampled at `FDC_PROBABILITIES`.
pub fn flow_duration_curve(q: &[f64]) -> [f64; 20] {
    let mut sorted = q.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let n = sorted.len() as f64;
    let positions: Vec<f64> = (0..sorted.len())
        .map(|j| 100.0 * (j as f64 + 1.0) / (n + 1.0))
        .collect();
    FDC_PROBABILITIES.map(|p| interp(p, &positions, &sorted))
}

/// Two-year return flow from annual maxima.
pub fn two_year_return(daily: &[(NaiveDate, f64)]) -> f64 {
    let mut annual: BTreeMap<i32, f64> = BTreeMap::new();
    for (date, q) in daily {
        annual
            .entry(date.year())
            .and_modify(|m| *m = m.max(*q))
            .or_insert(*q);
    }
    let mut maxima: Vec<f64> = annual.into_values().collect();
    if maxima.is_empty() {
        return f64::NAN;
    }
    maxima.sort_by(|a, b| b.total_cmp(a));
    let rank = ((maxima.len() as f64 + 1.0) / 2.0).ceil() as usize;
    maxima[rank - 1]
}

/// Computes every statistic for one gage over `window`.
///
/// Values outside the window are ignored; a repeated date keeps its first
/// value.
pub fn compute(values: &[DailyValue], window: &DateWindow) -> GageStatistics {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for value in values.iter().filter(|v| is_usable(v)) {
        if window.index_of(value.date).is_none() {
            continue;
        }
        if let Some(cfs) = value.value_cfs {
            by_date.entry(value.date).or_insert(cfs * CFS_TO_CMS);
        }
    }

    let mut stats = GageStatistics::empty(window.len());
    if by_date.is_empty() {
        return stats;
    }
    let daily: Vec<(NaiveDate, f64)> = by_date.into_iter().collect();
    let q: Vec<f64> = daily.iter().map(|(_, q)| *q).collect();

    for (date, value) in &daily {
        if let Some(i) = window.index_of(*date) {
            stats.usgs_q[i] = *value;
            stats.usgs_qt[i] = day_number(*date);
        }
    }

    stats.mean_q = q.iter().sum::<f64>() / q.len() as f64;
    stats.min_q = q.iter().copied().fold(f64::INFINITY, f64::min);
    stats.max_q = q.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut month_sums = [(0.0_f64, 0_usize); 12];
    for (date, value) in &daily {
        let slot = &mut month_sums[date.month0() as usize];
        slot.0 += *value;
        slot.1 += 1;
    }
    for (month, (sum, count)) in month_sums.iter().enumerate() {
        if *count > 0 {
            stats.monthly_q[month] = sum / *count as f64;
        }
    }

    stats.flow_duration_q = flow_duration_curve(&q);
    stats.two_year_return_q = two_year_return(&daily);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dv(date: NaiveDate, cfs: Option<f64>, qualifiers: &[&str]) -> DailyValue {
        DailyValue {
            site: "05568500".to_string(),
            date,
            value_cfs: cfs,
            qualifiers: qualifiers.iter().map(|q| q.to_string()).collect(),
        }
    }

    #[test]
    fn test_window_length_and_index() {
        let w = DateWindow::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(w.len(), 31);
        assert_eq!(w.index_of(date(2024, 1, 1)), Some(0));
        assert_eq!(w.index_of(date(2024, 1, 31)), Some(30));
        assert_eq!(w.index_of(date(2024, 2, 1)), None);
        assert!(DateWindow::new(date(2024, 2, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_day_number_is_ordinal_plus_one() {
        // 1 Jan of year 1 has ordinal 1.
        assert_eq!(day_number(date(1, 1, 1)), 2.0);
        // 1 Jan 2000 has ordinal 730120.
        assert_eq!(day_number(date(2000, 1, 1)), 730121.0);
    }

    #[test]
    fn test_interp_clamps_and_interpolates() {
        let xp = [20.0, 40.0, 60.0, 80.0];
        let fp = [4.0, 3.0, 2.0, 1.0];
        assert_eq!(interp(1.0, &xp, &fp), 4.0);
        assert_eq!(interp(96.0, &xp, &fp), 1.0);
        assert_eq!(interp(40.0, &xp, &fp), 3.0);
        assert_abs_diff_eq!(interp(21.0, &xp, &fp), 3.95, epsilon = 1e-12);
    }

    #[test]
    fn test_flow_duration_curve_is_descending() {
        let fdc = flow_duration_curve(&[1.0, 4.0, 2.0, 3.0]);
        assert_eq!(fdc[0], 4.0);
        assert_eq!(fdc[19], 1.0);
        assert!(fdc.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_two_year_return_uses_median_rank() {
        let daily = vec![
            (date(2020, 3, 1), 10.0),
            (date(2020, 4, 1), 5.0),
            (date(2021, 3, 1), 30.0),
            (date(2022, 3, 1), 20.0),
        ];
        // Maxima descending [30, 20, 10]; rank ceil(2) = 2.
        assert_eq!(two_year_return(&daily), 20.0);
        // Two years: rank ceil(1.5) = 2, the smaller maximum.
        assert_eq!(two_year_return(&daily[..3]), 10.0);
    }

    #[test]
    fn test_compute_masks_ice_and_converts_units() {
        let w = DateWindow::new(date(2024, 1, 1), date(2024, 2, 2)).unwrap();
        let values = vec![
            dv(date(2024, 1, 1), Some(100.0), &["A"]),
            dv(date(2024, 1, 2), Some(200.0), &["A", "Ice"]),
            dv(date(2024, 1, 3), None, &["A"]),
            dv(date(2024, 2, 1), Some(300.0), &["P"]),
        ];
        let stats = compute(&values, &w);

        assert_abs_diff_eq!(stats.min_q, 100.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.max_q, 300.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.mean_q, 200.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.monthly_q[0], 100.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.monthly_q[1], 300.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert!(stats.monthly_q[2].is_nan());

        assert_eq!(stats.usgs_q.len(), 33);
        assert!(stats.usgs_q[1].is_nan());
        assert!(stats.usgs_qt[2].is_nan());
        assert_eq!(stats.usgs_qt[0], day_number(date(2024, 1, 1)));
        assert_abs_diff_eq!(stats.usgs_q[31], 300.0 * CFS_TO_CMS, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.two_year_return_q, 300.0 * CFS_TO_CMS, epsilon = 1e-9);
    }

    #[test]
    fn test_no_usable_values_keeps_nan() {
        let w = DateWindow::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        let stats = compute(&[dv(date(2024, 1, 1), Some(5.0), &["Ice"])], &w);
        assert!(!stats.has_data());
        assert!(stats.flow_duration_q.iter().all(|v| v.is_nan()));
        assert_eq!(stats.usgs_q.len(), 3);
    }
}
