//! Day-level aggregation
//!
//! Calendar days are UTC days. A day is wear-time compliant when the epochs
//! with a valid reference value cover a fraction of the day inside the
//! configured band; everything else in this module resamples a (compliant)
//! epoch table to one value per day.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{DataQualityWarning, Diagnostics};
use crate::error::{PipelineError, Result};
use crate::features::quantile;
use crate::table::FeatureTable;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// ENMO below this is sedentary (g)
pub const SEDENTARY_ENMO_G: f64 = 0.03;
/// ENMO at or above this is moderate-to-vigorous (g)
pub const MVPA_ENMO_G: f64 = 0.1;

/// Wear-time compliance band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub min_weartime_fraction: f64,
    pub max_weartime_fraction: f64,
    pub epoch_length_s: f64,
    /// Epochs with a value in this column count as worn
    pub reference_column: String,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            min_weartime_fraction: 0.5,
            max_weartime_fraction: 0.8,
            epoch_length_s: 5.0,
            reference_column: "x_mean".to_string(),
        }
    }
}

impl ComplianceConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.min_weartime_fraction)
            || !in_unit(self.max_weartime_fraction)
            || self.min_weartime_fraction > self.max_weartime_fraction
        {
            return Err(PipelineError::Configuration(format!(
                "wear-time band [{}, {}] must be an ordered range within [0, 1]",
                self.min_weartime_fraction, self.max_weartime_fraction
            )));
        }
        if self.epoch_length_s.is_nan() || self.epoch_length_s <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "epoch length must be positive, got {}",
                self.epoch_length_s
            )));
        }
        Ok(())
    }
}

/// How the epochs of one day are reduced to a single value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "q")]
pub enum Aggregation {
    Mean,
    Sum,
    Count,
    Quantile(f64),
}

impl Aggregation {
    fn label(&self) -> String {
        match self {
            Aggregation::Mean => "mean".to_string(),
            Aggregation::Sum => "sum".to_string(),
            Aggregation::Count => "count".to_string(),
            Aggregation::Quantile(q) => format!("q{}", (q * 100.0).round()),
        }
    }

    /// Reduce the values of one day; missing values are skipped
    fn reduce(&self, values: &[f64]) -> f64 {
        let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        match self {
            Aggregation::Count => present.len() as f64,
            Aggregation::Sum => present.iter().sum(),
            Aggregation::Mean if present.is_empty() => f64::NAN,
            Aggregation::Mean => present.iter().sum::<f64>() / present.len() as f64,
            Aggregation::Quantile(q) => {
                present.sort_by(|a, b| a.total_cmp(b));
                quantile(&present, *q)
            }
        }
    }
}

/// One value per calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    pub name: String,
    pub days: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DailySeries {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn get(&self, day: NaiveDate) -> Option<f64> {
        self.days.iter().position(|d| *d == day).map(|i| self.values[i])
    }

    /// Keep only days with a strictly positive value
    pub fn retain_positive(mut self) -> Self {
        let (days, values): (Vec<NaiveDate>, Vec<f64>) = self
            .days
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| **v > 0.0)
            .map(|(d, v)| (*d, *v))
            .unzip();
        self.days = days;
        self.values = values;
        self
    }

    fn retain_present(mut self) -> Self {
        let (days, values): (Vec<NaiveDate>, Vec<f64>) = self
            .days
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| !v.is_nan())
            .map(|(d, v)| (*d, *v))
            .unzip();
        self.days = days;
        self.values = values;
        self
    }
}

fn day_of(timestamp_ms: i64) -> Result<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|t| t.date_naive())
        .ok_or_else(|| PipelineError::Shape(format!("timestamp {} ms is out of range", timestamp_ms)))
}

/// Row indices per UTC day, days in chronological order
fn rows_by_day(table: &FeatureTable) -> Result<BTreeMap<NaiveDate, Vec<usize>>> {
    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (row, &ts) in table.index().iter().enumerate() {
        days.entry(day_of(ts)?).or_default().push(row);
    }
    Ok(days)
}

/// Every calendar day from the first to the last populated one
fn calendar(days: &BTreeMap<NaiveDate, Vec<usize>>) -> Vec<NaiveDate> {
    match (days.keys().next(), days.keys().next_back()) {
        (Some(&first), Some(&last)) => first.iter_days().take_while(|d| *d <= last).collect(),
        _ => Vec::new(),
    }
}

/// Keep the days whose wear-time fraction lies inside the compliance band.
///
/// When no day qualifies a [`DataQualityWarning::NoCompliantDays`] is
/// reported and an empty table with the same columns is returned.
pub fn filter_compliant_days(
    table: &FeatureTable,
    config: &ComplianceConfig,
    diagnostics: &Diagnostics,
) -> Result<FeatureTable> {
    config.validate()?;
    let reference = table.series(&config.reference_column)?;

    let mut keep = Vec::with_capacity(table.n_rows());
    for (day, rows) in rows_by_day(table)? {
        let worn = rows.iter().filter(|&&r| !reference.values[r].is_nan()).count();
        let fraction = worn as f64 * config.epoch_length_s / SECONDS_PER_DAY;
        let compliant =
            fraction >= config.min_weartime_fraction && fraction <= config.max_weartime_fraction;
        debug!(%day, fraction, compliant, "wear-time compliance");
        if compliant {
            keep.extend(rows);
        }
    }

    if keep.is_empty() {
        diagnostics.report(DataQualityWarning::NoCompliantDays {
            rows: table.n_rows(),
        });
    }
    Ok(table.select_rows(&keep))
}

/// Resample one column to calendar days.
///
/// Days between the first and last epoch without any data are included,
/// which yields NaN for mean and quantile and zero for sum and count.
pub fn resample_daily(table: &FeatureTable, column: &str, aggregation: Aggregation) -> Result<DailySeries> {
    let values = &table.series(column)?.values;
    resample_values(table, values, aggregation, format!("{}_daily_{}", aggregation.label(), column))
}

fn resample_values(
    table: &FeatureTable,
    values: &[f64],
    aggregation: Aggregation,
    name: String,
) -> Result<DailySeries> {
    let by_day = rows_by_day(table)?;
    let days = calendar(&by_day);
    let values = days
        .iter()
        .map(|day| {
            let day_values: Vec<f64> = by_day
                .get(day)
                .map(|rows| rows.iter().map(|&r| values[r]).collect())
                .unwrap_or_default();
            aggregation.reduce(&day_values)
        })
        .collect();
    Ok(DailySeries { name, days, values })
}

/// Share of epochs per day that are sedentary, light and moderate-to-vigorous,
/// judged on `mean_enmo`. Days without ENMO values are left out.
pub fn intensity_fractions(table: &FeatureTable) -> Result<[DailySeries; 3]> {
    let enmo = &table.series("mean_enmo")?.values;
    let classify = |keep: fn(f64) -> bool, name: &str| -> Result<DailySeries> {
        let selected: Vec<f64> = enmo
            .iter()
            .map(|&v| if keep(v) { v } else { f64::NAN })
            .collect();
        let hits = resample_values(table, &selected, Aggregation::Count, String::new())?;
        let total = resample_values(table, enmo, Aggregation::Count, String::new())?;
        let values = hits
            .values
            .iter()
            .zip(&total.values)
            .map(|(h, t)| if *t > 0.0 { h / t } else { f64::NAN })
            .collect();
        Ok(DailySeries {
            name: name.to_string(),
            days: hits.days,
            values,
        }
        .retain_present())
    };

    Ok([
        classify(|v| v < SEDENTARY_ENMO_G, "relative_daily_sedentary")?,
        classify(|v| (SEDENTARY_ENMO_G..MVPA_ENMO_G).contains(&v), "relative_daily_lpa")?,
        classify(|v| v >= MVPA_ENMO_G, "relative_daily_mvpa")?,
    ])
}

/// The standard set of daily aggregates of a compliant epoch table
pub fn daily_features(table: &FeatureTable) -> Result<Vec<DailySeries>> {
    let std_sum: Vec<f64> = {
        let x = &table.series("x_std")?.values;
        let y = &table.series("y_std")?.values;
        let z = &table.series("z_std")?.values;
        (0..table.n_rows()).map(|r| x[r] + y[r] + z[r]).collect()
    };

    let mut out = vec![
        resample_daily(table, "mean_enmo", Aggregation::Mean)?.with_name("mean_daily_enmo"),
        resample_daily(table, "mean_enmo", Aggregation::Sum)?
            .with_name("sum_daily_enmo")
            .retain_positive(),
        resample_values(table, &std_sum, Aggregation::Mean, "mean_daily_std_sum".to_string())?,
        resample_daily(table, "total_energy", Aggregation::Mean)?
            .with_name("mean_daily_signal_energy"),
        resample_daily(table, "total_energy", Aggregation::Sum)?
            .with_name("sum_daily_signal_energy")
            .retain_positive(),
        resample_daily(table, "mean_velocity", Aggregation::Mean)?.with_name("mean_daily_velocity"),
        resample_daily(table, "approximate_distance", Aggregation::Sum)?
            .with_name("total_daily_distance")
            .retain_positive(),
        resample_daily(table, "spectral_entropy", Aggregation::Mean)?
            .with_name("mean_daily_spectral_entropy"),
    ];
    out.extend(intensity_fractions(table)?);
    for q in [25, 50, 75] {
        out.push(
            resample_daily(table, "mean_enmo", Aggregation::Quantile(f64::from(q) / 100.0))?
                .with_name(format!("enmo_{}_quantile", q)),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureSeries;
    use pretty_assertions::assert_eq;

    const DAY_MS: i64 = 86_400_000;
    const HOUR_MS: i64 = 3_600_000;
    // 2021-03-01T00:00:00Z
    const START_MS: i64 = 1_614_556_800_000;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
    }

    /// Hourly epochs: `hours_per_day[i]` rows on day `i`
    fn hourly_table(hours_per_day: &[usize], values: impl Fn(usize) -> f64) -> FeatureTable {
        let mut index = Vec::new();
        for (day, &hours) in hours_per_day.iter().enumerate() {
            for h in 0..hours {
                index.push(START_MS + day as i64 * DAY_MS + h as i64 * HOUR_MS);
            }
        }
        let column = (0..index.len()).map(values).collect();
        FeatureTable::from_series(index, vec![FeatureSeries::new("x_mean", column)]).unwrap()
    }

    fn hourly_config() -> ComplianceConfig {
        ComplianceConfig {
            epoch_length_s: 3600.0,
            ..ComplianceConfig::default()
        }
    }

    #[test]
    fn test_only_days_inside_band_are_kept() {
        // 12 h = 0.5 (kept), 20 h = 0.83 (too long), 5 h = 0.21 (too short)
        let table = hourly_table(&[12, 20, 5], |_| 1.0);
        let diagnostics = Diagnostics::new();
        let kept = filter_compliant_days(&table, &hourly_config(), &diagnostics).unwrap();

        assert_eq!(kept.n_rows(), 12);
        assert!(kept.index().iter().all(|&ts| day_of(ts).unwrap() == date(1)));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_missing_reference_values_are_not_worn() {
        // 14 rows but only 10 with a value: 0.42 is below the band
        let table = hourly_table(&[14], |r| if r < 10 { 1.0 } else { f64::NAN });
        let kept = filter_compliant_days(&table, &hourly_config(), &Diagnostics::new()).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_no_compliant_day_warns_and_returns_empty_table() {
        let table = hourly_table(&[2, 3], |_| 1.0);
        let diagnostics = Diagnostics::new();
        let kept = filter_compliant_days(&table, &hourly_config(), &diagnostics).unwrap();

        assert!(kept.is_empty());
        assert_eq!(kept.column_names(), vec!["x_mean"]);
        assert_eq!(
            diagnostics.warnings(),
            vec![DataQualityWarning::NoCompliantDays { rows: 5 }]
        );
    }

    #[test]
    fn test_reference_column_is_required() {
        let config = ComplianceConfig {
            reference_column: "mean_enmo".to_string(),
            ..hourly_config()
        };
        let err = filter_compliant_days(&hourly_table(&[1], |_| 1.0), &config, &Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(_)));
    }

    #[test]
    fn test_resample_fills_calendar_gaps() {
        let table = hourly_table(&[2, 0, 3], |r| r as f64);
        let mean = resample_daily(&table, "x_mean", Aggregation::Mean).unwrap();
        assert_eq!(mean.name, "mean_daily_x_mean");
        assert_eq!(mean.days, vec![date(1), date(2), date(3)]);
        assert_eq!(mean.values[0], 0.5);
        assert!(mean.values[1].is_nan());
        assert_eq!(mean.values[2], 3.0);

        let sum = resample_daily(&table, "x_mean", Aggregation::Sum).unwrap();
        assert_eq!(sum.values, vec![1.0, 0.0, 9.0]);
        assert_eq!(sum.clone().retain_positive().days, vec![date(1), date(3)]);

        let count = resample_daily(&table, "x_mean", Aggregation::Count).unwrap();
        assert_eq!(count.values, vec![2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_quantile_interpolates() {
        let table = hourly_table(&[5], |r| r as f64 * 10.0);
        let q = resample_daily(&table, "x_mean", Aggregation::Quantile(0.25)).unwrap();
        assert_eq!(q.get(date(1)), Some(10.0));
    }

    #[test]
    fn test_intensity_fractions() {
        let enmo = [0.01, 0.02, 0.05, 0.2, f64::NAN];
        let table = FeatureTable::from_series(
            (0..5).map(|i| START_MS + i * HOUR_MS).collect(),
            vec![FeatureSeries::new("mean_enmo", enmo.to_vec())],
        )
        .unwrap();

        let [sedentary, light, mvpa] = intensity_fractions(&table).unwrap();
        assert_eq!(sedentary.values, vec![0.5]);
        assert_eq!(light.values, vec![0.25]);
        assert_eq!(mvpa.values, vec![0.25]);
        assert_eq!(mvpa.name, "relative_daily_mvpa");
    }

    #[test]
    fn test_invalid_band_is_rejected() {
        let config = ComplianceConfig {
            min_weartime_fraction: 0.9,
            max_weartime_fraction: 0.8,
            ..ComplianceConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_daily_features_names() {
        let n = 4;
        let index: Vec<i64> = (0..n).map(|i| START_MS + i * HOUR_MS).collect();
        let column = |name: &str| FeatureSeries::new(name, vec![0.05; n as usize]);
        let table = FeatureTable::from_series(
            index,
            vec![
                column("x_std"),
                column("y_std"),
                column("z_std"),
                column("mean_enmo"),
                column("total_energy"),
                column("mean_velocity"),
                column("approximate_distance"),
                column("spectral_entropy"),
            ],
        )
        .unwrap();

        let features = daily_features(&table).unwrap();
        let names: Vec<&str> = features.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), 14);
        assert!(names.contains(&"mean_daily_std_sum"));
        assert!(names.contains(&"enmo_75_quantile"));
        let std_sum = features.iter().find(|s| s.name == "mean_daily_std_sum").unwrap();
        assert!((std_sum.values[0] - 0.15).abs() < 1e-12);
    }
}
