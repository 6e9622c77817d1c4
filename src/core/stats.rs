use serde::Serialize;

use super::error::{ProjectionError, Result};
use super::types::{EquityConfig, SimulationResult, TreasuryPath, YearStats};

pub const REPORTED_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

// Sorts `values` in place. Linear interpolation between closest ranks.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    percentile_sorted(values, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let Some(&last) = sorted.last() else {
        return 0.0;
    };
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    if below + 1 >= sorted.len() {
        return last;
    }
    let frac = rank - below as f64;
    sorted[below] + (sorted[below + 1] - sorted[below]) * frac
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn summarize_values(year: u32, values: &mut [f64]) -> YearStats {
    let avg = mean(values);
    values.sort_by(f64::total_cmp);
    let [p5, p25, p50, p75, p95] = REPORTED_PERCENTILES.map(|p| percentile_sorted(values, p));
    YearStats {
        year,
        p5,
        p25,
        p50,
        p75,
        p95,
        mean: avg,
    }
}

pub fn year_stats(result: &SimulationResult) -> Vec<YearStats> {
    (0..=result.years())
        .map(|year| summarize_values(year as u32, &mut result.year_values(year)))
        .collect()
}

pub fn growth_ratio(path: &TreasuryPath) -> f64 {
    let initial = path.initial();
    if initial.abs() < 1e-12 {
        return 0.0;
    }
    path.final_balance() / initial
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub p1: f64,
    pub p99: f64,
    pub bin_width: f64,
    pub bins: Vec<HistogramBin>,
}

// Exactly `bins` bins spanning max(0, p1)..=p99 (p1..=p99 when p99 is not
// positive); a degenerate range collapses to one bin. Values outside the range
// are left out and densities are normalised over the binned values.
pub fn histogram(values: &[f64], bins: usize) -> Result<Histogram> {
    if values.is_empty() {
        return Err(ProjectionError::empty("histogram"));
    }
    if bins == 0 {
        return Err(ProjectionError::invalid("bins", "must be > 0"));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let p1 = percentile_sorted(&sorted, 1.0);
    let p99 = percentile_sorted(&sorted, 99.0);

    let floor = p1.max(0.0);
    let lower = if p99 > floor { floor } else { p1 };
    let spread = p99 - lower;
    let (bin_count, bin_width) = if spread > 0.0 {
        (bins, spread / bins as f64)
    } else {
        (1, p99.abs().max(1.0))
    };

    let mut counts = vec![0_usize; bin_count];
    for &value in sorted.iter().filter(|v| (lower..=p99).contains(*v)) {
        let idx = (((value - lower) / bin_width) as usize).min(bin_count - 1);
        counts[idx] += 1;
    }

    let binned: usize = counts.iter().sum();
    let bins = counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| HistogramBin {
            lower: lower + idx as f64 * bin_width,
            upper: lower + (idx + 1) as f64 * bin_width,
            count,
            density: if binned == 0 {
                0.0
            } else {
                count as f64 / (binned as f64 * bin_width)
            },
        })
        .collect();

    Ok(Histogram {
        p1,
        p99,
        bin_width,
        bins,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub name: String,
    pub initial: f64,
    pub contributed: f64,
    pub total_invested: f64,
    pub median_final: f64,
    pub growth_multiple: f64,
}

pub fn equity_summary(config: &EquityConfig, result: &SimulationResult) -> AssetSummary {
    let basis = config.cost_basis(result.years() as u32);
    asset_summary(&config.name, config.initial, basis - config.initial, result)
}

pub fn asset_summary(
    name: &str,
    initial: f64,
    contributed: f64,
    result: &SimulationResult,
) -> AssetSummary {
    let total_invested = initial + contributed;
    let median_final = percentile(&mut result.final_values(), 50.0);
    AssetSummary {
        name: name.to_string(),
        initial,
        contributed,
        total_invested,
        median_final,
        growth_multiple: if total_invested > 0.0 {
            median_final / total_invested
        } else {
            0.0
        },
    }
}
