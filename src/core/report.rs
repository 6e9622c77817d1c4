use serde::Serialize;

use super::error::Result;
use super::stats::{
    AssetSummary, Histogram, asset_summary, equity_summary, growth_ratio, histogram,
    summarize_values, year_stats,
};
use super::types::{ProjectionInputs, ProjectionResult, YearStats};

pub const HISTOGRAM_BINS: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasurySummary {
    pub initial: f64,
    pub total_withdrawn: f64,
    pub final_balance: f64,
    pub growth_ratio: f64,
    pub rates: Vec<f64>,
    pub balances: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionReport {
    pub years: u32,
    pub trials: u32,
    pub seed: u64,
    pub initial_total: f64,
    pub terminal: YearStats,
    pub yearly: Vec<YearStats>,
    pub treasury: TreasurySummary,
    pub equities: Vec<AssetSummary>,
    pub retirement: Option<AssetSummary>,
    pub distribution: Histogram,
}

pub fn build_report(inputs: &ProjectionInputs, result: &ProjectionResult) -> Result<ProjectionReport> {
    let settings = &inputs.settings;
    let yearly = year_stats(&result.total);
    let final_values = result.total.final_values();
    let terminal = summarize_values(settings.years, &mut final_values.clone());

    let withdrawal_months = inputs
        .treasury
        .withdrawal_months()
        .min(settings.years.saturating_mul(12));
    let treasury = TreasurySummary {
        initial: result.treasury.initial(),
        total_withdrawn: inputs.treasury.monthly_withdrawal * withdrawal_months as f64,
        final_balance: result.treasury.final_balance(),
        growth_ratio: growth_ratio(&result.treasury),
        rates: result.treasury.rates.clone(),
        balances: result.treasury.balances.clone(),
    };

    let equities = result
        .equities
        .iter()
        .map(|e| equity_summary(&e.config, &e.result))
        .collect();

    let retirement = match (&inputs.retirement, &result.retirement) {
        (Some(config), Some(sim)) => Some(asset_summary(&config.name, config.initial, 0.0, sim)),
        _ => None,
    };

    Ok(ProjectionReport {
        years: settings.years,
        trials: settings.trials,
        seed: settings.seed,
        initial_total: yearly.first().map(|y| y.mean).unwrap_or(0.0),
        terminal,
        yearly,
        treasury,
        equities,
        retirement,
        distribution: histogram(&final_values, HISTOGRAM_BINS)?,
    })
}
