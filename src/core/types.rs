use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionSettings {
    pub years: u32,
    pub trials: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryConfig {
    pub initial: f64,
    pub monthly_withdrawal: f64,
    pub withdrawal_cap: f64,
    pub start_rate: f64,
    pub end_rate: f64,
    pub interest_tax_rate: f64,
}

impl TreasuryConfig {
    pub fn withdrawal_months(&self) -> u32 {
        funded_months(self.monthly_withdrawal, self.withdrawal_cap)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityConfig {
    pub name: String,
    pub initial: f64,
    pub monthly_contribution: f64,
    pub contribution_cap: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub expense_ratio: f64,
    pub capital_gains_tax_rate: f64,
}

impl EquityConfig {
    pub fn contribution_months(&self) -> u32 {
        funded_months(self.monthly_contribution, self.contribution_cap)
    }

    // Initial balance plus every contribution that fits inside the horizon.
    pub fn cost_basis(&self, years: u32) -> f64 {
        let months = self.contribution_months().min(years.saturating_mul(12));
        self.initial + self.monthly_contribution * months as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthConfig {
    pub name: String,
    pub initial: f64,
    pub expected_return: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionInputs {
    pub settings: ProjectionSettings,
    pub treasury: TreasuryConfig,
    pub equities: Vec<EquityConfig>,
    pub retirement: Option<GrowthConfig>,
}

fn funded_months(monthly: f64, cap: f64) -> u32 {
    if monthly <= 0.0 || cap <= 0.0 {
        return 0;
    }
    let months = (cap / monthly).floor();
    if months >= u32::MAX as f64 {
        u32::MAX
    } else {
        months as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryPath {
    pub rates: Vec<f64>,
    pub balances: Vec<f64>,
}

impl TreasuryPath {
    pub fn initial(&self) -> f64 {
        self.balances.first().copied().unwrap_or(0.0)
    }

    pub fn final_balance(&self) -> f64 {
        self.balances.last().copied().unwrap_or(0.0)
    }
}

// Trial-by-year balances; column 0 holds the starting balance.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    paths: Vec<Vec<f64>>,
    years: usize,
}

impl SimulationResult {
    pub(crate) fn from_paths(paths: Vec<Vec<f64>>, years: usize) -> Self {
        debug_assert!(paths.iter().all(|p| p.len() == years + 1));
        Self { paths, years }
    }

    pub fn broadcast(path: &TreasuryPath, trials: usize) -> Self {
        let years = path.balances.len().saturating_sub(1);
        Self {
            paths: vec![path.balances.clone(); trials],
            years,
        }
    }

    pub fn trials(&self) -> usize {
        self.paths.len()
    }

    pub fn years(&self) -> usize {
        self.years
    }

    pub fn path(&self, trial: usize) -> Option<&[f64]> {
        self.paths.get(trial).map(Vec::as_slice)
    }

    pub fn paths(&self) -> &[Vec<f64>] {
        &self.paths
    }

    pub fn year_values(&self, year: usize) -> Vec<f64> {
        self.paths
            .iter()
            .filter_map(|p| p.get(year).copied())
            .collect()
    }

    pub fn final_values(&self) -> Vec<f64> {
        self.year_values(self.years)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStats {
    pub year: u32,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub mean: f64,
}

#[derive(Debug, Clone)]
pub struct EquityOutcome {
    pub config: EquityConfig,
    pub result: SimulationResult,
}

#[derive(Debug, Clone)]
pub struct ProjectionResult {
    pub treasury: TreasuryPath,
    pub equities: Vec<EquityOutcome>,
    pub retirement: Option<SimulationResult>,
    pub total: SimulationResult,
}
