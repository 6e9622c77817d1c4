mod engine;
mod error;
mod history;
mod report;
mod rng;
mod stats;
mod types;

pub use engine::{
    RETIREMENT_STREAM, aggregate, equity_stream, rate_schedule, run_projection, simulate_equity,
    simulate_growth, simulate_treasury, validate_inputs,
};
pub use error::{ProjectionError, Result};
pub use history::{
    AssumptionSource, DailyClose, DecadeReturn, HistoricalMetrics, ReturnAssumption, YearReturn,
    historical_metrics, resolve_assumption,
};
pub use report::{HISTOGRAM_BINS, ProjectionReport, TreasurySummary, build_report};
pub use rng::{TrialRng, trial_seed};
pub use stats::{
    AssetSummary, Histogram, HistogramBin, growth_ratio, histogram, mean, percentile, year_stats,
};
pub use types::{
    EquityConfig, EquityOutcome, GrowthConfig, ProjectionInputs, ProjectionResult,
    ProjectionSettings, SimulationResult, TreasuryConfig, TreasuryPath, YearStats,
};
