use serde::{Deserialize, Serialize};

use super::error::{ProjectionError, Result};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyClose {
    pub year: i32,
    pub close: f64,
    // Cash dividend paid on this day, per share.
    #[serde(default)]
    pub dividend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearReturn {
    pub year: i32,
    pub total_return: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecadeReturn {
    pub decade_start: i32,
    pub annualized_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalMetrics {
    pub first_year: i32,
    pub last_year: i32,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub yearly: Vec<YearReturn>,
    pub decades: Vec<DecadeReturn>,
}

// Closes must be chronological. A day's total return is its price change plus
// its cash dividend over the previous close, plus the configured yield accrual;
// the first retained day has no previous close.
pub fn historical_metrics(
    closes: &[DailyClose],
    start_year: Option<i32>,
    dividend_yield: f64,
) -> Result<HistoricalMetrics> {
    if !dividend_yield.is_finite() || dividend_yield <= -1.0 {
        return Err(ProjectionError::invalid(
            "dividend_yield",
            "must be finite and above -100%",
        ));
    }

    let retained = closes
        .iter()
        .filter(|c| start_year.is_none_or(|start| c.year >= start))
        .collect::<Vec<_>>();
    if retained.is_empty() {
        return Err(ProjectionError::empty("price history"));
    }
    if let Some(bad) = retained
        .iter()
        .find(|c| !c.close.is_finite() || c.close <= 0.0)
    {
        return Err(ProjectionError::InvalidPrice {
            year: bad.year,
            price: bad.close,
        });
    }
    if let Some(bad) = retained
        .iter()
        .find(|c| !c.dividend.is_finite() || c.dividend < 0.0)
    {
        return Err(ProjectionError::invalid(
            "dividend",
            format!("{} paid in {} must be finite and >= 0", bad.dividend, bad.year),
        ));
    }

    let daily_dividend = (1.0 + dividend_yield).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0;

    let mut yearly: Vec<YearReturn> = Vec::new();
    let mut growth = 1.0;
    let mut prev_close: Option<f64> = None;
    let mut current_year = retained[0].year;

    for close in &retained {
        if close.year != current_year {
            yearly.push(YearReturn {
                year: current_year,
                total_return: growth - 1.0,
            });
            growth = 1.0;
            current_year = close.year;
        }
        let day_return =
            prev_close.map_or(0.0, |prev| (close.close + close.dividend) / prev - 1.0);
        growth *= 1.0 + day_return + daily_dividend;
        prev_close = Some(close.close);
    }
    yearly.push(YearReturn {
        year: current_year,
        total_return: growth - 1.0,
    });

    let returns = yearly.iter().map(|y| y.total_return).collect::<Vec<_>>();
    let first_year = retained[0].year;
    let last_year = retained[retained.len() - 1].year;

    Ok(HistoricalMetrics {
        first_year,
        last_year,
        annual_return: geometric_mean_return(&returns),
        annual_volatility: sample_std(&returns),
        decades: decade_returns(&yearly, first_year, last_year),
        yearly,
    })
}

fn geometric_mean_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    growth.powf(1.0 / returns.len() as f64) - 1.0
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

// Completed decades only: the decade holding `last_year` is skipped.
fn decade_returns(yearly: &[YearReturn], first_year: i32, last_year: i32) -> Vec<DecadeReturn> {
    let first_decade = first_year.div_euclid(10) * 10;
    let last_decade = last_year.div_euclid(10) * 10;

    let mut decades = Vec::new();
    let mut decade_start = first_decade;
    while decade_start < last_decade {
        let returns = yearly
            .iter()
            .filter(|y| (decade_start..=decade_start + 9).contains(&y.year))
            .map(|y| y.total_return)
            .collect::<Vec<_>>();
        if !returns.is_empty() {
            decades.push(DecadeReturn {
                decade_start,
                annualized_return: geometric_mean_return(&returns),
            });
        }
        decade_start += 10;
    }
    decades
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssumptionSource {
    Historical,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnAssumption {
    pub expected_return: f64,
    pub volatility: f64,
    pub source: AssumptionSource,
}

pub fn resolve_assumption(
    label: &str,
    metrics: Result<HistoricalMetrics>,
    fallback: (f64, f64),
) -> ReturnAssumption {
    match metrics {
        Ok(m) => ReturnAssumption {
            expected_return: m.annual_return,
            volatility: m.annual_volatility,
            source: AssumptionSource::Historical,
        },
        Err(err) => {
            tracing::warn!(asset = label, error = %err, "using fallback return assumptions");
            ReturnAssumption {
                expected_return: fallback.0,
                volatility: fallback.1,
                source: AssumptionSource::Fallback,
            }
        }
    }
}
