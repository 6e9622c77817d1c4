use super::error::{ProjectionError, Result};
use super::rng::TrialRng;
use super::types::{
    EquityConfig, EquityOutcome, GrowthConfig, ProjectionInputs, ProjectionResult,
    ProjectionSettings, SimulationResult, TreasuryConfig, TreasuryPath,
};

const MONTHS_PER_YEAR: u32 = 12;

// Equity bucket `i` draws from stream `i + 1`.
pub const RETIREMENT_STREAM: u32 = 0;

pub fn equity_stream(index: usize) -> u32 {
    index as u32 + 1
}

pub fn run_projection(inputs: &ProjectionInputs) -> Result<ProjectionResult> {
    validate_inputs(inputs)?;
    let settings = &inputs.settings;

    tracing::debug!(
        years = settings.years,
        trials = settings.trials,
        equities = inputs.equities.len(),
        retirement = inputs.retirement.is_some(),
        "running projection"
    );

    let treasury = simulate_treasury(settings, &inputs.treasury)?;

    let mut equities = Vec::with_capacity(inputs.equities.len());
    for (idx, config) in inputs.equities.iter().enumerate() {
        let result = simulate_equity(settings, config, equity_stream(idx))?;
        equities.push(EquityOutcome {
            config: config.clone(),
            result,
        });
    }

    let retirement = match &inputs.retirement {
        Some(config) => Some(simulate_growth(settings, config, RETIREMENT_STREAM)?),
        None => None,
    };

    let treasury_matrix = SimulationResult::broadcast(&treasury, settings.trials as usize);
    let mut parts = vec![&treasury_matrix];
    parts.extend(equities.iter().map(|e| &e.result));
    if let Some(r) = retirement.as_ref() {
        parts.push(r);
    }
    let total = aggregate(&parts)?;

    Ok(ProjectionResult {
        treasury,
        equities,
        retirement,
        total,
    })
}

pub fn validate_inputs(inputs: &ProjectionInputs) -> Result<()> {
    validate_settings(&inputs.settings)?;
    validate_treasury(&inputs.treasury)?;
    for config in &inputs.equities {
        validate_equity(config)?;
    }
    if let Some(config) = &inputs.retirement {
        validate_growth(config)?;
    }
    Ok(())
}

fn validate_settings(settings: &ProjectionSettings) -> Result<()> {
    if settings.years == 0 {
        return Err(ProjectionError::invalid("years", "horizon must be at least one year"));
    }
    if settings.trials == 0 {
        return Err(ProjectionError::invalid("trials", "must run at least one trial"));
    }
    Ok(())
}

fn validate_treasury(config: &TreasuryConfig) -> Result<()> {
    require_non_negative("treasury.initial", config.initial)?;
    require_schedule(
        "treasury",
        config.monthly_withdrawal,
        config.withdrawal_cap,
    )?;
    require_finite("treasury.start_rate", config.start_rate)?;
    require_finite("treasury.end_rate", config.end_rate)?;
    require_fraction("treasury.interest_tax_rate", config.interest_tax_rate)
}

fn validate_equity(config: &EquityConfig) -> Result<()> {
    let field = |name: &str| format!("{}.{name}", config.name);

    require_non_negative(&field("initial"), config.initial)?;
    require_schedule(
        &config.name,
        config.monthly_contribution,
        config.contribution_cap,
    )?;
    require_finite(&field("expected_return"), config.expected_return)?;
    require_volatility(&field("volatility"), config.volatility)?;
    require_non_negative(&field("expense_ratio"), config.expense_ratio)?;
    require_fraction(&field("capital_gains_tax_rate"), config.capital_gains_tax_rate)?;

    let monthly_mean = (config.expected_return - config.expense_ratio) / MONTHS_PER_YEAR as f64;
    if monthly_mean <= -1.0 {
        return Err(ProjectionError::invalid(
            field("expected_return"),
            "net monthly return must be above -100%",
        ));
    }
    Ok(())
}

fn validate_growth(config: &GrowthConfig) -> Result<()> {
    require_non_negative(&format!("{}.initial", config.name), config.initial)?;
    require_finite(
        &format!("{}.expected_return", config.name),
        config.expected_return,
    )?;
    require_volatility(&format!("{}.volatility", config.name), config.volatility)
}

fn require_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProjectionError::invalid(field, "must be finite"))
    }
}

fn require_non_negative(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(ProjectionError::invalid(field, "must be >= 0"));
    }
    Ok(())
}

fn require_fraction(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ProjectionError::invalid(field, "must be between 0 and 1"));
    }
    Ok(())
}

// Zero volatility is accepted and collapses the draw to its mean.
fn require_volatility(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(ProjectionError::invalid(field, "volatility must be >= 0"));
    }
    Ok(())
}

fn require_schedule(bucket: &str, monthly: f64, cap: f64) -> Result<()> {
    require_non_negative(&format!("{bucket}.monthly_amount"), monthly)?;
    require_non_negative(&format!("{bucket}.cap"), cap)?;
    if monthly > 0.0 && cap < monthly {
        return Err(ProjectionError::invalid(
            format!("{bucket}.cap"),
            format!("cap {cap} is smaller than a single monthly amount {monthly}"),
        ));
    }
    Ok(())
}

pub fn rate_schedule(start: f64, end: f64, years: u32) -> Vec<f64> {
    if years <= 1 {
        return vec![start; years as usize];
    }
    let steps = (years - 1) as f64;
    (0..years)
        .map(|y| start + (end - start) * (y as f64 / steps))
        .collect()
}

pub fn simulate_treasury(
    settings: &ProjectionSettings,
    config: &TreasuryConfig,
) -> Result<TreasuryPath> {
    validate_settings(settings)?;
    validate_treasury(config)?;

    let rates = rate_schedule(config.start_rate, config.end_rate, settings.years);
    let withdrawal_months = config.withdrawal_months();

    let mut balance = config.initial;
    let mut balances = Vec::with_capacity(settings.years as usize + 1);
    balances.push(balance);
    let mut months_withdrawn = 0_u32;

    for &annual_rate in &rates {
        let monthly_rate = annual_rate / MONTHS_PER_YEAR as f64;
        let mut yearly_interest = 0.0;
        for _ in 0..MONTHS_PER_YEAR {
            if months_withdrawn < withdrawal_months {
                balance -= config.monthly_withdrawal;
                months_withdrawn += 1;
            }
            let interest = balance * monthly_rate;
            yearly_interest += interest;
            balance += interest;
        }
        balance -= yearly_interest * config.interest_tax_rate;
        balances.push(balance);
    }

    Ok(TreasuryPath { rates, balances })
}

pub fn simulate_equity(
    settings: &ProjectionSettings,
    config: &EquityConfig,
    stream: u32,
) -> Result<SimulationResult> {
    validate_settings(settings)?;
    validate_equity(config)?;

    let years = settings.years as usize;
    let monthly_mean = (config.expected_return - config.expense_ratio) / MONTHS_PER_YEAR as f64;
    let monthly_vol = config.volatility / (MONTHS_PER_YEAR as f64).sqrt();
    let log_drift = lognormal_drift(monthly_mean, monthly_vol);
    let contribution_months = config.contribution_months();

    let mut paths = Vec::with_capacity(settings.trials as usize);
    for trial in 0..settings.trials {
        let mut rng = TrialRng::for_trial(settings.seed, stream, trial);
        let mut path = Vec::with_capacity(years + 1);
        let mut balance = config.initial;
        let mut months_contributed = 0_u32;
        path.push(balance);

        for _ in 0..years {
            for _ in 0..MONTHS_PER_YEAR {
                if months_contributed < contribution_months {
                    balance += config.monthly_contribution;
                    months_contributed += 1;
                }
                balance *= rng.lognormal(log_drift, monthly_vol);
            }
            path.push(balance);
        }
        paths.push(path);
    }

    apply_terminal_tax(
        &mut paths,
        config.cost_basis(settings.years),
        config.capital_gains_tax_rate,
    );
    Ok(SimulationResult::from_paths(paths, years))
}

pub fn simulate_growth(
    settings: &ProjectionSettings,
    config: &GrowthConfig,
    stream: u32,
) -> Result<SimulationResult> {
    validate_settings(settings)?;
    validate_growth(config)?;

    let years = settings.years as usize;
    let mut paths = Vec::with_capacity(settings.trials as usize);
    for trial in 0..settings.trials {
        let mut rng = TrialRng::for_trial(settings.seed, stream, trial);
        let mut balance = config.initial;
        let mut path = Vec::with_capacity(years + 1);
        path.push(balance);
        for _ in 0..years {
            let annual_return = rng.normal(config.expected_return, config.volatility);
            balance *= 1.0 + annual_return;
            path.push(balance);
        }
        paths.push(path);
    }

    Ok(SimulationResult::from_paths(paths, years))
}

pub fn aggregate(parts: &[&SimulationResult]) -> Result<SimulationResult> {
    let Some(first) = parts.first() else {
        return Err(ProjectionError::empty("aggregate"));
    };
    let trials = first.trials();
    let years = first.years();

    for part in parts {
        if part.trials() != trials || part.years() != years {
            return Err(ProjectionError::ShapeMismatch {
                expected_trials: trials,
                expected_years: years,
                trials: part.trials(),
                years: part.years(),
            });
        }
    }

    let mut totals = vec![vec![0.0; years + 1]; trials];
    for part in parts {
        for (total_path, path) in totals.iter_mut().zip(part.paths()) {
            for (total, value) in total_path.iter_mut().zip(path) {
                *total += value;
            }
        }
    }
    Ok(SimulationResult::from_paths(totals, years))
}

// Final column only; contributions are not random so one basis serves every trial.
fn apply_terminal_tax(paths: &mut [Vec<f64>], basis: f64, tax_rate: f64) {
    for path in paths.iter_mut() {
        if let Some(last) = path.last_mut() {
            let gains = *last - basis;
            *last -= gains * tax_rate;
        }
    }
}

// Keeps E[factor] at 1 + monthly_mean.
fn lognormal_drift(monthly_mean: f64, monthly_vol: f64) -> f64 {
    (1.0 + monthly_mean).ln() - monthly_vol * monthly_vol / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::percentile;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_rel(actual: f64, expected: f64, tol: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() / scale <= tol,
            "expected {expected}, got {actual}, relative tolerance {tol}"
        );
    }

    fn settings(years: u32, trials: u32) -> ProjectionSettings {
        ProjectionSettings {
            years,
            trials,
            seed: 42,
        }
    }

    fn sample_treasury() -> TreasuryConfig {
        TreasuryConfig {
            initial: 520_000.0,
            monthly_withdrawal: 10_000.0,
            withdrawal_cap: 320_000.0,
            start_rate: 0.0425,
            end_rate: 0.025,
            interest_tax_rate: 0.37,
        }
    }

    fn sample_equity() -> EquityConfig {
        EquityConfig {
            name: "VOO".to_string(),
            initial: 80_000.0,
            monthly_contribution: 5_000.0,
            contribution_cap: 160_000.0,
            expected_return: 0.116,
            volatility: 0.16,
            expense_ratio: 0.0003,
            capital_gains_tax_rate: 0.20,
        }
    }

    fn flat_equity(initial: f64, monthly: f64, cap: f64, annual: f64) -> EquityConfig {
        EquityConfig {
            name: "flat".to_string(),
            initial,
            monthly_contribution: monthly,
            contribution_cap: cap,
            expected_return: annual,
            volatility: 0.0,
            expense_ratio: 0.0,
            capital_gains_tax_rate: 0.0,
        }
    }

    fn closed_form_path(config: &EquityConfig, years: u32) -> Vec<f64> {
        let m = (config.expected_return - config.expense_ratio) / 12.0;
        let months = config.contribution_months();
        let mut balance = config.initial;
        let mut path = vec![balance];
        for month in 0..years * 12 {
            if month < months {
                balance += config.monthly_contribution;
            }
            balance *= 1.0 + m;
            if (month + 1) % 12 == 0 {
                path.push(balance);
            }
        }
        path
    }

    #[test]
    fn rate_schedule_interpolates_linearly() {
        let rates = rate_schedule(0.0425, 0.025, 3);
        assert_eq!(rates.len(), 3);
        assert_approx(rates[0], 0.0425);
        assert_approx(rates[1], 0.03375);
        assert_approx(rates[2], 0.025);

        assert_eq!(rate_schedule(0.03, 0.01, 1), vec![0.03]);
    }

    #[test]
    fn oracle_treasury_year_matches_hand_calculation() {
        let config = TreasuryConfig {
            initial: 1_000.0,
            monthly_withdrawal: 100.0,
            withdrawal_cap: 200.0,
            start_rate: 0.12,
            end_rate: 0.12,
            interest_tax_rate: 0.5,
        };
        let path = simulate_treasury(&settings(1, 1), &config).expect("valid treasury");

        // Month 1: (1000 - 100) * 1.01 = 909; month 2: (909 - 100) * 1.01 = 817.09;
        // months 3-12 only accrue interest.
        let pre_tax = 817.09 * 1.01_f64.powi(10);
        let interest = pre_tax - (1_000.0 - 200.0);
        assert_eq!(path.balances.len(), 2);
        assert_approx(path.balances[0], 1_000.0);
        assert_approx(path.balances[1], pre_tax - 0.5 * interest);
    }

    #[test]
    fn treasury_takes_no_partial_withdrawal_in_stopping_month() {
        let config = TreasuryConfig {
            initial: 1_000.0,
            monthly_withdrawal: 100.0,
            withdrawal_cap: 250.0,
            start_rate: 0.0,
            end_rate: 0.0,
            interest_tax_rate: 0.0,
        };
        let path = simulate_treasury(&settings(2, 1), &config).expect("valid treasury");
        assert_approx(path.balances[1], 800.0);
        assert_approx(path.balances[2], 800.0);
    }

    #[test]
    fn treasury_reruns_are_bit_identical() {
        let a = simulate_treasury(&settings(30, 1), &sample_treasury()).expect("valid");
        let b = simulate_treasury(&settings(30, 1), &sample_treasury()).expect("valid");
        assert_eq!(a.balances.len(), 31);
        for (x, y) in a.balances.iter().zip(&b.balances) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn zero_volatility_equity_matches_closed_form_growth() {
        let config = flat_equity(80_000.0, 5_000.0, 160_000.0, 0.08);
        let result = simulate_equity(&settings(5, 8), &config, 1).expect("valid equity");
        let expected = closed_form_path(&config, 5);

        for trial in 0..result.trials() {
            let path = result.path(trial).expect("trial exists");
            for (actual, want) in path.iter().zip(&expected) {
                assert_rel(*actual, *want, 1e-12);
            }
        }
    }

    #[test]
    fn one_year_five_percent_monthly_compounding() {
        let config = flat_equity(100_000.0, 0.0, 0.0, 0.05);
        let result = simulate_equity(&settings(1, 4), &config, 1).expect("valid equity");
        let expected = 100_000.0 * (1.0 + 0.05 / 12.0_f64).powi(12);
        for value in result.final_values() {
            assert_rel(value, expected, 1e-12);
        }
    }

    #[test]
    fn one_year_five_percent_annual_growth_is_105000() {
        let config = GrowthConfig {
            name: "401k".to_string(),
            initial: 100_000.0,
            expected_return: 0.05,
            volatility: 0.0,
        };
        let result = simulate_growth(&settings(1, 3), &config, RETIREMENT_STREAM).expect("valid");
        for value in result.final_values() {
            assert_approx(value, 105_000.0);
        }
    }

    #[test]
    fn contributions_stop_once_cap_is_reached() {
        let config = flat_equity(0.0, 1_000.0, 12_000.0, 0.06);
        let result = simulate_equity(&settings(2, 1), &config, 1).expect("valid equity");
        let path = result.path(0).expect("trial exists");

        let m = 0.06 / 12.0;
        let mut year_one = 0.0;
        for _ in 0..12 {
            year_one = (year_one + 1_000.0) * (1.0 + m);
        }
        assert_rel(path[1], year_one, 1e-12);
        // Second year is growth only.
        assert_rel(path[2], year_one * (1.0 + m).powi(12), 1e-12);
    }

    #[test]
    fn terminal_tax_only_touches_final_year() {
        let mut paths = vec![vec![150_000.0, 180_000.0, 200_000.0]];
        apply_terminal_tax(&mut paths, 150_000.0, 0.20);
        assert_approx(paths[0][0], 150_000.0);
        assert_approx(paths[0][1], 180_000.0);
        assert_approx(paths[0][2], 190_000.0);
    }

    #[test]
    fn equity_tax_uses_basis_capped_by_horizon() {
        // 10 years of contributions allowed but only 1 year simulated.
        let mut config = flat_equity(10_000.0, 1_000.0, 120_000.0, 0.0);
        config.capital_gains_tax_rate = 0.25;
        assert_approx(config.cost_basis(1), 22_000.0);

        config.expected_return = 0.12;
        let result = simulate_equity(&settings(1, 2), &config, 1).expect("valid equity");
        let untaxed = closed_form_path(&config, 1);
        let expected = untaxed[1] - (untaxed[1] - 22_000.0) * 0.25;
        for value in result.final_values() {
            assert_rel(value, expected, 1e-12);
        }
    }

    #[test]
    fn zero_contribution_equity_is_initial_times_product_of_factors() {
        let mut config = sample_equity();
        config.monthly_contribution = 0.0;
        config.contribution_cap = 0.0;
        config.capital_gains_tax_rate = 0.0;
        let s = settings(2, 16);
        let result = simulate_equity(&s, &config, 3).expect("valid equity");

        let m = (config.expected_return - config.expense_ratio) / 12.0;
        let vol = config.volatility / 12.0_f64.sqrt();
        let drift = lognormal_drift(m, vol);
        for trial in 0..s.trials {
            let mut rng = TrialRng::for_trial(s.seed, 3, trial);
            let product: f64 = (0..24).map(|_| rng.lognormal(drift, vol)).product();
            let path = result.path(trial as usize).expect("trial exists");
            assert_rel(path[2], config.initial * product, 1e-12);
        }
    }

    #[test]
    fn lognormal_factor_mean_matches_target_monthly_return() {
        let monthly_mean = 0.01;
        let monthly_vol = 0.05;
        let drift = lognormal_drift(monthly_mean, monthly_vol);
        let mut rng = TrialRng::for_trial(7, 1, 0);
        let n = 200_000;
        let sum: f64 = (0..n).map(|_| rng.lognormal(drift, monthly_vol)).sum();
        let mean = sum / n as f64;
        assert!(
            (mean - (1.0 + monthly_mean)).abs() < 1e-3,
            "sample mean {mean} too far from {}",
            1.0 + monthly_mean
        );
    }

    #[test]
    fn small_volatility_percentiles_converge_to_deterministic_value() {
        let mut config = flat_equity(100_000.0, 0.0, 0.0, 0.07);
        config.volatility = 0.002;
        let result = simulate_equity(&settings(1, 100_000), &config, 1).expect("valid equity");
        let deterministic = 100_000.0 * (1.0 + 0.07 / 12.0_f64).powi(12);

        let mut finals = result.final_values();
        for p in [5.0, 50.0, 95.0] {
            let value = percentile(&mut finals, p);
            assert_rel(value, deterministic, 5e-3);
        }
    }

    #[test]
    fn trials_are_independent_and_reproducible() {
        let s = settings(3, 5);
        let a = simulate_equity(&s, &sample_equity(), 1).expect("valid");
        let b = simulate_equity(&s, &sample_equity(), 1).expect("valid");
        assert_eq!(a, b);

        let first = a.path(0).expect("trial 0");
        let second = a.path(1).expect("trial 1");
        assert_ne!(first[1], second[1]);

        let other_stream = simulate_equity(&s, &sample_equity(), 2).expect("valid");
        assert_ne!(a.path(0), other_stream.path(0));
    }

    #[test]
    fn aggregate_rejects_shape_mismatch() {
        let a = SimulationResult::from_paths(vec![vec![1.0, 2.0]; 3], 1);
        let b = SimulationResult::from_paths(vec![vec![1.0, 2.0, 3.0]; 3], 2);
        let err = aggregate(&[&a, &b]).expect_err("must reject mismatched horizons");
        assert!(matches!(err, ProjectionError::ShapeMismatch { .. }));

        let err = aggregate(&[]).expect_err("must reject empty input");
        assert!(matches!(err, ProjectionError::EmptyData { .. }));
    }

    #[test]
    fn aggregate_pairs_trials_by_position() {
        let a = SimulationResult::from_paths(vec![vec![1.0, 2.0], vec![10.0, 20.0]], 1);
        let b = SimulationResult::from_paths(vec![vec![100.0, 200.0], vec![1_000.0, 2_000.0]], 1);
        let total = aggregate(&[&a, &b]).expect("same shape");
        assert_eq!(total.path(0), Some(&[101.0, 202.0][..]));
        assert_eq!(total.path(1), Some(&[1_010.0, 2_020.0][..]));
    }

    #[test]
    fn validation_rejects_bad_configuration_before_simulating() {
        let err = simulate_equity(&settings(0, 10), &sample_equity(), 1).expect_err("zero years");
        assert!(err.to_string().contains("years"));

        let err = simulate_equity(&settings(5, 0), &sample_equity(), 1).expect_err("zero trials");
        assert!(err.to_string().contains("trials"));

        let mut config = sample_equity();
        config.volatility = -0.1;
        let err = simulate_equity(&settings(5, 10), &config, 1).expect_err("negative vol");
        assert!(err.to_string().contains("volatility"));

        let mut config = sample_equity();
        config.contribution_cap = 4_000.0;
        let err = simulate_equity(&settings(5, 10), &config, 1).expect_err("cap below one month");
        assert!(err.to_string().contains("cap"));

        let mut treasury = sample_treasury();
        treasury.interest_tax_rate = 1.5;
        let err = simulate_treasury(&settings(5, 1), &treasury).expect_err("bad tax rate");
        assert!(err.to_string().contains("interest_tax_rate"));
    }

    #[test]
    fn run_projection_sums_every_bucket_by_trial() {
        let inputs = ProjectionInputs {
            settings: settings(4, 6),
            treasury: sample_treasury(),
            equities: vec![sample_equity(), {
                let mut qqqm = sample_equity();
                qqqm.name = "QQQM".to_string();
                qqqm.expected_return = 0.14;
                qqqm.volatility = 0.32;
                qqqm.expense_ratio = 0.0015;
                qqqm
            }],
            retirement: Some(GrowthConfig {
                name: "401k".to_string(),
                initial: 240_000.0,
                expected_return: 0.10,
                volatility: 0.15,
            }),
        };
        let result = run_projection(&inputs).expect("valid projection");
        assert_eq!(result.total.trials(), 6);
        assert_eq!(result.total.years(), 4);

        let retirement = result.retirement.as_ref().expect("retirement simulated");
        for trial in 0..6 {
            for year in 0..=4 {
                let expected = result.treasury.balances[year]
                    + result.equities[0].result.paths()[trial][year]
                    + result.equities[1].result.paths()[trial][year]
                    + retirement.paths()[trial][year];
                assert_rel(result.total.paths()[trial][year], expected, 1e-12);
            }
        }
        assert_approx(result.total.paths()[0][0], 520_000.0 + 80_000.0 * 2.0 + 240_000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_aggregation_is_order_independent(
            seed in 0u64..10_000,
            years in 1u32..6,
            trials in 1u32..8
        ) {
            let s = ProjectionSettings { years, trials, seed };
            let a = simulate_equity(&s, &sample_equity(), 1).expect("valid");
            let b = simulate_equity(&s, &sample_equity(), 2).expect("valid");
            let c = simulate_growth(
                &s,
                &GrowthConfig {
                    name: "401k".to_string(),
                    initial: 240_000.0,
                    expected_return: 0.10,
                    volatility: 0.15,
                },
                RETIREMENT_STREAM,
            )
            .expect("valid");

            let abc = aggregate(&[&a, &b, &c]).expect("same shape");
            let cba = aggregate(&[&c, &b, &a]).expect("same shape");
            let nested = aggregate(&[&aggregate(&[&b, &c]).expect("same shape"), &a])
                .expect("same shape");

            for ((x, y), z) in abc.paths().iter().zip(cba.paths()).zip(nested.paths()) {
                for ((l, r), n) in x.iter().zip(y).zip(z) {
                    prop_assert!((l - r).abs() <= 1e-9 * l.abs().max(1.0));
                    prop_assert!((l - n).abs() <= 1e-9 * l.abs().max(1.0));
                }
            }
        }

        #[test]
        fn prop_zero_volatility_trials_equal_closed_form(
            initial in 0u32..500_000,
            monthly in 0u32..10_000,
            cap_months in 1u32..60,
            annual_bp in -500i32..2_000,
            years in 1u32..8
        ) {
            let monthly = monthly as f64;
            let config = flat_equity(
                initial as f64,
                monthly,
                monthly * cap_months as f64,
                annual_bp as f64 / 10_000.0,
            );
            let result = simulate_equity(&ProjectionSettings { years, trials: 3, seed: 9 }, &config, 1)
                .expect("valid equity");
            let expected = closed_form_path(&config, years);
            for path in result.paths() {
                for (actual, want) in path.iter().zip(&expected) {
                    prop_assert!((actual - want).abs() <= 1e-9 * want.abs().max(1.0));
                }
            }
        }
    }
}
