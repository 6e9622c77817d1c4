use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    DailyClose, EquityConfig, GrowthConfig, ProjectionInputs, ProjectionReport,
    ProjectionSettings, ReturnAssumption, TreasuryConfig, build_report, historical_metrics,
    resolve_assumption, run_projection, validate_inputs,
};

const BIN_NAME: &str = "portfolio-mc";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "portfolio-mc",
    about = "Monte Carlo portfolio projection (treasury transfer + equity ETFs + retirement account)"
)]
struct Cli {
    #[arg(long, default_value_t = 30, help = "Projection horizon in years")]
    years: u32,
    #[arg(long, default_value_t = 100_000)]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 520_000.0)]
    treasury_start: f64,
    #[arg(
        long,
        default_value_t = 10_000.0,
        help = "Amount moved out of the treasury bucket each month"
    )]
    monthly_transfer: f64,
    #[arg(
        long,
        default_value_t = 320_000.0,
        help = "Total amount to transfer; transfers stop after this many whole months"
    )]
    total_transfer: f64,
    #[arg(long, default_value_t = 4.25, help = "Treasury rate in the first year, in percent")]
    treasury_start_rate: f64,
    #[arg(long, default_value_t = 2.5, help = "Treasury rate in the last year, in percent")]
    treasury_end_rate: f64,
    #[arg(long, default_value_t = 37.0, help = "Tax on treasury interest in percent")]
    treasury_interest_tax: f64,

    #[arg(long, default_value = "VOO")]
    core_equity_name: String,
    #[arg(long, default_value_t = 80_000.0)]
    core_equity_start: f64,
    #[arg(long, default_value_t = 5_000.0)]
    core_equity_monthly: f64,
    #[arg(
        long,
        default_value_t = 11.6,
        help = "Expected annual total return in percent, dividends included"
    )]
    core_equity_return: f64,
    #[arg(long, default_value_t = 16.0)]
    core_equity_volatility: f64,
    #[arg(long, default_value_t = 0.03, help = "Annual expense ratio in percent")]
    core_equity_expense_ratio: f64,

    #[arg(long, default_value = "QQQM")]
    growth_equity_name: String,
    #[arg(long, default_value_t = 80_000.0)]
    growth_equity_start: f64,
    #[arg(long, default_value_t = 5_000.0)]
    growth_equity_monthly: f64,
    #[arg(long, default_value_t = 14.0)]
    growth_equity_return: f64,
    #[arg(long, default_value_t = 32.0)]
    growth_equity_volatility: f64,
    #[arg(long, default_value_t = 0.15)]
    growth_equity_expense_ratio: f64,

    #[arg(
        long,
        default_value_t = 20.0,
        help = "Long-term capital gains tax on terminal equity gains, in percent"
    )]
    capital_gains_tax_rate: f64,

    #[arg(long, default_value = "401k")]
    retirement_name: String,
    #[arg(long, default_value_t = 240_000.0)]
    retirement_start: f64,
    #[arg(long, default_value_t = 10.0)]
    retirement_return: f64,
    #[arg(long, default_value_t = 15.0)]
    retirement_volatility: f64,
    #[arg(long, default_value_t = false)]
    skip_retirement: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    years: Option<u32>,
    simulations: Option<u32>,
    seed: Option<u64>,

    treasury_start: Option<f64>,
    monthly_transfer: Option<f64>,
    total_transfer: Option<f64>,
    treasury_start_rate: Option<f64>,
    treasury_end_rate: Option<f64>,
    treasury_interest_tax: Option<f64>,

    core_equity_name: Option<String>,
    core_equity_start: Option<f64>,
    core_equity_monthly: Option<f64>,
    core_equity_return: Option<f64>,
    core_equity_volatility: Option<f64>,
    core_equity_expense_ratio: Option<f64>,
    core_equity_history: Option<Vec<DailyClose>>,
    core_equity_dividend_yield: Option<f64>,

    growth_equity_name: Option<String>,
    growth_equity_start: Option<f64>,
    growth_equity_monthly: Option<f64>,
    growth_equity_return: Option<f64>,
    growth_equity_volatility: Option<f64>,
    growth_equity_expense_ratio: Option<f64>,
    growth_equity_history: Option<Vec<DailyClose>>,
    growth_equity_dividend_yield: Option<f64>,

    history_start_year: Option<i32>,

    #[serde(alias = "cgtRate")]
    capital_gains_tax_rate: Option<f64>,

    retirement_name: Option<String>,
    retirement_start: Option<f64>,
    retirement_return: Option<f64>,
    retirement_volatility: Option<f64>,
    skip_retirement: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssumptionEcho {
    name: String,
    #[serde(flatten)]
    assumption: ReturnAssumption,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: ProjectionInputs,
    assumptions: Vec<AssumptionEcho>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    assumptions: Vec<AssumptionEcho>,
    #[serde(flatten)]
    report: ProjectionReport,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: Cli) -> Result<ProjectionInputs, String> {
    if cli.years == 0 {
        return Err("--years must be > 0".to_string());
    }

    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    for (name, amount) in [
        ("--treasury-start", cli.treasury_start),
        ("--monthly-transfer", cli.monthly_transfer),
        ("--total-transfer", cli.total_transfer),
        ("--core-equity-start", cli.core_equity_start),
        ("--core-equity-monthly", cli.core_equity_monthly),
        ("--growth-equity-start", cli.growth_equity_start),
        ("--growth-equity-monthly", cli.growth_equity_monthly),
        ("--retirement-start", cli.retirement_start),
    ] {
        if !amount.is_finite() || amount < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if cli.monthly_transfer > 0.0 && cli.total_transfer < cli.monthly_transfer {
        return Err("--total-transfer must be >= --monthly-transfer".to_string());
    }

    for (name, rate) in [
        ("--treasury-interest-tax", cli.treasury_interest_tax),
        ("--capital-gains-tax-rate", cli.capital_gains_tax_rate),
        ("--core-equity-expense-ratio", cli.core_equity_expense_ratio),
        ("--growth-equity-expense-ratio", cli.growth_equity_expense_ratio),
    ] {
        if !(0.0..=100.0).contains(&rate) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    for (name, vol) in [
        ("--core-equity-volatility", cli.core_equity_volatility),
        ("--growth-equity-volatility", cli.growth_equity_volatility),
        ("--retirement-volatility", cli.retirement_volatility),
    ] {
        if !vol.is_finite() || vol < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    for (name, rate) in [
        ("--treasury-start-rate", cli.treasury_start_rate),
        ("--treasury-end-rate", cli.treasury_end_rate),
        ("--core-equity-return", cli.core_equity_return),
        ("--growth-equity-return", cli.growth_equity_return),
        ("--retirement-return", cli.retirement_return),
    ] {
        if !rate.is_finite() || rate <= -100.0 {
            return Err(format!("{name} must be > -100"));
        }
    }

    let transfer = TreasuryConfig {
        initial: cli.treasury_start,
        monthly_withdrawal: cli.monthly_transfer,
        withdrawal_cap: cli.total_transfer,
        start_rate: cli.treasury_start_rate / 100.0,
        end_rate: cli.treasury_end_rate / 100.0,
        interest_tax_rate: cli.treasury_interest_tax / 100.0,
    };
    // Equity contributions are funded by the transfer, so they share its month count.
    let transfer_months = transfer.withdrawal_months() as f64;
    let equity = |name: String, start: f64, monthly: f64, ret: f64, vol: f64, fee: f64| {
        let monthly = if transfer_months > 0.0 { monthly } else { 0.0 };
        EquityConfig {
            name,
            initial: start,
            monthly_contribution: monthly,
            contribution_cap: monthly * transfer_months,
            expected_return: ret / 100.0,
            volatility: vol / 100.0,
            expense_ratio: fee / 100.0,
            capital_gains_tax_rate: cli.capital_gains_tax_rate / 100.0,
        }
    };

    let equities = vec![
        equity(
            cli.core_equity_name.clone(),
            cli.core_equity_start,
            cli.core_equity_monthly,
            cli.core_equity_return,
            cli.core_equity_volatility,
            cli.core_equity_expense_ratio,
        ),
        equity(
            cli.growth_equity_name.clone(),
            cli.growth_equity_start,
            cli.growth_equity_monthly,
            cli.growth_equity_return,
            cli.growth_equity_volatility,
            cli.growth_equity_expense_ratio,
        ),
    ];

    let retirement = (!cli.skip_retirement).then(|| GrowthConfig {
        name: cli.retirement_name.clone(),
        initial: cli.retirement_start,
        expected_return: cli.retirement_return / 100.0,
        volatility: cli.retirement_volatility / 100.0,
    });

    let inputs = ProjectionInputs {
        settings: ProjectionSettings {
            years: cli.years,
            trials: cli.simulations,
            seed: cli.seed,
        },
        treasury: transfer,
        equities,
        retirement,
    };
    validate_inputs(&inputs).map_err(|e| e.to_string())?;
    Ok(inputs)
}

fn default_cli_for_api() -> Cli {
    Cli::parse_from([BIN_NAME])
}

pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let inputs = build_inputs(cli)?;
    let report = project(&inputs)?;
    serde_json::to_string_pretty(&report).map_err(|e| format!("failed to encode report: {e}"))
}

fn project(inputs: &ProjectionInputs) -> Result<ProjectionReport, String> {
    let result = run_projection(inputs).map_err(|e| e.to_string())?;
    build_report(inputs, &result).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "projection HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

// Query strings cannot carry price histories; those go through POST.
async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            tracing::info!(error = %msg, "rejected projection request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let settings = request.inputs.settings;
    let started = std::time::Instant::now();
    let inputs = request.inputs;
    let outcome = tokio::task::spawn_blocking(move || project(&inputs)).await;

    let report = match outcome {
        Ok(Ok(report)) => report,
        Ok(Err(msg)) => return error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            tracing::error!(error = %e, "projection task failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "projection failed");
        }
    };
    tracing::info!(
        years = settings.years,
        trials = settings.trials,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "projection complete"
    );

    json_response(
        StatusCode::OK,
        ProjectResponse {
            assumptions: request.assumptions,
            report,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    if let Some(v) = payload.treasury_start {
        cli.treasury_start = v;
    }
    if let Some(v) = payload.monthly_transfer {
        cli.monthly_transfer = v;
    }
    if let Some(v) = payload.total_transfer {
        cli.total_transfer = v;
    }
    if let Some(v) = payload.treasury_start_rate {
        cli.treasury_start_rate = v;
    }
    if let Some(v) = payload.treasury_end_rate {
        cli.treasury_end_rate = v;
    }
    if let Some(v) = payload.treasury_interest_tax {
        cli.treasury_interest_tax = v;
    }

    if let Some(v) = payload.core_equity_name {
        cli.core_equity_name = v;
    }
    if let Some(v) = payload.core_equity_start {
        cli.core_equity_start = v;
    }
    if let Some(v) = payload.core_equity_monthly {
        cli.core_equity_monthly = v;
    }
    if let Some(v) = payload.core_equity_return {
        cli.core_equity_return = v;
    }
    if let Some(v) = payload.core_equity_volatility {
        cli.core_equity_volatility = v;
    }
    if let Some(v) = payload.core_equity_expense_ratio {
        cli.core_equity_expense_ratio = v;
    }

    if let Some(v) = payload.growth_equity_name {
        cli.growth_equity_name = v;
    }
    if let Some(v) = payload.growth_equity_start {
        cli.growth_equity_start = v;
    }
    if let Some(v) = payload.growth_equity_monthly {
        cli.growth_equity_monthly = v;
    }
    if let Some(v) = payload.growth_equity_return {
        cli.growth_equity_return = v;
    }
    if let Some(v) = payload.growth_equity_volatility {
        cli.growth_equity_volatility = v;
    }
    if let Some(v) = payload.growth_equity_expense_ratio {
        cli.growth_equity_expense_ratio = v;
    }

    if let Some(v) = payload.capital_gains_tax_rate {
        cli.capital_gains_tax_rate = v;
    }

    if let Some(v) = payload.retirement_name {
        cli.retirement_name = v;
    }
    if let Some(v) = payload.retirement_start {
        cli.retirement_start = v;
    }
    if let Some(v) = payload.retirement_return {
        cli.retirement_return = v;
    }
    if let Some(v) = payload.retirement_volatility {
        cli.retirement_volatility = v;
    }
    if let Some(v) = payload.skip_retirement {
        cli.skip_retirement = v;
    }

    let mut assumptions = Vec::new();
    if let Some(history) = payload.core_equity_history {
        let assumption = assumption_from_history(
            &cli.core_equity_name,
            &history,
            payload.history_start_year,
            payload.core_equity_dividend_yield.unwrap_or(0.0),
            (cli.core_equity_return, cli.core_equity_volatility),
        );
        cli.core_equity_return = assumption.expected_return * 100.0;
        cli.core_equity_volatility = assumption.volatility * 100.0;
        assumptions.push(AssumptionEcho {
            name: cli.core_equity_name.clone(),
            assumption,
        });
    }
    if let Some(history) = payload.growth_equity_history {
        let assumption = assumption_from_history(
            &cli.growth_equity_name,
            &history,
            payload.history_start_year,
            payload.growth_equity_dividend_yield.unwrap_or(0.0),
            (cli.growth_equity_return, cli.growth_equity_volatility),
        );
        cli.growth_equity_return = assumption.expected_return * 100.0;
        cli.growth_equity_volatility = assumption.volatility * 100.0;
        assumptions.push(AssumptionEcho {
            name: cli.growth_equity_name.clone(),
            assumption,
        });
    }

    let inputs = build_inputs(cli)?;
    Ok(ApiRequest {
        inputs,
        assumptions,
    })
}

// Percent in, fraction out.
fn assumption_from_history(
    name: &str,
    history: &[DailyClose],
    start_year: Option<i32>,
    dividend_yield_pct: f64,
    fallback_pct: (f64, f64),
) -> ReturnAssumption {
    resolve_assumption(
        name,
        historical_metrics(history, start_year, dividend_yield_pct / 100.0),
        (fallback_pct.0 / 100.0, fallback_pct.1 / 100.0),
    )
}
