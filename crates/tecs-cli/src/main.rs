//! TECS CLI - closed-loop scenario runner for the energy controller.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tecs_core::telemetry::mode_from_u8;
use tecs_sim::{run_scenario, ScenarioConfig, ScenarioKind, ScenarioResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tecs-cli")]
#[command(about = "Fixed-wing total energy control scenario runner")]
#[command(version)]
struct Args {
    /// Scenario to fly
    #[arg(short, long, value_enum, default_value = "cruise")]
    scenario: ScenarioArg,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Output file format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    // ── Run parameters ────────────────────────────────────────
    #[arg(long, default_value_t = 60.0)]
    duration: f64,

    #[arg(long, default_value_t = 0.02)]
    control_dt: f64,

    #[arg(long, default_value_t = 100.0)]
    initial_altitude: f64,

    #[arg(long, default_value_t = 15.0)]
    initial_eas: f64,

    // ── Sensor options ────────────────────────────────────────
    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    // ── Controller tuning ─────────────────────────────────────
    #[arg(long, default_value_t = 5.0)]
    max_climb_rate: f32,

    #[arg(long, default_value_t = 4.0)]
    max_sink_rate: f32,

    #[arg(long, default_value_t = 10.0)]
    jerk_max: f32,

    #[arg(long, default_value_t = 4.0)]
    vert_accel_limit: f32,

    #[arg(long, default_value_t = 0.45)]
    throttle_trim: f32,

    #[arg(long, default_value_t = 12.0)]
    eas_min: f32,

    #[arg(long, default_value_t = 25.0)]
    eas_max: f32,

    #[arg(long, default_value_t = 15.0)]
    eas_trim: f32,

    #[arg(long, default_value_t = 1.0)]
    pitch_speed_weight: f32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioArg {
    Cruise,
    AltStep,
    SpeedStep,
    Underspeed,
    Climbout,
    Sink,
    /// Run every scenario in sequence
    All,
}

impl ScenarioArg {
    fn kinds(self) -> Vec<ScenarioKind> {
        match self {
            Self::Cruise => vec![ScenarioKind::Cruise],
            Self::AltStep => vec![ScenarioKind::AltStep],
            Self::SpeedStep => vec![ScenarioKind::SpeedStep],
            Self::Underspeed => vec![ScenarioKind::Underspeed],
            Self::Climbout => vec![ScenarioKind::Climbout],
            Self::Sink => vec![ScenarioKind::Sink],
            Self::All => vec![
                ScenarioKind::Cruise,
                ScenarioKind::AltStep,
                ScenarioKind::SpeedStep,
                ScenarioKind::Underspeed,
                ScenarioKind::Climbout,
                ScenarioKind::Sink,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!("TECS Scenario Runner");
    println!("====================\n");

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output dir {:?}", args.output_dir))?;
    tracing::info!("writing results to {:?}", args.output_dir);

    for kind in args.scenario.kinds() {
        let cfg = build_config(&args, kind);
        let result = run_scenario(&cfg);

        let path = write_result(&args, kind, &result)?;
        print_summary(kind, &result, &path);
    }

    Ok(())
}

fn build_config(args: &Args, kind: ScenarioKind) -> ScenarioConfig {
    let mut cfg = ScenarioConfig {
        kind,
        duration_s: args.duration,
        control_dt_s: args.control_dt,
        initial_altitude: args.initial_altitude,
        initial_eas: args.initial_eas,
        throttle_trim: args.throttle_trim,
        ..ScenarioConfig::default()
    };

    cfg.sensors.noise_scale = args.noise_scale;
    cfg.sensors.seed = args.seed;

    cfg.tecs.max_climb_rate = args.max_climb_rate;
    cfg.tecs.max_sink_rate = args.max_sink_rate;
    cfg.tecs.jerk_max = args.jerk_max;
    cfg.tecs.vert_accel_limit = args.vert_accel_limit;
    cfg.tecs.equivalent_airspeed_min = args.eas_min;
    cfg.tecs.equivalent_airspeed_max = args.eas_max;
    cfg.tecs.equivalent_airspeed_trim = args.eas_trim;
    cfg.tecs.pitch_speed_weight = args.pitch_speed_weight;

    cfg
}

fn write_result(args: &Args, kind: ScenarioKind, result: &ScenarioResult) -> Result<PathBuf> {
    let path = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join(format!("{}.csv", kind.label()));
            write_csv(&path, result)?;
            path
        }
        OutputFormat::Json => {
            let path = args.output_dir.join(format!("{}.json", kind.label()));
            let json = serde_json::to_string_pretty(result).context("serializing result")?;
            fs::write(&path, json).with_context(|| format!("writing {path:?}"))?;
            path
        }
    };
    Ok(path)
}

fn write_csv(path: &PathBuf, result: &ScenarioResult) -> Result<()> {
    let mut file = fs::File::create(path).with_context(|| format!("creating {path:?}"))?;
    writeln!(
        file,
        "time,altitude,eas,hgt_setpoint,hgt_rate_setpoint,tas_estimate,throttle,pitch,mode,ste_error,seb_error"
    )?;
    for i in 0..result.len() {
        writeln!(
            file,
            "{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.4},{:.4},{},{:.2},{:.2}",
            result.time[i],
            result.altitude[i],
            result.eas[i],
            result.hgt_setpoint[i],
            result.hgt_rate_setpoint[i],
            result.tas_estimate[i],
            result.throttle[i],
            result.pitch[i],
            result.mode[i],
            result.ste_error[i],
            result.seb_error[i],
        )?;
    }
    Ok(())
}

fn print_summary(kind: ScenarioKind, result: &ScenarioResult, path: &PathBuf) {
    if result.is_empty() {
        println!("{}: empty run\n", kind.label());
        return;
    }
    let last = result.len() - 1;
    let final_mode = mode_from_u8(*result.mode.last().unwrap_or(&0));

    println!("{}:", kind.label());
    println!(
        "  final altitude {:>7.1} m   EAS {:>5.1} m/s   mode {}",
        result.altitude[last], result.eas[last], final_mode.label()
    );
    println!(
        "  throttle {:.2}..{:.2}   pitch {:.2}..{:.2} rad",
        result.throttle.iter().cloned().fold(f32::MAX, f32::min),
        result.throttle.iter().cloned().fold(f32::MIN, f32::max),
        result.pitch.iter().cloned().fold(f32::MAX, f32::min),
        result.pitch.iter().cloned().fold(f32::MIN, f32::max),
    );
    println!("  wrote {}\n", path.display());
}
