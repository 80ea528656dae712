#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! CLI entrypoint for the load-cell event-capture device.
//!
//! Responsibilities:
//! - Parse config/flags and assemble hardware (or simulated) ADC
//! - Initialize tracing and manage log sinks
//! - Offer `--json` mode for stable structured output
//! - Drive the IDLE/ACTIVE capture loop, or one of the calibration/serial commands

mod cli;
mod commands;
mod error_fmt;
mod run;
mod tracing_setup;
mod transport;
mod twopoint;

use std::fs;
use std::io::BufRead;

use clap::Parser;
use eyre::WrapErr;
use scale_config::Config;
use scale_core::calibration::{FileCalibrationStore, calibration_store_path};
use scale_traits::AdcReader;

use cli::{Cli, Commands, JSON_MODE};
use commands::DeviceContext;
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use tracing_setup::init_tracing;
use twopoint::TwoPointStore;

fn main() -> eyre::Result<()> {
    let _ = color_eyre::install();

    let shutdown = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let shutdown_clone = std::sync::Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived shutdown signal, stopping gracefully...");
        shutdown_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    }) {
        eprintln!("Warning: Failed to set signal handler: {e}");
    }

    if let Err(e) = real_main(shutdown) {
        let json = *JSON_MODE.get().unwrap_or(&false);
        let code = exit_code_for_error(&e);
        if json {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(code);
    }
    Ok(())
}

fn build_adc(cfg: &Config) -> eyre::Result<Box<dyn AdcReader>> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new().wrap_err("open GPIO chip")?;
        let dt = gpio
            .get(cfg.pins.hx711_dt)
            .wrap_err("open HX711 DT pin")?
            .into_input();
        let sck = gpio
            .get(cfg.pins.hx711_sck)
            .wrap_err("open HX711 SCK pin")?
            .into_output();
        let hx711 = scale_hardware::Hx711::new(dt, sck, cfg.hardware.gain_pulses)
            .wrap_err("open HX711")?;
        return Ok(Box::new(hx711));
    }

    #[cfg(any(not(feature = "hardware"), not(target_os = "linux")))]
    {
        let _ = cfg;
        Ok(Box::new(scale_hardware::SimulatedAdc::new()))
    }
}

fn real_main(shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg_text = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {:?}", cli.config))?;
    let cfg: Config =
        toml::from_str(&cfg_text).wrap_err_with(|| format!("parse config {:?}", cli.config))?;
    cfg.validate().wrap_err("invalid configuration")?;

    init_tracing(
        cli.json,
        &cli.log_level,
        cfg.logging.file.as_deref(),
        cfg.logging.rotation.as_deref(),
    );

    fs::create_dir_all(&cli.state_dir)
        .wrap_err_with(|| format!("create state dir {:?}", cli.state_dir))?;
    let cal_store = FileCalibrationStore::new(calibration_store_path(&cli.state_dir));
    let two_point = TwoPointStore::new(&cli.state_dir);

    match cli.cmd {
        Commands::Run => {
            let device_id = cli
                .device_id
                .clone()
                .ok_or_else(|| eyre::eyre!("--device-id (or SCALE_DEVICE_ID) is required to run"))?;
            let calibration = scale_core::calibration::load_or_default(&cal_store);

            let mut adc = build_adc(&cfg)?;
            let params = run::capture_params(&cfg);
            let conversion =
                run::conversion_from(&cfg, calibration.counts_per_gram, calibration.zero_counts);
            let mut transport = run::build_transport(&cfg)?;

            run::run_capture_loop(
                &device_id,
                adc.as_mut(),
                params,
                conversion,
                &mut transport,
                shutdown,
            )
        }
        Commands::SelfCheck => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_self_check(&mut ctx)?);
            Ok(())
        }
        Commands::Health => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_health(&mut ctx)?);
            Ok(())
        }
        Commands::Tare => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_tare(&mut ctx)?);
            Ok(())
        }
        Commands::Cal { grams } => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_cal(&mut ctx, grams)?);
            Ok(())
        }
        Commands::Cal1 { grams } => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_cal1(&mut ctx, grams)?);
            Ok(())
        }
        Commands::Cal2 { grams } => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_cal2(&mut ctx, grams)?);
            Ok(())
        }
        Commands::Solve => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_solve(&mut ctx)?);
            Ok(())
        }
        Commands::ResetCal => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("{}", commands::run_reset_cal(&mut ctx)?);
            Ok(())
        }
        Commands::Serial => {
            let mut ctx = DeviceContext {
                adc: build_adc(&cfg)?,
                clock: Box::new(scale_traits::clock::MonotonicClock::new()),
                cfg,
                cal_store,
                two_point,
            };
            println!("commands: help, tare, cal <g>, cal1 <g>, cal2 <g>, solve, resetcal");
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line.wrap_err("read stdin")?;
                println!("{}", commands::dispatch_line(&mut ctx, &line));
            }
            Ok(())
        }
    }
}
