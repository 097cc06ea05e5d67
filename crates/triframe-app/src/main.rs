// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod app;
mod cli;
mod config;
mod renderer;

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info};
use triframe_core::init_tracing;
use triframe_platform::winit::event_loop::EventLoop;

use crate::app::App;
use crate::cli::CliError;
use crate::config::{load_cfg, Settings};

fn main() -> ExitCode {
    init_tracing();

    let argv = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
    let args = match cli::parse(argv) {
        Ok(args) => args,
        Err(CliError::Display(info)) => {
            let _ = info.print();
            return ExitCode::SUCCESS;
        }
        Err(err @ CliError::InvalidArguments(_)) => {
            if let CliError::InvalidArguments(list) = &err {
                for arg in list {
                    error!("invalid command line argument '{}': {}", arg.token, arg.reason);
                }
            }
            error!("{err}; nothing was started");
            return ExitCode::FAILURE;
        }
    };

    let settings = Settings::resolve(&args, &load_cfg());
    info!(
        "starting {}x{} (warp={})",
        settings.size.width, settings.size.height, settings.options.prefer_software
    );

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: Settings) -> Result<()> {
    let event_loop: EventLoop<()> = EventLoop::new().context("event loop")?;
    let mut app = App::new(settings);
    event_loop.run_app(&mut app)?;
    app.finish()
}
