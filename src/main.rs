use std::io::prelude::*;

use anyhow::Result;
use env_logger::Builder;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;
use uefireader_volume::prelude::*;

mod menu;

fn color_level(level: Level) -> String {
    match level {
        Level::Error => level.red().to_string(),
        Level::Warn => level.yellow().to_string(),
        Level::Info => level.green().to_string(),
        Level::Debug => level.blue().to_string(),
        Level::Trace => level.purple().to_string(),
    }
}

const fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    //Parse command line input
    let args: menu::UefiReader = argp::parse_args_or_exit(argp::DEFAULT);

    // Build up a logger with custom formatting and set it to the verbosity from the command line
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}",
                uefireader_core::time::current_time(),
                color_level(record.level()),
                record.args()
            )
        })
        .filter(None, level_filter(args.verbose))
        .init();

    log::info!("Reading UEFI image from {}", args.input);
    let image = UefiImage::open(&args.input)?;

    log::info!("Parsed {} firmware files", image.files().len());
    if !image.build_id().is_empty() {
        log::info!("Firmware build {}", image.build_id());
    }

    image.extract(&args.output)?;
    log::info!("Extracted build description to {}", args.output);
    Ok(())
}
