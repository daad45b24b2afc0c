//! 批量评估胸廓分割结果.
//!
//! ```text
//! ribeval [OPTIONS] [TRUTH_DIR] [PRED_DIR]
//! ```
//!
//! 选项见 `ribeval --help`.

mod result;
mod runner;

use clap::Parser;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let args = runner::Args::parse();
    simple_logger::init_with_level(args.log_level)?;

    let result = runner::run(&args)?;
    result.write_csvs(&args)?;
    result.analyze()?;

    Ok(if result.report().has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
