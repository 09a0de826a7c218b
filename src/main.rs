//! smdp utility - main entrypoint

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::process::ExitCode;

use smdp::styles::{RESET, error};

#[cfg_attr(coverage_nightly, coverage(off))]
fn main() -> ExitCode {
    match smdp::cli(std::env::args_os()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if smdp::util::tracing::is_initialized() {
                tracing::error!("{e:#}");
            } else {
                anstream::eprintln!("{ERROR}Error:{RESET} {e:#}", ERROR = error());
            }
            ExitCode::FAILURE
        }
    }
}
