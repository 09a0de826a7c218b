//! General utility code that didn't fit anywhere else

pub mod tracing;
pub(crate) use tracing::{ConsoleTraceType, TimeFormat, setup as setup_tracing, trace_level};

mod optionalify;
pub use optionalify::derive_deftly_template_Optionalify;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod test_protocol;
