//! Build-time version information

#[cfg_attr(coverage_nightly, coverage(off))]
/// Short version string
pub(crate) fn short() -> String {
    // this _should_ be provided by our build script; if not, something went wrong
    if let Some(v) = option_env!("SMDP_VERSION_STRING") {
        return v.to_string();
    }
    let hash = option_env!("SMDP_BUILD_GIT_HASH").unwrap_or("???");
    format!("{}+g{hash}", env!("CARGO_PKG_VERSION"))
}
