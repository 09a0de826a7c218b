//! Configuration file wrangling

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use figment::providers::{Env, Format as _, Toml};
use figment::value::Value;
use figment::{Figment, Provider};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Configuration, SystemDefault};

/// Prefix for configuration environment variables
const ENV_PREFIX: &str = "SMDP_";

/// Processes and merges all possible configuration sources.
///
/// In increasing order of priority:
/// 1. System defaults
/// 1. The system configuration file, `/etc/smdp.toml`
/// 1. The user configuration file, `smdp/smdp.toml` under the platform's user config directory
/// 1. `SMDP_*` environment variables
/// 1. The command line
///
/// To see which files apply on the current platform, run `smdp --config-files`.
#[derive(Debug)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

impl Manager {
    fn new(apply_config_files: bool, apply_env: bool) -> Self {
        let mut new1 = Self {
            data: Figment::new(),
        };
        if apply_config_files {
            new1.add_config("system", system_config_path());
            new1.add_config("user", user_config_path());
        }
        if apply_env {
            new1.merge_provider(Env::prefixed(ENV_PREFIX));
        }
        new1
    }

    /// General constructor for production use.
    ///
    /// Reads the configuration files and environment. The caller merges in the command line
    /// and then applies the system default.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(true, true)
    }

    /// Testing/internal constructor: no files, no environment, but DOES apply the system default
    #[cfg(test)]
    #[must_use]
    pub(crate) fn without_files() -> Self {
        let mut new1 = Self::new(false, false);
        new1.apply_system_default();
        new1
    }

    fn add_config(&mut self, what: &str, path: Option<PathBuf>) {
        let Some(path) = path else {
            warn!("could not determine {what} configuration file path");
            return;
        };
        if !path.exists() {
            debug!("{what} configuration file {path:?} not present");
            return;
        }
        self.merge_provider(Toml::file(path));
    }

    /// Returns the list of configuration files we would read, whether or not they exist
    #[must_use]
    pub fn config_files() -> Vec<String> {
        [system_config_path(), user_config_path()]
            .into_iter()
            .flatten()
            .map(|p| p.to_string_lossy().to_string())
            .collect()
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    /// This uses figment's `merge` operation, which prefers to _replace_ existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider);
    }

    /// Applies the system default settings, at a lower priority than everything else
    pub fn apply_system_default(&mut self) {
        let f = std::mem::take(&mut self.data);
        self.data = f.join(SystemDefault {});
    }

    /// Attempts to extract a particular struct from the data
    pub fn get<'de, T>(&self) -> anyhow::Result<T>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>().map_err(|e| anyhow::anyhow!(e))
    }

    /// Creates a displayable adapter showing each configured value and where it came from
    #[must_use]
    pub fn to_display_adapter(&self) -> DisplayAdapter<'_> {
        DisplayAdapter { source: self }
    }
}

fn system_config_path() -> Option<PathBuf> {
    if cfg!(unix) {
        Some(PathBuf::from("/etc/smdp.toml"))
    } else {
        None
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("smdp").join("smdp.toml"))
}

/// Pretty-prints the merged configuration
#[derive(Debug)]
pub struct DisplayAdapter<'a> {
    source: &'a Manager,
}

impl Display for DisplayAdapter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let config = match self.source.get::<Configuration>() {
            Ok(c) => c,
            Err(e) => return write!(f, "(configuration is invalid: {e})"),
        };
        let Ok(Value::Dict(_, dict)) = Value::serialize(&config) else {
            return write!(f, "(configuration could not be rendered)");
        };
        writeln!(f, "{:<14} {:<24} {}", "FIELD", "VALUE", "SOURCE")?;
        for (key, value) in &dict {
            let origin = self.source.data.find_metadata(key).map_or_else(
                || "?".to_string(),
                |meta| {
                    meta.source.as_ref().map_or_else(
                        || meta.interpolate(&figment::Profile::Default, &[key.as_str()]),
                        |src| format!("{} ({src})", meta.name),
                    )
                },
            );
            writeln!(f, "{key:<14} {:<24} {origin}", render(value))?;
        }
        Ok(())
    }
}

fn render(v: &Value) -> String {
    v.as_str()
        .map(str::to_owned)
        .or_else(|| v.to_u128().map(|n| n.to_string()))
        .or_else(|| v.to_i128().map(|n| n.to_string()))
        .or_else(|| v.to_bool().map(|b| b.to_string()))
        .unwrap_or_else(|| format!("{v:?}"))
}
