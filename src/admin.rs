//! Catalog administration: creating users and registering media files

use std::io::Write;
use std::path::Path;

use anyhow::Context as _;

use crate::Configuration;
use crate::catalog::SqliteCatalog;
use crate::cli::styles::{RESET, success, warning};

fn open_catalog(config: &Configuration) -> anyhow::Result<SqliteCatalog> {
    SqliteCatalog::open(&config.database)
        .with_context(|| format!("opening catalog database {}", config.database))
}

/// Creates `username`, or replaces its secret
pub(crate) fn add_user<W: Write>(
    config: &Configuration,
    username: &str,
    secret: &str,
    out: &mut W,
) -> anyhow::Result<bool> {
    anyhow::ensure!(!username.is_empty(), "The username must not be empty");
    let catalog = open_catalog(config)?;
    catalog
        .add_user(username, secret.as_bytes())
        .with_context(|| format!("adding user {username}"))?;
    writeln!(out, "{}User {username} saved{RESET}", success())?;
    Ok(true)
}

/// Registers every `*.extension` file in `dir`
pub(crate) fn add_directory<W: Write>(
    config: &Configuration,
    dir: &Path,
    extension: &str,
    out: &mut W,
) -> anyhow::Result<bool> {
    let catalog = open_catalog(config)?;
    let added = catalog
        .add_directory(dir, extension)
        .with_context(|| format!("adding files from {}", dir.display()))?;
    if added.is_empty() {
        writeln!(
            out,
            "{}No .{extension} files found in {}{RESET}",
            warning(),
            dir.display()
        )?;
        return Ok(true);
    }
    for record in &added {
        writeln!(out, "{:>6}  {}", record.id, record.name)?;
    }
    writeln!(out, "{}Added {} file(s){RESET}", success(), added.len())?;
    Ok(true)
}
