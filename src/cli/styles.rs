//! CLI output styling
//!
//! Styles for use with the `anstream` print macros, and a `RESET` constant to return
//! to the default style.

use anstream::ColorChoice;
#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use clap::builder::styling::Styles;
use std::borrow::Cow;
use std::io::IsTerminal as _;

const _ERROR: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Red)));

const _WARNING: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Yellow)));

const _INFO: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Cyan)));

const _SUCCESS: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Green)));

const _HEADER: anstyle::Style = anstyle::Style::new()
    .underline()
    .fg_color(Some(Ansi(Yellow)));

/// Resets styling to default. This is a re-export of [`anstyle::Reset`].
pub use anstyle::Reset as RESET;

// clap reads the CLICOLOR variables itself, so this need not be conditional.
pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(_HEADER)
    .header(_HEADER)
    .literal(anstyle::Style::new().bold())
    .invalid(_WARNING)
    .error(_ERROR)
    .valid(_INFO.bold().underline())
    .placeholder(_INFO);

/// Wraps a style constant in a function that returns it only if colours are enabled.
macro_rules! wrap {
    ($func:ident, $def:ident) => {
        #[allow(clippy::missing_const_for_fn)]
        #[must_use]
        /// Conditional styling accessor for
        #[doc = stringify!($func)]
        /// messages
        ///
        /// Returns either an active [`anstyle::Style`], or
        /// (if colours are disabled) the empty Style.
        pub fn $func() -> anstyle::Style {
            if use_colours() {
                $def
            } else {
                anstyle::Style::new()
            }
        }
    };
}

wrap!(error, _ERROR);
wrap!(warning, _WARNING);
wrap!(info, _INFO);
wrap!(success, _SUCCESS);
wrap!(header, _HEADER);

/// Are we configured to use terminal colours?
#[must_use]
pub fn use_colours() -> bool {
    console::colors_enabled()
}

/// Decides whether to use colour from the quasi-standard environment variables.
///
/// `NO_COLOR` wins over `CLICOLOR_FORCE`; otherwise colour is on when stdout is a terminal.
/// See [https://bixense.com/clicolors/](https://bixense.com/clicolors/).
pub(crate) fn autodetect_colour() -> bool {
    let clicolor_force = std::env::var("CLICOLOR_FORCE").unwrap_or_default();
    let no_color = std::env::var("NO_COLOR").unwrap_or_default();

    if !no_color.is_empty() {
        false
    } else if !clicolor_force.is_empty() {
        true
    } else {
        std::io::stdout().is_terminal()
    }
}

/// Applies the colour decision to `console` and `anstream` alike
pub(crate) fn configure_colours(state: bool) {
    console::set_colors_enabled(state);
    console::set_colors_enabled_stderr(state);
    if state {
        ColorChoice::Always
    } else {
        ColorChoice::Never
    }
    .write_global();
}

pub(crate) fn maybe_strip_color(s: &str) -> Cow<'_, str> {
    if use_colours() {
        s.into()
    } else {
        console::strip_ansi_codes(s)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{configure_colours, error, maybe_strip_color, use_colours};
    use pretty_assertions::assert_eq;
    use rusty_fork::rusty_fork_test;

    rusty_fork_test! {
        #[test]
        fn colours_off() {
            configure_colours(false);
            assert!(!use_colours());
            assert_eq!(error(), anstyle::Style::new());
            assert_eq!(maybe_strip_color("\x1b[31mred\x1b[0m"), "red");
        }

        #[test]
        fn colours_on() {
            configure_colours(true);
            assert!(use_colours());
            assert_eq!(error(), super::_ERROR);
            assert_eq!(maybe_strip_color("\x1b[31mred\x1b[0m"), "\x1b[31mred\x1b[0m");
        }
    }
}
