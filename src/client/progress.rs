//! Progress bar styling

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Maximum update frequency we will use for the progress display
pub(crate) const MAX_UPDATE_FPS: u8 = 20;

/// A single-line style format for Indicatif which should cover most situations.
///
/// ```text
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// song.mp3 [==========================            ] 2s @ 123.4kB/s [70%/1.24MB]
/// extremely-long-filename-no-really-very-long [== ] 2s @ 123.4kB/s [70%/1.24MB]
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// ```
const PROGRESS_STYLE_COMPACT: &str =
    "{msg:.dim} {wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec} [{decimal_total_bytes:.dim}]";

/// Room needed by everything except the message: about 35 characters of readout and a
/// useful bar of at least 20.
const DATA_AND_PROGRESS: usize = 55;

/// A double-line style format for Indicatif for use when the message is too long.
///
/// ```text
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// extremely-long-filename-no-really-very-long                         [70%/1.24MB]
/// [==========================                                  ] 2s @ 123.4kB/s
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// ```
const PROGRESS_STYLE_OVERLONG: &str = "{wide_msg:.dim} [{decimal_total_bytes:.dim}]\n{wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec}";

/// Determine and retrieve the appropriate progress style to use
pub(crate) fn style_for(msg_size: usize) -> &'static str {
    let term_width = console::Term::stderr().size().1 as usize; // reasonable default if it can't detect
    if msg_size + DATA_AND_PROGRESS > term_width {
        PROGRESS_STYLE_OVERLONG
    } else {
        PROGRESS_STYLE_COMPACT
    }
}

/// Adds a transfer progress bar to `display`, or a hidden one in quiet mode.
///
/// The caller sets the length once it is known.
pub(crate) fn transfer_bar(
    display: &MultiProgress,
    label: &str,
    quiet: bool,
) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let style = ProgressStyle::with_template(style_for(label.len()))?;
    Ok(display.add(
        ProgressBar::new(0)
            .with_style(style)
            .with_message(label.to_owned()),
    ))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use indicatif::MultiProgress;
    use pretty_assertions::assert_eq;

    use super::{PROGRESS_STYLE_COMPACT, PROGRESS_STYLE_OVERLONG, style_for, transfer_bar};

    #[test]
    fn filename_sizes() {
        assert_eq!(style_for(10), PROGRESS_STYLE_COMPACT);
        assert_eq!(style_for(500), PROGRESS_STYLE_OVERLONG);
    }

    #[test]
    fn quiet_bars_are_hidden() {
        let display = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        assert!(transfer_bar(&display, "x", true).unwrap().is_hidden());
        let bar = transfer_bar(&display, "song.mp3", false).unwrap();
        assert_eq!(bar.message(), "song.mp3");
        assert_eq!(bar.length(), Some(0));
    }
}
