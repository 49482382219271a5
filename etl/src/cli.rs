use std::sync::atomic::{AtomicUsize, Ordering};

use anstyle::{AnsiColor, Style};
use clap::builder::Styles;
use error_stack::{Result, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exit code used when the process is interrupted twice.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Connect the cancellation token to the ctrl-c handler.
///
/// The first signal cancels the token, letting the current ledger complete. The second one
/// exits immediately.
pub fn set_ctrlc_handler(ct: CancellationToken) -> Result<(), ctrlc::Error> {
    let signals = AtomicUsize::new(0);

    ctrlc::set_handler({
        move || {
            if signals.fetch_add(1, Ordering::SeqCst) == 0 {
                warn!("stopping after the current ledger, interrupt again to exit immediately");
                ct.cancel();
            } else {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    })
    .attach_printable("failed to register ctrl-c handler")?;

    Ok(())
}

/// The clap style of the command line.
pub fn etl_cli_style() -> Styles {
    Styles::styled()
        .header(Style::new().bold().fg_color(Some(AnsiColor::Yellow.into())))
        .error(Style::new().bold().fg_color(Some(AnsiColor::Red.into())))
        .usage(Style::new().bold().fg_color(Some(AnsiColor::Yellow.into())))
        .literal(Style::new().fg_color(Some(AnsiColor::BrightCyan.into())))
        .placeholder(Style::new())
        .valid(Style::new().fg_color(Some(AnsiColor::BrightBlue.into())))
        .invalid(
            Style::new()
                .underline()
                .fg_color(Some(AnsiColor::Red.into())),
        )
}
