//! Development-only logger setup (feature `devel`).
//!
//! The crate itself never installs a `log` subscriber — the owning
//! application chooses one. This module exists purely so local development
//! and the test suite have somewhere to route `log` output during manual
//! runs, mirroring the teacher's own `devel` feature.

use console::Style;
use log::Level;

/// Install a `fern` dispatcher that writes colored, leveled log lines to
/// stderr. Intended for local development and manual test runs only; never
/// call this from library code that ships to users.
pub fn init_dev_logger(level: log::LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let style = level_style(record.level());
            out.finish(format_args!(
                "[{} {}] {}",
                chrono_like_timestamp(),
                style.apply_to(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::new().red().bold(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug => Style::new().blue(),
        Level::Trace => Style::new().dim(),
    }
}

fn chrono_like_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}
