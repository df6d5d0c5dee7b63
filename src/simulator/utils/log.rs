/// Global logging configuration
use std::sync::atomic::{AtomicBool, Ordering};
static ENABLE_LOG: AtomicBool = AtomicBool::new(true);

/// Set console reporting enabled
pub fn set_log(enabled: bool) {
  ENABLE_LOG.store(enabled, Ordering::Relaxed);
}

/// Check if console reporting is enabled, default is true
pub fn is_log_enabled() -> bool {
  ENABLE_LOG.load(Ordering::Relaxed)
}

/// Initialise env_logger, `RUST_LOG` takes precedence over the default filter
pub fn init_log() {
  init_log_with(false);
}

/// Quiet runs only show warnings and errors
pub fn init_log_with(quiet: bool) {
  set_log(!quiet);
  let default = if quiet { "warn" } else { "info" };
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
    .format_timestamp(None)
    .try_init();
}

/// Lower the console to warnings after the logger is installed
pub fn set_quiet(quiet: bool) {
  if quiet {
    set_log(false);
    log::set_max_level(log::LevelFilter::Warn);
  }
}
