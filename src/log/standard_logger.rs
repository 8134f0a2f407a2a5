use std::sync::{Mutex, PoisonError};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::{Config, Handle};

#[cfg(feature = "progress_bar")]
use super::progress_bar_encoder::PBWrapperEncoder;
use crate::error::EpiError;
use crate::log::LogSettings;

// ISO 8601 timestamp, color coded level tag, then the thread name so that messages from pool
// workers can be told apart.
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} [{T}] {t} - {m}{n}";

/// Handle to the `log4rs` logger once one has been installed.
static HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn build_config(settings: &LogSettings) -> Result<Config, EpiError> {
    let encoder = Box::new(PatternEncoder::new(LOG_PATTERN));
    // Clears the progress bar line before every message.
    #[cfg(feature = "progress_bar")]
    let encoder = Box::new(PBWrapperEncoder::new(encoder));
    let stdout = ConsoleAppender::builder().encoder(encoder).build();

    let loggers = settings
        .module_filters
        .iter()
        .map(|(module, level)| Logger::builder().build(module.clone(), *level));
    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .loggers(loggers)
        .build(Root::builder().appender("stdout").build(settings.level))
        .map_err(|e| EpiError::ConfigError(format!("invalid log settings: {e}")))
}

pub(super) fn install(settings: &LogSettings) -> Result<(), EpiError> {
    let config = build_config(settings)?;
    let mut handle = HANDLE.lock().unwrap_or_else(PoisonError::into_inner);
    match handle.as_ref() {
        Some(handle) => handle.set_config(config),
        None => match log4rs::init_config(config) {
            Ok(installed) => *handle = Some(installed),
            // The host installed its own logger first. Only the level can be honored.
            Err(_) => log::set_max_level(settings.level),
        },
    }
    Ok(())
}
