//! Diagnostic logging for the simulation machinery. This is separate from _reporting_ (see
//! `crate::report`), which records compartment counts for analysis.
//!
//! The five `log` macros are re-exported from here. Nothing is emitted until the host driver
//! builds a [`LogSettings`] and installs it:
//!
//! ```rust
//! use epiabm::log::{LevelFilter, LogSettings};
//!
//! LogSettings::new(LevelFilter::Info)
//!     // Follow every enqueued infection in the household sweep.
//!     .with_module_filter("epiabm::sweep::household", LevelFilter::Trace)
//!     .install()
//!     .unwrap();
//! ```
//!
//! With the `logging` feature, messages go to a `log4rs` console appender. Without it only
//! the `log` facade's max level is set.
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

#[cfg(all(feature = "logging", feature = "progress_bar"))]
mod progress_bar_encoder;

pub use log::{debug, error, info, trace, warn, LevelFilter};

use crate::error::EpiError;

/// Per-person transmission messages are noisy, so the sweeps log at `Info` unless told
/// otherwise.
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] = [("epiabm::sweep", LevelFilter::Info)];

/// A global level plus level overrides for module paths such as `"epiabm::simulation"`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSettings {
    level: LevelFilter,
    module_filters: Vec<(String, LevelFilter)>,
}

impl Default for LogSettings {
    /// Logging off, with the default module filters.
    fn default() -> Self {
        LogSettings::new(LevelFilter::Off)
    }
}

impl LogSettings {
    #[must_use]
    pub fn new(level: LevelFilter) -> Self {
        LogSettings {
            level,
            module_filters: DEFAULT_MODULE_FILTERS
                .iter()
                .map(|&(module, level)| (module.to_string(), level))
                .collect(),
        }
    }

    /// Sets the filter for `module`, replacing any filter it already had.
    #[must_use]
    pub fn with_module_filter(mut self, module: &str, level: LevelFilter) -> Self {
        match self.module_filters.iter_mut().find(|(m, _)| m == module) {
            Some(entry) => entry.1 = level,
            None => self.module_filters.push((module.to_string(), level)),
        }
        self
    }

    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    #[must_use]
    pub fn module_filter(&self, module: &str) -> Option<LevelFilter> {
        self.module_filters
            .iter()
            .find(|(m, _)| m == module)
            .map(|&(_, level)| level)
    }

    /// Makes these settings the process-wide logging configuration, replacing whatever was
    /// installed before.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` if the logger rejects the settings.
    pub fn install(&self) -> Result<(), EpiError> {
        #[cfg(feature = "logging")]
        return standard_logger::install(self);
        #[cfg(not(feature = "logging"))]
        return null_logger::install(self);
    }
}

#[cfg(test)]
mod tests {
    use super::{LevelFilter, LogSettings};
    use log::{error, trace};
    use std::sync::{LazyLock, Mutex};

    // The installed logger is global, so tests that install run one at a time
    static INSTALL_LOCK: LazyLock<Mutex<()>> = LazyLock::new(Mutex::default);

    #[test]
    fn defaults_quiet_the_sweeps() {
        let settings = LogSettings::default();
        assert_eq!(settings.level(), LevelFilter::Off);
        assert_eq!(
            settings.module_filter("epiabm::sweep"),
            Some(LevelFilter::Info)
        );
        assert_eq!(settings.module_filter("epiabm::simulation"), None);
    }

    #[test]
    fn module_filters_replace_earlier_ones() {
        let settings = LogSettings::new(LevelFilter::Warn)
            .with_module_filter("epiabm::sweep", LevelFilter::Error)
            .with_module_filter("epiabm::simulation", LevelFilter::Debug)
            .with_module_filter("epiabm::simulation", LevelFilter::Trace);
        assert_eq!(settings.level(), LevelFilter::Warn);
        assert_eq!(
            settings.module_filter("epiabm::sweep"),
            Some(LevelFilter::Error)
        );
        assert_eq!(
            settings.module_filter("epiabm::simulation"),
            Some(LevelFilter::Trace)
        );
    }

    #[test]
    fn install_sets_the_max_level() {
        let _guard = INSTALL_LOCK.lock().unwrap();
        LogSettings::new(LevelFilter::Error).install().unwrap();
        assert!(log::max_level() >= LevelFilter::Error);
        error!("install_sets_the_max_level: emitted");
        trace!("install_sets_the_max_level: not emitted");

        // Reinstalling replaces the earlier settings
        LogSettings::new(LevelFilter::Trace).install().unwrap();
        assert_eq!(log::max_level(), LevelFilter::Trace);
        LogSettings::default().install().unwrap();
    }
}
