//! Builds without the `logging` feature write nothing, but the `log` facade's max level still
//! follows the installed settings so that disabled messages cost nothing.

use crate::error::EpiError;
use crate::log::LogSettings;

pub(super) fn install(settings: &LogSettings) -> Result<(), EpiError> {
    let max = settings
        .module_filters
        .iter()
        .map(|&(_, level)| level)
        .fold(settings.level, Ord::max);
    log::set_max_level(max);
    Ok(())
}
