//! A console progress bar over the timesteps of a run.
//!
//! The controller initializes the bar when `simulate` starts and advances it after every
//! timestep. Log lines are routed around the bar by the progress bar encoder in `crate::log`.

use progress_bar::{
    finalize_progress_bar, init_progress_bar, set_progress_bar_action, set_progress_bar_progress,
    Color, Style,
};

use crate::log::trace;

pub(crate) struct TimestepProgress {
    timesteps: u32,
}

impl TimestepProgress {
    pub fn new(timesteps: u32) -> Self {
        trace!("initializing timestep progress bar over {timesteps} timesteps");
        init_progress_bar(timesteps as usize);
        set_progress_bar_action("Timestep", Color::Blue, Style::Bold);
        TimestepProgress { timesteps }
    }

    /// Records that `timestep` has completed. The bar is finalized at the last timestep.
    pub fn update(&self, timestep: u32) {
        let timestep = timestep.min(self.timesteps);
        set_progress_bar_progress(timestep as usize);
        if timestep == self.timesteps {
            finalize_progress_bar();
        }
    }
}
