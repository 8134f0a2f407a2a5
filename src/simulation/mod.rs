//! The simulation controllers.
//!
//! A controller owns the population, the parameters, the random manager, the sweeps and the
//! reporters. `simulate(n)` runs the whole lifecycle:
//!
//! 1. bind every sweep to the population and parameters,
//! 2. rebuild the compartment counters and partitions from the current statuses,
//! 3. set up the reporters and report timestep 0,
//! 4. for each timestep `1..=n`, run every sweep to completion in order, then report,
//! 5. tear the reporters down.
//!
//! `Simulation` runs everything on the calling thread with worker slot 0.
//! `ThreadedSimulation` runs numbered groups of sweeps on a rayon pool.
mod threaded;

use std::sync::Arc;

pub use threaded::ThreadedSimulation;

use crate::error::EpiError;
use crate::execution_stats::{
    log_execution_statistics, ExecutionProfilingCollector, ExecutionStatistics,
};
use crate::log::{error, info};
use crate::parameters::Parameters;
use crate::population::Population;
#[cfg(feature = "progress_bar")]
use crate::progress::TimestepProgress;
use crate::random::RandomManager;
use crate::report::Reporter;
use crate::sweep::Sweep;

/// Tracks resource usage and progress over one `simulate` call.
pub(crate) struct RunMonitor {
    collector: ExecutionProfilingCollector,
    #[cfg(feature = "progress_bar")]
    progress: Option<TimestepProgress>,
    timesteps: u32,
}

impl RunMonitor {
    #[cfg_attr(not(feature = "progress_bar"), allow(unused_variables))]
    fn new(timesteps: u32, show_progress: bool) -> Self {
        RunMonitor {
            collector: ExecutionProfilingCollector::new(),
            #[cfg(feature = "progress_bar")]
            progress: show_progress.then(|| TimestepProgress::new(timesteps)),
            timesteps,
        }
    }

    fn timestep_done(&mut self, timestep: u32) {
        self.collector.refresh();
        #[cfg(feature = "progress_bar")]
        if let Some(progress) = &self.progress {
            progress.update(timestep);
        }
    }

    fn finish(mut self, population: &Population) -> ExecutionStatistics {
        let stats = self
            .collector
            .compute_final_statistics(population.total_people(), self.timesteps);
        log_execution_statistics(&stats);
        stats
    }
}

pub(crate) fn bind_sweep(
    sweep: &mut dyn Sweep,
    population: &Population,
    parameters: &Arc<Parameters>,
) -> Result<(), EpiError> {
    sweep.bind(population, parameters).inspect_err(|e| {
        error!("failed to bind {} sweep: {e}", sweep.name());
    })
}

pub(crate) fn setup_reporters(
    reporters: &mut [Box<dyn Reporter>],
    population: &Population,
) -> Result<(), EpiError> {
    for reporter in reporters.iter_mut() {
        reporter.setup(population)?;
    }
    report_all(reporters, population, 0)
}

pub(crate) fn report_all(
    reporters: &mut [Box<dyn Reporter>],
    population: &Population,
    timestep: u32,
) -> Result<(), EpiError> {
    for reporter in reporters {
        reporter.report(population, timestep)?;
    }
    Ok(())
}

/// Tears down every reporter, even after a failure. Returns the first error.
pub(crate) fn teardown_all(reporters: &mut [Box<dyn Reporter>]) -> Result<(), EpiError> {
    let mut result = Ok(());
    for reporter in reporters {
        if let Err(e) = reporter.teardown() {
            error!("reporter teardown failed: {e}");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

/// Runs sweeps one after another over every cell on the calling thread.
pub struct Simulation {
    population: Population,
    parameters: Arc<Parameters>,
    random: RandomManager,
    sweeps: Vec<Box<dyn Sweep>>,
    reporters: Vec<Box<dyn Reporter>>,
    show_progress: bool,
    statistics: Option<ExecutionStatistics>,
}

impl Simulation {
    #[must_use]
    pub fn new(population: Population, parameters: Parameters, seed: u64) -> Self {
        Simulation {
            population,
            parameters: Arc::new(parameters),
            random: RandomManager::new(seed, 1),
            sweeps: Vec::new(),
            reporters: Vec::new(),
            show_progress: false,
            statistics: None,
        }
    }

    /// Appends a sweep. Sweeps run in the order they were added.
    pub fn add_sweep(&mut self, sweep: impl Sweep + 'static) {
        self.sweeps.push(Box::new(sweep));
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static) {
        self.reporters.push(Box::new(reporter));
    }

    /// Shows a progress bar over the timesteps while simulating.
    pub fn enable_progress_bar(&mut self) {
        self.show_progress = true;
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    #[must_use]
    pub fn into_population(self) -> Population {
        self.population
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Resource usage of the last completed `simulate` call.
    #[must_use]
    pub fn execution_statistics(&self) -> Option<&ExecutionStatistics> {
        self.statistics.as_ref()
    }

    /// Runs `timesteps` timesteps.
    ///
    /// # Errors
    ///
    /// Returns the first error from binding a sweep, running a sweep or a reporter. The run
    /// stops at that point; reporters are still torn down.
    pub fn simulate(&mut self, timesteps: u32) -> Result<(), EpiError> {
        info!(
            "simulating {timesteps} timesteps of {} people with {} sweeps",
            self.population.total_people(),
            self.sweeps.len()
        );
        for sweep in &mut self.sweeps {
            bind_sweep(sweep.as_mut(), &self.population, &self.parameters)?;
        }
        self.population.initialize_counters();

        let mut monitor = RunMonitor::new(timesteps, self.show_progress);
        let result = self.run(timesteps, &mut monitor);
        let teardown = teardown_all(&mut self.reporters);
        result?;
        teardown?;
        self.statistics = Some(monitor.finish(&self.population));
        Ok(())
    }

    fn run(&mut self, timesteps: u32, monitor: &mut RunMonitor) -> Result<(), EpiError> {
        setup_reporters(&mut self.reporters, &self.population)?;
        for timestep in 1..=timesteps {
            for sweep in &self.sweeps {
                let mut rng = self.random.generator(0);
                sweep
                    .run(&mut self.population, timestep, &mut rng)
                    .inspect_err(|e| {
                        error!("{} sweep failed at timestep {timestep}: {e}", sweep.name());
                    })?;
            }
            report_all(&mut self.reporters, &self.population, timestep)?;
            monitor.timestep_done(timestep);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::error::EpiError;
    use crate::population::{CompartmentCounter, Population};
    use crate::report::Reporter;

    /// Keeps every report in memory, shared with the test through an `Rc`.
    #[derive(Clone, Default)]
    pub struct MemoryReporter {
        pub events: Rc<RefCell<Vec<String>>>,
        pub counts: Rc<RefCell<Vec<(u32, CompartmentCounter)>>>,
    }

    impl Reporter for MemoryReporter {
        fn setup(&mut self, _population: &Population) -> Result<(), EpiError> {
            self.events.borrow_mut().push("setup".to_string());
            Ok(())
        }

        fn report(&mut self, population: &Population, timestep: u32) -> Result<(), EpiError> {
            self.events.borrow_mut().push(format!("report {timestep}"));
            self.counts
                .borrow_mut()
                .push((timestep, population.compartment_totals()));
            Ok(())
        }

        fn teardown(&mut self) -> Result<(), EpiError> {
            self.events.borrow_mut().push("teardown".to_string());
            Ok(())
        }
    }
}
