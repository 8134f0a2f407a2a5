use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::EpiError;
use crate::execution_stats::ExecutionStatistics;
use crate::log::{debug, error, info};
use crate::parameters::Parameters;
use crate::population::Population;
use crate::random::RandomManager;
use crate::report::Reporter;
use crate::simulation::{
    bind_sweep, report_all, setup_reporters, teardown_all, RunMonitor,
};
use crate::sweep::{Sweep, SweepAccess};

struct SweepGroup {
    access: SweepAccess,
    sweeps: Vec<Box<dyn Sweep>>,
}

/// Runs numbered groups of sweeps on a fixed-size rayon pool.
///
/// Groups run in ascending order. Each group is split into one task per worker slot, and
/// slot `s` always covers the same contiguous block of cells and draws from the generator of
/// slot `s`. Within a task the sweeps of the group run in the order they were added, each
/// over the whole block. The `false` a work unit may return is ignored here. A group
/// finishes on every cell before the next group starts, so a new-infection group sees
/// everything the transmission groups before it queued.
///
/// Fixed blocks do not balance load. When infections cluster in a few cells, the slots
/// holding those cells do most of the work while the others wait at the end of the group.
/// Splitting the work any finer would make the generator a cell draws from depend on
/// scheduling, and runs would no longer repeat for a given seed and thread count.
///
/// A group must contain only shared or only exclusive sweeps: shared tasks read the whole
/// population while exclusive tasks hold their block of cells mutably.
pub struct ThreadedSimulation {
    population: Population,
    parameters: Arc<Parameters>,
    random: RandomManager,
    pool: ThreadPool,
    groups: BTreeMap<usize, SweepGroup>,
    reporters: Vec<Box<dyn Reporter>>,
    show_progress: bool,
    statistics: Option<ExecutionStatistics>,
}

impl ThreadedSimulation {
    /// Creates a controller with a pool of `threads` workers and as many random slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be created.
    pub fn new(
        population: Population,
        parameters: Parameters,
        seed: u64,
        threads: usize,
    ) -> Result<Self, EpiError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("epiabm-worker-{i}"))
            .build()
            .map_err(|e| EpiError::EpiError(format!("could not start thread pool: {e}")))?;
        debug!("started a pool of {threads} workers");
        Ok(ThreadedSimulation {
            population,
            parameters: Arc::new(parameters),
            random: RandomManager::new(seed, threads),
            pool,
            groups: BTreeMap::new(),
            reporters: Vec::new(),
            show_progress: false,
            statistics: None,
        })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.random.num_slots()
    }

    /// Adds `sweep` to a new group after every existing one.
    pub fn add_sweep(&mut self, sweep: impl Sweep + 'static) {
        let group = self
            .groups
            .last_key_value()
            .map_or(0, |(group, _)| group + 1);
        let access = sweep.access();
        self.groups.insert(
            group,
            SweepGroup {
                access,
                sweeps: vec![Box::new(sweep)],
            },
        );
    }

    /// Adds `sweep` to group `group`, after the sweeps already in it.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` if the group already holds sweeps with a different
    /// `SweepAccess`.
    pub fn add_sweep_to_group(
        &mut self,
        group: usize,
        sweep: impl Sweep + 'static,
    ) -> Result<(), EpiError> {
        let access = sweep.access();
        let entry = self.groups.entry(group).or_insert_with(|| SweepGroup {
            access,
            sweeps: Vec::new(),
        });
        if entry.access != access {
            return Err(EpiError::ConfigError(format!(
                "cannot add {:?} sweep {} to group {group} of {:?} sweeps",
                access,
                sweep.name(),
                entry.access
            )));
        }
        entry.sweeps.push(Box::new(sweep));
        Ok(())
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static) {
        self.reporters.push(Box::new(reporter));
    }

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
    pub fn execution_statistics(&self) -> Option<&ExecutionStatistics> {
        self.statistics.as_ref()
    }

    /// Runs `timesteps` timesteps.
    ///
    /// # Errors
    ///
    /// Returns the first error from binding a sweep, running a sweep group or a reporter. A
    /// failing group still finishes the cells already dispatched; no later group runs.
    pub fn simulate(&mut self, timesteps: u32) -> Result<(), EpiError> {
        info!(
            "simulating {timesteps} timesteps of {} people with {} sweep groups on {} threads",
            self.population.total_people(),
            self.groups.len(),
            self.threads()
        );
        for group in self.groups.values_mut() {
            for sweep in &mut group.sweeps {
                bind_sweep(sweep.as_mut(), &self.population, &self.parameters)?;
            }
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
            for (number, group) in &self.groups {
                run_group(
                    &self.pool,
                    &self.random,
                    &mut self.population,
                    group,
                    timestep,
                )
                .inspect_err(|e| {
                    error!("sweep group {number} failed at timestep {timestep}: {e}");
                })?;
            }
            report_all(&mut self.reporters, &self.population, timestep)?;
            monitor.timestep_done(timestep);
        }
        Ok(())
    }
}

/// Runs one group over every cell and returns once all tasks have finished.
fn run_group(
    pool: &ThreadPool,
    random: &RandomManager,
    population: &mut Population,
    group: &SweepGroup,
    timestep: u32,
) -> Result<(), EpiError> {
    let slots = random.num_slots();
    let cells = population.cells().len();
    if cells == 0 {
        return Ok(());
    }
    let block = cells.div_ceil(slots);
    let sweeps = &group.sweeps;

    match group.access {
        SweepAccess::Shared => {
            let population = &*population;
            pool.install(|| {
                (0..slots).into_par_iter().try_for_each(|slot| {
                    let mut rng = random.generator(slot);
                    let end = ((slot + 1) * block).min(cells);
                    for sweep in sweeps {
                        for cell in (slot * block).min(end)..end {
                            sweep.visit_cell(timestep, population, cell, &mut rng)?;
                        }
                    }
                    Ok(())
                })
            })
        }
        SweepAccess::Exclusive => pool.install(|| {
            population
                .cells_mut()
                .par_chunks_mut(block)
                .enumerate()
                .try_for_each(|(slot, cells)| {
                    let mut rng = random.generator(slot);
                    for sweep in sweeps {
                        for cell in cells.iter_mut() {
                            sweep.update_cell(timestep, cell, &mut rng)?;
                        }
                    }
                    Ok(())
                })
        }),
    }
}
