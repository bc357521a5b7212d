//! Genetic search over unit orderings.
//!
//! Every generation is decoded by the [`Packer`] and scored by the
//! [`Evaluator`]; selection, crossover and mutation then breed the next one
//! from a single seeded RNG, so a fixed seed gives a fixed result whether
//! or not evaluation runs in parallel.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::catalog::{PartCatalog, StockCatalog};
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, Fitness, Summary};
use crate::genome::{Genome, Heuristic};
use crate::packer::{Decoder, Packer};
use crate::types::{Layout, Part, SheetType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    /// Upper bound on generations bred after the initial population.
    pub generations: usize,
    /// Stop once the best fitness has not improved for this many generations.
    pub stall_limit: Option<usize>,
    /// Fraction of each generation copied unchanged into the next. At least
    /// one genome is always kept.
    pub elitism: f64,
    pub crossover_rate: f64,
    /// Probability that a child is mutated.
    pub mutation_rate: f64,
    pub tournament_size: usize,
    /// Seed for the PRNG. If undefined, the run is seeded from OS entropy.
    pub seed: Option<u64>,
    pub time_limit_ms: Option<u64>,
    pub decoder: Decoder,
    /// Seed the first generation with largest-first orderings.
    pub heuristic_seeding: bool,
    /// Decode and score each generation on the rayon thread pool.
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            stall_limit: Some(20),
            elitism: 0.1,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            tournament_size: 3,
            seed: Some(0),
            time_limit_ms: None,
            decoder: Decoder::default(),
            heuristic_seeding: true,
            parallel: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    pub fn with_stall_limit(mut self, limit: Option<usize>) -> Self {
        self.stall_limit = limit;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_time_limit(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));

        if self.population_size < 2 {
            return invalid(format!(
                "population size must be at least 2, got {}",
                self.population_size
            ));
        }
        if self.generations == 0 {
            return invalid("generations must be at least 1".to_string());
        }
        if !(self.elitism.is_finite() && (0.0..1.0).contains(&self.elitism)) {
            return invalid(format!(
                "elitism must be in [0, 1), got {}",
                self.elitism
            ));
        }
        for (name, rate) in [
            ("crossover rate", self.crossover_rate),
            ("mutation rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("{name} must be in [0, 1], got {rate}"));
            }
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return invalid(format!(
                "tournament size must be between 1 and the population size ({}), got {}",
                self.population_size, self.tournament_size
            ));
        }
        if self.stall_limit == Some(0) {
            return invalid("stall limit must be at least 1".to_string());
        }
        if self.time_limit_ms == Some(0) {
            return invalid("time limit must be positive".to_string());
        }
        Ok(())
    }

    pub fn elite_count(&self) -> usize {
        ((self.population_size as f64 * self.elitism) as usize).max(1)
    }
}

/// Cooperative cancellation, checked between generations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing to cut.
    Empty,
    Generations,
    Stalled,
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub generation: usize,
    pub best: Fitness,
    pub elapsed_ms: u64,
}

pub type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimized {
    /// Best layout seen in any generation.
    pub layout: Layout,
    pub fitness: Fitness,
    pub summary: Summary,
    pub generations: usize,
    pub stop_reason: StopReason,
    /// Best fitness of the population, initial population first.
    pub history: Vec<Fitness>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
struct Evaluated {
    genome: Genome,
    layout: Layout,
    fitness: Fitness,
}

fn rank(a: &Evaluated, b: &Evaluated) -> CmpOrdering {
    a.fitness
        .cmp(&b.fitness)
        .then_with(|| a.genome.cmp(&b.genome))
}

pub struct Optimizer {
    config: OptimizerConfig,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self, parts: &[Part], sheet_types: &[SheetType]) -> Result<Optimized> {
        let start = Instant::now();
        let parts = PartCatalog::new(parts.to_vec())?;
        let stock = StockCatalog::new(sheet_types.to_vec())?;
        let evaluator = Evaluator::new(&stock);

        if parts.is_empty() {
            let layout = Layout::default();
            return Ok(Optimized {
                fitness: evaluator.score(&layout),
                summary: evaluator.summary(&layout),
                layout,
                generations: 0,
                stop_reason: StopReason::Empty,
                history: Vec::new(),
                elapsed_ms: 0,
            });
        }

        let packer = Packer::new(&parts, &stock, self.config.decoder)?;
        let mut rng = match self.config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let time_limit = self.config.time_limit_ms.map(Duration::from_millis);
        let elites = self.config.elite_count();

        info!(
            units = parts.unit_count(),
            sheet_types = stock.sheet_types().len(),
            population = self.config.population_size,
            decoder = ?self.config.decoder,
            "starting optimization"
        );

        let initial = self.initial_population(&parts, &stock, &mut rng);
        let mut population = self.evaluate(&packer, &evaluator, initial)?;
        let mut best = population[0].clone();
        let mut history = vec![best.fitness];
        let mut stalled = 0;
        let mut generation = 0;

        let stop_reason = loop {
            if generation >= self.config.generations {
                break StopReason::Generations;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(limit) = time_limit
                && start.elapsed() >= limit
            {
                break StopReason::Deadline;
            }

            let offspring = self.breed(&population, &parts, &mut rng);
            let mut next = self.evaluate(&packer, &evaluator, offspring)?;
            // elites take the places of the weakest offspring
            next.truncate(self.config.population_size - elites);
            next.extend(population.drain(..elites));
            next.sort_by(rank);
            population = next;
            generation += 1;

            // a genome-order tie replaces the best but is no improvement
            let improved = population[0].fitness < best.fitness;
            if rank(&population[0], &best) == CmpOrdering::Less {
                best = population[0].clone();
            }
            if improved {
                stalled = 0;
                info!(generation, best = %best.fitness, "new best layout");
            } else {
                stalled += 1;
            }
            history.push(population[0].fitness);
            debug!(generation, best = %best.fitness, stalled, "generation evaluated");

            if let Some(callback) = &self.progress {
                callback(&Progress {
                    generation,
                    best: best.fitness,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }

            if let Some(limit) = self.config.stall_limit
                && stalled >= limit
            {
                break StopReason::Stalled;
            }
        };

        let violations = packer.violations(&best.layout);
        if !violations.is_empty() {
            error!(?violations, "best layout breaks placement rules");
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            generations = generation,
            stop = ?stop_reason,
            best = %best.fitness,
            elapsed_ms,
            "optimization finished"
        );

        Ok(Optimized {
            summary: evaluator.summary(&best.layout),
            fitness: best.fitness,
            layout: best.layout,
            generations: generation,
            stop_reason,
            history,
            elapsed_ms,
        })
    }

    fn initial_population(
        &self,
        parts: &PartCatalog,
        stock: &StockCatalog,
        rng: &mut SmallRng,
    ) -> Vec<Genome> {
        let size = self.config.population_size;
        let mut genomes = Vec::with_capacity(size);

        if self.config.heuristic_seeding {
            let landscape = stock
                .by_price()
                .first()
                .map(|&t| stock.sheet(t).width >= stock.sheet(t).height)
                .unwrap_or(true);
            genomes.extend(
                Heuristic::ALL
                    .iter()
                    .take(size)
                    .map(|&h| Genome::sorted_by(parts, h, landscape)),
            );
        }
        while genomes.len() < size {
            genomes.push(Genome::random(parts, rng));
        }
        genomes
    }

    /// Decodes and scores `genomes`, best first.
    fn evaluate(
        &self,
        packer: &Packer,
        evaluator: &Evaluator,
        genomes: Vec<Genome>,
    ) -> Result<Vec<Evaluated>> {
        let decode = |genome: Genome| -> Result<Evaluated> {
            let layout = packer.pack(&genome)?;
            let fitness = evaluator.score(&layout);
            Ok(Evaluated {
                genome,
                layout,
                fitness,
            })
        };

        let mut evaluated = if self.config.parallel {
            genomes.into_par_iter().map(decode).collect::<Result<Vec<_>>>()?
        } else {
            genomes.into_iter().map(decode).collect::<Result<Vec<_>>>()?
        };
        evaluated.sort_by(rank);
        Ok(evaluated)
    }

    /// A full generation of children from tournament-selected parents.
    fn breed(&self, population: &[Evaluated], parts: &PartCatalog, rng: &mut SmallRng) -> Vec<Genome> {
        let size = self.config.population_size;
        let mut children = Vec::with_capacity(size + 1);

        while children.len() < size {
            let a = &population[self.tournament(population.len(), rng)].genome;
            let b = &population[self.tournament(population.len(), rng)].genome;

            let (mut c1, mut c2) = if rng.random_bool(self.config.crossover_rate) {
                a.ordered_crossover(b, rng)
            } else {
                (a.clone(), b.clone())
            };
            for child in [&mut c1, &mut c2] {
                if rng.random_bool(self.config.mutation_rate) {
                    child.mutate(parts, rng);
                }
            }
            children.push(c1);
            children.push(c2);
        }

        children.truncate(size);
        children
    }

    /// Index of the best of `tournament_size` random picks; `population` is
    /// sorted, so the lowest index wins.
    fn tournament(&self, len: usize, rng: &mut SmallRng) -> usize {
        (0..self.config.tournament_size)
            .map(|_| rng.random_range(0..len))
            .min()
            .unwrap_or(0)
    }
}

/// Runs the genetic optimizer with `config` and returns the best layout found.
pub fn optimize(
    parts: &[Part],
    sheet_types: &[SheetType],
    config: &OptimizerConfig,
) -> Result<Optimized> {
    Optimizer::new(config.clone())?.run(parts, sheet_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Grain;
    use std::sync::atomic::AtomicUsize;

    fn kitchen() -> (Vec<Part>, Vec<SheetType>) {
        let parts = vec![
            Part::new("side", 720, 560, 6),
            Part::new("base", 564, 560, 3),
            Part::new("shelf", 564, 500, 6),
            Part::new("door", 715, 397, 6).with_grain(Grain::AlongHeight),
            Part::new("drawer-front", 397, 140, 6).with_grain(Grain::AlongWidth),
            Part::new("plinth", 1800, 100, 2),
        ];
        let sheets = vec![
            SheetType::new("board", 2440, 1220, 40.0)
                .with_kerf(3)
                .with_grain(Grain::AlongWidth),
            SheetType::new("jumbo", 3050, 1220, 55.0)
                .with_kerf(3)
                .with_grain(Grain::AlongWidth),
        ];
        (parts, sheets)
    }

    fn quick() -> OptimizerConfig {
        OptimizerConfig::default()
            .with_population_size(20)
            .with_generations(15)
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(OptimizerConfig::default().validate().is_ok());
        assert_eq!(OptimizerConfig::default().elite_count(), 5);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let base = OptimizerConfig::default();
        let bad = [
            OptimizerConfig { population_size: 0, ..base.clone() },
            OptimizerConfig { generations: 0, ..base.clone() },
            OptimizerConfig { elitism: 1.0, ..base.clone() },
            OptimizerConfig { elitism: f64::NAN, ..base.clone() },
            OptimizerConfig { mutation_rate: 1.5, ..base.clone() },
            OptimizerConfig { crossover_rate: -0.1, ..base.clone() },
            OptimizerConfig { tournament_size: 0, ..base.clone() },
            OptimizerConfig { tournament_size: 51, ..base.clone() },
            OptimizerConfig { stall_limit: Some(0), ..base.clone() },
            OptimizerConfig { time_limit_ms: Some(0), ..base.clone() },
        ];
        for config in bad {
            let (parts, sheets) = kitchen();
            let err = optimize(&parts, &sheets, &config).err();
            assert!(
                matches!(err, Some(Error::InvalidConfiguration(_))),
                "{config:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_elitism_zero_still_keeps_one() {
        let config = OptimizerConfig { elitism: 0.0, ..OptimizerConfig::default() };
        assert_eq!(config.elite_count(), 1);
    }

    #[test]
    fn test_empty_parts() {
        let result = optimize(&[], &[], &OptimizerConfig::default()).unwrap();
        assert!(result.layout.is_empty());
        assert_eq!(result.fitness.sheets, 0);
        assert_eq!(result.fitness.waste, 0);
        assert_eq!(result.stop_reason, StopReason::Empty);
    }

    #[test]
    fn test_fixed_seed_reproducible() {
        let (parts, sheets) = kitchen();
        let a = optimize(&parts, &sheets, &quick().with_seed(42)).unwrap();
        let b = optimize(&parts, &sheets, &quick().with_seed(42)).unwrap();
        assert_eq!(a.layout, b.layout);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (parts, sheets) = kitchen();
        let parallel = optimize(&parts, &sheets, &quick()).unwrap();
        let sequential = optimize(
            &parts,
            &sheets,
            &OptimizerConfig { parallel: false, ..quick() },
        )
        .unwrap();
        assert_eq!(parallel.layout, sequential.layout);
        assert_eq!(parallel.fitness, sequential.fitness);
    }

    #[test]
    fn test_history_never_regresses() {
        let (parts, sheets) = kitchen();
        let config = OptimizerConfig { heuristic_seeding: false, ..quick() }
            .with_generations(40)
            .with_stall_limit(None);
        let result = optimize(&parts, &sheets, &config).unwrap();
        assert_eq!(result.history.len(), result.generations + 1);
        for pair in result.history.windows(2) {
            assert!(pair[1] <= pair[0], "{} after {}", pair[1], pair[0]);
        }
        assert_eq!(result.history.last(), Some(&result.fitness));
    }

    #[test]
    fn test_stall_limit_stops_early() {
        let parts = vec![Part::new("only", 100, 100, 1)];
        let sheets = vec![SheetType::new("s", 1000, 1000, 1.0)];
        let config = quick().with_generations(1000).with_stall_limit(Some(3));
        let result = optimize(&parts, &sheets, &config).unwrap();
        assert_eq!(result.stop_reason, StopReason::Stalled);
        assert_eq!(result.generations, 3);
        assert_eq!(result.layout.sheet_count(), 1);
    }

    #[test]
    fn test_equal_fitness_counts_as_stall() {
        // every ordering of identical squares packs to the same fitness
        let parts = vec![Part::new("square", 100, 100, 12)];
        let sheets = vec![SheetType::new("s", 1000, 1000, 1.0)];
        let config = OptimizerConfig { heuristic_seeding: false, ..quick() }
            .with_generations(500)
            .with_stall_limit(Some(3));
        let result = optimize(&parts, &sheets, &config).unwrap();
        assert_eq!(result.stop_reason, StopReason::Stalled);
        assert_eq!(result.generations, 3);
        assert!(result.history.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_cancelled_mid_run() {
        let (parts, sheets) = kitchen();
        let optimizer = Optimizer::new(quick().with_generations(100).with_stall_limit(None)).unwrap();
        let token = optimizer.cancel_token();
        let result = optimizer
            .with_progress(Box::new(move |progress| {
                if progress.generation == 4 {
                    token.cancel();
                }
            }))
            .run(&parts, &sheets)
            .unwrap();
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert_eq!(result.generations, 4);
        assert_eq!(result.history.len(), 5);
        let units: u32 = parts.iter().map(|p| p.quantity).sum();
        assert_eq!(result.layout.placements.len(), units as usize);
    }

    #[test]
    fn test_cancelled_before_first_generation() {
        let (parts, sheets) = kitchen();
        let token = CancelToken::new();
        token.cancel();
        let result = Optimizer::new(quick())
            .unwrap()
            .with_cancel_token(token)
            .run(&parts, &sheets)
            .unwrap();
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert_eq!(result.generations, 0);
        let units: u32 = parts.iter().map(|p| p.quantity).sum();
        assert_eq!(result.layout.placements.len(), units as usize);
    }

    #[test]
    fn test_deadline() {
        let (parts, sheets) = kitchen();
        let config = quick()
            .with_generations(usize::MAX)
            .with_stall_limit(None)
            .with_time_limit(1);
        let result = optimize(&parts, &sheets, &config).unwrap();
        assert_eq!(result.stop_reason, StopReason::Deadline);
    }

    #[test]
    fn test_progress_reported_each_generation() {
        let (parts, sheets) = kitchen();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let result = Optimizer::new(quick().with_stall_limit(None))
            .unwrap()
            .with_progress(Box::new(move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            }))
            .run(&parts, &sheets)
            .unwrap();
        assert_eq!(result.generations, 15);
        assert_eq!(calls.load(Ordering::Relaxed), 15);
    }

    #[test]
    fn test_unpackable_aborts() {
        let parts = vec![Part::new("worktop", 4000, 600, 1)];
        let sheets = vec![SheetType::new("board", 2440, 1220, 40.0)];
        let err = optimize(&parts, &sheets, &quick()).err();
        assert!(matches!(err, Some(Error::Unpackable { id, .. }) if id == "worktop"));
    }
}
