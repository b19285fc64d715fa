//! Task scoring framework.
//!
//! A scorer is a named, pure function from a task (and a fixed `now`) to a
//! non-negative number; higher means more urgent. The service holds an
//! ordered registry of scorers and ranks task sets by the summed score.
//! Determinism matters: for a fixed `now`, every scorer returns the same
//! value across repeated calls, which the tests assert with frozen clocks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::Task;

/// Names of the built-in scorers, in registry order.
pub const BUILTIN_SCORER_NAMES: [&str; 5] =
    ["fifo", "priority", "due-date", "blocking", "combined"];

/// True when `name` names a built-in scorer.
pub fn is_known_scorer(name: &str) -> bool {
    BUILTIN_SCORER_NAMES.contains(&name)
}

/// Injected lookup for how many open tasks a task currently blocks.
pub type BlockingCountFn = Box<dyn Fn(&Task) -> usize + Send + Sync>;

/// A named, deterministic urgency function
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Non-negative urgency of `task` at the instant `now`.
    fn score(&self, task: &Task, now: DateTime<Utc>) -> f64;
}

/// Age-based score: one point per day since creation.
///
/// Prevents starvation of old tasks.
pub struct FifoScorer;

impl Scorer for FifoScorer {
    fn name(&self) -> &str {
        "fifo"
    }

    fn description(&self) -> &str {
        "Age in days since creation"
    }

    fn score(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let age = (now - task.created_at).num_seconds() as f64 / 86_400.0;
        age.max(0.0)
    }
}

/// Label-driven priority weights, case-insensitive, max over labels.
pub struct PriorityScorer;

const PRIORITY_WEIGHTS: &[(&str, f64)] = &[
    ("critical", 1000.0),
    ("p0", 1000.0),
    ("urgent", 500.0),
    ("p1", 500.0),
    ("high", 100.0),
    ("p2", 100.0),
    ("medium", 50.0),
    ("p3", 50.0),
    ("low", 10.0),
    ("p4", 10.0),
];

impl Scorer for PriorityScorer {
    fn name(&self) -> &str {
        "priority"
    }

    fn description(&self) -> &str {
        "Weight of the most urgent priority label"
    }

    fn score(&self, task: &Task, _now: DateTime<Utc>) -> f64 {
        task.labels
            .iter()
            .filter_map(|label| {
                let lower = label.to_ascii_lowercase();
                PRIORITY_WEIGHTS
                    .iter()
                    .find(|(name, _)| *name == lower)
                    .map(|(_, weight)| *weight)
            })
            .fold(0.0, f64::max)
    }
}

/// Deadline pressure: overdue tasks dominate, near-due tasks rise.
pub struct DueDateScorer;

impl Scorer for DueDateScorer {
    fn name(&self) -> &str {
        "due-date"
    }

    fn description(&self) -> &str {
        "Pressure from an approaching or missed due date"
    }

    fn score(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let Some(due) = task.due_date else {
            return 0.0;
        };
        if due < now {
            let days_overdue = (now - due).num_days() as f64;
            return 1000.0 + days_overdue * 10.0;
        }
        let days_left = (due - now).num_days();
        if days_left <= 1 {
            500.0
        } else if days_left <= 7 {
            100.0 + (7 - days_left) as f64 * 10.0
        } else {
            (50.0 - days_left as f64).max(0.0)
        }
    }
}

/// Bottleneck elevation: 50 points per open task this one blocks.
///
/// The count comes from an injected function so the scorer itself stays
/// pure and testable.
pub struct BlockingScorer {
    count: BlockingCountFn,
}

impl BlockingScorer {
    pub fn new(count: BlockingCountFn) -> Self {
        Self { count }
    }
}

impl Scorer for BlockingScorer {
    fn name(&self) -> &str {
        "blocking"
    }

    fn description(&self) -> &str {
        "Elevates tasks that block other work"
    }

    fn score(&self, task: &Task, _now: DateTime<Utc>) -> f64 {
        (self.count)(task) as f64 * 50.0
    }
}

/// Weight vector for [`CombinedScorer`]
#[derive(Debug, Clone, Serialize)]
pub struct ScoringWeights {
    pub priority: f64,
    pub due_date: f64,
    pub fifo: f64,
    /// Blocking contribution is opt-in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<f64>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            priority: 0.5,
            due_date: 0.3,
            fifo: 0.2,
            blocking: None,
        }
    }
}

/// Weighted sum of the other built-in scorers. The board-level default.
pub struct CombinedScorer {
    weights: ScoringWeights,
    blocking: Option<BlockingScorer>,
}

impl CombinedScorer {
    pub fn new(weights: ScoringWeights, blocking_count: Option<BlockingCountFn>) -> Self {
        let blocking = blocking_count.map(BlockingScorer::new);
        Self { weights, blocking }
    }
}

impl Scorer for CombinedScorer {
    fn name(&self) -> &str {
        "combined"
    }

    fn description(&self) -> &str {
        "Weighted blend of priority, due date, age, and blocking"
    }

    fn score(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let mut total = self.weights.priority * PriorityScorer.score(task, now)
            + self.weights.due_date * DueDateScorer.score(task, now)
            + self.weights.fifo * FifoScorer.score(task, now);
        if let (Some(weight), Some(blocking)) = (self.weights.blocking, &self.blocking) {
            total += weight * blocking.score(task, now);
        }
        total
    }
}

/// A task with its evaluated score
#[derive(Serialize)]
pub struct ScoredTask {
    pub task: Task,
    pub total: f64,
    /// Per-scorer contributions in registry order
    pub breakdown: Vec<(String, f64)>,
}

/// Ordered registry of active scorers
pub struct ScoringService {
    scorers: Vec<Box<dyn Scorer>>,
}

impl ScoringService {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    /// Registry with every built-in scorer, in the standard order.
    ///
    /// `blocking_count` is typically backed by
    /// [`LinkService::blocking_count`](crate::links::LinkService::blocking_count).
    pub fn with_builtins(
        blocking_count: impl Fn(&Task) -> usize + Send + Sync + Clone + 'static,
    ) -> Self {
        let mut service = Self::new();
        service.scorers.push(Box::new(FifoScorer));
        service.scorers.push(Box::new(PriorityScorer));
        service.scorers.push(Box::new(DueDateScorer));
        service
            .scorers
            .push(Box::new(BlockingScorer::new(Box::new(
                blocking_count.clone(),
            ))));
        service.scorers.push(Box::new(CombinedScorer::new(
            ScoringWeights::default(),
            Some(Box::new(blocking_count)),
        )));
        service
    }

    /// Names of the active scorers, in evaluation order.
    pub fn scorer_names(&self) -> Vec<&str> {
        self.scorers.iter().map(|s| s.name()).collect()
    }

    /// Append a scorer. Fails when the name is already registered.
    pub fn add_scorer(&mut self, scorer: Box<dyn Scorer>) -> Result<()> {
        if self.scorers.iter().any(|s| s.name() == scorer.name()) {
            return Err(Error::validation(
                "scorer",
                format!("scorer '{}' is already registered", scorer.name()),
            ));
        }
        self.scorers.push(scorer);
        Ok(())
    }

    /// Remove a scorer by name.
    pub fn remove_scorer(&mut self, name: &str) -> Result<()> {
        let before = self.scorers.len();
        self.scorers.retain(|s| s.name() != name);
        if self.scorers.len() == before {
            return Err(Error::NotFound {
                entity: "scorer",
                id: name.to_string(),
            });
        }
        Ok(())
    }

    /// Evaluate every scorer against one task at the current instant.
    pub fn score_task(&self, task: &Task) -> ScoredTask {
        self.score_task_at(task, Utc::now())
    }

    /// Evaluate every scorer at a fixed instant. Tests freeze `now` here.
    pub fn score_task_at(&self, task: &Task, now: DateTime<Utc>) -> ScoredTask {
        let breakdown: Vec<(String, f64)> = self
            .scorers
            .iter()
            .map(|scorer| (scorer.name().to_string(), scorer.score(task, now)))
            .collect();
        let total = breakdown.iter().map(|(_, score)| score).sum();
        ScoredTask {
            task: task.clone(),
            total,
            breakdown,
        }
    }

    /// Score and sort a task set, most urgent first. Stable on ties.
    pub fn rank_tasks(&self, tasks: Vec<Task>) -> Vec<ScoredTask> {
        self.rank_tasks_at(tasks, Utc::now())
    }

    /// [`rank_tasks`](Self::rank_tasks) at a fixed instant.
    pub fn rank_tasks_at(&self, tasks: Vec<Task>, now: DateTime<Utc>) -> Vec<ScoredTask> {
        let mut scored: Vec<ScoredTask> = tasks
            .into_iter()
            .map(|task| self.score_task_at(&task, now))
            .collect();
        scored.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}

impl Default for ScoringService {
    fn default() -> Self {
        Self::new()
    }
}
