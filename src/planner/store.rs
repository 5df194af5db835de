use super::types::{PlanObservation, PlanStatus, PlanStep};
use crate::error::PlanError;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// How `waitingForId` entries that no longer resolve to a step are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Unknown ids count as satisfied, so a stale reference never deadlocks
    /// the plan.
    #[default]
    Permissive,
    /// Unknown ids block readiness.
    Strict,
}

/// Aggregate counts over the live plan generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanProgress {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub abandoned: usize,
}

#[derive(Debug, Default)]
struct Generation {
    order: Vec<String>,
    steps: HashMap<String, PlanStep>,
}

impl Generation {
    fn is_ready(&self, step: &PlanStep, policy: DependencyPolicy) -> bool {
        if step.status != PlanStatus::Pending {
            return false;
        }
        step.waiting_for_id
            .iter()
            .all(|dep_id| match self.steps.get(dep_id) {
                Some(dep) => dep.status == PlanStatus::Completed,
                None => policy == DependencyPolicy::Permissive,
            })
    }

    fn ordered(&self) -> impl Iterator<Item = &PlanStep> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }
}

/// Holds exactly one plan generation at a time.
///
/// The orchestrator is the only writer; the lock lets reporting paths take
/// snapshots safely and is never held across an await point.
#[derive(Debug, Default)]
pub struct PlanStore {
    state: RwLock<Generation>,
    policy: DependencyPolicy,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DependencyPolicy) -> Self {
        Self {
            state: RwLock::default(),
            policy,
        }
    }

    pub fn policy(&self) -> DependencyPolicy {
        self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, Generation> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Generation> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard the current generation and install `steps` in submission order.
    ///
    /// A repeated id keeps its first position and takes the later value.
    pub fn replace(&self, steps: Vec<PlanStep>) {
        let mut next = Generation {
            order: Vec::with_capacity(steps.len()),
            steps: HashMap::with_capacity(steps.len()),
        };
        for step in steps {
            if next.steps.contains_key(&step.id) {
                warn!(step_id = %step.id, "plan.duplicate_step_id");
            } else {
                next.order.push(step.id.clone());
            }
            next.steps.insert(step.id.clone(), step);
        }

        let step_count = next.order.len();
        *self.write() = next;
        debug!(steps = step_count, "plan.replace");
    }

    /// Deep copy of every step in stored order.
    pub fn snapshot(&self) -> Vec<PlanStep> {
        self.read().ordered().cloned().collect()
    }

    /// First pending step, in stored order, whose dependencies are satisfied.
    pub fn ready(&self) -> Option<PlanStep> {
        let state = self.read();
        state
            .ordered()
            .find(|step| state.is_ready(step, self.policy))
            .cloned()
    }

    /// Set `status` on step `id` and attach `observation` when given.
    pub fn update_status(
        &self,
        id: &str,
        status: PlanStatus,
        observation: Option<PlanObservation>,
    ) -> Result<(), PlanError> {
        let mut state = self.write();
        let step = state
            .steps
            .get_mut(id)
            .ok_or_else(|| PlanError::UnknownStep(id.to_string()))?;
        step.status = status;
        if let Some(observation) = observation {
            step.observation = Some(observation);
        }
        debug!(step_id = %id, status = %status, "plan.update_status");
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.read().steps.values().any(PlanStep::is_pending)
    }

    /// True only for a non-empty plan whose every step completed.
    pub fn completed(&self) -> bool {
        let state = self.read();
        !state.steps.is_empty()
            && state
                .steps
                .values()
                .all(|step| step.status == PlanStatus::Completed)
    }

    pub fn is_empty(&self) -> bool {
        self.read().steps.is_empty()
    }

    pub fn progress(&self) -> PlanProgress {
        let state = self.read();
        let mut progress = PlanProgress {
            total: state.steps.len(),
            ..PlanProgress::default()
        };
        for step in state.steps.values() {
            match step.status {
                PlanStatus::Pending => progress.pending += 1,
                PlanStatus::Completed => progress.completed += 1,
                PlanStatus::Failed => progress.failed += 1,
                PlanStatus::Abandoned => progress.abandoned += 1,
            }
        }
        progress
    }
}
