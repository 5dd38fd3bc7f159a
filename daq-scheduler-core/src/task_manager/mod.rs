//! # Task Manager (C4)
//!
//! Holds the task catalog, the registries needed to turn a descriptor into
//! a concrete, constraint-annotated resource request, and the agent cache
//! (C3) as an embedded collaborator, updated on every accepted offer (spec
//! §4.3, §4.4). The catalog and the pending-descriptor list are guarded by
//! the single state mutex described in spec §5; callers (principally the
//! offer matcher, C7) take [`TaskManagerState::lock`] for the whole of a
//! per-offer matching pass and release it before issuing any network call.

mod constraints;

pub use constraints::ConstraintRegistry;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent_cache::AgentCache;
use crate::domain::offer::Offer;
use crate::domain::task::{ExecutorId, Task, TaskId, TaskLifecycleState};
use crate::domain::{ResourceDemand, TaskDescriptor};

/// How long a terminal task's record is kept around after its last status
/// update, before `sweep_terminal` removes it (spec §4.4).
const DEFAULT_TERMINAL_GRACE: Duration = Duration::from_secs(30);

/// Registry of declared resource demand per task class, populated from the
/// workflow template at deploy time.
#[derive(Debug, Default)]
pub struct ClassDemandRegistry {
    demands: HashMap<String, ResourceDemand>,
}

impl ClassDemandRegistry {
    pub fn register(&mut self, class_name: impl Into<String>, demand: ResourceDemand) {
        self.demands.insert(class_name.into(), demand);
    }

    pub fn get(&self, class_name: &str) -> Option<&ResourceDemand> {
        self.demands.get(class_name)
    }
}

/// The task catalog plus its supporting registries (spec §4.4). The agent
/// cache (C3) is an embedded collaborator here rather than a freestanding
/// component, per spec §4.4's listing of it under the task manager.
#[derive(Debug, Default)]
pub struct TaskManager {
    catalog: HashMap<TaskId, Task>,
    class_demands: ClassDemandRegistry,
    constraints: ConstraintRegistry,
    terminal_since: HashMap<TaskId, Instant>,
    terminal_grace: Duration,
    agent_cache: AgentCache,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            terminal_grace: DEFAULT_TERMINAL_GRACE,
            ..Default::default()
        }
    }

    pub fn class_demands_mut(&mut self) -> &mut ClassDemandRegistry {
        &mut self.class_demands
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintRegistry {
        &mut self.constraints
    }

    pub fn agent_cache(&self) -> &AgentCache {
        &self.agent_cache
    }

    /// *GetWantsForDescriptor* (spec §4.4): declared demand for a
    /// descriptor's class, or `None` when the class is unknown (the
    /// descriptor is silently skipped by the offer matcher in that case).
    pub fn get_wants_for_descriptor(&self, descriptor: &TaskDescriptor) -> Option<&ResourceDemand> {
        self.class_demands.get(&descriptor.class_name)
    }

    /// *BuildDescriptorConstraints* (spec §4.4): returns `descriptors` with
    /// each one's constraint set replaced by the union of its own
    /// constraints, its class's registered constraints, and its role
    /// path's inherited constraints.
    pub fn build_descriptor_constraints(&self, descriptors: &[TaskDescriptor]) -> Vec<TaskDescriptor> {
        descriptors
            .iter()
            .map(|d| {
                let mut merged = d.constraints.clone();
                merged.extend(self.constraints.for_class(&d.class_name).iter().cloned());
                merged.extend(self.constraints.for_role_path(&d.role_path).iter().cloned());
                let mut out = d.clone();
                out.constraints = merged;
                out
            })
            .collect()
    }

    /// *NewTaskForOffer* (spec §4.4). Returns `None` only on programmer
    /// error (a descriptor whose class has no registered demand); callers
    /// must treat `None` as fatal, not as a routine skip.
    pub fn new_task_for_offer(
        &mut self,
        offer: &Offer,
        descriptor: &TaskDescriptor,
        bound_ports: HashMap<String, u32>,
        control_port: u32,
        executor_id: ExecutorId,
    ) -> Option<Task> {
        if self.get_wants_for_descriptor(descriptor).is_none() {
            warn!(class = %descriptor.class_name, "no registered demand for descriptor class; programmer error");
            return None;
        }

        self.agent_cache
            .update(offer.agent_id.clone(), offer.hostname.clone(), offer.attributes.clone());

        let task = Task {
            id: format!("task-{}", Uuid::new_v4()),
            descriptor: descriptor.clone(),
            bound_ports: bound_ports.into_iter().collect(),
            agent_id: offer.agent_id.clone(),
            executor_id,
            role_path: descriptor.role_path.clone(),
            environment_id: String::new(),
            state: TaskLifecycleState::Launched,
            fine_grained_state: None,
            control_port,
        };
        self.catalog.insert(task.id.clone(), task.clone());
        Some(task)
    }

    /// *UpdateTaskState* (spec §4.4): fast path, sets the executor-reported
    /// fine-grained state string without touching the lifecycle enum.
    pub fn update_task_state(&mut self, task_id: &str, state: String) {
        match self.catalog.get_mut(task_id) {
            Some(task) => task.fine_grained_state = Some(state),
            None => debug!(task_id, "fine-grained state update for unknown task; ignored"),
        }
    }

    /// *UpdateTaskStatus* (spec §4.4): lifecycle transition driven by the
    /// outer manager. Returns `false` if the task was unknown or already
    /// terminal (state-monotonicity invariant, spec §8).
    pub fn update_task_status(&mut self, task_id: &str, status: TaskLifecycleState, now: Instant) -> bool {
        let Some(task) = self.catalog.get_mut(task_id) else {
            debug!(task_id, "status update for unknown task; ignored");
            return false;
        };

        let applied = task.apply_status(status);
        if applied && status.is_terminal() {
            self.terminal_since.insert(task_id.to_string(), now);
        }
        applied
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.catalog.get(task_id)
    }

    pub fn tasks_for_environment<'a>(&'a self, environment_id: &'a str) -> impl Iterator<Item = &'a Task> {
        self.catalog.values().filter(move |t| t.environment_id == environment_id)
    }

    pub fn set_environment(&mut self, task_id: &str, environment_id: String) {
        if let Some(task) = self.catalog.get_mut(task_id) {
            task.environment_id = environment_id;
        }
    }

    /// Remove any terminal task whose grace window has elapsed as of `now`.
    pub fn sweep_terminal(&mut self, now: Instant) {
        let expired: Vec<TaskId> = self
            .terminal_since
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= self.terminal_grace)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            self.catalog.remove(&id);
            self.terminal_since.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }
}

/// Mutex wrapper giving the offer matcher a single critical section over
/// the task catalog and the pending-descriptor list (spec §5). Port
/// allocation and task construction happen while this lock is held; the
/// resulting ACCEPT/DECLINE calls are issued only after it is released.
#[derive(Debug, Default)]
pub struct TaskManagerState {
    inner: Mutex<TaskManagerInner>,
}

#[derive(Debug, Default)]
struct TaskManagerInner {
    pub manager: TaskManager,
    pub pending_descriptors: Vec<TaskDescriptor>,
}

pub struct TaskManagerGuard<'a> {
    guard: std::sync::MutexGuard<'a, TaskManagerInner>,
}

impl TaskManagerState {
    pub fn new(manager: TaskManager) -> Self {
        Self {
            inner: Mutex::new(TaskManagerInner {
                manager,
                pending_descriptors: Vec::new(),
            }),
        }
    }

    pub fn lock(&self) -> TaskManagerGuard<'_> {
        TaskManagerGuard {
            guard: self.inner.lock().expect("task manager state lock poisoned"),
        }
    }
}

impl TaskManagerGuard<'_> {
    pub fn manager(&mut self) -> &mut TaskManager {
        &mut self.guard.manager
    }

    pub fn pending_descriptors(&mut self) -> &mut Vec<TaskDescriptor> {
        &mut self.guard.pending_descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::CommandRecipe;
    use crate::domain::offer::ResourceBundle;
    use std::collections::BTreeMap;

    fn sample_descriptor() -> TaskDescriptor {
        TaskDescriptor::new(
            "readout",
            "flp/0",
            ResourceDemand::new(2.0, 1024).with_dynamic_port("data"),
            CommandRecipe::new("/bin/readout"),
        )
    }

    fn sample_offer() -> Offer {
        Offer {
            id: "offer-1".to_string(),
            agent_id: "agent-1".to_string(),
            hostname: "flp01".to_string(),
            attributes: BTreeMap::new(),
            resources: ResourceBundle::new(4.0, 4096, vec![10000..=10010]),
        }
    }

    #[test]
    fn new_task_for_offer_fails_without_registered_demand() {
        let mut tm = TaskManager::new();
        let descriptor = sample_descriptor();
        let offer = sample_offer();
        let task = tm.new_task_for_offer(&offer, &descriptor, HashMap::new(), 47101, "exec-1".to_string());
        assert!(task.is_none());
    }

    #[test]
    fn new_task_for_offer_succeeds_with_registered_demand() {
        let mut tm = TaskManager::new();
        let descriptor = sample_descriptor();
        tm.class_demands_mut().register("readout", descriptor.demand.clone());
        let offer = sample_offer();

        let mut bound = HashMap::new();
        bound.insert("data".to_string(), 10000u32);
        let task = tm
            .new_task_for_offer(&offer, &descriptor, bound, 47101, "exec-1".to_string())
            .expect("task should be created");

        assert_eq!(task.agent_id, "agent-1");
        assert_eq!(task.bound_ports.get("data"), Some(&10000));
        assert_eq!(tm.len(), 1);
    }

    #[test]
    fn terminal_state_is_monotonic() {
        let mut tm = TaskManager::new();
        let descriptor = sample_descriptor();
        tm.class_demands_mut().register("readout", descriptor.demand.clone());
        let offer = sample_offer();
        let task = tm
            .new_task_for_offer(&offer, &descriptor, HashMap::new(), 47101, "exec-1".to_string())
            .unwrap();

        let now = Instant::now();
        assert!(tm.update_task_status(&task.id, TaskLifecycleState::Running, now));
        assert!(tm.update_task_status(&task.id, TaskLifecycleState::Finished, now));
        assert!(!tm.update_task_status(&task.id, TaskLifecycleState::Running, now));
        assert_eq!(tm.get(&task.id).unwrap().state, TaskLifecycleState::Finished);
    }

    #[test]
    fn sweep_terminal_removes_after_grace_window() {
        let mut tm = TaskManager::new();
        tm.terminal_grace = Duration::from_millis(0);
        let descriptor = sample_descriptor();
        tm.class_demands_mut().register("readout", descriptor.demand.clone());
        let offer = sample_offer();
        let task = tm
            .new_task_for_offer(&offer, &descriptor, HashMap::new(), 47101, "exec-1".to_string())
            .unwrap();

        let now = Instant::now();
        tm.update_task_status(&task.id, TaskLifecycleState::Finished, now);
        tm.sweep_terminal(now);
        assert!(tm.get(&task.id).is_none());
    }
}
