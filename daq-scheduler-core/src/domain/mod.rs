//! Domain types: descriptors, tasks, environments, and offers (spec §3).

pub mod descriptor;
pub mod environment;
pub mod offer;
pub mod task;

pub use descriptor::{CommandRecipe, Constraint, DynamicPortName, ResourceDemand, TaskDescriptor};
pub use environment::{Environment, EnvironmentState, EnvironmentTrigger, RoleNode};
pub use offer::{AttributeMap, Offer, OfferId, ResourceBundle};
pub use task::{AgentId, EnvironmentId, ExecutorId, Task, TaskId, TaskLifecycleState};
