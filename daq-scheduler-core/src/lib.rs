//! Core of the DAQ scheduler: the outer resource manager client, agent
//! cache, task manager, command servant, environment manager, offer
//! matcher, message router, and the scheduler controller that ties them
//! together (spec components C2–C8).

pub mod agent_cache;
pub mod command_servant;
pub mod controller;
pub mod domain;
pub mod environment_manager;
pub mod health;
pub mod message_router;
pub mod offer_matcher;
pub mod rm_client;
pub mod task_manager;

pub use agent_cache::AgentCache;
pub use command_servant::CommandServant;
pub use controller::SchedulerController;
pub use environment_manager::EnvironmentManager;
pub use health::SchedulerHealth;
pub use offer_matcher::OfferMatcher;
pub use rm_client::ResourceManagerClient;
pub use task_manager::{TaskManager, TaskManagerState};
