//! Task descriptors: immutable requests for a task, produced by the
//! environment manager from a workflow graph and consumed by the offer
//! matcher.

use std::collections::{BTreeMap, BTreeSet};

/// A single named dynamic port a descriptor needs bound to a concrete port
/// number at launch time, workflow specific (e.g. `"data"`). The
/// command-protocol control port every task exposes is not one of these —
/// it is allocated unconditionally for every task (spec §3's task model
/// tracks it as its own field, separate from the named bound-port map).
pub type DynamicPortName = String;

/// Resources a descriptor requires, precomputed per class before matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDemand {
    pub cpus: f64,
    pub memory_mib: u64,
    /// Ports that must be bound to these exact numbers (rare; most ports
    /// are dynamic).
    pub static_ports: BTreeSet<u32>,
    /// Ports to be bound to any available number above the configured
    /// floor, keyed by logical name.
    pub dynamic_ports: BTreeSet<DynamicPortName>,
}

impl ResourceDemand {
    pub fn new(cpus: f64, memory_mib: u64) -> Self {
        Self {
            cpus,
            memory_mib,
            static_ports: BTreeSet::new(),
            dynamic_ports: BTreeSet::new(),
        }
    }

    pub fn with_dynamic_port(mut self, name: impl Into<DynamicPortName>) -> Self {
        self.dynamic_ports.insert(name.into());
        self
    }

    pub fn with_static_port(mut self, port: u32) -> Self {
        self.static_ports.insert(port);
        self
    }
}

/// A capability/attribute constraint a descriptor imposes on candidate
/// offers. Constraints from the class and the role path are combined and
/// precomputed once, before matching begins (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Constraint {
    pub attribute: String,
    pub value: String,
}

impl Constraint {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// The build recipe used to construct the launched process's command line.
/// Treated opaquely by everything except the executor; the core only
/// carries it through to the launch info handed to the resource manager.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecipe {
    pub shell: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl CommandRecipe {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            arguments: Vec::new(),
            environment: BTreeMap::new(),
        }
    }
}

/// An immutable request for one task: class, target role, resource demand,
/// precomputed constraints, and a command recipe (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub class_name: String,
    pub role_path: String,
    pub demand: ResourceDemand,
    pub constraints: BTreeSet<Constraint>,
    pub command: CommandRecipe,
}

impl TaskDescriptor {
    pub fn new(
        class_name: impl Into<String>,
        role_path: impl Into<String>,
        demand: ResourceDemand,
        command: CommandRecipe,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            role_path: role_path.into(),
            demand,
            constraints: BTreeSet::new(),
            command,
        }
    }

    pub fn with_constraints(mut self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }

    /// `true` iff `attributes` satisfies every constraint on this descriptor.
    pub fn satisfied_by(&self, attributes: &BTreeMap<String, String>) -> bool {
        self.constraints
            .iter()
            .all(|c| attributes.get(&c.attribute).is_some_and(|v| v == &c.value))
    }
}
