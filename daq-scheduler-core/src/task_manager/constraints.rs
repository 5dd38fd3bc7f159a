//! Class- and role-path-level constraint registries consulted by
//! [`super::TaskManager::build_descriptor_constraints`].

use std::collections::{BTreeSet, HashMap};

use crate::domain::descriptor::Constraint;

#[derive(Debug, Default)]
pub struct ConstraintRegistry {
    class: HashMap<String, BTreeSet<Constraint>>,
    role_path: HashMap<String, BTreeSet<Constraint>>,
}

impl ConstraintRegistry {
    pub fn register_for_class(&mut self, class_name: impl Into<String>, constraints: impl IntoIterator<Item = Constraint>) {
        self.class.entry(class_name.into()).or_default().extend(constraints);
    }

    pub fn register_for_role_path(&mut self, role_path: impl Into<String>, constraints: impl IntoIterator<Item = Constraint>) {
        self.role_path.entry(role_path.into()).or_default().extend(constraints);
    }

    pub fn for_class(&self, class_name: &str) -> BTreeSet<Constraint> {
        self.class.get(class_name).cloned().unwrap_or_default()
    }

    pub fn for_role_path(&self, role_path: &str) -> BTreeSet<Constraint> {
        self.role_path.get(role_path).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_class_and_role_constraints_independently() {
        let mut reg = ConstraintRegistry::default();
        reg.register_for_class("readout", [Constraint::new("role", "FLP")]);
        reg.register_for_role_path("flp/0", [Constraint::new("site", "cern")]);

        assert_eq!(reg.for_class("readout").len(), 1);
        assert_eq!(reg.for_role_path("flp/0").len(), 1);
        assert!(reg.for_class("unknown").is_empty());
    }
}
