//! `UsagePlanRegistry` — tiered policies attached to keys.

use std::collections::HashMap;

use parking_lot::RwLock;
use pg_domain::plan::UsagePlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    InvalidName,
    AlreadyExists,
    NotFound,
    PlanHasAssignedKeys,
}

struct Inner {
    plans: HashMap<String, UsagePlan>,
    assignments: HashMap<String, String>,
}

pub struct UsagePlanRegistry {
    inner: RwLock<Inner>,
}

impl Default for UsagePlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UsagePlanRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                plans: HashMap::new(),
                assignments: HashMap::new(),
            }),
        }
    }

    pub fn create_plan(&self, plan: UsagePlan) -> Result<(), PlanError> {
        if !UsagePlan::is_valid_name(&plan.name) {
            return Err(PlanError::InvalidName);
        }
        let mut inner = self.inner.write();
        if inner.plans.contains_key(&plan.name) {
            return Err(PlanError::AlreadyExists);
        }
        inner.plans.insert(plan.name.clone(), plan);
        Ok(())
    }

    pub fn update_plan(&self, name: &str, plan: UsagePlan) -> Result<(), PlanError> {
        let mut inner = self.inner.write();
        if !inner.plans.contains_key(name) {
            return Err(PlanError::NotFound);
        }
        inner.plans.insert(name.to_string(), plan);
        Ok(())
    }

    pub fn delete_plan(&self, name: &str) -> Result<(), PlanError> {
        let mut inner = self.inner.write();
        if !inner.plans.contains_key(name) {
            return Err(PlanError::NotFound);
        }
        if inner.assignments.values().any(|p| p == name) {
            return Err(PlanError::PlanHasAssignedKeys);
        }
        inner.plans.remove(name);
        Ok(())
    }

    /// `plan = None` unassigns the key.
    pub fn assign_key(&self, key: &str, plan: Option<&str>) -> Result<(), PlanError> {
        let mut inner = self.inner.write();
        match plan {
            Some(name) => {
                if !inner.plans.contains_key(name) {
                    return Err(PlanError::NotFound);
                }
                inner.assignments.insert(key.to_string(), name.to_string());
            }
            None => {
                inner.assignments.remove(key);
            }
        }
        Ok(())
    }

    pub fn plan_for_key(&self, key: &str) -> Option<UsagePlan> {
        let inner = self.inner.read();
        let name = inner.assignments.get(key)?;
        inner.plans.get(name).cloned()
    }

    pub fn get_plan(&self, name: &str) -> Option<UsagePlan> {
        self.inner.read().plans.get(name).cloned()
    }

    pub fn get_credit_multiplier(&self, key: &str) -> f64 {
        self.plan_for_key(key).map(|p| p.credit_multiplier).unwrap_or(1.0)
    }

    pub fn is_tool_allowed_by_plan(&self, key: &str, tool: &str) -> bool {
        match self.plan_for_key(key) {
            Some(plan) => plan.tool_allowed(tool),
            None => true,
        }
    }

    pub fn all_plans(&self) -> Vec<UsagePlan> {
        self.inner.read().plans.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(name: &str) -> UsagePlan {
        UsagePlan {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_plan_name_is_rejected() {
        let registry = UsagePlanRegistry::new();
        assert_eq!(registry.create_plan(plan("has space")), Err(PlanError::InvalidName));
    }

    #[test]
    fn duplicate_plan_name_is_rejected() {
        let registry = UsagePlanRegistry::new();
        registry.create_plan(plan("pro")).unwrap();
        assert_eq!(registry.create_plan(plan("pro")), Err(PlanError::AlreadyExists));
    }

    #[test]
    fn delete_refuses_plan_with_assigned_keys() {
        let registry = UsagePlanRegistry::new();
        registry.create_plan(plan("pro")).unwrap();
        registry.assign_key("pg_k1", Some("pro")).unwrap();
        assert_eq!(registry.delete_plan("pro"), Err(PlanError::PlanHasAssignedKeys));
    }

    #[test]
    fn unassigning_sets_multiplier_back_to_default() {
        let registry = UsagePlanRegistry::new();
        let mut p = plan("pro");
        p.credit_multiplier = 2.0;
        registry.create_plan(p).unwrap();
        registry.assign_key("pg_k1", Some("pro")).unwrap();
        assert_eq!(registry.get_credit_multiplier("pg_k1"), 2.0);
        registry.assign_key("pg_k1", None).unwrap();
        assert_eq!(registry.get_credit_multiplier("pg_k1"), 1.0);
    }

    #[test]
    fn tool_allowed_by_plan_denied_wins() {
        let registry = UsagePlanRegistry::new();
        let mut p = plan("pro");
        p.allowed_tools.insert("search".into());
        p.denied_tools.insert("search".into());
        registry.create_plan(p).unwrap();
        registry.assign_key("pg_k1", Some("pro")).unwrap();
        assert!(!registry.is_tool_allowed_by_plan("pg_k1", "search"));
    }

    #[test]
    fn key_without_plan_defaults_to_allowed() {
        let registry = UsagePlanRegistry::new();
        assert!(registry.is_tool_allowed_by_plan("pg_k1", "anything"));
    }
}
