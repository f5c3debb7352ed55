//! Usage plans, permission rules, and team budgets.

pub mod permission_engine;
pub mod plan_registry;
pub mod team_registry;

pub use permission_engine::{EvalContext, PermissionEngine};
pub use plan_registry::{PlanError, UsagePlanRegistry};
pub use team_registry::{TeamError, TeamRegistry};
