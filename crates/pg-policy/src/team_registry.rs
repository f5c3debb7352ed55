//! `TeamRegistry` — groups of keys sharing a budget and quota.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use pg_domain::team::Team;

const MAX_MEMBERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamError {
    NotFound,
    AlreadyAssigned,
    TeamFull,
}

pub struct TeamRegistry {
    teams: RwLock<HashMap<String, Team>>,
    /// key -> team id.
    membership: RwLock<HashMap<String, String>>,
}

impl Default for TeamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TeamRegistry {
    pub fn new() -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            membership: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_team(&self, team: Team) {
        self.teams.write().insert(team.id.clone(), team);
    }

    pub fn update_team(
        &self,
        id: &str,
        budget: Option<u64>,
        quota_daily_calls: Option<u64>,
        quota_daily_credits: Option<u64>,
        tag_updates: HashMap<String, Option<String>>,
    ) -> Result<(), TeamError> {
        let mut teams = self.teams.write();
        let team = teams.get_mut(id).ok_or(TeamError::NotFound)?;
        if let Some(b) = budget {
            team.budget = b;
        }
        if let Some(c) = quota_daily_calls {
            team.quota_daily_calls = c;
        }
        if let Some(c) = quota_daily_credits {
            team.quota_daily_credits = c;
        }
        for (k, v) in tag_updates {
            match v {
                Some(value) => {
                    team.tags.insert(k, value);
                }
                None => {
                    team.tags.remove(&k);
                }
            }
        }
        Ok(())
    }

    /// Deactivates the team and unassigns all its members.
    pub fn delete_team(&self, id: &str) -> Result<(), TeamError> {
        let mut teams = self.teams.write();
        let team = teams.get_mut(id).ok_or(TeamError::NotFound)?;
        team.active = false;
        let member_keys: Vec<String> = team.member_keys.drain().collect();
        drop(teams);
        let mut membership = self.membership.write();
        for key in member_keys {
            membership.remove(&key);
        }
        Ok(())
    }

    pub fn assign_key(&self, team_id: &str, key: &str) -> Result<(), TeamError> {
        {
            let membership = self.membership.read();
            if membership.contains_key(key) {
                return Err(TeamError::AlreadyAssigned);
            }
        }

        let mut teams = self.teams.write();
        let team = teams.get_mut(team_id).ok_or(TeamError::NotFound)?;
        if team.member_keys.len() >= MAX_MEMBERS {
            return Err(TeamError::TeamFull);
        }
        team.member_keys.insert(key.to_string());
        drop(teams);

        self.membership.write().insert(key.to_string(), team_id.to_string());
        Ok(())
    }

    pub fn team_for_key(&self, key: &str) -> Option<Team> {
        let team_id = self.membership.read().get(key).cloned()?;
        self.teams.read().get(&team_id).cloned()
    }

    /// `None` or `budget == 0` allows unconditionally.
    pub fn check_budget(&self, key: &str, credits: u64) -> bool {
        match self.team_for_key(key) {
            Some(team) => team.budget_allows(credits),
            None => true,
        }
    }

    pub fn check_quota(&self, key: &str, credits: u64) -> bool {
        let team = match self.team_for_key(key) {
            Some(t) => t,
            None => return true,
        };
        if team.quota_daily_calls > 0 && team.daily_calls_used >= team.quota_daily_calls {
            return false;
        }
        if team.quota_daily_credits > 0 && team.daily_credits_used + credits > team.quota_daily_credits {
            return false;
        }
        true
    }

    pub fn record_usage(&self, key: &str, credits: u64) {
        let team_id = match self.membership.read().get(key).cloned() {
            Some(id) => id,
            None => return,
        };
        let mut teams = self.teams.write();
        if let Some(team) = teams.get_mut(&team_id) {
            team.roll_if_stale(Utc::now().date_naive());
            team.total_spent += credits;
            team.daily_calls_used += 1;
            team.daily_credits_used += credits;
        }
    }

    pub fn all_teams(&self) -> Vec<Team> {
        self.teams.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            member_keys: Default::default(),
            budget: 0,
            total_spent: 0,
            quota_daily_calls: 0,
            quota_daily_credits: 0,
            daily_calls_used: 0,
            daily_credits_used: 0,
            last_reset_day: None,
            active: true,
            tags: Default::default(),
        }
    }

    #[test]
    fn assign_key_fails_when_already_assigned_elsewhere() {
        let registry = TeamRegistry::new();
        registry.create_team(team("a"));
        registry.create_team(team("b"));
        registry.assign_key("a", "pg_k1").unwrap();
        assert_eq!(registry.assign_key("b", "pg_k1"), Err(TeamError::AlreadyAssigned));
    }

    #[test]
    fn budget_check_respects_zero_as_unlimited() {
        let registry = TeamRegistry::new();
        registry.create_team(team("a"));
        registry.assign_key("a", "pg_k1").unwrap();
        assert!(registry.check_budget("pg_k1", 1_000_000));
    }

    #[test]
    fn budget_check_enforces_limit() {
        let registry = TeamRegistry::new();
        let mut t = team("a");
        t.budget = 100;
        t.total_spent = 90;
        registry.create_team(t);
        registry.assign_key("a", "pg_k1").unwrap();
        assert!(registry.check_budget("pg_k1", 10));
        assert!(!registry.check_budget("pg_k1", 11));
    }

    #[test]
    fn delete_team_unassigns_all_members() {
        let registry = TeamRegistry::new();
        registry.create_team(team("a"));
        registry.assign_key("a", "pg_k1").unwrap();
        registry.delete_team("a").unwrap();
        assert!(registry.team_for_key("pg_k1").is_none());
        assert!(!registry.all_teams()[0].active);
    }

    #[test]
    fn record_usage_increments_team_counters() {
        let registry = TeamRegistry::new();
        registry.create_team(team("a"));
        registry.assign_key("a", "pg_k1").unwrap();
        registry.record_usage("pg_k1", 5);
        let t = registry.team_for_key("pg_k1").unwrap();
        assert_eq!(t.total_spent, 5);
        assert_eq!(t.daily_calls_used, 1);
        assert_eq!(t.daily_credits_used, 5);
    }
}
