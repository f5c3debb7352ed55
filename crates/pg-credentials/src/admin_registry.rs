//! `AdminKeyRegistry` — admin credentials with a total role hierarchy and
//! constant-time validation.

use chrono::Utc;
use parking_lot::RwLock;
use pg_domain::admin::{AdminKeyRecord, AdminRole};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminError {
    NotFound,
    LastSuperAdmin,
    NotBootstrap,
}

pub struct AdminKeyRegistry {
    records: RwLock<Vec<AdminKeyRecord>>,
}

impl Default for AdminKeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminKeyRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Seed the registry with a single bootstrap super-admin, as the
    /// surrounding server does on first start.
    pub fn bootstrap(name: impl Into<String>) -> (Self, String) {
        let registry = Self::new();
        let key = Self::generate_key_id(true);
        registry.records.write().push(AdminKeyRecord {
            key: key.clone(),
            name: name.into(),
            role: AdminRole::SuperAdmin,
            created_at: Utc::now(),
            created_by: AdminKeyRecord::BOOTSTRAP_CREATOR.to_string(),
            active: true,
            last_used_at: None,
        });
        (registry, key)
    }

    fn generate_key_id(bootstrap: bool) -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let prefix = if bootstrap { "admin_" } else { "ak_" };
        format!("{prefix}{}", hex::encode(bytes))
    }

    pub fn create(&self, name: impl Into<String>, role: AdminRole, created_by: impl Into<String>) -> AdminKeyRecord {
        let record = AdminKeyRecord {
            key: Self::generate_key_id(false),
            name: name.into(),
            role,
            created_at: Utc::now(),
            created_by: created_by.into(),
            active: true,
            last_used_at: None,
        };
        self.records.write().push(record.clone());
        record
    }

    /// Iterates every stored record and performs a constant-time comparison
    /// against each, including records that don't match, so that neither an
    /// early exit nor a length mismatch leaks which prefix is correct.
    pub fn validate(&self, presented: &str) -> Option<AdminRole> {
        let presented_hash = Sha256::digest(presented.as_bytes());
        let mut matched_index: Option<usize> = None;

        {
            let records = self.records.read();
            for (i, rec) in records.iter().enumerate() {
                let stored_hash = Sha256::digest(rec.key.as_bytes());
                let is_match = bool::from(presented_hash.ct_eq(&stored_hash)) && rec.active;
                // Deliberately do not short-circuit: every record gets a
                // comparison regardless of earlier matches.
                if is_match && matched_index.is_none() {
                    matched_index = Some(i);
                }
            }
        }

        let index = matched_index?;
        let mut records = self.records.write();
        let rec = records.get_mut(index)?;
        rec.last_used_at = Some(Utc::now());
        Some(rec.role)
    }

    pub fn has_role(&self, presented: &str, min: AdminRole) -> bool {
        self.validate(presented).map(|role| role.at_least(min)).unwrap_or(false)
    }

    fn active_super_admin_count(records: &[AdminKeyRecord]) -> usize {
        records
            .iter()
            .filter(|r| r.active && r.role == AdminRole::SuperAdmin)
            .count()
    }

    pub fn revoke(&self, key: &str) -> Result<(), AdminError> {
        let mut records = self.records.write();
        let idx = records.iter().position(|r| r.key == key).ok_or(AdminError::NotFound)?;

        if records[idx].role == AdminRole::SuperAdmin
            && records[idx].active
            && Self::active_super_admin_count(&records) <= 1
        {
            return Err(AdminError::LastSuperAdmin);
        }

        records[idx].active = false;
        Ok(())
    }

    /// Inserts a new bootstrap super-admin before revoking the old one, so
    /// the ">=1 active super-admin" invariant is never violated even for a
    /// single observer reading between the two steps.
    pub fn rotate_bootstrap(&self, old_key: &str) -> Result<AdminKeyRecord, AdminError> {
        {
            let records = self.records.read();
            let old = records.iter().find(|r| r.key == old_key).ok_or(AdminError::NotFound)?;
            if !old.is_bootstrap() {
                return Err(AdminError::NotBootstrap);
            }
        }

        let new_record = AdminKeyRecord {
            key: Self::generate_key_id(true),
            name: "bootstrap".to_string(),
            role: AdminRole::SuperAdmin,
            created_at: Utc::now(),
            created_by: AdminKeyRecord::BOOTSTRAP_CREATOR.to_string(),
            active: true,
            last_used_at: None,
        };

        {
            let mut records = self.records.write();
            records.push(new_record.clone());
        }

        // Revoke directly rather than via `self.revoke` — the new
        // super-admin above already guarantees the invariant holds, and
        // `revoke`'s own last-super-admin guard would otherwise be racing
        // against a read of state we just wrote.
        let mut records = self.records.write();
        if let Some(old) = records.iter_mut().find(|r| r.key == old_key) {
            old.active = false;
        }

        Ok(new_record)
    }

    pub fn all(&self) -> Vec<AdminKeyRecord> {
        self.records.read().clone()
    }

    pub fn restore(&self, records: Vec<AdminKeyRecord>) {
        *self.records.write() = records;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_validates_as_super_admin() {
        let (registry, key) = AdminKeyRegistry::bootstrap("root");
        assert_eq!(registry.validate(&key), Some(AdminRole::SuperAdmin));
    }

    #[test]
    fn unknown_key_does_not_validate() {
        let (registry, _key) = AdminKeyRegistry::bootstrap("root");
        assert_eq!(registry.validate("admin_doesnotexist"), None);
    }

    #[test]
    fn revoking_last_super_admin_is_refused() {
        let (registry, key) = AdminKeyRegistry::bootstrap("root");
        assert_eq!(registry.revoke(&key), Err(AdminError::LastSuperAdmin));
    }

    #[test]
    fn revoking_non_last_super_admin_succeeds() {
        let (registry, key) = AdminKeyRegistry::bootstrap("root");
        let second = registry.create("second", AdminRole::SuperAdmin, "root");
        registry.revoke(&key).unwrap();
        assert_eq!(registry.validate(&key), None);
        assert_eq!(registry.validate(&second.key), Some(AdminRole::SuperAdmin));
    }

    #[test]
    fn rotate_bootstrap_never_drops_below_one_super_admin() {
        let (registry, old_key) = AdminKeyRegistry::bootstrap("root");
        let new_record = registry.rotate_bootstrap(&old_key).unwrap();

        assert_eq!(registry.validate(&old_key), None);
        assert_eq!(registry.validate(&new_record.key), Some(AdminRole::SuperAdmin));
        assert_eq!(
            AdminKeyRegistry::active_super_admin_count(&registry.all()),
            1
        );
    }

    #[test]
    fn rotate_bootstrap_refuses_non_bootstrap_key() {
        let (registry, _) = AdminKeyRegistry::bootstrap("root");
        let other = registry.create("ordinary-admin", AdminRole::SuperAdmin, "root");
        assert_eq!(
            registry.rotate_bootstrap(&other.key),
            Err(AdminError::NotBootstrap)
        );
    }

    #[test]
    fn has_role_respects_hierarchy() {
        let (registry, key) = AdminKeyRegistry::bootstrap("root");
        let viewer = registry.create("viewer", AdminRole::Viewer, "root");
        assert!(registry.has_role(&key, AdminRole::Admin));
        assert!(!registry.has_role(&viewer.key, AdminRole::Admin));
    }
}
