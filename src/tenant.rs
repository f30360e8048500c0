use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::engine::Engine;
use crate::limits::*;
use crate::reaper;

/// One engine per location. Location = database name from the pgwire
/// connection; each gets its own WAL file, completion sweep and compactor.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    sweep_interval: Duration,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, sweep_interval: Duration) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            sweep_interval,
        }
    }

    /// Get or lazily create the engine for `tenant`.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Only these characters reach the filesystem.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        // Two connections may race here; whoever inserts first wins and the
        // other engine is never used.
        let entry = self.engines.entry(tenant.to_string());
        if let dashmap::mapref::entry::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path)?);
        tokio::spawn(reaper::run_completion_sweep(engine.clone(), self.sweep_interval));
        tokio::spawn(reaper::run_compactor(engine.clone(), self.compact_threshold));

        entry.or_insert(engine.clone());
        let active = self.engines.len();
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(active as f64);
        info!(tenant = %safe_name, active, "opened location");
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_time};
    use crate::engine::EngineError;
    use crate::model::*;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hotdesk_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, Duration::from_secs(60))
    }

    async fn seed(engine: &Engine, ws: Ulid, user: Ulid) {
        engine
            .create_workspace(Workspace {
                id: ws,
                name: "Focus pod".into(),
                workspace_type: WorkspaceType::PrivateOffice,
                capacity: 1,
                hourly_rate: 1_500,
                amenity_tier: AmenityTier::Premium,
            })
            .await
            .unwrap();
        engine
            .register_user(User {
                id: user,
                email: "same@example.com".into(),
                role: Role::Member,
            })
            .await
            .unwrap();
    }

    fn request(ws: Ulid, user: Ulid) -> NewBooking {
        NewBooking {
            id: Ulid::new(),
            workspace_id: ws,
            user_id: user,
            slot: Slot::new(
                parse_date("2099-06-01").unwrap(),
                parse_time("09:00").unwrap(),
                parse_time("10:00").unwrap(),
            ),
            equipment: Vec::new(),
        }
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let tm = manager(test_data_dir("isolation"));
        let eng_a = tm.get_or_create("downtown").unwrap();
        let eng_b = tm.get_or_create("harbour").unwrap();

        // Same ids and email in both locations
        let (ws, user) = (Ulid::new(), Ulid::new());
        seed(&eng_a, ws, user).await;
        seed(&eng_b, ws, user).await;

        eng_a.create_booking(request(ws, user), 0).await.unwrap();
        let err = eng_a.create_booking(request(ws, user), 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        // The other location's workspace is still free
        eng_b.create_booking(request(ws, user), 0).await.unwrap();
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let tm = manager(test_data_dir("same_eng"));
        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let tm = manager(test_data_dir("name_too_long"));
        let err = tm
            .get_or_create(&"x".repeat(MAX_TENANT_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("tenant name too long"));
        assert!(tm.get_or_create(&"x".repeat(MAX_TENANT_NAME_LEN)).is_ok());
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let tm = manager(test_data_dir("count_limit"));
        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
