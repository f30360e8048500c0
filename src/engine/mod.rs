mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod subscriptions;

pub use availability::{free_spans, merge_overlapping, peak_load, subtract_intervals};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedWorkspaceState = Arc<RwLock<WorkspaceState>>;
pub type SharedMemberState = Arc<RwLock<MemberState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while one fsync is in flight are
/// written and synced together, then every sender gets the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!(error = %e, batch = batch.len(), "WAL flush failed");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't ride along
    // with the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed outside a batch")));
        }
    }
}

/// One location's state: workspaces (with their equipment and bookings) and
/// members (with their memberships and cantina subscriptions), each shard
/// behind its own lock.
pub struct Engine {
    pub workspaces: DashMap<Ulid, SharedWorkspaceState>,
    pub members: DashMap<Ulid, SharedMemberState>,
    /// Booking / equipment id → workspace id.
    pub(super) workspace_of: DashMap<Ulid, Ulid>,
    /// Membership / subscription id → user id.
    pub(super) owner_of: DashMap<Ulid, Ulid>,
    /// Lowercased email → user id.
    pub(super) emails: DashMap<String, Ulid>,
    /// Every entity id in the location. Claimed before the WAL append so two
    /// creates with the same id cannot both pass.
    pub(super) ids: DashMap<Ulid, ()>,
    /// Held shared by operations that add a shard, exclusively by compaction,
    /// so a snapshot never misses a shard created while it is written.
    pub(super) shard_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

/// Apply an event to a workspace shard (caller holds the lock).
fn apply_to_workspace(ws: &mut WorkspaceState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::EquipmentAdded {
            id,
            workspace_id,
            name,
            description,
            quantity_available,
        } => {
            ws.equipment.push(Equipment {
                id: *id,
                workspace_id: *workspace_id,
                name: name.clone(),
                description: description.clone(),
                quantity_available: *quantity_available,
            });
            index.insert(*id, *workspace_id);
        }
        Event::EquipmentQuantitySet {
            id,
            quantity_available,
            ..
        } => {
            if let Some(item) = ws.equipment_item_mut(id) {
                item.quantity_available = *quantity_available;
            }
        }
        Event::BookingCreated {
            id,
            workspace_id,
            user_id,
            slot,
            equipment,
            price,
        } => {
            ws.insert_booking(Booking {
                id: *id,
                workspace_id: *workspace_id,
                user_id: *user_id,
                slot: *slot,
                status: BookingStatus::Pending,
                equipment: equipment.clone(),
                price: *price,
            });
            index.insert(*id, *workspace_id);
        }
        Event::BookingConfirmed { id, .. } => set_status(ws, id, BookingStatus::Confirmed),
        Event::BookingCancelled { id, .. } => set_status(ws, id, BookingStatus::Cancelled),
        Event::BookingCompleted { id, .. } => set_status(ws, id, BookingStatus::Completed),
        // Shard creation is handled at the DashMap level; the rest belong to member shards.
        Event::WorkspaceCreated { .. }
        | Event::UserRegistered { .. }
        | Event::MembershipCreated { .. }
        | Event::MembershipExtended { .. }
        | Event::CantinaSubscribed { .. }
        | Event::MealUsed { .. }
        | Event::CantinaRenewed { .. } => {}
    }
}

fn set_status(ws: &mut WorkspaceState, id: &Ulid, status: BookingStatus) {
    if let Some(b) = ws.booking_mut(id) {
        b.status = status;
    }
}

/// Apply an event to a member shard (caller holds the lock).
fn apply_to_member(ms: &mut MemberState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::MembershipCreated {
            id,
            user_id,
            membership_type,
            amenity_tier,
            starts_at,
            ends_at,
        } => {
            ms.memberships.push(Membership {
                id: *id,
                user_id: *user_id,
                membership_type: *membership_type,
                amenity_tier: *amenity_tier,
                starts_at: *starts_at,
                ends_at: *ends_at,
            });
            index.insert(*id, *user_id);
        }
        Event::MembershipExtended { id, ends_at, .. } => {
            if let Some(m) = ms.membership_mut(id) {
                m.ends_at = *ends_at;
            }
        }
        Event::CantinaSubscribed {
            id,
            user_id,
            plan,
            meals_remaining,
            renews_at,
        } => {
            ms.subscriptions.push(CantinaSubscription {
                id: *id,
                user_id: *user_id,
                plan: *plan,
                meals_remaining: *meals_remaining,
                renews_at: *renews_at,
            });
            index.insert(*id, *user_id);
        }
        Event::MealUsed { id, .. } => {
            if let Some(s) = ms.subscription_mut(id) {
                s.meals_remaining = s.meals_remaining.saturating_sub(1);
            }
        }
        Event::CantinaRenewed { id, renews_at, .. } => {
            if let Some(s) = ms.subscription_mut(id) {
                s.meals_remaining = s.plan.meal_limit();
                s.renews_at = *renews_at;
            }
        }
        Event::WorkspaceCreated { .. }
        | Event::EquipmentAdded { .. }
        | Event::EquipmentQuantitySet { .. }
        | Event::UserRegistered { .. }
        | Event::BookingCreated { .. }
        | Event::BookingConfirmed { .. }
        | Event::BookingCancelled { .. }
        | Event::BookingCompleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            workspaces: DashMap::new(),
            members: DashMap::new(),
            workspace_of: DashMap::new(),
            owner_of: DashMap::new(),
            emails: DashMap::new(),
            ids: DashMap::new(),
            shard_gate: RwLock::new(()),
            wal_tx,
        };

        // Nothing else can see these Arcs yet, so try_write never contends.
        // blocking_write would panic here: tenants are created inside the runtime.
        for event in &events {
            if let Some(id) = event.created_id() {
                engine.ids.insert(id, ());
            }
            match event {
                Event::WorkspaceCreated {
                    id,
                    name,
                    workspace_type,
                    capacity,
                    hourly_rate,
                    amenity_tier,
                } => {
                    let ws = WorkspaceState::new(Workspace {
                        id: *id,
                        name: name.clone(),
                        workspace_type: *workspace_type,
                        capacity: *capacity,
                        hourly_rate: *hourly_rate,
                        amenity_tier: *amenity_tier,
                    });
                    engine.workspaces.insert(*id, Arc::new(RwLock::new(ws)));
                }
                Event::UserRegistered { id, email, role } => {
                    let user = User {
                        id: *id,
                        email: email.clone(),
                        role: *role,
                    };
                    engine.emails.insert(email.to_ascii_lowercase(), *id);
                    engine.members.insert(*id, Arc::new(RwLock::new(MemberState::new(user))));
                }
                other => engine.replay_into_shard(other),
            }
        }

        Ok(engine)
    }

    fn replay_into_shard(&self, event: &Event) {
        match event.shard() {
            Shard::Workspace(id) => {
                let Some(ws) = self.get_workspace(&id) else {
                    warn!(workspace = %id, "replay: event for unknown workspace skipped");
                    return;
                };
                match ws.try_write() {
                    Ok(mut guard) => apply_to_workspace(&mut guard, event, &self.workspace_of),
                    Err(_) => warn!(workspace = %id, "replay: shard unexpectedly locked"),
                }
            }
            Shard::User(id) => {
                let Some(ms) = self.get_member(&id) else {
                    warn!(user = %id, "replay: event for unknown user skipped");
                    return;
                };
                match ms.try_write() {
                    Ok(mut guard) => apply_to_member(&mut guard, event, &self.owner_of),
                    Err(_) => warn!(user = %id, "replay: shard unexpectedly locked"),
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_workspace(&self, id: &Ulid) -> Option<SharedWorkspaceState> {
        self.workspaces.get(id).map(|e| e.value().clone())
    }

    pub fn get_member(&self, id: &Ulid) -> Option<SharedMemberState> {
        self.members.get(id).map(|e| e.value().clone())
    }

    /// Reserve `id` for a create. Fails if any entity in this location
    /// already holds it or another create has claimed it first.
    pub(super) fn claim_id(&self, id: Ulid) -> Result<(), EngineError> {
        match self.ids.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::AlreadyExists(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(())
            }
        }
    }

    /// Undo a claim whose WAL append failed.
    pub(super) fn release_id(&self, id: &Ulid) {
        self.ids.remove(id);
    }

    /// WAL-append then apply, under the workspace's write lock.
    pub(super) async fn persist_to_workspace(
        &self,
        ws: &mut WorkspaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_workspace(ws, event, &self.workspace_of);
        Ok(())
    }

    /// WAL-append then apply, under the member's write lock.
    pub(super) async fn persist_to_member(
        &self,
        ms: &mut MemberState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_member(ms, event, &self.owner_of);
        Ok(())
    }

    /// Booking / equipment id → its workspace's write lock.
    pub(super) async fn resolve_workspace_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<WorkspaceState>, EngineError> {
        let workspace_id = self
            .workspace_of
            .get(entity_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        Ok(ws.write_owned().await)
    }

    /// Membership / subscription id → its owner's write lock.
    pub(super) async fn resolve_member_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<MemberState>, EngineError> {
        let user_id = self
            .owner_of
            .get(entity_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ms = self.get_member(&user_id).ok_or(EngineError::NotFound(user_id))?;
        Ok(ms.write_owned().await)
    }

    pub(super) fn all_workspaces(&self) -> Vec<SharedWorkspaceState> {
        self.workspaces.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn all_members(&self) -> Vec<SharedMemberState> {
        self.members.iter().map(|e| e.value().clone()).collect()
    }
}
