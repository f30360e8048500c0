use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::pricing;

use super::conflict::{check_equipment, check_no_conflict, validate_email, validate_name, validate_slot};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace, EngineError> {
        validate_name(&workspace.name, "workspace name")?;
        if workspace.capacity == 0 {
            return Err(EngineError::validation("capacity must be at least 1"));
        }
        if workspace.capacity > MAX_CAPACITY {
            return Err(EngineError::LimitExceeded("capacity too large"));
        }
        if workspace.hourly_rate < 0 {
            return Err(EngineError::validation("hourly rate must not be negative"));
        }
        if workspace.hourly_rate > MAX_HOURLY_RATE {
            return Err(EngineError::LimitExceeded("hourly rate too large"));
        }

        let _gate = self.shard_gate.read().await;
        if self.workspaces.len() >= MAX_WORKSPACES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many workspaces"));
        }

        let event = Event::WorkspaceCreated {
            id: workspace.id,
            name: workspace.name.clone(),
            workspace_type: workspace.workspace_type,
            capacity: workspace.capacity,
            hourly_rate: workspace.hourly_rate,
            amenity_tier: workspace.amenity_tier,
        };
        self.claim_id(workspace.id)?;
        if let Err(e) = self.wal_append(&event).await {
            self.release_id(&workspace.id);
            return Err(e);
        }
        self.workspaces.insert(
            workspace.id,
            Arc::new(RwLock::new(WorkspaceState::new(workspace.clone()))),
        );
        Ok(workspace)
    }

    pub async fn add_equipment(&self, equipment: Equipment) -> Result<Equipment, EngineError> {
        validate_name(&equipment.name, "equipment name")?;
        if equipment
            .description
            .as_ref()
            .is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN)
        {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if equipment.quantity_available > MAX_EQUIPMENT_QUANTITY {
            return Err(EngineError::LimitExceeded("equipment quantity too large"));
        }
        let ws = self
            .get_workspace(&equipment.workspace_id)
            .ok_or(EngineError::NotFound(equipment.workspace_id))?;
        let mut guard = ws.write().await;
        if guard.workspace.workspace_type != WorkspaceType::Workshop {
            return Err(EngineError::validation(format!(
                "equipment can only be attached to a workshop, {} is a {}",
                guard.workspace.id, guard.workspace.workspace_type
            )));
        }
        if guard.equipment.len() >= MAX_EQUIPMENT_PER_WORKSPACE {
            return Err(EngineError::LimitExceeded("too much equipment in workspace"));
        }

        let event = Event::EquipmentAdded {
            id: equipment.id,
            workspace_id: equipment.workspace_id,
            name: equipment.name.clone(),
            description: equipment.description.clone(),
            quantity_available: equipment.quantity_available,
        };
        self.claim_id(equipment.id)?;
        if let Err(e) = self.persist_to_workspace(&mut guard, &event).await {
            self.release_id(&equipment.id);
            return Err(e);
        }
        Ok(equipment)
    }

    /// Admin restock. Existing bookings keep their units even if the new
    /// quantity is below current load; only later requests see the cap.
    pub async fn set_equipment_quantity(
        &self,
        id: Ulid,
        quantity_available: u32,
    ) -> Result<Equipment, EngineError> {
        if quantity_available > MAX_EQUIPMENT_QUANTITY {
            return Err(EngineError::LimitExceeded("equipment quantity too large"));
        }
        let mut guard = self.resolve_workspace_write(&id).await?;
        let workspace_id = guard
            .equipment_item(&id)
            .map(|e| e.workspace_id)
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::EquipmentQuantitySet {
            id,
            workspace_id,
            quantity_available,
        };
        self.persist_to_workspace(&mut guard, &event).await?;
        guard.equipment_item(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn register_user(&self, user: User) -> Result<User, EngineError> {
        validate_email(&user.email)?;
        let _gate = self.shard_gate.read().await;
        if self.members.len() >= MAX_USERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        self.claim_id(user.id)?;

        // Claim the address first so two registrations can't both pass.
        let key = user.email.to_ascii_lowercase();
        match self.emails.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                self.release_id(&user.id);
                return Err(EngineError::validation(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        let event = Event::UserRegistered {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.emails.remove(&key);
            self.release_id(&user.id);
            return Err(e);
        }
        self.members
            .insert(user.id, Arc::new(RwLock::new(MemberState::new(user.clone()))));
        Ok(user)
    }

    /// New pending booking. Conflict check, WAL append and apply all happen
    /// under the workspace's write lock, so of two overlapping requests the
    /// second sees the first and fails.
    pub async fn create_booking(&self, req: NewBooking, now: Ms) -> Result<Booking, EngineError> {
        let span = validate_slot(&req.slot)?;
        if span.start <= now {
            return Err(EngineError::validation("booking must start in the future"));
        }
        if !self.members.contains_key(&req.user_id) {
            return Err(EngineError::NotFound(req.user_id));
        }
        let ws = self
            .get_workspace(&req.workspace_id)
            .ok_or(EngineError::NotFound(req.workspace_id))?;
        let mut guard = ws.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_WORKSPACE {
            return Err(EngineError::LimitExceeded("too many bookings on workspace"));
        }
        check_no_conflict(&guard, &span, None)?;
        check_equipment(&guard, &span, &req.equipment, None)?;

        let price = pricing::booking_price(guard.workspace.hourly_rate, req.slot.duration_minutes());
        let event = Event::BookingCreated {
            id: req.id,
            workspace_id: req.workspace_id,
            user_id: req.user_id,
            slot: req.slot,
            equipment: req.equipment,
            price,
        };
        self.claim_id(req.id)?;
        if let Err(e) = self.persist_to_workspace(&mut guard, &event).await {
            self.release_id(&req.id);
            return Err(e);
        }
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        guard.booking(&req.id).cloned().ok_or(EngineError::NotFound(req.id))
    }

    pub async fn confirm_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_workspace_write(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::state(format!(
                "booking {id} is {}, only pending bookings can be confirmed",
                booking.status
            )));
        }
        let (span, workspace_id) = (booking.span(), booking.workspace_id);
        check_no_conflict(&guard, &span, Some(id))?;

        let event = Event::BookingConfirmed { id, workspace_id };
        self.persist_to_workspace(&mut guard, &event).await?;
        guard.booking(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn cancel_booking(&self, id: Ulid, now: Ms) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_workspace_write(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if !booking.status.holds_slot() {
            return Err(EngineError::state(format!(
                "booking {id} is already {}",
                booking.status
            )));
        }
        if !booking.is_cancellable(now) {
            return Err(EngineError::state(format!(
                "booking {id} has already started"
            )));
        }
        let event = Event::BookingCancelled {
            id,
            workspace_id: booking.workspace_id,
        };
        self.persist_to_workspace(&mut guard, &event).await?;
        guard.booking(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Confirmed and ended → completed. Anything else is left alone and
    /// reported as `false`, so repeated calls are harmless.
    pub async fn complete_booking_if_past(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let mut guard = self.resolve_workspace_write(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status != BookingStatus::Confirmed || booking.span().end > now {
            return Ok(false);
        }
        let event = Event::BookingCompleted {
            id,
            workspace_id: booking.workspace_id,
        };
        self.persist_to_workspace(&mut guard, &event).await?;
        Ok(true)
    }

    /// Confirmed bookings whose end has passed. Read locks only; each
    /// candidate is re-checked under the write lock when completed.
    pub async fn collect_completable_bookings(&self, now: Ms) -> Vec<Ulid> {
        let mut due = Vec::new();
        for ws in self.all_workspaces() {
            let guard = ws.read().await;
            due.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.status == BookingStatus::Confirmed && b.span().end <= now)
                    .map(|b| b.id),
            );
        }
        due
    }

    /// Complete every confirmed booking that has ended. Rows that fail are
    /// logged and skipped. Returns how many were completed.
    pub async fn complete_past_bookings(&self, now: Ms) -> usize {
        let mut completed = 0;
        for id in self.collect_completable_bookings(now).await {
            match self.complete_booking_if_past(id, now).await {
                Ok(true) => completed += 1,
                Ok(false) => debug!(booking = %id, "no longer completable, skipped"),
                Err(e) => {
                    metrics::counter!(crate::observability::SWEEP_FAILURES_TOTAL).increment(1);
                    warn!(booking = %id, error = %e, "failed to complete booking");
                }
            }
        }
        if completed > 0 {
            metrics::counter!(crate::observability::BOOKINGS_COMPLETED_TOTAL)
                .increment(completed as u64);
            info!(completed, "completed past bookings");
        }
        completed
    }

    /// Rewrite the WAL as the minimal event list that rebuilds current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive gate: no new shards while we snapshot. Holding every
        // shard's read guard until the swap keeps writes out of the old file.
        let _gate = self.shard_gate.write().await;
        let workspaces = self.all_workspaces();
        let members = self.all_members();

        let mut ws_guards = Vec::with_capacity(workspaces.len());
        for ws in &workspaces {
            ws_guards.push(ws.read().await);
        }
        let mut member_guards = Vec::with_capacity(members.len());
        for ms in &members {
            member_guards.push(ms.read().await);
        }

        let mut events = Vec::new();
        for ws in &ws_guards {
            snapshot_workspace(ws, &mut events);
        }
        for ms in &member_guards {
            snapshot_member(ms, &mut events);
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        debug!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn snapshot_workspace(ws: &WorkspaceState, events: &mut Vec<Event>) {
    let w = &ws.workspace;
    events.push(Event::WorkspaceCreated {
        id: w.id,
        name: w.name.clone(),
        workspace_type: w.workspace_type,
        capacity: w.capacity,
        hourly_rate: w.hourly_rate,
        amenity_tier: w.amenity_tier,
    });
    for e in &ws.equipment {
        events.push(Event::EquipmentAdded {
            id: e.id,
            workspace_id: e.workspace_id,
            name: e.name.clone(),
            description: e.description.clone(),
            quantity_available: e.quantity_available,
        });
    }
    for b in &ws.bookings {
        events.push(Event::BookingCreated {
            id: b.id,
            workspace_id: b.workspace_id,
            user_id: b.user_id,
            slot: b.slot,
            equipment: b.equipment.clone(),
            price: b.price,
        });
        let (id, workspace_id) = (b.id, b.workspace_id);
        match b.status {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed => events.push(Event::BookingConfirmed { id, workspace_id }),
            BookingStatus::Cancelled => events.push(Event::BookingCancelled { id, workspace_id }),
            BookingStatus::Completed => events.push(Event::BookingCompleted { id, workspace_id }),
        }
    }
}

fn snapshot_member(ms: &MemberState, events: &mut Vec<Event>) {
    events.push(Event::UserRegistered {
        id: ms.user.id,
        email: ms.user.email.clone(),
        role: ms.user.role,
    });
    for m in &ms.memberships {
        events.push(Event::MembershipCreated {
            id: m.id,
            user_id: m.user_id,
            membership_type: m.membership_type,
            amenity_tier: m.amenity_tier,
            starts_at: m.starts_at,
            ends_at: m.ends_at,
        });
    }
    for s in &ms.subscriptions {
        events.push(Event::CantinaSubscribed {
            id: s.id,
            user_id: s.user_id,
            plan: s.plan,
            meals_remaining: s.meals_remaining,
            renews_at: s.renews_at,
        });
    }
}
