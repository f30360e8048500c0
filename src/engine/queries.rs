use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::free_spans;
use super::conflict::{find_conflict, validate_slot};
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_workspaces(&self, filter: &WorkspaceFilter) -> Vec<Workspace> {
        let mut out = Vec::new();
        for ws in self.all_workspaces() {
            let guard = ws.read().await;
            let w = &guard.workspace;
            if filter.workspace_type.is_none_or(|t| w.workspace_type == t)
                && filter.amenity_tier.is_none_or(|t| w.amenity_tier == t)
            {
                out.push(w.clone());
            }
        }
        out.sort_by_key(|w| w.id);
        out
    }

    pub async fn list_equipment(&self, filter: &EquipmentFilter) -> Vec<Equipment> {
        let shards: Vec<_> = match filter.workspace_id {
            Some(id) => self.get_workspace(&id).into_iter().collect(),
            None => self.all_workspaces(),
        };
        let mut out = Vec::new();
        for ws in shards {
            let guard = ws.read().await;
            out.extend(
                guard
                    .equipment
                    .iter()
                    .filter(|e| filter.available.is_none_or(|a| e.is_available() == a))
                    .cloned(),
            );
        }
        out.sort_by_key(|e| e.id);
        out
    }

    /// Bookings matching every set field of `filter`, ordered by date and start time.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        // Narrow to one shard when the filter pins it.
        let pinned = filter
            .workspace_id
            .or_else(|| filter.id.and_then(|id| self.workspace_of.get(&id).map(|e| *e.value())));
        let shards: Vec<_> = match pinned {
            Some(id) => self.get_workspace(&id).into_iter().collect(),
            None => self.all_workspaces(),
        };
        let mut out = Vec::new();
        for ws in shards {
            let guard = ws.read().await;
            out.extend(guard.bookings.iter().filter(|b| filter.matches(b)).cloned());
        }
        out.sort_by_key(|b| (b.span().start, b.id));
        out
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let filter = BookingFilter {
            id: Some(id),
            ..Default::default()
        };
        self.list_bookings(&filter)
            .await
            .into_iter()
            .next()
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_memberships(&self, filter: &MembershipFilter, now: Ms) -> Vec<Membership> {
        let mut out = Vec::new();
        for ms in self.member_shards(filter.user_id) {
            let guard = ms.read().await;
            out.extend(
                guard
                    .memberships
                    .iter()
                    .filter(|m| filter.status.is_none_or(|s| m.status(now) == s))
                    .filter(|m| {
                        filter
                            .expiring_within_days
                            .is_none_or(|days| m.is_expiring_soon(now, days))
                    })
                    .cloned(),
            );
        }
        out.sort_by_key(|m| (m.ends_at, m.id));
        out
    }

    pub async fn list_subscriptions(
        &self,
        filter: &SubscriptionFilter,
        now: Ms,
    ) -> Vec<CantinaSubscription> {
        let mut out = Vec::new();
        for ms in self.member_shards(filter.user_id) {
            let guard = ms.read().await;
            out.extend(
                guard
                    .subscriptions
                    .iter()
                    .filter(|s| filter.status.is_none_or(|st| s.status(now) == st))
                    .cloned(),
            );
        }
        out.sort_by_key(|s| s.id);
        out
    }

    pub async fn list_users(&self, id: Option<Ulid>, now: Ms) -> Vec<UserInfo> {
        let mut out = Vec::new();
        for ms in self.member_shards(id) {
            let guard = ms.read().await;
            out.push(UserInfo {
                user: guard.user.clone(),
                active_membership: guard.has_active_membership(now),
                has_meal_credits: guard.has_meal_credits(),
            });
        }
        out.sort_by_key(|u| u.user.id);
        out
    }

    /// Free spans of `[00:00, 24:00)` on `date` for one workspace.
    pub async fn day_availability(
        &self,
        workspace_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.read().await;
        Ok(free_spans(&guard, date))
    }

    /// Read-only conflict probe. Pending and confirmed bookings count;
    /// `exclude` lets an existing booking test a move against everyone else.
    pub async fn has_conflict(
        &self,
        workspace_id: Ulid,
        slot: &Slot,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = validate_slot(slot)?;
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.read().await;
        Ok(find_conflict(&guard, &span, exclude).is_some())
    }

    fn member_shards(&self, user_id: Option<Ulid>) -> Vec<super::SharedMemberState> {
        match user_id {
            Some(id) => self.get_member(&id).into_iter().collect(),
            None => self.all_members(),
        }
    }
}
