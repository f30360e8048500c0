//! Membership and cantina lifecycles. Every transition re-checks its
//! precondition under the owning member's write lock.

use ulid::Ulid;

use crate::calendar;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn create_membership(&self, req: NewMembership) -> Result<Membership, EngineError> {
        let ends_at = match req.ends_at {
            Some(end) => end,
            None => calendar::advance(req.starts_at, req.membership_type.extension())
                .ok_or_else(|| EngineError::validation("membership start out of range"))?,
        };
        if req.starts_at >= ends_at {
            return Err(EngineError::validation(format!(
                "starts_at {} must be before ends_at {}",
                calendar::format_timestamp(req.starts_at),
                calendar::format_timestamp(ends_at)
            )));
        }
        check_window(req.starts_at, ends_at)?;
        let ms = self.get_member(&req.user_id).ok_or(EngineError::NotFound(req.user_id))?;
        let mut guard = ms.write().await;
        if guard.memberships.len() >= MAX_MEMBERSHIPS_PER_USER {
            return Err(EngineError::LimitExceeded("too many memberships"));
        }

        let event = Event::MembershipCreated {
            id: req.id,
            user_id: req.user_id,
            membership_type: req.membership_type,
            amenity_tier: req.amenity_tier,
            starts_at: req.starts_at,
            ends_at,
        };
        self.claim_id(req.id)?;
        if let Err(e) = self.persist_to_member(&mut guard, &event).await {
            self.release_id(&req.id);
            return Err(e);
        }
        membership(&guard, req.id)
    }

    /// Push `ends_at` forward by one increment of the membership's type.
    /// Only active memberships can be extended.
    pub async fn extend_membership(&self, id: Ulid, now: Ms) -> Result<Membership, EngineError> {
        let mut guard = self.resolve_member_write(&id).await?;
        let current = membership(&guard, id)?;
        let status = current.status(now);
        if status != MembershipStatus::Active {
            return Err(EngineError::state(format!(
                "membership {id} is {status}, only active memberships can be extended"
            )));
        }
        let ends_at = calendar::advance(current.ends_at, current.membership_type.extension())
            .ok_or_else(|| EngineError::validation("membership end out of range"))?;
        check_window(current.starts_at, ends_at)?;
        let event = Event::MembershipExtended {
            id,
            user_id: current.user_id,
            ends_at,
        };
        self.persist_to_member(&mut guard, &event).await?;
        membership(&guard, id)
    }

    /// New subscription with a full meal balance. `renews_at` defaults to one
    /// plan period from `now`.
    pub async fn subscribe_cantina(
        &self,
        id: Ulid,
        user_id: Ulid,
        plan: CantinaPlan,
        renews_at: Option<Ms>,
        now: Ms,
    ) -> Result<CantinaSubscription, EngineError> {
        let renews_at = match renews_at {
            Some(at) => at,
            None => calendar::advance(now, plan.period())
                .ok_or_else(|| EngineError::validation("renewal date out of range"))?,
        };
        let ms = self.get_member(&user_id).ok_or(EngineError::NotFound(user_id))?;
        let mut guard = ms.write().await;
        if guard.subscriptions.len() >= MAX_SUBSCRIPTIONS_PER_USER {
            return Err(EngineError::LimitExceeded("too many cantina subscriptions"));
        }

        let event = Event::CantinaSubscribed {
            id,
            user_id,
            plan,
            meals_remaining: plan.meal_limit(),
            renews_at,
        };
        self.claim_id(id)?;
        if let Err(e) = self.persist_to_member(&mut guard, &event).await {
            self.release_id(&id);
            return Err(e);
        }
        subscription(&guard, id)
    }

    pub async fn use_meal(&self, id: Ulid) -> Result<CantinaSubscription, EngineError> {
        let mut guard = self.resolve_member_write(&id).await?;
        let current = subscription(&guard, id)?;
        if current.meals_remaining == 0 {
            return Err(EngineError::InsufficientCredits(id));
        }
        let event = Event::MealUsed {
            id,
            user_id: current.user_id,
        };
        self.persist_to_member(&mut guard, &event).await?;
        metrics::counter!(crate::observability::MEALS_USED_TOTAL).increment(1);
        subscription(&guard, id)
    }

    /// Refill to the plan's limit and move `renews_at` one period forward
    /// from its previous value. Only allowed once due.
    pub async fn renew_cantina(&self, id: Ulid, now: Ms) -> Result<CantinaSubscription, EngineError> {
        let mut guard = self.resolve_member_write(&id).await?;
        let current = subscription(&guard, id)?;
        if !current.is_due(now) {
            return Err(EngineError::state(format!(
                "subscription {id} is not due until {}",
                calendar::format_timestamp(current.renews_at)
            )));
        }
        let renews_at = calendar::advance(current.renews_at, current.plan.period())
            .ok_or_else(|| EngineError::validation("renewal date out of range"))?;
        let event = Event::CantinaRenewed {
            id,
            user_id: current.user_id,
            renews_at,
        };
        self.persist_to_member(&mut guard, &event).await?;
        subscription(&guard, id)
    }
}

fn membership(ms: &MemberState, id: Ulid) -> Result<Membership, EngineError> {
    ms.membership(&id).cloned().ok_or(EngineError::NotFound(id))
}

fn subscription(ms: &MemberState, id: Ulid) -> Result<CantinaSubscription, EngineError> {
    ms.subscription(&id).cloned().ok_or(EngineError::NotFound(id))
}

/// `ends_at - starts_at` must fit the widest allowed window. The difference
/// itself can overflow for timestamps near the ends of `i64`.
fn check_window(starts_at: Ms, ends_at: Ms) -> Result<(), EngineError> {
    match ends_at.checked_sub(starts_at) {
        Some(width) if width <= MAX_MEMBERSHIP_WINDOW_MS => Ok(()),
        _ => Err(EngineError::LimitExceeded("membership window too wide")),
    }
}
