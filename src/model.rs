use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar::{self, Period, DAY_MS, MINUTE_MS};

/// Unix milliseconds. The only instant type the engine uses.
pub type Ms = i64;

/// Money in integer cents.
pub type Cents = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A wall-clock window on one date (UTC). Never crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl Slot {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self { date, start_time, end_time }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start_time < self.end_time
    }

    /// Absolute span of the slot. Only meaningful when well-formed.
    pub fn span(&self) -> Span {
        Span {
            start: calendar::at(self.date, self.start_time),
            end: calendar::at(self.date, self.end_time),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

// ── Labelled enums ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

impl std::fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.label)
    }
}

impl std::error::Error for UnknownLabel {}

/// Closed set of variants with a stable lowercase label used in SQL and rows.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident ($kind:literal) { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(UnknownLabel { kind: $kind, label: s.to_string() }),
                }
            }
        }
    };
}

labelled_enum! {
    BookingStatus("booking status") {
        Pending => "pending",
        Confirmed => "confirmed",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

impl BookingStatus {
    /// Pending and confirmed bookings hold their slot; the rest never conflict.
    pub fn holds_slot(self) -> bool {
        match self {
            BookingStatus::Pending | BookingStatus::Confirmed => true,
            BookingStatus::Cancelled | BookingStatus::Completed => false,
        }
    }
}

labelled_enum! {
    WorkspaceType("workspace type") {
        Desk => "desk",
        PrivateOffice => "private_office",
        MeetingRoom => "meeting_room",
        Workshop => "workshop",
    }
}

labelled_enum! {
    AmenityTier("amenity tier") {
        Basic => "basic",
        Standard => "standard",
        Premium => "premium",
    }
}

labelled_enum! {
    MembershipType("membership type") {
        DayPass => "day_pass",
        Weekly => "weekly",
        Monthly => "monthly",
    }
}

impl MembershipType {
    /// How far one extension pushes `ends_at`; also the default window length.
    pub fn extension(self) -> Period {
        match self {
            MembershipType::DayPass => Period::Days(1),
            MembershipType::Weekly => Period::Days(7),
            MembershipType::Monthly => Period::Months(1),
        }
    }
}

labelled_enum! {
    CantinaPlan("cantina plan") {
        Five => "five",
        Ten => "ten",
        Twenty => "twenty",
    }
}

impl CantinaPlan {
    pub fn meal_limit(self) -> u32 {
        match self {
            CantinaPlan::Five => 5,
            CantinaPlan::Ten => 10,
            CantinaPlan::Twenty => 20,
        }
    }

    pub fn period(self) -> Period {
        Period::Months(1)
    }

    pub fn product_name(self) -> &'static str {
        match self {
            CantinaPlan::Five => "cantina_five",
            CantinaPlan::Ten => "cantina_ten",
            CantinaPlan::Twenty => "cantina_twenty",
        }
    }
}

labelled_enum! {
    Role("role") {
        Member => "member",
        Admin => "admin",
    }
}

labelled_enum! {
    MembershipStatus("membership status") {
        Future => "future",
        Active => "active",
        Expired => "expired",
    }
}

labelled_enum! {
    SubscriptionStatus("subscription status") {
        Active => "active",
        Exhausted => "exhausted",
        Due => "due",
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: Ulid,
    pub name: String,
    pub workspace_type: WorkspaceType,
    pub capacity: u32,
    pub hourly_rate: Cents,
    pub amenity_tier: AmenityTier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    pub id: Ulid,
    pub workspace_id: Ulid,
    pub name: String,
    pub description: Option<String>,
    pub quantity_available: u32,
}

impl Equipment {
    pub fn is_available(&self) -> bool {
        self.quantity_available > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Ulid,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub workspace_id: Ulid,
    pub user_id: Ulid,
    pub slot: Slot,
    pub status: BookingStatus,
    /// Equipment ids; an id listed twice uses two units.
    pub equipment: Vec<Ulid>,
    pub price: Cents,
}

impl Booking {
    pub fn span(&self) -> Span {
        self.slot.span()
    }

    pub fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    pub fn is_cancellable(&self, now: Ms) -> bool {
        self.status.holds_slot() && now < self.span().start
    }

    pub fn units_of(&self, equipment_id: &Ulid) -> u32 {
        self.equipment.iter().filter(|e| *e == equipment_id).count() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub id: Ulid,
    pub user_id: Ulid,
    pub membership_type: MembershipType,
    pub amenity_tier: AmenityTier,
    pub starts_at: Ms,
    pub ends_at: Ms,
}

impl Membership {
    /// Both window ends are inclusive.
    pub fn status(&self, now: Ms) -> MembershipStatus {
        if now < self.starts_at {
            MembershipStatus::Future
        } else if now > self.ends_at {
            MembershipStatus::Expired
        } else {
            MembershipStatus::Active
        }
    }

    pub fn is_active(&self, now: Ms) -> bool {
        self.status(now) == MembershipStatus::Active
    }

    pub fn is_future(&self, now: Ms) -> bool {
        self.status(now) == MembershipStatus::Future
    }

    pub fn is_expired(&self, now: Ms) -> bool {
        self.status(now) == MembershipStatus::Expired
    }

    pub fn is_expiring_soon(&self, now: Ms, within_days: u32) -> bool {
        self.is_active(now) && self.ends_at - now <= Ms::from(within_days) * DAY_MS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CantinaSubscription {
    pub id: Ulid,
    pub user_id: Ulid,
    pub plan: CantinaPlan,
    pub meals_remaining: u32,
    pub renews_at: Ms,
}

impl CantinaSubscription {
    pub fn is_due(&self, now: Ms) -> bool {
        self.renews_at <= now
    }

    pub fn status(&self, now: Ms) -> SubscriptionStatus {
        if self.is_due(now) {
            SubscriptionStatus::Due
        } else if self.meals_remaining == 0 {
            SubscriptionStatus::Exhausted
        } else {
            SubscriptionStatus::Active
        }
    }

    /// `meals_remaining / meal_limit × 100`, rounded half-up.
    pub fn meals_remaining_percentage(&self) -> u32 {
        let limit = self.plan.meal_limit();
        (200 * self.meals_remaining + limit) / (2 * limit)
    }
}

// ── Shard state ──────────────────────────────────────────────────

/// Everything that must be consistent under one workspace lock.
#[derive(Debug, Clone)]
pub struct WorkspaceState {
    pub workspace: Workspace,
    pub equipment: Vec<Equipment>,
    /// All bookings regardless of status, sorted by span start.
    pub bookings: Vec<Booking>,
}

impl WorkspaceState {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            equipment: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let start = booking.span().start;
        let pos = self.bookings.partition_point(|b| b.span().start <= start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    pub fn equipment_item(&self, id: &Ulid) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.id == *id)
    }

    pub fn equipment_item_mut(&mut self, id: &Ulid) -> Option<&mut Equipment> {
        self.equipment.iter_mut().find(|e| e.id == *id)
    }

    /// Bookings of any status whose span overlaps `query`.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let query = *query;
        let right_bound = self
            .bookings
            .partition_point(|b| b.span().start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span().end > query.start)
    }

    /// Slot-holding bookings overlapping `query`, minus `exclude`.
    pub fn holding_overlapping(
        &self,
        query: &Span,
        exclude: Option<Ulid>,
    ) -> impl Iterator<Item = &Booking> {
        self.overlapping(query)
            .filter(move |b| b.holds_slot() && Some(b.id) != exclude)
    }
}

/// Everything that must be consistent under one user lock.
#[derive(Debug, Clone)]
pub struct MemberState {
    pub user: User,
    pub memberships: Vec<Membership>,
    pub subscriptions: Vec<CantinaSubscription>,
}

impl MemberState {
    pub fn new(user: User) -> Self {
        Self {
            user,
            memberships: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn membership(&self, id: &Ulid) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.id == *id)
    }

    pub fn subscription(&self, id: &Ulid) -> Option<&CantinaSubscription> {
        self.subscriptions.iter().find(|s| s.id == *id)
    }

    pub fn membership_mut(&mut self, id: &Ulid) -> Option<&mut Membership> {
        self.memberships.iter_mut().find(|m| m.id == *id)
    }

    pub fn subscription_mut(&mut self, id: &Ulid) -> Option<&mut CantinaSubscription> {
        self.subscriptions.iter_mut().find(|s| s.id == *id)
    }

    pub fn has_active_membership(&self, now: Ms) -> bool {
        self.memberships.iter().any(|m| m.is_active(now))
    }

    pub fn has_meal_credits(&self) -> bool {
        self.subscriptions.iter().any(|s| s.meals_remaining > 0)
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    WorkspaceCreated {
        id: Ulid,
        name: String,
        workspace_type: WorkspaceType,
        capacity: u32,
        hourly_rate: Cents,
        amenity_tier: AmenityTier,
    },
    EquipmentAdded {
        id: Ulid,
        workspace_id: Ulid,
        name: String,
        description: Option<String>,
        quantity_available: u32,
    },
    EquipmentQuantitySet {
        id: Ulid,
        workspace_id: Ulid,
        quantity_available: u32,
    },
    UserRegistered {
        id: Ulid,
        email: String,
        role: Role,
    },
    BookingCreated {
        id: Ulid,
        workspace_id: Ulid,
        user_id: Ulid,
        slot: Slot,
        equipment: Vec<Ulid>,
        price: Cents,
    },
    BookingConfirmed {
        id: Ulid,
        workspace_id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        workspace_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        workspace_id: Ulid,
    },
    MembershipCreated {
        id: Ulid,
        user_id: Ulid,
        membership_type: MembershipType,
        amenity_tier: AmenityTier,
        starts_at: Ms,
        ends_at: Ms,
    },
    MembershipExtended {
        id: Ulid,
        user_id: Ulid,
        ends_at: Ms,
    },
    CantinaSubscribed {
        id: Ulid,
        user_id: Ulid,
        plan: CantinaPlan,
        meals_remaining: u32,
        renews_at: Ms,
    },
    MealUsed {
        id: Ulid,
        user_id: Ulid,
    },
    CantinaRenewed {
        id: Ulid,
        user_id: Ulid,
        renews_at: Ms,
    },
}

/// Which lock an event is applied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shard {
    Workspace(Ulid),
    User(Ulid),
}

impl Event {
    pub fn shard(&self) -> Shard {
        match self {
            Event::WorkspaceCreated { id, .. } => Shard::Workspace(*id),
            Event::EquipmentAdded { workspace_id, .. }
            | Event::EquipmentQuantitySet { workspace_id, .. }
            | Event::BookingCreated { workspace_id, .. }
            | Event::BookingConfirmed { workspace_id, .. }
            | Event::BookingCancelled { workspace_id, .. }
            | Event::BookingCompleted { workspace_id, .. } => Shard::Workspace(*workspace_id),
            Event::UserRegistered { id, .. } => Shard::User(*id),
            Event::MembershipCreated { user_id, .. }
            | Event::MembershipExtended { user_id, .. }
            | Event::CantinaSubscribed { user_id, .. }
            | Event::MealUsed { user_id, .. }
            | Event::CantinaRenewed { user_id, .. } => Shard::User(*user_id),
        }
    }

    /// Id of the entity this event brings into existence, if any.
    pub fn created_id(&self) -> Option<Ulid> {
        match self {
            Event::WorkspaceCreated { id, .. }
            | Event::EquipmentAdded { id, .. }
            | Event::UserRegistered { id, .. }
            | Event::BookingCreated { id, .. }
            | Event::MembershipCreated { id, .. }
            | Event::CantinaSubscribed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

// ── Commands and filters ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: Ulid,
    pub workspace_id: Ulid,
    pub user_id: Ulid,
    pub slot: Slot,
    pub equipment: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    pub id: Ulid,
    pub user_id: Ulid,
    pub membership_type: MembershipType,
    pub amenity_tier: AmenityTier,
    pub starts_at: Ms,
    /// Defaults to `starts_at` plus one extension of the type.
    pub ends_at: Option<Ms>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceFilter {
    pub workspace_type: Option<WorkspaceType>,
    pub amenity_tier: Option<AmenityTier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquipmentFilter {
    pub workspace_id: Option<Ulid>,
    pub available: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub id: Option<Ulid>,
    pub workspace_id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.id.is_none_or(|id| booking.id == id)
            && self.workspace_id.is_none_or(|w| booking.workspace_id == w)
            && self.user_id.is_none_or(|u| booking.user_id == u)
            && self.date.is_none_or(|d| booking.slot.date == d)
            && self.status.is_none_or(|s| booking.status == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipFilter {
    pub user_id: Option<Ulid>,
    pub status: Option<MembershipStatus>,
    pub expiring_within_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub user_id: Option<Ulid>,
    pub status: Option<SubscriptionStatus>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user: User,
    pub active_membership: bool,
    pub has_meal_credits: bool,
}

/// Minutes since midnight, for free-span rows.
pub fn minutes_into_day(date: NaiveDate, t: Ms) -> i64 {
    (t - calendar::midnight(date)) / MINUTE_MS
}
