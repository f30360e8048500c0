//! Hard caps on per-tenant state and request sizes.

use crate::model::{Cents, Ms};

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 64;

pub const MAX_WORKSPACES_PER_TENANT: usize = 10_000;
pub const MAX_USERS_PER_TENANT: usize = 100_000;
pub const MAX_BOOKINGS_PER_WORKSPACE: usize = 100_000;
pub const MAX_EQUIPMENT_PER_WORKSPACE: usize = 1_000;
pub const MAX_MEMBERSHIPS_PER_USER: usize = 1_000;
pub const MAX_SUBSCRIPTIONS_PER_USER: usize = 1_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_EMAIL_LEN: usize = 320;

/// Units of equipment a single booking may request (duplicates included).
pub const MAX_EQUIPMENT_PER_BOOKING: usize = 64;

pub const MAX_CAPACITY: u32 = 10_000;
pub const MAX_EQUIPMENT_QUANTITY: u32 = 100_000;
/// 100 000.00 per hour.
pub const MAX_HOURLY_RATE: Cents = 10_000_000;

/// Membership windows wider than this are rejected (~100 years).
pub const MAX_MEMBERSHIP_WINDOW_MS: Ms = 100 * 366 * 86_400_000;
