//! Booking prices and the static membership / cantina price tables.

use crate::model::{AmenityTier, CantinaPlan, Cents, MembershipType};

/// `hourly_rate × minutes / 60`, rounded half-up to the cent.
pub fn booking_price(hourly_rate: Cents, duration_minutes: i64) -> Cents {
    // x / 60 rounded half-up == (2x + 60) / 120 for non-negative x
    let scaled = hourly_rate * duration_minutes;
    (2 * scaled + 60).div_euclid(120)
}

pub fn membership_price(membership_type: MembershipType, tier: AmenityTier) -> Cents {
    use AmenityTier::*;
    use MembershipType::*;
    match (membership_type, tier) {
        (DayPass, Basic) => 2_500,
        (DayPass, Standard) => 3_500,
        (DayPass, Premium) => 5_000,
        (Weekly, Basic) => 10_000,
        (Weekly, Standard) => 14_000,
        (Weekly, Premium) => 20_000,
        (Monthly, Basic) => 30_000,
        (Monthly, Standard) => 42_000,
        (Monthly, Premium) => 60_000,
    }
}

pub fn cantina_price(plan: CantinaPlan) -> Cents {
    match plan {
        CantinaPlan::Five => 5_000,
        CantinaPlan::Ten => 9_500,
        CantinaPlan::Twenty => 18_000,
    }
}

/// One row of the published price list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEntry {
    pub product: &'static str,
    pub tier: Option<AmenityTier>,
    pub price: Cents,
}

pub fn price_list() -> Vec<PriceEntry> {
    let mut entries = Vec::new();
    for &membership_type in MembershipType::ALL {
        for &tier in AmenityTier::ALL {
            entries.push(PriceEntry {
                product: membership_type.as_str(),
                tier: Some(tier),
                price: membership_price(membership_type, tier),
            });
        }
    }
    for &plan in CantinaPlan::ALL {
        entries.push(PriceEntry {
            product: plan.product_name(),
            tier: None,
            price: cantina_price(plan),
        });
    }
    entries
}

/// Parse `12`, `12.5` or `12.50` into cents. Negative amounts and more than
/// two fractional digits are rejected.
pub fn parse_cents(s: &str) -> Result<Cents, String> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad amount {s:?}"));
    }
    if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad amount {s:?}: at most two decimal places"));
    }
    let whole: Cents = whole
        .parse()
        .map_err(|e| format!("bad amount {s:?}: {e}"))?;
    let frac: Cents = match frac.len() {
        0 => 0,
        1 => frac.parse::<Cents>().map_err(|e| format!("bad amount {s:?}: {e}"))? * 10,
        _ => frac.parse().map_err(|e| format!("bad amount {s:?}: {e}"))?,
    };
    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(|| format!("amount {s:?} out of range"))
}

pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
