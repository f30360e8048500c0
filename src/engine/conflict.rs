use std::collections::BTreeMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::peak_load;
use super::EngineError;

/// Structural checks on a slot; returns its absolute span.
pub(crate) fn validate_slot(slot: &Slot) -> Result<Span, EngineError> {
    if !slot.is_well_formed() {
        return Err(EngineError::validation(format!(
            "start time {} must be before end time {}",
            slot.start_time, slot.end_time
        )));
    }
    Ok(slot.span())
}

/// First slot-holding booking overlapping `span`, ignoring `exclude`.
pub(crate) fn find_conflict(ws: &WorkspaceState, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    ws.holding_overlapping(span, exclude).next().map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    ws: &WorkspaceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(ws, span, exclude) {
        Some(existing) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::Conflict(existing))
        }
        None => Ok(()),
    }
}

/// Requested units per equipment id, in id order.
pub(crate) fn tally(equipment: &[Ulid]) -> BTreeMap<Ulid, u32> {
    let mut counts = BTreeMap::new();
    for id in equipment {
        *counts.entry(*id).or_insert(0) += 1;
    }
    counts
}

/// Every requested item belongs to this workshop and still has enough units
/// free across `span`, counting the peak load of overlapping bookings.
pub(crate) fn check_equipment(
    ws: &WorkspaceState,
    span: &Span,
    equipment: &[Ulid],
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if equipment.is_empty() {
        return Ok(());
    }
    if equipment.len() > MAX_EQUIPMENT_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too much equipment on one booking"));
    }
    if ws.workspace.workspace_type != WorkspaceType::Workshop {
        return Err(EngineError::validation(format!(
            "equipment can only be booked with a workshop, {} is a {}",
            ws.workspace.id, ws.workspace.workspace_type
        )));
    }

    let holders: Vec<&Booking> = ws.holding_overlapping(span, exclude).collect();
    for (id, wanted) in tally(equipment) {
        let item = ws.equipment_item(&id).ok_or_else(|| {
            EngineError::validation(format!(
                "equipment {id} does not belong to workspace {}",
                ws.workspace.id
            ))
        })?;
        let allocs: Vec<(Span, u32)> = holders
            .iter()
            .map(|b| (b.span(), b.units_of(&id)))
            .collect();
        let in_use = peak_load(&allocs, span);
        if in_use + wanted > item.quantity_available {
            return Err(EngineError::validation(format!(
                "equipment {id} ({}): {wanted} requested, {} of {} free",
                item.name,
                item.quantity_available.saturating_sub(in_use),
                item.quantity_available
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), EngineError> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(EngineError::validation(format!("invalid email {email:?}"))),
    }
}
