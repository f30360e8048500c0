use chrono::NaiveDate;

use crate::calendar;
use crate::model::*;

/// Free parts of `[00:00, 24:00)` on `date` once slot-holding bookings are
/// removed. Sorted, disjoint, half-open.
pub fn free_spans(ws: &WorkspaceState, date: NaiveDate) -> Vec<Span> {
    let day = calendar::day_span(date);
    let mut held: Vec<Span> = ws
        .holding_overlapping(&day, None)
        .map(|b| b.span())
        .collect();
    held.sort_by_key(|s| s.start);
    subtract_intervals(&[day], &merge_overlapping(&held))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base − to_remove`. Both inputs sorted by start; `to_remove` may overlap itself.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

/// Sweep line: the most units held at any instant inside `window` by the
/// given `(span, units)` allocations.
pub fn peak_load(allocs: &[(Span, u32)], window: &Span) -> u32 {
    let mut events: Vec<(Ms, i64)> = Vec::with_capacity(allocs.len() * 2);
    for (span, units) in allocs {
        if *units == 0 || !span.overlaps(window) {
            continue;
        }
        events.push((span.start.max(window.start), i64::from(*units)));
        events.push((span.end.min(window.end), -i64::from(*units)));
    }
    // Releases sort before acquisitions at the same instant (half-open).
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut load: i64 = 0;
    let mut peak: i64 = 0;
    for (_, delta) in events {
        load += delta;
        peak = peak.max(load);
    }
    peak as u32
}
