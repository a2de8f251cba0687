use std::collections::HashSet;

use crate::model::*;

use super::ValidationError;

pub const MAX_PROPOSED_TIMES: usize = 3;

/// Trimmed reason, or `MissingReason` when blank.
pub fn validate_decline_reason(reason: &str) -> Result<&str, ValidationError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::MissingReason);
    }
    Ok(reason)
}

/// 1–3 well-formed future slots with distinct starts, plus a non-blank message.
pub fn validate_suggestion(
    times: &[TimeSlot],
    message: &str,
    now: Timestamp,
) -> Result<(), ValidationError> {
    if times.is_empty() || times.len() > MAX_PROPOSED_TIMES {
        return Err(ValidationError::SlotCount(times.len()));
    }
    let mut starts = HashSet::with_capacity(times.len());
    for slot in times {
        if slot.start <= now {
            return Err(ValidationError::SlotNotInFuture(slot.start));
        }
        if slot.end <= slot.start {
            return Err(ValidationError::SlotNotAfterStart(slot.start));
        }
        if !starts.insert(slot.start) {
            return Err(ValidationError::DuplicateSlot(slot.start));
        }
    }
    if message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(())
}
