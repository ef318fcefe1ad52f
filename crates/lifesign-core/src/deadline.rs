//! Pause engine and deadline computation.
//!
//! Pure state transitions over a [`User`] — the store applies the returned
//! state, the HTTP layer surfaces the rejections. Deadline policy:
//! check-ins and unpausing compute the deadline from *now*; interval changes
//! recompute from the stored `last_check_in`. The grace period is always the
//! user's stored `grace_period_hours`.

use chrono::{DateTime, Duration, Utc};

use crate::error::{LifesignError, Result};
use crate::types::User;

/// Fixed pause duration. Pause auto-expires after this long.
pub const PAUSE_DURATION_HOURS: i64 = 24;

/// Pause-related fields to persist after a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseState {
    pub is_paused: bool,
    pub paused_until: Option<DateTime<Utc>>,
    pub next_deadline: Option<DateTime<Utc>>,
}

/// Deadline after a check-in at `now`: now + interval + grace.
pub fn deadline_after_check_in(
    interval_hours: u32,
    grace_hours: u32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    now + Duration::hours(i64::from(interval_hours) + i64::from(grace_hours))
}

/// Enter pause.
///
/// Rejected while a previous pause is still running, and rejected while the
/// user is already overdue — pausing must not erase an active alert
/// condition. On success the user is due for re-evaluation the moment the
/// pause lapses: `paused_until == next_deadline == now + 24h`.
pub fn enter_pause(user: &User, now: DateTime<Utc>) -> Result<PauseState> {
    if user.is_paused
        && let Some(until) = user.paused_until
        && until > now
    {
        return Err(LifesignError::InvalidOperation(
            "already paused".into(),
        ));
    }
    if !user.is_paused
        && let Some(deadline) = user.next_deadline
        && deadline < now
    {
        return Err(LifesignError::InvalidOperation(
            "cannot pause while overdue".into(),
        ));
    }

    let resume_at = now + Duration::hours(PAUSE_DURATION_HOURS);
    Ok(PauseState {
        is_paused: true,
        paused_until: Some(resume_at),
        next_deadline: Some(resume_at),
    })
}

/// Leave pause: clear `paused_until` and restart the deadline clock from
/// `now`, using either a newly supplied interval or the stored one.
pub fn leave_pause(user: &User, now: DateTime<Utc>, new_interval_hours: Option<u32>) -> PauseState {
    let interval = new_interval_hours.unwrap_or(user.check_in_interval_hours);
    PauseState {
        is_paused: false,
        paused_until: None,
        next_deadline: Some(deadline_after_check_in(
            interval,
            user.grace_period_hours,
            now,
        )),
    }
}

/// Deadline recompute for an interval change. Only meaningful once a
/// check-in exists: `last_check_in + new_interval + grace`.
pub fn interval_change_deadline(user: &User, new_interval_hours: u32) -> Option<DateTime<Utc>> {
    user.last_check_in.map(|last| {
        deadline_after_check_in(new_interval_hours, user.grace_period_hours, last)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactType, DEFAULT_GRACE_PERIOD_HOURS};

    fn user() -> User {
        User {
            id: "u1".into(),
            contact_type: ContactType::Email,
            check_in_interval_hours: 48,
            grace_period_hours: DEFAULT_GRACE_PERIOD_HOURS,
            last_check_in: None,
            next_deadline: None,
            is_paused: false,
            paused_until: None,
            reminder_enabled: true,
            push_token: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_enter_pause_sets_resume_instant() {
        let now = Utc::now();
        let mut u = user();
        u.next_deadline = Some(now + Duration::hours(10));

        let state = enter_pause(&u, now).unwrap();
        let resume = now + Duration::hours(24);
        assert!(state.is_paused);
        assert_eq!(state.paused_until, Some(resume));
        assert_eq!(state.next_deadline, Some(resume));
    }

    #[test]
    fn test_enter_pause_rejected_while_paused() {
        let now = Utc::now();
        let mut u = user();
        u.is_paused = true;
        u.paused_until = Some(now + Duration::hours(3));

        let err = enter_pause(&u, now).unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_enter_pause_allowed_after_pause_lapsed() {
        let now = Utc::now();
        let mut u = user();
        u.is_paused = true;
        u.paused_until = Some(now - Duration::hours(1));

        assert!(enter_pause(&u, now).is_ok());
    }

    #[test]
    fn test_enter_pause_rejected_while_overdue() {
        let now = Utc::now();
        let mut u = user();
        u.next_deadline = Some(now - Duration::minutes(1));

        let err = enter_pause(&u, now).unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_leave_pause_restarts_clock_from_now() {
        let now = Utc::now();
        let mut u = user();
        u.is_paused = true;
        u.paused_until = Some(now + Duration::hours(12));

        let state = leave_pause(&u, now, None);
        assert!(!state.is_paused);
        assert_eq!(state.paused_until, None);
        assert_eq!(state.next_deadline, Some(now + Duration::hours(48 + 6)));
    }

    #[test]
    fn test_leave_pause_with_new_interval() {
        let now = Utc::now();
        let mut u = user();
        u.is_paused = true;

        let state = leave_pause(&u, now, Some(24));
        assert_eq!(state.next_deadline, Some(now + Duration::hours(24 + 6)));
    }

    #[test]
    fn test_interval_change_recomputes_from_last_check_in() {
        let t = Utc::now() - Duration::hours(5);
        let mut u = user();
        u.check_in_interval_hours = 48;
        u.last_check_in = Some(t);

        let deadline = interval_change_deadline(&u, 24).unwrap();
        assert_eq!(deadline, t + Duration::hours(24 + 6));
    }

    #[test]
    fn test_interval_change_without_check_in_is_noop() {
        assert_eq!(interval_change_deadline(&user(), 24), None);
    }
}
