// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rotation trigger: decides whether the next write must go to a fresh file.
//!
//! Pure functions of the writer state and the clock reading; all triggers
//! combine with logical OR ("whichever comes first").

use crate::config::RotationPolicy;
use chrono::{DateTime, Local, NaiveDate, Utc};

/// Why a rotation is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The write would push the active file past `max_size_bytes`.
    Size,
    /// `max_interval` has elapsed since the last rotation.
    Interval,
    /// The calendar day changed since the last rotation.
    Daily,
}

/// Return the first rotation reason that applies, if any.
///
/// Time-based reasons are checked before size so that a daily/interval
/// rotation is reported even when the write also overflows the file.
pub fn evaluate(
    current_size: u64,
    prospective_bytes: u64,
    last_rotation: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &RotationPolicy,
) -> Option<RotationReason> {
    if let Some(interval) = policy.max_interval() {
        // A clock stepping backwards yields a negative delta and never triggers.
        if let Ok(elapsed) = (now - last_rotation).to_std() {
            if elapsed >= interval {
                return Some(RotationReason::Interval);
            }
        }
    }

    if policy.rotate_daily
        && calendar_day(now, policy.local_time) > calendar_day(last_rotation, policy.local_time)
    {
        return Some(RotationReason::Daily);
    }

    if policy.max_size_bytes > 0
        && current_size.saturating_add(prospective_bytes) > policy.max_size_bytes
    {
        return Some(RotationReason::Size);
    }

    None
}

/// True if a rotation is due before writing `prospective_bytes`.
pub fn should_rotate(
    current_size: u64,
    prospective_bytes: u64,
    last_rotation: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &RotationPolicy,
) -> bool {
    evaluate(current_size, prospective_bytes, last_rotation, now, policy).is_some()
}

fn calendar_day(at: DateTime<Utc>, local_time: bool) -> NaiveDate {
    if local_time {
        at.with_timezone(&Local).date_naive()
    } else {
        at.date_naive()
    }
}
