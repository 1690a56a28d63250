//! Date buckets for the conversation sidebar.
//!
//! DESIGN
//! ======
//! Boundaries are calendar dates in the viewer's timezone, compared as local
//! wall-clock times at midnight. Each item lands in the first bucket whose
//! lower edge it reaches (edges are inclusive), so the buckets are mutually
//! exclusive and their order is fixed. Input order is kept inside a bucket
//! and empty buckets are dropped.
//!
//! Month arithmetic clamps to the end of the shorter month: 31 March minus
//! one month is the last day of February.

use std::fmt;

use chrono::{DateTime, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Conversation, ConversationWithMessages};

// =============================================================================
// PERIOD
// =============================================================================

/// A named recency window. Declaration order is display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    Today,
    Yesterday,
    LastSevenDays,
    LastMonth,
    LastThreeMonths,
    LastSixMonths,
    Older,
}

impl Period {
    /// Every period in display order.
    pub const ALL: [Self; 7] = [
        Self::Today,
        Self::Yesterday,
        Self::LastSevenDays,
        Self::LastMonth,
        Self::LastThreeMonths,
        Self::LastSixMonths,
        Self::Older,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::LastSevenDays => "Last 7 days",
            Self::LastMonth => "Last month",
            Self::LastThreeMonths => "Last 3 months",
            Self::LastSixMonths => "Last 6 months",
            Self::Older => "Older",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A non-empty bucket of items sharing a [`Period`].
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodGroup<T> {
    pub period: Period,
    pub conversations: Vec<T>,
}

// =============================================================================
// DATED
// =============================================================================

/// Anything ordered by a last-modified instant.
pub trait Dated {
    fn updated_at(&self) -> DateTime<Utc>;
}

impl Dated for Conversation {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Dated for ConversationWithMessages {
    fn updated_at(&self) -> DateTime<Utc> {
        self.conversation.updated_at
    }
}

impl<T: Dated + ?Sized> Dated for &T {
    fn updated_at(&self) -> DateTime<Utc> {
        (**self).updated_at()
    }
}

// =============================================================================
// BOUNDARIES
// =============================================================================

/// Lower edges of each bucket as local midnights, derived from one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boundaries {
    pub today: NaiveDateTime,
    pub yesterday: NaiveDateTime,
    pub last_week: NaiveDateTime,
    pub last_month: NaiveDateTime,
    pub last_three_months: NaiveDateTime,
    pub last_six_months: NaiveDateTime,
}

impl Boundaries {
    /// Compute the boundaries for `now` in `now`'s own timezone.
    #[must_use]
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = now.date_naive();
        Self {
            today: midnight(today),
            yesterday: midnight(minus_days(today, 1)),
            last_week: midnight(minus_days(today, 7)),
            last_month: midnight(minus_months(today, 1)),
            last_three_months: midnight(minus_months(today, 3)),
            last_six_months: midnight(minus_months(today, 6)),
        }
    }

    /// Classify a local wall-clock time. First matching edge wins.
    #[must_use]
    pub fn classify(&self, local: NaiveDateTime) -> Period {
        if local >= self.today {
            Period::Today
        } else if local >= self.yesterday {
            Period::Yesterday
        } else if local >= self.last_week {
            Period::LastSevenDays
        } else if local >= self.last_month {
            Period::LastMonth
        } else if local >= self.last_three_months {
            Period::LastThreeMonths
        } else if local >= self.last_six_months {
            Period::LastSixMonths
        } else {
            Period::Older
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn minus_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

fn minus_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

// =============================================================================
// GROUPING
// =============================================================================

/// Partition `items` into ordered, non-empty period buckets relative to `now`.
///
/// Timestamps are converted into `now`'s timezone before comparison, so the
/// caller picks the calendar (browser-local, server-local, or UTC).
pub fn group_by_period<T, Tz>(
    items: impl IntoIterator<Item = T>,
    now: &DateTime<Tz>,
) -> Vec<PeriodGroup<T>>
where
    T: Dated,
    Tz: TimeZone,
{
    let boundaries = Boundaries::at(now);
    let tz = now.timezone();

    let mut buckets: [Vec<T>; 7] = Default::default();
    for item in items {
        let local = item.updated_at().with_timezone(&tz).naive_local();
        buckets[boundaries.classify(local).index()].push(item);
    }

    Period::ALL
        .into_iter()
        .zip(buckets)
        .filter(|(_, conversations)| !conversations.is_empty())
        .map(|(period, conversations)| PeriodGroup { period, conversations })
        .collect()
}

/// [`group_by_period`] against the current local time.
pub fn group_by_period_local<T: Dated>(
    items: impl IntoIterator<Item = T>,
) -> Vec<PeriodGroup<T>> {
    group_by_period(items, &Local::now())
}

#[cfg(test)]
#[path = "bucket_test.rs"]
mod tests;
