use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::complaint::{Category, Complaint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Month,
    Year,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DateRange {
    /// Lower bound for the rolling ranges; `None` for `All` and `Custom`.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DateRange::All | DateRange::Custom { .. } => None,
            DateRange::Today => Some(now.date_naive().and_time(NaiveTime::MIN).and_utc()),
            DateRange::Week => Some(now - Duration::days(7)),
            DateRange::Month => now.checked_sub_months(Months::new(1)),
            DateRange::Year => now.checked_sub_months(Months::new(12)),
        }
    }

    fn contains(&self, created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self, created) {
            (DateRange::All, _) => true,
            (_, None) => false,
            (DateRange::Custom { start, end }, Some(at)) => *start <= at && at <= *end,
            (range, Some(at)) => range.start(now).map_or(true, |start| at >= start),
        }
    }
}

/// Complaints created within `range`. Records without a creation date only
/// survive the `All` range.
pub fn filter_by_range(
    complaints: &[Complaint],
    range: DateRange,
    now: DateTime<Utc>,
) -> Vec<Complaint> {
    complaints
        .iter()
        .filter(|complaint| range.contains(complaint.created_at, now))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub label: String,
    pub count: usize,
}

/// Counts per category in first-seen order.
pub fn category_breakdown(complaints: &[Complaint]) -> Vec<CategoryCount> {
    let mut counts: Vec<CategoryCount> = Vec::new();
    for complaint in complaints {
        match counts
            .iter_mut()
            .find(|entry| entry.category == complaint.category)
        {
            Some(entry) => entry.count += 1,
            None => counts.push(CategoryCount {
                category: complaint.category.clone(),
                label: complaint.category.label().to_string(),
                count: 1,
            }),
        }
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

pub fn yearly_counts(complaints: &[Complaint]) -> Vec<YearCount> {
    let mut years: BTreeMap<i32, usize> = BTreeMap::new();
    for created in complaints.iter().filter_map(|c| c.created_at) {
        *years.entry(created.year()).or_default() += 1;
    }
    years
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}
