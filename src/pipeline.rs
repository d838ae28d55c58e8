use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::complaint::{Category, Complaint, ComplaintStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Severity,
    #[default]
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ComplaintStatus),
}

impl StatusFilter {
    /// Accepts `all`/`все`, a canonical status, or its display label.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "all" | "все" => Some(StatusFilter::All),
            other => ComplaintStatus::parse(other)
                .or_else(|| ComplaintStatus::from_label(other))
                .map(StatusFilter::Only),
        }
    }

    fn matches(&self, status: ComplaintStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(expected) => *expected == status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "all" => CategoryFilter::All,
            other => CategoryFilter::Only(Category::from(other.to_string())),
        }
    }

    fn matches(&self, category: &Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(expected) => expected == category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSortSpec {
    pub search_text: String,
    pub status: StatusFilter,
    pub category: CategoryFilter,
    /// `None` shows every score; the map overlay sets a floor.
    pub min_score: Option<u8>,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
}

impl FilterSortSpec {
    pub fn sorted_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort_key = key;
        self.sort_direction = direction;
        self
    }

    fn includes(&self, complaint: &Complaint, needle: Option<&str>) -> bool {
        self.category.matches(&complaint.category)
            && self.status.matches(complaint.status)
            && self
                .min_score
                .map_or(true, |floor| complaint.seriousness_score >= floor)
            && needle.map_or(true, |needle| {
                complaint.complaint.to_lowercase().contains(needle)
            })
    }

    fn compare(&self, a: &Complaint, b: &Complaint) -> Ordering {
        let ascending = match self.sort_key {
            SortKey::Date => a.created_or_epoch().cmp(&b.created_or_epoch()),
            SortKey::Severity => a.seriousness_score.cmp(&b.seriousness_score),
        };
        match self.sort_direction {
            SortDirection::Asc => ascending,
            SortDirection::Desc => ascending.reverse(),
        }
    }
}

/// Filtered, ordered view over a complaint snapshot. Ties keep input order.
pub fn derive(complaints: &[Complaint], spec: &FilterSortSpec) -> Vec<Complaint> {
    derive_by(complaints, spec, |complaint| complaint)
}

/// Same as [`derive`] for items that carry a complaint, such as map markers.
pub fn derive_by<T, F>(items: &[T], spec: &FilterSortSpec, complaint_of: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> &Complaint,
{
    let needle = spec.search_text.trim().to_lowercase();
    let needle = (!needle.is_empty()).then_some(needle.as_str());

    let mut view: Vec<T> = items
        .iter()
        .filter(|item| spec.includes(complaint_of(item), needle))
        .cloned()
        .collect();
    view.sort_by(|a, b| spec.compare(complaint_of(a), complaint_of(b)));
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaint::{parse_timestamp, ComplaintId};

    fn complaint(id: i64, score: u8, date: &str) -> Complaint {
        Complaint {
            id: Some(ComplaintId::Number(id)),
            complaint: format!("Жалоба {id}"),
            address: "Бишкек".into(),
            category: Category::Ecology,
            status: ComplaintStatus::New,
            seriousness_score: score,
            created_at: parse_timestamp(date),
            updated_at: None,
        }
    }

    fn scenario() -> Vec<Complaint> {
        vec![
            complaint(1, 3, "2024-01-01"),
            complaint(2, 8, "2024-06-01"),
            complaint(3, 5, "2024-03-01"),
        ]
    }

    fn ids(view: &[Complaint]) -> Vec<i64> {
        view.iter()
            .map(|c| match c.id {
                Some(ComplaintId::Number(id)) => id,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn sorts_by_severity_descending() {
        let spec = FilterSortSpec::default().sorted_by(SortKey::Severity, SortDirection::Desc);
        let view = derive(&scenario(), &spec);
        let scores: Vec<u8> = view.iter().map(|c| c.seriousness_score).collect();
        assert_eq!(scores, vec![8, 5, 3]);
    }

    #[test]
    fn sorts_by_date_ascending() {
        let spec = FilterSortSpec::default().sorted_by(SortKey::Date, SortDirection::Asc);
        let view = derive(&scenario(), &spec);
        assert_eq!(ids(&view), vec![1, 3, 2]);
    }

    #[test]
    fn default_is_newest_first() {
        let view = derive(&scenario(), &FilterSortSpec::default());
        assert_eq!(ids(&view), vec![2, 3, 1]);
    }

    #[test]
    fn missing_dates_sort_as_epoch() {
        let mut list = scenario();
        list.push(complaint(4, 1, ""));
        let spec = FilterSortSpec::default().sorted_by(SortKey::Date, SortDirection::Asc);
        assert_eq!(ids(&derive(&list, &spec))[0], 4);
    }

    #[test]
    fn ties_keep_input_order() {
        let list = vec![
            complaint(1, 5, "2024-01-01"),
            complaint(2, 5, "2024-02-01"),
            complaint(3, 5, "2024-03-01"),
        ];
        let spec = FilterSortSpec::default().sorted_by(SortKey::Severity, SortDirection::Desc);
        assert_eq!(ids(&derive(&list, &spec)), vec![1, 2, 3]);
    }

    #[test]
    fn derive_is_deterministic_and_leaves_input_alone() {
        let list = scenario();
        let snapshot = list.clone();
        let spec = FilterSortSpec {
            min_score: Some(4),
            ..FilterSortSpec::default()
        };
        let first = derive(&list, &spec);
        let second = derive(&list, &spec);
        assert_eq!(first, second);
        assert_eq!(list, snapshot);
        assert_eq!(ids(&first), vec![2, 3]);
    }

    #[test]
    fn filters_by_status_category_and_text() {
        let mut list = scenario();
        list[0].status = ComplaintStatus::Completed;
        list[1].category = Category::Police;
        list[2].complaint = "Свалка мусора во дворе".into();

        let by_status = FilterSortSpec {
            status: StatusFilter::parse("завершена").unwrap(),
            ..FilterSortSpec::default()
        };
        assert_eq!(ids(&derive(&list, &by_status)), vec![1]);

        let by_category = FilterSortSpec {
            category: CategoryFilter::parse("police"),
            ..FilterSortSpec::default()
        };
        assert_eq!(ids(&derive(&list, &by_category)), vec![2]);

        let by_text = FilterSortSpec {
            search_text: "  СВАЛКА ".into(),
            ..FilterSortSpec::default()
        };
        assert_eq!(ids(&derive(&list, &by_text)), vec![3]);
    }

    #[test]
    fn parses_filter_values() {
        assert_eq!(StatusFilter::parse("все"), Some(StatusFilter::All));
        assert_eq!(
            StatusFilter::parse("in_progress"),
            Some(StatusFilter::Only(ComplaintStatus::InProgress))
        );
        assert_eq!(StatusFilter::parse("unknown"), None);
        assert_eq!(
            CategoryFilter::parse("медицина"),
            CategoryFilter::Only(Category::Medicine)
        );
        assert_eq!(CategoryFilter::parse("all"), CategoryFilter::All);
    }
}
