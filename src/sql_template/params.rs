use chrono::NaiveDate;
use log::warn;

use crate::filters::{FilterState, ObjectCategory, ResolvedRange, ALL_VALUES};

/// Cost multipliers above the per-user average used to bucket query
/// priority in cost reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostPolicy {
    pub critical_multiplier: f64,
    pub high_multiplier: f64,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self {
            critical_multiplier: 2.0,
            high_multiplier: 1.5,
        }
    }
}

/// Restriction of a query to a single object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFilter {
    pub column: &'static str,
    pub value: String,
}

/// Concrete values substituted into a query template
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub object_filter: Option<ObjectFilter>,
    pub policy: CostPolicy,
}

impl QueryParameters {
    /// Build parameters for a range and the current filter selection
    ///
    /// The object filter is only set when `apply_object_filter` is true and
    /// a concrete object of a known category is selected.
    pub fn build(
        range: &ResolvedRange,
        filters: &FilterState,
        apply_object_filter: bool,
        policy: CostPolicy,
    ) -> Self {
        let object_filter = if apply_object_filter {
            object_filter(&filters.object_type, &filters.object_value)
        } else {
            None
        };

        Self {
            start_date: range.start,
            end_date: range.end,
            object_filter,
            policy,
        }
    }

    pub fn start_date_str(&self) -> String {
        self.start_date.format("%Y-%m-%d").to_string()
    }

    pub fn end_date_str(&self) -> String {
        self.end_date.format("%Y-%m-%d").to_string()
    }
}

fn object_filter(category: &ObjectCategory, value: &str) -> Option<ObjectFilter> {
    let value = value.trim();
    if *category == ObjectCategory::All
        || value.is_empty()
        || value.eq_ignore_ascii_case(ALL_VALUES)
    {
        return None;
    }
    match category.column() {
        Some(column) => Some(ObjectFilter {
            column,
            value: value.to_string(),
        }),
        None => {
            warn!(
                "No column mapping for object type '{}', object filter not applied",
                category
            );
            None
        }
    }
}

/// Quote a value as a SQL string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn range() -> ResolvedRange {
        FilterState::default().resolve_range(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    fn filters(object_type: &str, object_value: &str) -> FilterState {
        FilterState {
            object_type: ObjectCategory::parse(object_type),
            object_value: object_value.to_string(),
            ..FilterState::default()
        }
    }

    #[rstest]
    fn formats_dates_as_iso(range: ResolvedRange) {
        let params = QueryParameters::build(&range, &FilterState::default(), true, CostPolicy::default());
        assert_eq!(params.start_date_str(), "2024-03-08");
        assert_eq!(params.end_date_str(), "2024-03-15");
        assert_eq!(params.object_filter, None);
    }

    #[rstest]
    #[case::user("user", "ALICE", Some(("USER_NAME", "ALICE")))]
    #[case::trimmed("warehouse", "  COMPUTE_WH ", Some(("WAREHOUSE_NAME", "COMPUTE_WH")))]
    #[case::all_value("role", "all", None)]
    #[case::all_category("all", "ALICE", None)]
    #[case::empty_value("database", "  ", None)]
    #[case::unknown_category("schema", "PUBLIC", None)]
    fn builds_object_filter(
        range: ResolvedRange,
        #[case] object_type: &str,
        #[case] object_value: &str,
        #[case] expected: Option<(&'static str, &str)>,
    ) {
        let params = QueryParameters::build(
            &range,
            &filters(object_type, object_value),
            true,
            CostPolicy::default(),
        );
        let expected = expected.map(|(column, value)| ObjectFilter {
            column,
            value: value.to_string(),
        });
        assert_eq!(params.object_filter, expected);
    }

    #[rstest]
    fn skips_object_filter_when_disabled(range: ResolvedRange) {
        let params = QueryParameters::build(
            &range,
            &filters("user", "ALICE"),
            false,
            CostPolicy::default(),
        );
        assert_eq!(params.object_filter, None);
    }

    #[test]
    fn doubles_single_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
