use chrono::{Duration, Months, NaiveDate};
use log::warn;
use serde::Serialize;

use super::DateFilter;

/// Inclusive date range produced by [`resolve`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Set when the requested range could not be honoured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ResolvedRange {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            warning: None,
        }
    }

    /// Range of the same length immediately preceding this one
    pub fn previous_period(&self) -> ResolvedRange {
        let (start, end) = previous_period(self.start, self.end);
        ResolvedRange::new(start, end)
    }
}

fn last_days(today: NaiveDate, days: i64) -> ResolvedRange {
    ResolvedRange::new(today - Duration::days(days), today)
}

/// Resolve a date filter into a concrete range ending `today`
///
/// Never fails: an unknown key or an unusable custom range falls back to the
/// last seven days. For custom ranges the fallback carries a warning meant
/// for the user.
pub fn resolve(
    filter: &DateFilter,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
    today: NaiveDate,
) -> ResolvedRange {
    match filter {
        DateFilter::OneDay => last_days(today, 1),
        DateFilter::SevenDays => last_days(today, 7),
        DateFilter::FourteenDays => last_days(today, 14),
        DateFilter::OneMonth => {
            let start = today
                .checked_sub_months(Months::new(1))
                .unwrap_or(today - Duration::days(30));
            ResolvedRange::new(start, today)
        }
        DateFilter::ThreeMonths => last_days(today, 90),
        DateFilter::SixMonths => last_days(today, 180),
        DateFilter::OneYear => last_days(today, 365),
        DateFilter::Custom => match (custom_start, custom_end) {
            (Some(start), Some(end)) if start <= end => ResolvedRange::new(start, end),
            (Some(_), Some(_)) => {
                warn!("Custom range end precedes start, using last 7 days");
                ResolvedRange {
                    warning: Some(
                        "End date is before start date. Showing the last 7 days instead."
                            .to_string(),
                    ),
                    ..last_days(today, 7)
                }
            }
            _ => {
                warn!("Custom range is missing a bound, using last 7 days");
                ResolvedRange {
                    warning: Some(
                        "Please select both start and end dates. Showing the last 7 days instead."
                            .to_string(),
                    ),
                    ..last_days(today, 7)
                }
            }
        },
        DateFilter::Unknown(key) => {
            warn!("Unknown date filter '{}', using last 7 days", key);
            last_days(today, 7)
        }
    }
}

/// Previous period of equal length: it ends the day before `start`
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let prev_end = start - Duration::days(1);
    let prev_start = prev_end - (end - start);
    (prev_start, prev_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[fixture]
    fn today() -> NaiveDate {
        date(2024, 3, 15)
    }

    #[rstest]
    #[case::one_day(DateFilter::OneDay, date(2024, 3, 14))]
    #[case::seven_days(DateFilter::SevenDays, date(2024, 3, 8))]
    #[case::fourteen_days(DateFilter::FourteenDays, date(2024, 3, 1))]
    #[case::one_month(DateFilter::OneMonth, date(2024, 2, 15))]
    #[case::three_months(DateFilter::ThreeMonths, date(2023, 12, 16))]
    #[case::six_months(DateFilter::SixMonths, date(2023, 9, 17))]
    #[case::one_year(DateFilter::OneYear, date(2023, 3, 16))]
    #[case::unknown(DateFilter::Unknown("2_weeks".to_string()), date(2024, 3, 8))]
    fn resolves_symbolic_keys(today: NaiveDate, #[case] filter: DateFilter, #[case] start: NaiveDate) {
        let range = resolve(&filter, None, None, today);
        assert_eq!(range.start, start);
        assert_eq!(range.end, today);
        assert_eq!(range.warning, None);
    }

    #[rstest]
    fn one_month_clamps_to_month_end() {
        let range = resolve(&DateFilter::OneMonth, None, None, date(2024, 3, 31));
        assert_eq!(range.start, date(2024, 2, 29));
    }

    #[rstest]
    fn custom_range_is_used_verbatim(today: NaiveDate) {
        let range = resolve(
            &DateFilter::Custom,
            Some(date(2024, 1, 1)),
            Some(date(2024, 1, 31)),
            today,
        );
        assert_eq!(range, ResolvedRange::new(date(2024, 1, 1), date(2024, 1, 31)));
    }

    #[rstest]
    #[case::missing_end(Some(date(2024, 1, 1)), None)]
    #[case::missing_both(None, None)]
    #[case::reversed(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)))]
    fn bad_custom_range_falls_back_with_warning(
        today: NaiveDate,
        #[case] start: Option<NaiveDate>,
        #[case] end: Option<NaiveDate>,
    ) {
        let range = resolve(&DateFilter::Custom, start, end, today);
        assert_eq!(range.start, date(2024, 3, 8));
        assert_eq!(range.end, today);
        assert!(range.warning.is_some());
    }

    #[rstest]
    #[case::week(date(2024, 3, 8), date(2024, 3, 15), date(2024, 2, 29), date(2024, 3, 7))]
    #[case::single_day(date(2024, 3, 15), date(2024, 3, 15), date(2024, 3, 14), date(2024, 3, 14))]
    fn previous_period_has_equal_length(
        #[case] start: NaiveDate,
        #[case] end: NaiveDate,
        #[case] prev_start: NaiveDate,
        #[case] prev_end: NaiveDate,
    ) {
        assert_eq!(previous_period(start, end), (prev_start, prev_end));
        assert_eq!(prev_end - prev_start, end - start);
        assert!(prev_end < start);
    }
}
