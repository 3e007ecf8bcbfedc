use chrono::NaiveDate;

use crate::filters::{FilterState, ResolvedRange};
use crate::sql_template::{CostPolicy, QueryParameters};

/// Inputs shared by every query of one render cycle
///
/// `today` is fixed once per cycle so that all queries agree on the range.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    pub filters: FilterState,
    pub today: NaiveDate,
    pub policy: CostPolicy,
}

impl RenderContext {
    pub fn new(filters: FilterState, today: NaiveDate, policy: CostPolicy) -> Self {
        Self {
            filters,
            today,
            policy,
        }
    }

    pub fn date_range(&self) -> ResolvedRange {
        self.filters.resolve_range(self.today)
    }

    pub fn params_for(&self, apply_object_filter: bool) -> QueryParameters {
        QueryParameters::build(
            &self.date_range(),
            &self.filters,
            apply_object_filter,
            self.policy,
        )
    }

    /// Context for the period of equal length right before the current one
    ///
    /// The previous period is always expressed as a custom range.
    pub fn previous_period(&self) -> RenderContext {
        let previous = self.date_range().previous_period();
        RenderContext {
            filters: self.filters.with_custom_range(previous.start, previous.end),
            ..self.clone()
        }
    }
}
