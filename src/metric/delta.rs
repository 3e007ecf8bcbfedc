use serde::{Serialize, Serializer};
use std::fmt;

use super::format::{format_number, parse_formatted_value, MetricFormat};

/// Period-over-period change of a metric
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Relative change against a non-zero prior value, in percent
    Percent(f64),
    /// The prior value was zero; holds the current value
    New(f64),
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::Percent(change) => write!(f, "{:+.1}%", change),
            Delta::New(current) => write!(f, "+{} (new)", format_number(*current)),
        }
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Compare two formatted metric values
///
/// Returns `None` when either value does not parse or both are zero.
pub fn compute_delta(current: &str, prior: &str, format: MetricFormat) -> Option<Delta> {
    let current = parse_formatted_value(current, format)?;
    let prior = parse_formatted_value(prior, format)?;

    if prior != 0.0 {
        Some(Delta::Percent((current - prior) / prior.abs() * 100.0))
    } else if current != 0.0 {
        Some(Delta::New(current))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::growth("150", "100", MetricFormat::Number, Some("+50.0%"))]
    #[case::decline("75", "100", MetricFormat::Number, Some("-25.0%"))]
    #[case::negative_prior("-50", "-100", MetricFormat::Number, Some("+50.0%"))]
    #[case::suffixed("1.5K", "1.0K", MetricFormat::Number, Some("+50.0%"))]
    #[case::minutes("3.0m", "2.0m", MetricFormat::Duration, Some("+50.0%"))]
    #[case::currency("$110.00", "$100.00", MetricFormat::Currency, Some("+10.0%"))]
    #[case::new("50", "0", MetricFormat::Number, Some("+50 (new)"))]
    #[case::new_large("2.5K", "0", MetricFormat::Number, Some("+2.5K (new)"))]
    #[case::both_zero("0", "0", MetricFormat::Number, None)]
    #[case::unparsable_current("N/A", "100", MetricFormat::Number, None)]
    #[case::unparsable_prior("100", "COMPUTE_WH", MetricFormat::Number, None)]
    fn computes_deltas(
        #[case] current: &str,
        #[case] prior: &str,
        #[case] format: MetricFormat,
        #[case] expected: Option<&str>,
    ) {
        let delta = compute_delta(current, prior, format).map(|d| d.to_string());
        assert_eq!(delta.as_deref(), expected);
    }

    #[test]
    fn new_delta_is_not_a_percentage() {
        assert_eq!(
            compute_delta("50", "0", MetricFormat::Number),
            Some(Delta::New(50.0))
        );
    }
}
