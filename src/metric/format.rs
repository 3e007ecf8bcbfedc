use log::warn;
use serde::{Deserialize, Serialize};

use crate::warehouse::{ResultTable, Value};

/// Placeholder shown when a metric has no value
pub const NOT_AVAILABLE: &str = "N/A";

/// Display format of a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormat {
    #[default]
    Number,
    Percentage,
    Currency,
    /// Value in seconds
    #[serde(alias = "duration_seconds")]
    Duration,
    /// Any other format name; the number is shown without decoration
    #[serde(other)]
    Plain,
}

/// Extract the headline value of a metric query and format it
///
/// The value is taken from the first row, in the first numeric column or
/// the first column when none is numeric.
pub fn extract_metric_value(table: &ResultTable, format: MetricFormat) -> String {
    let Some(row) = table.rows().first() else {
        warn!("Attempted to extract a metric value from an empty table");
        return NOT_AVAILABLE.to_string();
    };

    let column = table
        .columns()
        .iter()
        .position(|c| c.column_type.is_numeric())
        .unwrap_or(0);
    let value = row.get(column).unwrap_or(&Value::Null);
    if value.is_null() {
        warn!("Extracted metric value is null");
        return NOT_AVAILABLE.to_string();
    }

    let numeric = value
        .as_f64()
        .or_else(|| value.to_string().trim().parse::<f64>().ok());
    match numeric {
        Some(number) => format_value(number, format),
        None => {
            warn!(
                "Metric value '{}' is not numeric and cannot be formatted as {:?}",
                value, format
            );
            value.to_string()
        }
    }
}

pub fn format_value(value: f64, format: MetricFormat) -> String {
    match format {
        MetricFormat::Number => format_number(value),
        MetricFormat::Percentage => format!("{:.1}%", value),
        MetricFormat::Currency => format_currency(value),
        MetricFormat::Duration => format_duration(value),
        MetricFormat::Plain => value.to_string(),
    }
}

/// Format with a B/M/K suffix from a thousand upwards, comma-grouped below
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.1}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else if value.fract() == 0.0 {
        group_thousands(&format!("{:.0}", value))
    } else {
        let fixed = format!("{:.2}", value);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        group_thousands(trimmed)
    }
}

/// Format seconds as hours, minutes or seconds
pub fn format_duration(seconds: f64) -> String {
    if seconds == 0.0 {
        return "0s".to_string();
    }
    let abs = seconds.abs();
    if abs >= 3600.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else if abs >= 60.0 {
        format!("{:.1}m", seconds / 60.0)
    } else if seconds.fract() == 0.0 {
        format!("{:.0}s", seconds)
    } else {
        format!("{:.1}s", seconds)
    }
}

pub fn format_currency(value: f64) -> String {
    format!("${}", group_thousands(&format!("{:.2}", value)))
}

/// Insert comma separators into the integer part of a decimal string
pub fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (idx, digit) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}

/// Parse a formatted metric value back into a number
///
/// Understands B/M/K/h/m/s suffixes, `$`, `%`, a leading sign and comma
/// separators. A trailing `m` means minutes for [`MetricFormat::Duration`]
/// and millions otherwise.
pub fn parse_formatted_value(value: &str, format: MetricFormat) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '$' | '%' | ','))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('b') => (&cleaned[..cleaned.len() - 1], 1_000_000_000.0),
        Some('m') if format == MetricFormat::Duration => (&cleaned[..cleaned.len() - 1], 60.0),
        Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('h') => (&cleaned[..cleaned.len() - 1], 3600.0),
        Some('s') => (&cleaned[..cleaned.len() - 1], 1.0),
        _ => (cleaned.as_str(), 1.0),
    };

    match number.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Some(parsed * multiplier),
        _ => {
            warn!("Could not parse metric value '{}' to a number", value);
            None
        }
    }
}
