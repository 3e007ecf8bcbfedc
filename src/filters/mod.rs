pub mod date_range;

pub use date_range::{previous_period, resolve, ResolvedRange};

use chrono::NaiveDate;
use log::warn;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

pub const ALL_VALUES: &str = "All";

/// Symbolic date range selected in the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    OneDay,
    SevenDays,
    FourteenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    Custom,
    /// Unrecognised key, kept so it can be reported
    Unknown(String),
}

impl DateFilter {
    pub fn parse(key: &str) -> Self {
        match key.trim() {
            "1_day" => DateFilter::OneDay,
            "7_days" => DateFilter::SevenDays,
            "14_days" => DateFilter::FourteenDays,
            "1_month" => DateFilter::OneMonth,
            "3_months" => DateFilter::ThreeMonths,
            "6_months" => DateFilter::SixMonths,
            "1_year" => DateFilter::OneYear,
            "custom" => DateFilter::Custom,
            other => DateFilter::Unknown(other.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            DateFilter::OneDay => "1_day",
            DateFilter::SevenDays => "7_days",
            DateFilter::FourteenDays => "14_days",
            DateFilter::OneMonth => "1_month",
            DateFilter::ThreeMonths => "3_months",
            DateFilter::SixMonths => "6_months",
            DateFilter::OneYear => "1_year",
            DateFilter::Custom => "custom",
            DateFilter::Unknown(key) => key,
        }
    }
}

impl Default for DateFilter {
    fn default() -> Self {
        DateFilter::SevenDays
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for DateFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Kind of object the dashboard can be narrowed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    All,
    User,
    Warehouse,
    Role,
    Database,
    Other(String),
}

impl ObjectCategory {
    pub fn parse(key: &str) -> Self {
        match key.trim().to_lowercase().as_str() {
            "all" => ObjectCategory::All,
            "user" => ObjectCategory::User,
            "warehouse" => ObjectCategory::Warehouse,
            "role" => ObjectCategory::Role,
            "database" => ObjectCategory::Database,
            _ => ObjectCategory::Other(key.trim().to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ObjectCategory::All => "all",
            ObjectCategory::User => "user",
            ObjectCategory::Warehouse => "warehouse",
            ObjectCategory::Role => "role",
            ObjectCategory::Database => "database",
            ObjectCategory::Other(key) => key,
        }
    }

    /// ACCOUNT_USAGE column holding objects of this category
    pub fn column(&self) -> Option<&'static str> {
        match self {
            ObjectCategory::User => Some("USER_NAME"),
            ObjectCategory::Warehouse => Some("WAREHOUSE_NAME"),
            ObjectCategory::Role => Some("ROLE_NAME"),
            ObjectCategory::Database => Some("DATABASE_NAME"),
            ObjectCategory::All | ObjectCategory::Other(_) => None,
        }
    }
}

impl Default for ObjectCategory {
    fn default() -> Self {
        ObjectCategory::All
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for ObjectCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Filter selections for one render cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterState {
    pub date_filter: DateFilter,
    pub custom_start: Option<NaiveDate>,
    pub custom_end: Option<NaiveDate>,
    pub object_type: ObjectCategory,
    pub object_value: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            date_filter: DateFilter::default(),
            custom_start: None,
            custom_end: None,
            object_type: ObjectCategory::default(),
            object_value: ALL_VALUES.to_string(),
        }
    }
}

impl FilterState {
    /// Build filter state from request parameters
    ///
    /// Missing keys take their defaults. `default_object_type` applies when
    /// the request names no object type; a page default outside the known
    /// categories is replaced by `all`. Unparsable custom dates are dropped
    /// and logged, which later triggers the range fallback.
    pub fn from_mapping(
        params: &HashMap<String, String>,
        default_object_type: Option<&str>,
    ) -> Self {
        let date_filter = params
            .get("date_filter")
            .map(|key| DateFilter::parse(key))
            .unwrap_or_default();

        let object_type = match params.get("object_type") {
            Some(key) => ObjectCategory::parse(key),
            None => match default_object_type.map(ObjectCategory::parse) {
                Some(ObjectCategory::Other(key)) => {
                    warn!("Unknown default object type '{}', using 'all'", key);
                    ObjectCategory::All
                }
                Some(category) => category,
                None => ObjectCategory::All,
            },
        };
        if let ObjectCategory::Other(key) = &object_type {
            warn!("Unknown object type '{}' in request", key);
        }

        let object_value = params
            .get("object_value")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| ALL_VALUES.to_string());

        Self {
            date_filter,
            custom_start: parse_date(params, "custom_start"),
            custom_end: parse_date(params, "custom_end"),
            object_type,
            object_value,
        }
    }

    pub fn with_custom_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            date_filter: DateFilter::Custom,
            custom_start: Some(start),
            custom_end: Some(end),
            ..self.clone()
        }
    }

    pub fn resolve_range(&self, today: NaiveDate) -> ResolvedRange {
        resolve(&self.date_filter, self.custom_start, self.custom_end, today)
    }
}

fn parse_date(params: &HashMap<String, String>, key: &str) -> Option<NaiveDate> {
    let raw = params.get(key)?.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!("Ignoring {}='{}': {}", key, raw, e);
            None
        }
    }
}
