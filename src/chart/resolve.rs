use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ChartError;
use crate::metric::format::MetricFormat;

/// Toggle key meaning "no toggle variant applied"
pub const DEFAULT_TOGGLE: &str = "default";
const DEFAULT_COLOR_SCALE: &str = "Viridis";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Area,
    Scatter,
    Box,
    Histogram,
    Pie,
    Heatmap,
    Treemap,
    Table,
    /// Unknown kind name, drawn as a bar chart
    Unsupported(String),
}

impl ChartKind {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "area" => ChartKind::Area,
            "scatter" => ChartKind::Scatter,
            "box" => ChartKind::Box,
            "histogram" => ChartKind::Histogram,
            "pie" => ChartKind::Pie,
            "heatmap" => ChartKind::Heatmap,
            "treemap" => ChartKind::Treemap,
            "table" => ChartKind::Table,
            _ => ChartKind::Unsupported(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Scatter => "scatter",
            ChartKind::Box => "box",
            ChartKind::Histogram => "histogram",
            ChartKind::Pie => "pie",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Treemap => "treemap",
            ChartKind::Table => "table",
            ChartKind::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ChartKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ChartKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ChartKind::parse(&name))
    }
}

/// Chart field bindings, every field optional
///
/// Bindings are layered with [`ChartBindings::merge`]; a present field in
/// the higher layer wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartBindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_data: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<MetricFormat>,
}

impl ChartBindings {
    pub fn merge(&self, higher: &ChartBindings) -> ChartBindings {
        ChartBindings {
            chart_type: higher.chart_type.clone().or_else(|| self.chart_type.clone()),
            x_col: higher.x_col.clone().or_else(|| self.x_col.clone()),
            y_col: higher.y_col.clone().or_else(|| self.y_col.clone()),
            value_col: higher.value_col.clone().or_else(|| self.value_col.clone()),
            color_col: higher.color_col.clone().or_else(|| self.color_col.clone()),
            hover_data: higher.hover_data.clone().or_else(|| self.hover_data.clone()),
            color_scale: higher.color_scale.clone().or_else(|| self.color_scale.clone()),
            format: higher.format.or(self.format),
        }
    }
}

/// Alternate bindings for a chart, selectable at render time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOption {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub bindings: ChartBindings,
}

impl ToggleOption {
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => title_case(&self.key),
        }
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Chart declared by a query definition
///
/// Deserialization checks that the base bindings, combined with each
/// toggle variant, describe a drawable chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartDeclaration {
    #[serde(flatten)]
    pub base: ChartBindings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub toggle_options: Vec<ToggleOption>,
}

impl ChartDeclaration {
    pub fn toggle(&self, key: &str) -> Option<&ToggleOption> {
        self.toggle_options.iter().find(|t| t.key == key)
    }

    pub fn default_toggle(&self) -> &str {
        self.toggle_options
            .first()
            .map(|t| t.key.as_str())
            .unwrap_or(DEFAULT_TOGGLE)
    }
}

impl<'de> Deserialize<'de> for ChartDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ChartDeclarationHelper {
            #[serde(flatten)]
            base: ChartBindings,
            #[serde(default)]
            toggle_options: Vec<ToggleOption>,
        }

        let helper = ChartDeclarationHelper::deserialize(deserializer)?;

        let variants: Vec<ChartBindings> = if helper.toggle_options.is_empty() {
            vec![helper.base.clone()]
        } else {
            helper
                .toggle_options
                .iter()
                .map(|toggle| helper.base.merge(&toggle.bindings))
                .collect()
        };
        for bindings in &variants {
            ChartSpec::from_bindings(bindings).map_err(serde::de::Error::custom)?;
        }

        Ok(ChartDeclaration {
            base: helper.base,
            toggle_options: helper.toggle_options,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CartesianKind {
    Bar,
    Line,
    Area,
    Scatter,
    Box,
}

/// Fully resolved chart with the fields each kind requires
#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    Cartesian {
        kind: CartesianKind,
        x: String,
        y: String,
        color: Option<String>,
    },
    Histogram {
        x: String,
        color: Option<String>,
    },
    Pie {
        names: String,
        values: String,
    },
    Heatmap {
        x: String,
        y: String,
        value: String,
        color_scale: String,
    },
    Treemap {
        path: String,
        child: Option<String>,
        value: String,
    },
    Table,
}

fn required(kind: &ChartKind, field: &'static str, value: &Option<String>) -> Result<String, ChartError> {
    value.clone().ok_or_else(|| ChartError::MissingBinding {
        kind: kind.name().to_string(),
        field,
    })
}

impl ChartSpec {
    /// Build the chart spec for resolved bindings
    ///
    /// A missing kind means bar. Unsupported kinds are drawn as bar charts.
    pub fn from_bindings(bindings: &ChartBindings) -> Result<ChartSpec, ChartError> {
        let kind = bindings.chart_type.clone().unwrap_or(ChartKind::Bar);
        let cartesian = |cartesian_kind: CartesianKind| -> Result<ChartSpec, ChartError> {
            Ok(ChartSpec::Cartesian {
                kind: cartesian_kind,
                x: required(&kind, "x_col", &bindings.x_col)?,
                y: required(&kind, "y_col", &bindings.y_col)?,
                color: bindings.color_col.clone(),
            })
        };

        match &kind {
            ChartKind::Bar => cartesian(CartesianKind::Bar),
            ChartKind::Line => cartesian(CartesianKind::Line),
            ChartKind::Area => cartesian(CartesianKind::Area),
            ChartKind::Scatter => cartesian(CartesianKind::Scatter),
            ChartKind::Box => cartesian(CartesianKind::Box),
            ChartKind::Unsupported(name) => {
                warn!("Unsupported chart type '{}', defaulting to bar chart", name);
                cartesian(CartesianKind::Bar)
            }
            ChartKind::Histogram => Ok(ChartSpec::Histogram {
                x: required(&kind, "x_col", &bindings.x_col)?,
                color: bindings.color_col.clone(),
            }),
            ChartKind::Pie => Ok(ChartSpec::Pie {
                names: required(&kind, "x_col", &bindings.x_col)?,
                values: required(&kind, "y_col", &bindings.y_col)?,
            }),
            ChartKind::Heatmap => Ok(ChartSpec::Heatmap {
                x: required(&kind, "x_col", &bindings.x_col)?,
                y: required(&kind, "y_col", &bindings.y_col)?,
                value: required(&kind, "value_col", &bindings.value_col)?,
                color_scale: bindings
                    .color_scale
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COLOR_SCALE.to_string()),
            }),
            ChartKind::Treemap => Ok(ChartSpec::Treemap {
                path: required(&kind, "x_col", &bindings.x_col)?,
                child: bindings.y_col.clone(),
                value: required(&kind, "value_col", &bindings.value_col)?,
            }),
            ChartKind::Table => Ok(ChartSpec::Table),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ChartSpec::Cartesian { kind, .. } => match kind {
                CartesianKind::Bar => "bar",
                CartesianKind::Line => "line",
                CartesianKind::Area => "area",
                CartesianKind::Scatter => "scatter",
                CartesianKind::Box => "box",
            },
            ChartSpec::Histogram { .. } => "histogram",
            ChartSpec::Pie { .. } => "pie",
            ChartSpec::Heatmap { .. } => "heatmap",
            ChartSpec::Treemap { .. } => "treemap",
            ChartSpec::Table => "table",
        }
    }
}

/// Resolve bindings: base, then the selected toggle variant, then call-site
/// overrides
pub fn resolve_bindings(
    declaration: &ChartDeclaration,
    selected_toggle: &str,
    overrides: &ChartBindings,
) -> ChartBindings {
    let mut bindings = declaration.base.clone();
    if selected_toggle != DEFAULT_TOGGLE {
        match declaration.toggle(selected_toggle) {
            Some(toggle) => bindings = bindings.merge(&toggle.bindings),
            None => warn!("Toggle '{}' is not declared for this chart", selected_toggle),
        }
    }
    bindings.merge(overrides)
}

/// Selected toggle per chart slot, owned by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToggleState(BTreeMap<String, String>);

impl ToggleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self, slot: &str) -> Option<&str> {
        self.0.get(slot).map(String::as_str)
    }

    /// Selected toggle of a slot, falling back to the first declared toggle
    /// when nothing valid is selected
    pub fn current_or_default(&self, slot: &str, declaration: &ChartDeclaration) -> String {
        match self.selected(slot) {
            Some(key) if declaration.toggle(key).is_some() => key.to_string(),
            _ => declaration.default_toggle().to_string(),
        }
    }

    /// Select `key` for `slot`, returning the new state and whether it
    /// differs from this one
    pub fn select(&self, slot: &str, key: &str) -> (ToggleState, bool) {
        if self.selected(slot) == Some(key) {
            return (self.clone(), false);
        }
        let mut next = self.clone();
        next.0.insert(slot.to_string(), key.to_string());
        (next, true)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
