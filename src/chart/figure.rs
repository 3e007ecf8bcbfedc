use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use super::resolve::{ChartBindings, ChartSpec};
use super::ChartError;
use crate::metric::format::MetricFormat;
use crate::warehouse::ResultTable;

/// Renderer-agnostic description of a chart
///
/// `encodings` maps a visual channel (`x`, `y`, `color`, `names`, `values`,
/// `z`, `path`, `subpath`) to the result column that feeds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFigure {
    pub kind: &'static str,
    pub title: String,
    pub encodings: BTreeMap<&'static str, String>,
    pub hover_data: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_format: Option<MetricFormat>,
}

/// Build a figure from resolved bindings and the query result
///
/// Every column the chart needs must be present in `table`. Hover columns
/// that are missing are dropped.
pub fn build_figure(
    title: &str,
    bindings: &ChartBindings,
    table: &ResultTable,
) -> Result<ChartFigure, ChartError> {
    let spec = ChartSpec::from_bindings(bindings)?;

    let mut encodings: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut color_scale = None;
    match &spec {
        ChartSpec::Cartesian { x, y, color, .. } => {
            encodings.insert("x", x.clone());
            encodings.insert("y", y.clone());
            if let Some(color) = color {
                encodings.insert("color", color.clone());
            }
        }
        ChartSpec::Histogram { x, color } => {
            encodings.insert("x", x.clone());
            if let Some(color) = color {
                encodings.insert("color", color.clone());
            }
        }
        ChartSpec::Pie { names, values } => {
            encodings.insert("names", names.clone());
            encodings.insert("values", values.clone());
        }
        ChartSpec::Heatmap {
            x,
            y,
            value,
            color_scale: scale,
        } => {
            encodings.insert("x", x.clone());
            encodings.insert("y", y.clone());
            encodings.insert("z", value.clone());
            color_scale = Some(scale.clone());
        }
        ChartSpec::Treemap { path, child, value } => {
            encodings.insert("path", path.clone());
            encodings.insert("values", value.clone());
            // the second path level is optional and only used when returned
            if let Some(child) = child.as_ref().filter(|c| table.has_column(c)) {
                encodings.insert("subpath", child.clone());
            }
        }
        ChartSpec::Table => {
            if table.columns().is_empty() {
                return Err(ChartError::NoColumns(title.to_string()));
            }
        }
    }

    let missing: Vec<String> = encodings
        .values()
        .filter(|column| !table.has_column(column))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ChartError::MissingColumns {
            label: title.to_string(),
            kind: spec.kind_name().to_string(),
            missing,
            available: table.column_names().iter().map(|c| c.to_string()).collect(),
        });
    }

    let requested = bindings.hover_data.clone().unwrap_or_default();
    let hover_data: Vec<String> = requested
        .iter()
        .filter(|column| table.has_column(column))
        .cloned()
        .collect();
    if hover_data.len() != requested.len() {
        let dropped: Vec<&String> = requested
            .iter()
            .filter(|column| !hover_data.contains(column))
            .collect();
        warn!(
            "Some requested hover_data columns not found for chart '{}': {:?}",
            title, dropped
        );
    }

    Ok(ChartFigure {
        kind: spec.kind_name(),
        title: title.to_string(),
        encodings,
        hover_data,
        color_scale,
        value_format: bindings.format,
    })
}
