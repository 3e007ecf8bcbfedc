pub mod figure;
pub mod resolve;

pub use figure::{build_figure, ChartFigure};
pub use resolve::{
    resolve_bindings, ChartBindings, ChartDeclaration, ChartKind, ChartSpec, ToggleOption,
    ToggleState, DEFAULT_TOGGLE,
};

use log::{error, info};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Catalog, ChartEntry};
use crate::context::RenderContext;
use crate::executor::QueryExecutor;
use crate::warehouse::{ResultTable, Warehouse};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartError {
    #[error("Chart type '{kind}' requires '{field}'")]
    MissingBinding { kind: String, field: &'static str },

    #[error("Missing required columns for chart '{label}' (type: {kind}): {}. Available columns: {}", .missing.join(", "), .available.join(", "))]
    MissingColumns {
        label: String,
        kind: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("No valid columns found for table chart '{0}'")]
    NoColumns(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleChoice {
    pub key: String,
    pub label: String,
}

/// Chart ready for display, or the reason it could not be drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedChart {
    Figure {
        slot: String,
        label: String,
        description: String,
        figure: ChartFigure,
        data: ResultTable,
        show_table: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        toggles: Vec<ToggleChoice>,
        #[serde(skip_serializing_if = "Option::is_none")]
        selected_toggle: Option<String>,
    },
    Error {
        slot: String,
        label: String,
        error: String,
    },
}

impl RenderedChart {
    fn error(slot: &str, label: &str, error: impl Into<String>) -> Self {
        RenderedChart::Error {
            slot: slot.to_string(),
            label: label.to_string(),
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderedChart::Error { .. })
    }

    pub fn slot(&self) -> &str {
        match self {
            RenderedChart::Figure { slot, .. } | RenderedChart::Error { slot, .. } => slot,
        }
    }

    pub fn selected_toggle(&self) -> Option<&str> {
        match self {
            RenderedChart::Figure {
                selected_toggle, ..
            } => selected_toggle.as_deref(),
            RenderedChart::Error { .. } => None,
        }
    }
}

/// Renders chart entries of a page against one render context
pub struct ChartRenderer<'a, W> {
    executor: &'a QueryExecutor<W>,
    catalog: &'a Catalog,
}

impl<'a, W: Warehouse> ChartRenderer<'a, W> {
    pub fn new(executor: &'a QueryExecutor<W>, catalog: &'a Catalog) -> Self {
        Self { executor, catalog }
    }

    pub async fn render(
        &self,
        entry: &ChartEntry,
        ctx: &RenderContext,
        toggles: &ToggleState,
    ) -> RenderedChart {
        let slot = entry.slot();
        let query = match self.catalog.get_query(&entry.query_key) {
            Ok(query) => query,
            Err(e) => {
                error!("{}", e);
                let label = entry.label.as_deref().unwrap_or(&entry.query_key);
                return RenderedChart::error(slot, label, e.to_string());
            }
        };
        let label = entry.label.as_deref().unwrap_or(&query.label);

        let outcome = self
            .executor
            .execute(label, &query.query, &ctx.params_for(query.apply_object_filter))
            .await;
        if let Some(e) = outcome.error {
            return RenderedChart::error(slot, label, e.to_string());
        }
        if outcome.table.is_empty() {
            info!("No data returned for chart '{}'", label);
            return RenderedChart::error(
                slot,
                label,
                format!("No data found for '{}' with selected filters.", label),
            );
        }

        let default_declaration = ChartDeclaration::default();
        let declaration = query.chart.as_ref().unwrap_or(&default_declaration);
        let selected = toggles.current_or_default(slot, declaration);
        let bindings = resolve_bindings(declaration, &selected, &entry.overrides);

        match build_figure(label, &bindings, &outcome.table) {
            Ok(figure) => RenderedChart::Figure {
                slot: slot.to_string(),
                label: label.to_string(),
                description: query.description.clone(),
                figure,
                data: outcome.table,
                show_table: entry.show_table,
                toggles: declaration
                    .toggle_options
                    .iter()
                    .map(|t| ToggleChoice {
                        key: t.key.clone(),
                        label: t.display_label(),
                    })
                    .collect(),
                selected_toggle: (!declaration.toggle_options.is_empty()).then_some(selected),
            },
            Err(e) => {
                error!("{}", e);
                RenderedChart::error(slot, label, e.to_string())
            }
        }
    }

    pub async fn render_multiple(
        &self,
        entries: &[ChartEntry],
        ctx: &RenderContext,
        toggles: &ToggleState,
    ) -> Vec<RenderedChart> {
        let mut charts = Vec::with_capacity(entries.len());
        for entry in entries {
            charts.push(self.render(entry, ctx, toggles).await);
        }
        charts
    }
}
