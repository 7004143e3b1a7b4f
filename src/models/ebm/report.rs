//! Rendered tables for an EBM fit report.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use super::posterior::OrderingEvaluation;
use super::types::EbmReport;

/// Rendered tables for one fit.
#[derive(Debug, Clone)]
pub struct OrderTables {
    pub ordering: String,
    pub diagnostics: String,
    pub evaluation: Option<String>,
}

/// Render the report's orderings, sampler diagnostics, and (when a
/// ground truth was supplied) the Kendall evaluation.
#[must_use]
pub fn render_order_tables(
    report: &EbmReport,
    evaluation: Option<&OrderingEvaluation>,
) -> OrderTables {
    let mut ordering_table = make_table(&[
        "biomarker",
        "most likely stage",
        "retained frequency",
        "max-likelihood stage",
    ]);
    for (biomarker, stage) in &report.most_likely_order {
        let frequency = report
            .stage_frequency_of(biomarker, *stage)
            .unwrap_or(f64::NAN);
        let best_stage = report
            .max_likelihood_order
            .get(biomarker)
            .copied()
            .unwrap_or(0);
        ordering_table.add_row(vec![
            Cell::new(biomarker),
            Cell::new(stage.to_string()),
            Cell::new(format!("{frequency:.3}")),
            Cell::new(best_stage.to_string()),
        ]);
    }

    let mut diagnostics_table = make_table(&["metric", "value"]);
    let diagnostics = report.diagnostics;
    diagnostics_table.add_row(vec![
        Cell::new("iterations"),
        Cell::new(diagnostics.iterations_completed.to_string()),
    ]);
    diagnostics_table.add_row(vec![
        Cell::new("retained entries"),
        Cell::new(diagnostics.retained_entries.to_string()),
    ]);
    diagnostics_table.add_row(vec![
        Cell::new("acceptance rate"),
        Cell::new(format!("{:.3}", diagnostics.acceptance.rate())),
    ]);
    diagnostics_table.add_row(vec![
        Cell::new("max log-likelihood"),
        Cell::new(format!("{:.4}", report.max_log_likelihood)),
    ]);
    diagnostics_table.add_row(vec![
        Cell::new("numerical warnings"),
        Cell::new(diagnostics.numerical_warnings.to_string()),
    ]);
    diagnostics_table.add_row(vec![
        Cell::new("degenerate fallbacks"),
        Cell::new(diagnostics.degenerate_fallbacks.to_string()),
    ]);

    let evaluation_table = evaluation.map(|evaluation| {
        let mut table = make_table(&["ordering", "kendall tau", "p-value"]);
        table.add_row(vec![
            Cell::new("most likely"),
            Cell::new(format!("{:.4}", evaluation.most_likely.tau)),
            Cell::new(format!("{:.4}", evaluation.most_likely.p_value)),
        ]);
        table.add_row(vec![
            Cell::new("max likelihood"),
            Cell::new(format!("{:.4}", evaluation.max_likelihood.tau)),
            Cell::new(format!("{:.4}", evaluation.max_likelihood.p_value)),
        ]);
        table.to_string()
    });

    OrderTables {
        ordering: ordering_table.to_string(),
        diagnostics: diagnostics_table.to_string(),
        evaluation: evaluation_table,
    }
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}
