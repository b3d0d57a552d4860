//! Terminal rendering of the combined selection table.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};

use super::assemble::CombinedTable;

const COUNT_COLUMNS: [&str; 2] = ["Non0_Fixef", "Non0_Ranef"];

/// Render every fitted combination; the `optimum` row is highlighted.
#[must_use]
pub fn render_selection_table(table: &CombinedTable, optimum: Option<usize>) -> String {
    let mut rendered = make_table(&table.columns);
    for (index, row) in table.rows.iter().enumerate() {
        let highlight = optimum == Some(index);
        rendered.add_row(
            row.iter()
                .zip(&table.columns)
                .map(|(&value, name)| value_cell(value, name, highlight))
                .collect::<Vec<_>>(),
        );
    }
    rendered.to_string()
}

fn make_table(headers: &[String]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn value_cell(value: f64, column: &str, highlight: bool) -> Cell {
    let text = if value.is_nan() {
        "NA".to_string()
    } else if COUNT_COLUMNS.contains(&column) {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    };
    if highlight {
        Cell::new(text)
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new(text)
    }
}
