use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::models::Classification;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn classification_cell(classification: &Classification) -> Cell {
    let text = classification.label();
    match classification {
        Classification::ProductBug { .. } => Cell::new(text).fg(TableColor::Red),
        Classification::CodeIssue { .. } => Cell::new(text).fg(TableColor::Yellow),
        Classification::Unknown => Cell::new(text).fg(TableColor::DarkGrey),
    }
}

pub fn severity_cell(severity: &str) -> Cell {
    match severity.to_lowercase().as_str() {
        "critical" | "high" => Cell::new(severity).fg(TableColor::Red),
        "medium" => Cell::new(severity).fg(TableColor::Yellow),
        "low" => Cell::new(severity).fg(TableColor::Green),
        _ => Cell::new(severity).fg(TableColor::DarkGrey),
    }
}

