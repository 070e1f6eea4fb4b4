//! Locates a table by the text label in front of it and parses it.
//!
//! The marker is matched against individual text nodes after collapsing
//! whitespace, and the first `<table>` that follows it in document order is
//! read. `colspan` and `rowspan` cells are repeated into every slot they
//! cover; rows whose cell count still does not match the header are rejected.

use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::api::RawDocument;
use crate::error::{EtlError, Result};
use crate::models::Table;

/// Browsers clamp `colspan` and `rowspan` to these values.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

/// Turns a fetched document into a table
pub trait TableExtractor: Send + Sync {
    fn extract(&self, document: &RawDocument, marker_text: &str) -> Result<Table>;
}

/// Finds the table following a text marker
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerTableExtractor;

impl TableExtractor for MarkerTableExtractor {
    fn extract(&self, document: &RawDocument, marker_text: &str) -> Result<Table> {
        extract(document, marker_text)
    }
}

struct RawRow {
    cells: Vec<String>,
    is_header: bool,
}

/// A `rowspan` cell still covering rows below the one that declared it
struct SpanningCell {
    remaining: usize,
    text: String,
}

pub fn extract(document: &RawDocument, marker_text: &str) -> Result<Table> {
    let html = Html::parse_document(document.as_str());
    let marker = normalize_whitespace(marker_text);

    let mut nodes = html.tree.root().descendants();
    let found = nodes
        .by_ref()
        .any(|node| node.value().as_text().map_or(false, |text| normalize_whitespace(text) == marker));
    if !found {
        return Err(EtlError::Extraction(format!(
            "marker text `{}` not found in document",
            marker_text
        )));
    }

    let table = nodes
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "table")
        .ok_or_else(|| EtlError::Extraction(format!("no table follows marker `{}`", marker_text)))?;

    let mut rows = table_rows(table);
    if rows.is_empty() {
        return Err(EtlError::Extraction(format!(
            "table after marker `{}` has no columns",
            marker_text
        )));
    }

    let columns = if rows[0].is_header {
        rows.remove(0).cells
    } else {
        (0..rows[0].cells.len()).map(|i| i.to_string()).collect()
    };
    let cells: Vec<Vec<String>> = rows.into_iter().map(|row| row.cells).collect();
    debug!("Extracted {} columns, {} rows", columns.len(), cells.len());

    Table::from_text_rows(columns, cells, Some(',')).map_err(EtlError::extraction)
}

/// Rows of the table itself; nested tables are not descended into.
///
/// Row spans are carried down within a `thead`/`tbody`/`tfoot` group and end
/// at the group boundary.
fn table_rows(table: ElementRef<'_>) -> Vec<RawRow> {
    let mut rows = Vec::new();
    let mut pending: Vec<Option<SpanningCell>> = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(read_row(child, false, &mut pending)),
            section @ ("thead" | "tbody" | "tfoot") => {
                pending.clear();
                let in_head = section == "thead";
                for tr in child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr")
                {
                    rows.push(read_row(tr, in_head, &mut pending));
                }
                pending.clear();
            }
            _ => {}
        }
    }
    rows.retain(|row| !row.cells.is_empty());
    rows
}

fn read_row(tr: ElementRef<'_>, in_head: bool, pending: &mut Vec<Option<SpanningCell>>) -> RawRow {
    let mut cells = Vec::new();
    let mut all_th = true;

    for cell in tr.children().filter_map(ElementRef::wrap) {
        let name = cell.value().name();
        if name != "th" && name != "td" {
            continue;
        }
        all_th &= name == "th";

        fill_spanned(&mut cells, pending);

        let colspan = span_attr(cell, "colspan").min(MAX_COLSPAN);
        let rowspan = span_attr(cell, "rowspan").min(MAX_ROWSPAN);
        let mut text = String::new();
        collect_text(cell, &mut text);
        let text = normalize_whitespace(&text);

        for _ in 0..colspan {
            if rowspan > 1 {
                let column = cells.len();
                if pending.len() <= column {
                    pending.resize_with(column + 1, || None);
                }
                pending[column] = Some(SpanningCell {
                    remaining: rowspan - 1,
                    text: text.clone(),
                });
            }
            cells.push(text.clone());
        }
    }
    fill_spanned(&mut cells, pending);

    RawRow {
        is_header: in_head || (all_th && !cells.is_empty()),
        cells,
    }
}

/// Copy cells spanning down from earlier rows into the next free columns.
fn fill_spanned(cells: &mut Vec<String>, pending: &mut [Option<SpanningCell>]) {
    while let Some(Some(spanning)) = pending.get_mut(cells.len()) {
        cells.push(spanning.text.clone());
        spanning.remaining -= 1;
        if spanning.remaining == 0 {
            pending[cells.len() - 1] = None;
        }
    }
}

/// `colspan`/`rowspan` value; missing, zero or malformed counts as 1.
fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Visible text of an element; `<br>` counts as a space.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push(' '),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    if !is_hidden(el) {
                        collect_text(el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    element.value().attr("style").map_or(false, |style| {
        style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase()
            .contains("display:none")
    })
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
