//! Table extraction over already-fetched markup.
//!
//! Everything here is a pure function of the supplied text. A page with no
//! matching table yields an empty result, never an error; callers decide what
//! "no rows" means for them.

use scraper::{ElementRef, Html, Selector};

/// One row of text cells, header or data, exactly as the source laid it out.
pub type RawRow = Vec<String>;

/// Rows of a single table, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row; sources put column labels there when they have any.
    pub fn header(&self) -> Option<&RawRow> {
        self.rows.first()
    }

    /// Rows after the header.
    pub fn body(&self) -> &[RawRow] {
        if self.rows.is_empty() {
            &[]
        } else {
            &self.rows[1..]
        }
    }

    /// Rows with at least `min_cells` cells; shorter rows are skipped, not errors.
    pub fn rows_with_at_least(&self, min_cells: usize) -> impl Iterator<Item = &RawRow> {
        self.rows.iter().filter(move |r| r.len() >= min_cells)
    }

    /// Whether any cell contains `needle` (case-insensitive).
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.rows
            .iter()
            .flatten()
            .any(|cell| cell.to_lowercase().contains(&needle))
    }
}

/// How to pick tables out of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSelector {
    /// Every `<table>` on the page.
    All,
    /// Tables carrying all of these classes, e.g. `"table table-bordered"`.
    Class(String),
    /// Tables with some cell containing this text (case-insensitive).
    ContainingText(String),
    /// Tables matching an arbitrary CSS selector.
    Css(String),
}

/// Extracts rows of text cells from markup.
pub struct TableExtractor {
    document: Html,
}

impl TableExtractor {
    pub fn parse(markup: &str) -> Self {
        Self {
            document: Html::parse_document(markup),
        }
    }

    /// All tables picked by `selector`, in document order.
    pub fn tables(&self, selector: &TableSelector) -> Vec<RawTable> {
        let css = match selector {
            TableSelector::All | TableSelector::ContainingText(_) => "table".to_string(),
            TableSelector::Class(classes) => class_selector("table", classes),
            TableSelector::Css(css) => css.clone(),
        };
        let Some(sel) = parse_selector(&css) else {
            return Vec::new();
        };

        let tables = self
            .document
            .select(&sel)
            .filter(|el| el.value().name() == "table")
            .map(table_rows);

        match selector {
            TableSelector::ContainingText(needle) => {
                tables.filter(|t| t.contains_text(needle)).collect()
            }
            _ => tables.collect(),
        }
    }

    /// First table picked by `selector`.
    pub fn first(&self, selector: &TableSelector) -> Option<RawTable> {
        self.tables(selector).into_iter().next()
    }

    /// Div-based "tables": every element matching `row_css` inside the first
    /// `container_css` match becomes a row of the texts of its `cell_css` children.
    pub fn blocks(&self, container_css: &str, row_css: &str, cell_css: &str) -> Vec<RawRow> {
        let (Some(container), Some(row_sel), Some(cell_sel)) = (
            parse_selector(container_css),
            parse_selector(row_css),
            parse_selector(cell_css),
        ) else {
            return Vec::new();
        };
        let Some(root) = self.document.select(&container).next() else {
            return Vec::new();
        };
        root.select(&row_sel)
            .map(|row| row.select(&cell_sel).map(cell_text).collect())
            .collect()
    }
}

/// Extract every table picked by `selector` from `markup`.
pub fn extract_tables(markup: &str, selector: &TableSelector) -> Vec<RawTable> {
    if markup.trim().is_empty() {
        return Vec::new();
    }
    TableExtractor::parse(markup).tables(selector)
}

fn parse_selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// `"a b"` on `table` becomes `table.a.b`.
fn class_selector(tag: &str, classes: &str) -> String {
    let mut css = tag.to_string();
    for class in classes.split_whitespace() {
        css.push('.');
        css.push_str(class);
    }
    css
}

/// Rows belonging to this table only, not to tables nested inside it.
fn table_rows(table: ElementRef<'_>) -> RawTable {
    let (Some(tr), Some(cell)) = (parse_selector("tr"), parse_selector("th, td")) else {
        return RawTable::default();
    };
    let rows = table
        .select(&tr)
        .filter(|row| owning_table(*row) == Some(table))
        .map(|row| {
            row.select(&cell)
                .filter(|c| owning_row(*c) == Some(row))
                .map(cell_text)
                .collect::<RawRow>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    RawTable { rows }
}

fn owning_table<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    nearest_ancestor(el, "table")
}

fn owning_row<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    nearest_ancestor(el, "tr")
}

fn nearest_ancestor<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == tag)
}

/// Text content with runs of whitespace collapsed to one space.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
