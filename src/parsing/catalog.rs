use crate::error::{HarvestError, Result};
use crate::model::ReportRecord;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

/// Selectors describing where reports live in a finance-page snapshot.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub table: String,
    pub header_cells: String,
    pub body_rows: String,
    pub cells: String,
    /// Nested element carrying the redirect link
    pub redirect: String,
    /// Attribute holding the redirect link
    pub redirect_attr: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            table: "table.finance-report-table".to_string(),
            header_cells: "thead th".to_string(),
            body_rows: "tbody tr".to_string(),
            cells: "td".to_string(),
            redirect: "[data-url]".to_string(),
            redirect_attr: "data-url".to_string(),
        }
    }
}

impl CatalogConfig {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// Reports found in one snapshot, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub records: Vec<ReportRecord>,
    /// Display name from the page title, if it could be recovered
    pub stock_name: Option<String>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct Selectors {
    table: Selector,
    header_cells: Selector,
    body_rows: Selector,
    cells: Selector,
    redirect: Selector,
    title: Selector,
}

/// Extracts report redirect links from a rendered finance-report table.
///
/// The table is laid out with years down the first column and report
/// periods across the header:
///
/// ```text
/// | Year | Q1        | Q2        | Q3  | Q4        |
/// | 2024 | (no link) | data-url  |     | data-url  |
/// ```
///
/// Only cells holding an element with a `data-url` attribute become records.
/// A row with more cells than the header has columns is cut at the header
/// width.
///
/// # Examples
///
/// ```
/// use reportkit::parsing::catalog::{CatalogConfig, CatalogParser};
///
/// let parser = CatalogParser::new(CatalogConfig::default()).unwrap();
/// let catalog = parser.parse("<html><body></body></html>");
/// assert!(catalog.is_empty());
/// assert!(catalog.stock_name.is_none());
/// ```
pub struct CatalogParser {
    selectors: Selectors,
    redirect_attr: String,
}

impl CatalogParser {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let selectors = Selectors {
            table: parse_selector(&config.table)?,
            header_cells: parse_selector(&config.header_cells)?,
            body_rows: parse_selector(&config.body_rows)?,
            cells: parse_selector(&config.cells)?,
            redirect: parse_selector(&config.redirect)?,
            title: parse_selector("title")?,
        };

        Ok(Self {
            selectors,
            redirect_attr: config.redirect_attr,
        })
    }

    /// Reads and parses a saved snapshot.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Catalog> {
        let path = path.as_ref();
        tracing::debug!("Parsing snapshot {}", path.display());
        let html = std::fs::read_to_string(path)?;
        Ok(self.parse(&html))
    }

    /// Parses snapshot markup.
    ///
    /// A missing report table yields an empty catalog with no name, which the
    /// caller treats as "nothing to harvest for this stock".
    pub fn parse(&self, html: &str) -> Catalog {
        let document = Html::parse_document(html);

        let Some(table) = document.select(&self.selectors.table).next() else {
            tracing::warn!("Report table not found in snapshot");
            return Catalog::default();
        };

        let headers: Vec<String> = table
            .select(&self.selectors.header_cells)
            .map(|th| cell_text(&th))
            .collect();

        let mut records = Vec::new();
        for row in table.select(&self.selectors.body_rows) {
            let cells: Vec<ElementRef> = row.select(&self.selectors.cells).collect();
            let Some((year_cell, report_cells)) = cells.split_first() else {
                continue;
            };
            let year = cell_text(year_cell);

            for (offset, cell) in report_cells.iter().enumerate() {
                let column = offset + 1;
                if column >= headers.len() {
                    break;
                }

                let redirect = cell
                    .select(&self.selectors.redirect)
                    .find_map(|el| el.value().attr(&self.redirect_attr));

                if let Some(url) = redirect {
                    records.push(ReportRecord {
                        year: year.clone(),
                        quarter: headers[column].clone(),
                        redirect_url: url.to_string(),
                    });
                }
            }
        }

        let stock_name = self.stock_name(&document);
        tracing::debug!(
            "Found {} reports for {}",
            records.len(),
            stock_name.as_deref().unwrap_or("unknown stock")
        );

        Catalog {
            records,
            stock_name,
        }
    }

    /// Text before the first `(` of the page title.
    fn stock_name(&self, document: &Html) -> Option<String> {
        let title = document.select(&self.selectors.title).next()?;
        let text: String = title.text().collect();
        let (name, _) = text.split_once('(')?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector(format!("{selector}: {e}")))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}
