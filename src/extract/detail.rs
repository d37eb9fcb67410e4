//! Parsers for the three detail panels.
//!
//! Each parser works on the panel's HTML alone, so one malformed panel
//! never affects the others.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::models::{RecordDetail, RecordItem};

static ROW: LazyLock<Selector> = LazyLock::new(|| parse_selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| parse_selector("th, td"));
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| parse_selector("th"));
static TERM: LazyLock<Selector> = LazyLock::new(|| parse_selector("dt"));
static DEFINITION: LazyLock<Selector> = LazyLock::new(|| parse_selector("dd"));

fn parse_selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid static selector")
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse(&el.text().collect::<Vec<_>>().join(" "))
}

/// Long-form description panel: its visible text, whitespace-collapsed.
pub fn parse_description(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let text = element_text(&fragment.root_element());
    (!text.is_empty()).then_some(text)
}

/// Structured metadata panel: key/value pairs from table rows, definition
/// lists, or `Key: value` lines.
pub fn parse_metadata(html: &str) -> RecordDetail {
    let fragment = Html::parse_fragment(html);
    let mut pairs: Vec<(String, String)> = Vec::new();

    for row in fragment.select(&ROW) {
        let cells: Vec<String> = row.select(&CELL).map(|c| element_text(&c)).collect();
        if cells.len() >= 2 && !cells[0].is_empty() {
            pairs.push((cells[0].clone(), cells[1..].join(" ").trim().to_string()));
        }
    }

    for (term, definition) in fragment.select(&TERM).zip(fragment.select(&DEFINITION)) {
        pairs.push((element_text(&term), element_text(&definition)));
    }

    if pairs.is_empty() {
        let text = fragment.root_element().text().collect::<Vec<_>>().join("\n");
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = collapse(key);
                if !key.is_empty() && key.len() <= 60 {
                    pairs.push((key, collapse(value)));
                }
            }
        }
    }

    let mut detail = RecordDetail::default();
    for (key, value) in pairs {
        let key = key.trim_end_matches(':').trim().to_string();
        if value.is_empty() {
            continue;
        }
        let lower = key.to_lowercase();
        if lower.contains("divulga") || lower.contains("publica") {
            detail.disclosure_window.get_or_insert(value);
        } else if lower.contains("disputa") {
            detail.dispute_mode.get_or_insert(value);
        } else if lower.contains("estimado") {
            match parse_decimal(&value) {
                Some(amount) if detail.estimated_value.is_none() => {
                    detail.estimated_value = Some(amount)
                }
                _ => {
                    detail.flags.insert(key, value);
                }
            }
        } else {
            detail.flags.insert(key, value);
        }
    }
    detail
}

#[derive(Debug, Clone, Copy, Default)]
struct ItemColumns {
    line: Option<usize>,
    code: Option<usize>,
    description: Option<usize>,
    unit: Option<usize>,
    quantity: Option<usize>,
    unit_value: Option<usize>,
    total_value: Option<usize>,
    lot: Option<usize>,
}

impl ItemColumns {
    fn positional() -> Self {
        Self {
            line: Some(0),
            code: Some(1),
            description: Some(2),
            unit: Some(3),
            quantity: Some(4),
            unit_value: Some(5),
            total_value: Some(6),
            lot: Some(7),
        }
    }

    fn from_header(headers: &[String]) -> Option<Self> {
        let mut cols = Self::default();
        for (i, header) in headers.iter().enumerate() {
            let h = header.to_lowercase();
            if h.contains("lote") {
                cols.lot.get_or_insert(i);
            } else if h.contains("total") {
                cols.total_value.get_or_insert(i);
            } else if h.contains("unit") {
                cols.unit_value.get_or_insert(i);
            } else if h.contains("unid") || h == "un" || h == "un." {
                cols.unit.get_or_insert(i);
            } else if h.contains("quant") || h.starts_with("qtd") {
                cols.quantity.get_or_insert(i);
            } else if h.contains("descri") || h.contains("especifica") {
                cols.description.get_or_insert(i);
            } else if h.contains("cód") || h.contains("cod") {
                cols.code.get_or_insert(i);
            } else if h == "item" || h.starts_with("nº") || h.starts_with("seq") {
                cols.line.get_or_insert(i);
            }
        }
        cols.description.map(|_| cols)
    }
}

/// Line-item grid panel. Columns come from the header row when there is
/// one, otherwise from the usual positional layout.
pub fn parse_items(html: &str, record_id: &str) -> Vec<RecordItem> {
    let fragment = Html::parse_fragment(html);
    let mut columns: Option<ItemColumns> = None;
    let mut items = Vec::new();

    for row in fragment.select(&ROW) {
        let cells: Vec<String> = row.select(&CELL).map(|c| element_text(&c)).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        if row.select(&HEADER_CELL).next().is_some() || (columns.is_none() && items.is_empty()) {
            if let Some(header) = ItemColumns::from_header(&cells) {
                columns = Some(header);
                continue;
            }
        }

        let cols = columns.unwrap_or_else(ItemColumns::positional);
        let get = |idx: Option<usize>| {
            idx.and_then(|i| cells.get(i))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let code = get(cols.code);
        let description = get(cols.description);
        if code.is_empty() && description.is_empty() {
            continue;
        }

        let quantity = parse_decimal(&get(cols.quantity)).unwrap_or(0.0);
        let unit_value = parse_decimal(&get(cols.unit_value)).unwrap_or(0.0);
        let total_value = parse_decimal(&get(cols.total_value)).unwrap_or(quantity * unit_value);
        let lot = get(cols.lot);

        items.push(RecordItem {
            record_id: record_id.to_string(),
            line_number: get(cols.line)
                .parse()
                .unwrap_or(items.len() as i32 + 1),
            code,
            description,
            unit: get(cols.unit),
            quantity,
            unit_value,
            total_value,
            lot_id: (!lot.is_empty()).then_some(lot),
        });
    }

    items
}

/// Parse a Brazilian-formatted number such as `R$ 1.234,56` or `10,000`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(&cleaned) {
        cleaned.replace('.', "")
    } else {
        cleaned
    };
    normalized.parse().ok()
}

/// `1.000` or `12.345.678`: dots used only as thousands separators.
fn is_thousands_grouped(s: &str) -> bool {
    let mut groups = s.split('.');
    let Some(head) = groups.next() else {
        return false;
    };
    let tail: Vec<&str> = groups.collect();
    !tail.is_empty()
        && (1..=3).contains(&head.len())
        && head.chars().all(|c| c.is_ascii_digit())
        && tail
            .iter()
            .all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}
