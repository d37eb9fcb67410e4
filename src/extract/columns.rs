//! Column resolution for listing payloads.
//!
//! Listing columns are not at fixed positions across portal versions. The
//! [`ColumnResolver`] turns a raw listing into [`CandidateRecord`]s using a
//! per-profile [`ColumnStrategy`]; nothing else in the pipeline knows about
//! column positions.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::classify::parse_closing_date;
use crate::browser::ListingBody;
use crate::error::ExtractionError;

/// A `DD/MM/YYYY HH:MM` cell.
static DATE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}\s*\d{2}:\d{2}").expect("valid date cell pattern"));

/// Modality names searched for when the modality column cannot be located.
const MODALITY_KEYWORDS: &[&str] = &[
    "pregão eletrônico",
    "pregão presencial",
    "pregão",
    "concorrência eletrônica",
    "concorrência",
    "tomada de preços",
    "convite",
    "dispensa eletrônica",
    "dispensa",
    "inexigibilidade",
    "leilão",
    "concurso",
    "credenciamento",
    "chamamento público",
    "diálogo competitivo",
    "rdc",
];

/// How listing columns are located.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStrategy {
    /// Payload schema when present, date-anchored heuristics otherwise.
    #[default]
    Auto,
    /// Payload schema only; a listing without one fails to parse.
    Schema,
    /// Locate the closing-date cell and read neighbours at fixed offsets.
    DateAnchored,
    /// Absolute column indices.
    FixedOffsets(ColumnOffsets),
}

/// Absolute column positions. Defaults match the legacy grid layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOffsets {
    pub process_number: usize,
    pub organization: usize,
    pub status: usize,
    pub closing_date: usize,
    pub summary_text: usize,
    pub modality: usize,
}

impl Default for ColumnOffsets {
    fn default() -> Self {
        Self::anchored_at(6)
    }
}

impl ColumnOffsets {
    /// Offsets relative to a closing-date column at `date`.
    fn anchored_at(date: usize) -> Self {
        Self {
            process_number: date.wrapping_sub(3),
            organization: date.wrapping_sub(2),
            status: date.wrapping_sub(1),
            closing_date: date,
            summary_text: date + 1,
            modality: date + 3,
        }
    }
}

/// One listing row with its columns identified.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Position of the source row in the listing.
    pub row_index: usize,
    pub process_number: String,
    pub organization: String,
    pub status: String,
    /// Closing date as shown by the portal.
    pub closing_raw: String,
    pub closing_date: Option<NaiveDateTime>,
    pub summary_text: String,
    pub modality: String,
}

impl CandidateRecord {
    /// Rows without organization or process number cannot be keyed.
    pub fn is_keyable(&self) -> bool {
        !self.process_number.is_empty() && !self.organization.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColumnResolver {
    strategy: ColumnStrategy,
}

impl ColumnResolver {
    pub fn new(strategy: ColumnStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &ColumnStrategy {
        &self.strategy
    }

    /// Decode a listing into keyable candidates, in listing order.
    pub fn resolve(&self, body: &ListingBody) -> Result<Vec<CandidateRecord>, ExtractionError> {
        let (rows, schema) = match body {
            ListingBody::Json(json) => {
                let rows = json_rows(json)?;
                let schema = SchemaMap::from_payload(json);
                (rows, schema)
            }
            ListingBody::Rendered(rows) => (rows.clone(), None),
        };

        let total = rows.len();
        let candidates: Vec<CandidateRecord> = match (&self.strategy, schema) {
            (ColumnStrategy::FixedOffsets(offsets), _) => rows
                .iter()
                .enumerate()
                .map(|(i, cells)| read_row(i, cells, offsets))
                .collect(),
            (ColumnStrategy::Schema | ColumnStrategy::Auto, Some(schema)) => rows
                .iter()
                .enumerate()
                .map(|(i, cells)| read_row(i, cells, &schema.offsets))
                .collect(),
            (ColumnStrategy::Schema, None) => {
                return Err(ExtractionError::ParseFailed(
                    "listing payload carries no column schema".to_string(),
                ))
            }
            (ColumnStrategy::Auto | ColumnStrategy::DateAnchored, _) => {
                let offsets = listing_anchor(&rows)
                    .map(ColumnOffsets::anchored_at)
                    .unwrap_or_default();
                rows.iter()
                    .enumerate()
                    .map(|(i, cells)| read_row(i, cells, &offsets))
                    .collect()
            }
        };

        let keyable: Vec<CandidateRecord> =
            candidates.into_iter().filter(CandidateRecord::is_keyable).collect();
        if keyable.len() < total {
            debug!("Dropped {} unkeyable listing rows", total - keyable.len());
        }
        Ok(keyable)
    }
}

/// Index of the first cell that looks like a closing date, if the row has
/// room for the columns before it.
fn date_anchor(cells: &[String]) -> Option<usize> {
    cells
        .iter()
        .position(|c| DATE_CELL.is_match(c))
        .filter(|d| *d >= 3)
}

/// The closing-date column most rows agree on, earliest on a tie.
///
/// A row with an empty closing date can still carry a date inside its
/// summary text; a single row never moves the anchor for the listing.
fn listing_anchor(rows: &[Vec<String>]) -> Option<usize> {
    let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
    for anchor in rows.iter().filter_map(|cells| date_anchor(cells)) {
        *votes.entry(anchor).or_default() += 1;
    }
    votes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(anchor, _)| anchor)
}

fn cell(cells: &[String], index: usize) -> String {
    cells.get(index).map(|c| c.trim().to_string()).unwrap_or_default()
}

fn read_row(row_index: usize, cells: &[String], offsets: &ColumnOffsets) -> CandidateRecord {
    let closing_raw = cell(cells, offsets.closing_date);
    let mut modality = cell(cells, offsets.modality);
    if modality.is_empty() || !is_modality(&modality) {
        if let Some(found) = search_modality(cells, offsets.summary_text) {
            modality = found;
        }
    }
    CandidateRecord {
        row_index,
        process_number: cell(cells, offsets.process_number),
        organization: cell(cells, offsets.organization),
        status: cell(cells, offsets.status),
        closing_date: parse_closing_date(&closing_raw),
        closing_raw,
        summary_text: cell(cells, offsets.summary_text),
        modality,
    }
}

fn is_modality(text: &str) -> bool {
    let lower = text.to_lowercase();
    MODALITY_KEYWORDS.iter().any(|k| lower.starts_with(k))
}

/// Find a cell naming a known modality, skipping the free-text summary.
fn search_modality(cells: &[String], summary_index: usize) -> Option<String> {
    cells
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != summary_index)
        .map(|(_, c)| c.trim())
        .find(|c| is_modality(c))
        .map(str::to_string)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract the row arrays from a listing payload.
///
/// The root key is `rows` unless the payload's `metaData.root` says
/// otherwise. Object rows are flattened in schema field order.
fn json_rows(json: &Value) -> Result<Vec<Vec<String>>, ExtractionError> {
    let root = json
        .pointer("/metaData/root")
        .and_then(Value::as_str)
        .unwrap_or("rows");
    let rows = json.get(root).and_then(Value::as_array).ok_or_else(|| {
        ExtractionError::ParseFailed(format!("listing payload has no '{}' array", root))
    })?;

    let field_names = schema_field_names(json);
    Ok(rows
        .iter()
        .map(|row| match row {
            Value::Array(cells) => cells.iter().map(value_text).collect(),
            Value::Object(map) => match &field_names {
                Some(names) => names
                    .iter()
                    .map(|n| map.get(n).map(value_text).unwrap_or_default())
                    .collect(),
                None => map.values().map(value_text).collect(),
            },
            other => vec![value_text(other)],
        })
        .collect())
}

fn schema_field_names(json: &Value) -> Option<Vec<String>> {
    let fields = json
        .pointer("/metaData/fields")
        .or_else(|| json.get("fields"))
        .and_then(Value::as_array)?;
    let names: Vec<String> = fields
        .iter()
        .filter_map(|f| match f {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect();
    (!names.is_empty()).then_some(names)
}

/// Column positions derived from payload field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SchemaMap {
    offsets: ColumnOffsets,
}

impl SchemaMap {
    fn from_payload(json: &Value) -> Option<Self> {
        let names: Vec<String> = schema_field_names(json)?
            .into_iter()
            .map(|n| n.to_lowercase())
            .collect();
        let find = |keys: &[&str]| names.iter().position(|n| keys.iter().any(|k| n.contains(k)));

        let process_number = find(&["processo", "process", "nr_proc", "numero"])?;
        let organization = find(&["orgao", "órgão", "organization", "entidade", "unidade"])?;
        let closing_date = find(&["data_final", "datafinal", "dt_final", "encerramento", "closing"]);
        let summary_text = find(&["objeto", "object", "summary", "descricao"]);
        let status = find(&["status", "situacao", "situação"]);
        let modality = find(&["modalidade", "modality"]);

        // Missing optional columns point past the row and read as empty.
        let missing = names.len() + 1;
        Some(Self {
            offsets: ColumnOffsets {
                process_number,
                organization,
                status: status.unwrap_or(missing),
                closing_date: closing_date.unwrap_or(missing),
                summary_text: summary_text.unwrap_or(missing),
                modality: modality.unwrap_or(missing),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_row(process: &str, org: &str, date: &str) -> Value {
        json!([
            "",
            "1",
            "x",
            process,
            org,
            "Aberta",
            date,
            "Aquisição de material de expediente",
            "",
            "Pregão Eletrônico"
        ])
    }

    #[test]
    fn legacy_rows_resolve_by_date_anchor() {
        let body = ListingBody::Json(json!({
            "rows": [
                legacy_row("12/2024", "PREFEITURA MUNICIPAL", "15/03/2030 09:00"),
                legacy_row("", "PREFEITURA MUNICIPAL", "15/03/2030 09:00"),
                legacy_row("13/2024", "", "15/03/2030 09:00"),
            ]
        }));
        let records = ColumnResolver::default().resolve(&body).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.process_number, "12/2024");
        assert_eq!(r.organization, "PREFEITURA MUNICIPAL");
        assert_eq!(r.status, "Aberta");
        assert_eq!(r.summary_text, "Aquisição de material de expediente");
        assert_eq!(r.modality, "Pregão Eletrônico");
        assert_eq!(r.closing_raw, "15/03/2030 09:00");
        assert!(r.closing_date.is_some());
    }

    #[test]
    fn shifted_columns_follow_the_date() {
        // Two extra leading columns compared to the legacy layout.
        let body = ListingBody::Rendered(vec![vec![
            "a".into(),
            "b".into(),
            "c".into(),
            "d".into(),
            "e".into(),
            "7/2025".into(),
            "FUNDO MUNICIPAL DE SAÚDE".into(),
            "Em andamento".into(),
            "01/02/2031 14:30".into(),
            "Contratação de serviços".into(),
            "".into(),
            "".into(),
            "Dispensa Eletrônica".into(),
        ]]);
        let records = ColumnResolver::new(ColumnStrategy::DateAnchored)
            .resolve(&body)
            .unwrap();
        assert_eq!(records[0].process_number, "7/2025");
        assert_eq!(records[0].organization, "FUNDO MUNICIPAL DE SAÚDE");
        // d+3 is empty, so the modality comes from the keyword search.
        assert_eq!(records[0].modality, "Dispensa Eletrônica");
    }

    #[test]
    fn schema_is_preferred_when_present() {
        let body = ListingBody::Json(json!({
            "metaData": {
                "root": "data",
                "fields": [
                    {"name": "modalidade"},
                    {"name": "objeto"},
                    {"name": "data_final"},
                    {"name": "situacao"},
                    {"name": "orgao"},
                    {"name": "numero_processo"}
                ]
            },
            "data": [
                {"numero_processo": "5/2024", "orgao": "CÂMARA", "situacao": "Aberta",
                 "data_final": "10/10/2030 10:00", "objeto": "Obras", "modalidade": "Concorrência"},
                ["Convite", "Reforma", "11/10/2030 08:00", "Suspensa", "PREFEITURA", "6/2024"]
            ]
        }));
        let records = ColumnResolver::default().resolve(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].process_number, "5/2024");
        assert_eq!(records[0].modality, "Concorrência");
        assert_eq!(records[1].organization, "PREFEITURA");
        assert_eq!(records[1].status, "Suspensa");
    }

    #[test]
    fn schema_strategy_requires_schema() {
        let body = ListingBody::Json(json!({"rows": [legacy_row("1", "O", "01/01/2030 10:00")]}));
        let err = ColumnResolver::new(ColumnStrategy::Schema)
            .resolve(&body)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ParseFailed(_)));
    }

    #[test]
    fn missing_rows_is_a_parse_failure_but_empty_rows_is_not() {
        let resolver = ColumnResolver::default();
        let err = resolver.resolve(&ListingBody::Json(json!({"total": 0}))).unwrap_err();
        assert!(matches!(err, ExtractionError::ParseFailed(_)));

        let empty = resolver.resolve(&ListingBody::Json(json!({"rows": []}))).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn fixed_offsets_from_config() {
        let strategy: ColumnStrategy =
            serde_json::from_value(json!({"kind": "fixed_offsets", "modality": 8})).unwrap();
        let body = ListingBody::Json(json!({"rows": [[
            "", "", "", "9/2024", "AUTARQUIA", "Aberta", "sem data", "Locação", "Leilão", "x"
        ]]}));
        let records = ColumnResolver::new(strategy).resolve(&body).unwrap();
        assert_eq!(records[0].modality, "Leilão");
        assert_eq!(records[0].closing_date, None);
    }

    #[test]
    fn rows_without_date_use_listing_anchor() {
        let body = ListingBody::Json(json!({"rows": [
            legacy_row("1/2024", "PREFEITURA", "01/01/2030 10:00"),
            legacy_row("2/2024", "PREFEITURA", ""),
        ]}));
        let records = ColumnResolver::default().resolve(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].process_number, "2/2024");
        assert_eq!(records[1].closing_date, None);
    }

    #[test]
    fn date_in_summary_text_does_not_shift_the_row() {
        let mut undated = legacy_row("3/2024", "CAMARA", "");
        undated[7] = json!("Sessão em 20/03/2030 10:00 no plenário");
        let body = ListingBody::Json(json!({"rows": [
            legacy_row("1/2024", "PREFEITURA", "01/01/2030 10:00"),
            undated,
            legacy_row("2/2024", "PREFEITURA", "02/01/2030 10:00"),
        ]}));
        let records = ColumnResolver::default().resolve(&body).unwrap();
        assert_eq!(records.len(), 3);
        let r = &records[1];
        assert_eq!(r.process_number, "3/2024");
        assert_eq!(r.organization, "CAMARA");
        assert_eq!(r.closing_date, None);
        assert_eq!(r.summary_text, "Sessão em 20/03/2030 10:00 no plenário");
    }

    #[test]
    fn listing_anchor_follows_the_majority() {
        let cells = |date_at: usize| -> Vec<String> {
            let mut row = vec![String::new(); 10];
            row[date_at] = "01/01/2030 10:00".to_string();
            row
        };
        assert_eq!(listing_anchor(&[cells(7), cells(6), cells(6)]), Some(6));
        assert_eq!(listing_anchor(&[cells(7), cells(6)]), Some(6));
        assert_eq!(listing_anchor(&[vec!["x".to_string()]]), None);
    }
}
