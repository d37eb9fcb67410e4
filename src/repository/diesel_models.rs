//! Diesel row types for the harvest tables.

use diesel::prelude::*;

use crate::schema;

/// Target catalog row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::targets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TargetRecord {
    pub id: String,
    pub display_name: String,
    pub base_address: Option<String>,
    pub region: Option<String>,
}

/// New or replacement catalog row.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::targets)]
pub struct NewTarget<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub base_address: Option<&'a str>,
    pub region: Option<&'a str>,
}

/// Stored record row, including merged detail columns.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    pub id: String,
    pub owner_id: String,
    pub process_number: String,
    pub organization: String,
    pub status: String,
    pub closing_date: Option<String>,
    pub summary_text: String,
    pub modality: String,
    pub description: Option<String>,
    pub disclosure_window: Option<String>,
    pub dispute_mode: Option<String>,
    pub estimated_value: Option<f64>,
    pub flags: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Summary fields written by the upsert.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::records)]
pub struct NewRecordSummary<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub process_number: &'a str,
    pub organization: &'a str,
    pub status: &'a str,
    pub closing_date: Option<String>,
    pub summary_text: &'a str,
    pub modality: &'a str,
    pub created_at: &'a str,
    pub updated_at: Option<&'a str>,
}

/// Detail merge. `None` leaves the column unchanged.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = schema::records)]
pub struct RecordDetailChangeset<'a> {
    pub description: Option<&'a str>,
    pub disclosure_window: Option<&'a str>,
    pub dispute_mode: Option<&'a str>,
    pub estimated_value: Option<f64>,
    pub flags: Option<String>,
    pub updated_at: Option<&'a str>,
}

/// Stored line item.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::record_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordItemRow {
    pub id: i32,
    pub record_id: String,
    pub line_number: i32,
    pub code: String,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
    pub lot_id: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::record_items)]
pub struct NewRecordItem<'a> {
    pub record_id: &'a str,
    pub line_number: i32,
    pub code: &'a str,
    pub description: &'a str,
    pub unit: &'a str,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
    pub lot_id: Option<&'a str>,
}
