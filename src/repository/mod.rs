//! Repository layer for the harvest store.
//!
//! All database access uses Diesel over SQLite through diesel-async's
//! `SyncConnectionWrapper`.

pub mod diesel_models;
pub mod diesel_record;
pub mod diesel_report;
pub mod diesel_target;
pub mod migrations;
pub mod pool;
pub mod util;

pub use diesel_record::{DieselRecordRepository, UpsertOutcome};
pub use diesel_report::{DieselReportRepository, HarvestStats, LastUpdateSummary};
pub use diesel_target::DieselTargetRepository;
pub use migrations::init_schema;
pub use pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
