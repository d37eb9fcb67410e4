//! Read-only reporting queries over the record store.

use diesel::sql_types::{BigInt, Nullable, Text};
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::pool::{AsyncSqlitePool, DieselError};

/// Rows per target ranking.
const TARGET_RANKING_LIMIT: i64 = 30;
/// Rows in the modality distribution.
const MODALITY_LIMIT: i64 = 15;

pub const NO_MODALITY: &str = "(no modality)";

#[derive(Debug, Clone, PartialEq, Serialize, diesel::QueryableByName)]
pub struct TargetCount {
    #[diesel(sql_type = Text)]
    pub target_id: String,
    #[diesel(sql_type = Text)]
    pub display_name: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, diesel::QueryableByName)]
pub struct IdleTarget {
    #[diesel(sql_type = Text)]
    pub target_id: String,
    #[diesel(sql_type = Text)]
    pub display_name: String,
    #[diesel(sql_type = BigInt)]
    pub idle_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, diesel::QueryableByName)]
pub struct ModalityCount {
    #[diesel(sql_type = Text)]
    pub modality: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Most recent write date and how many records each target got that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastUpdateSummary {
    pub last_date: Option<String>,
    pub rows: Vec<TargetCount>,
}

/// Thirty-day activity overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarvestStats {
    pub top_new: Vec<TargetCount>,
    pub idle: Vec<IdleTarget>,
    pub modalities: Vec<ModalityCount>,
}

#[derive(diesel::QueryableByName)]
struct LastDate {
    #[diesel(sql_type = Nullable<Text>)]
    last_date: Option<String>,
}

#[derive(Clone)]
pub struct DieselReportRepository {
    pool: AsyncSqlitePool,
}

impl DieselReportRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    pub async fn last_update_summary(&self) -> Result<LastUpdateSummary, DieselError> {
        let mut conn = self.pool.get().await?;

        let last: Vec<LastDate> = diesel::sql_query(
            "SELECT DATE(MAX(COALESCE(updated_at, created_at))) AS last_date FROM records",
        )
        .load(&mut conn)
        .await?;

        let Some(last_date) = last.into_iter().next().and_then(|r| r.last_date) else {
            return Ok(LastUpdateSummary::default());
        };

        let rows: Vec<TargetCount> = diesel::sql_query(
            r#"SELECT r.owner_id AS target_id,
                      COALESCE(t.display_name, r.owner_id) AS display_name,
                      COUNT(*) AS count
               FROM records r
               LEFT JOIN targets t ON t.id = r.owner_id
               WHERE DATE(COALESCE(r.updated_at, r.created_at)) = ?
               GROUP BY r.owner_id
               ORDER BY count DESC, r.owner_id ASC"#,
        )
        .bind::<Text, _>(&last_date)
        .load(&mut conn)
        .await?;

        Ok(LastUpdateSummary {
            last_date: Some(last_date),
            rows,
        })
    }

    pub async fn stats(&self) -> Result<HarvestStats, DieselError> {
        let mut conn = self.pool.get().await?;

        let top_new: Vec<TargetCount> = diesel::sql_query(
            r#"SELECT r.owner_id AS target_id,
                      COALESCE(t.display_name, r.owner_id) AS display_name,
                      COUNT(*) AS count
               FROM records r
               LEFT JOIN targets t ON t.id = r.owner_id
               WHERE r.created_at >= DATETIME('now', '-30 days')
               GROUP BY r.owner_id
               ORDER BY count DESC, r.owner_id ASC
               LIMIT ?"#,
        )
        .bind::<BigInt, _>(TARGET_RANKING_LIMIT)
        .load(&mut conn)
        .await?;

        let idle: Vec<IdleTarget> = diesel::sql_query(
            r#"SELECT r.owner_id AS target_id,
                      COALESCE(t.display_name, r.owner_id) AS display_name,
                      CAST(JULIANDAY('now') - JULIANDAY(MAX(COALESCE(r.updated_at, r.created_at))) AS INTEGER) AS idle_days
               FROM records r
               LEFT JOIN targets t ON t.id = r.owner_id
               GROUP BY r.owner_id
               ORDER BY idle_days DESC, r.owner_id ASC
               LIMIT ?"#,
        )
        .bind::<BigInt, _>(TARGET_RANKING_LIMIT)
        .load(&mut conn)
        .await?;

        let modalities: Vec<ModalityCount> = diesel::sql_query(
            r#"SELECT COALESCE(NULLIF(r.modality, ''), ?) AS modality,
                      COUNT(*) AS count
               FROM records r
               WHERE r.created_at >= DATETIME('now', '-30 days')
               GROUP BY 1
               ORDER BY count DESC, modality ASC
               LIMIT ?"#,
        )
        .bind::<Text, _>(NO_MODALITY)
        .bind::<BigInt, _>(MODALITY_LIMIT)
        .load(&mut conn)
        .await?;

        Ok(HarvestStats {
            top_new,
            idle,
            modalities,
        })
    }
}
