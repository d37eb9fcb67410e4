//! Target catalog repository.
//!
//! Resolves the harvestable targets: rows with a non-empty base address,
//! optionally narrowed by a caller-supplied SQL predicate.

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::diesel_models::{NewTarget, TargetRecord};
use super::pool::{AsyncSqlitePool, DieselError};
use crate::error::ResolutionError;
use crate::models::Target;
use crate::schema::targets;

impl TargetRecord {
    fn into_target(self) -> Option<Target> {
        let base_address = self.base_address.filter(|b| !b.trim().is_empty())?;
        Some(Target {
            id: self.id,
            display_name: self.display_name,
            base_address,
        })
    }
}

#[derive(Clone)]
pub struct DieselTargetRepository {
    pool: AsyncSqlitePool,
}

impl DieselTargetRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve harvest targets, ordered by id.
    ///
    /// `filter` is appended verbatim with `AND`; callers are expected to
    /// have sanitized it already.
    pub async fn resolve(&self, filter: Option<&str>) -> Result<Vec<Target>, ResolutionError> {
        let mut conn = self.pool.get().await?;

        let mut query = targets::table
            .filter(targets::base_address.is_not_null())
            .filter(targets::base_address.ne(""))
            .into_boxed();

        if let Some(predicate) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            debug!("Applying target filter: {}", predicate);
            query = query.filter(sql::<Bool>(&format!("({})", predicate)));
        }

        let rows = query
            .order(targets::id.asc())
            .select(TargetRecord::as_select())
            .load::<TargetRecord>(&mut conn)
            .await?;

        Ok(rows.into_iter().filter_map(TargetRecord::into_target).collect())
    }

    /// Insert or replace a catalog entry.
    pub async fn save(&self, target: &Target, region: Option<&str>) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::replace_into(targets::table)
            .values(NewTarget {
                id: &target.id,
                display_name: &target.display_name,
                base_address: Some(&target.base_address),
                region,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// All catalog rows, including those without an address.
    pub async fn list(&self) -> Result<Vec<TargetRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        targets::table
            .order(targets::id.asc())
            .select(TargetRecord::as_select())
            .load(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations::init_schema;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();

        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(
            r#"INSERT INTO targets (id, display_name, base_address, region) VALUES
                ('3550308', 'São Paulo', 'https://sp.example.gov.br', 'SP'),
                ('3304557', 'Rio de Janeiro', 'https://rj.example.gov.br', 'RJ'),
                ('3509502', 'Campinas', 'https://campinas.example.gov.br', 'SP'),
                ('3106200', 'Belo Horizonte', NULL, 'MG'),
                ('4106902', 'Curitiba', '', 'PR')"#,
        )
        .await
        .unwrap();

        (pool, dir)
    }

    #[tokio::test]
    async fn test_resolve_skips_targets_without_address() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselTargetRepository::new(pool);

        let all = repo.resolve(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["3304557", "3509502", "3550308"]);
        assert_eq!(all[2].display_name, "São Paulo");

        assert_eq!(repo.resolve(Some("   ")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_with_filter() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselTargetRepository::new(pool);

        let sp = repo.resolve(Some("REGION = 'SP'")).await.unwrap();
        assert_eq!(sp.len(), 2);

        let either = repo
            .resolve(Some("REGION = 'RJ' OR REGION = 'MG'"))
            .await
            .unwrap();
        // The predicate is grouped, so MG's missing address still excludes it.
        assert_eq!(either.len(), 1);
        assert_eq!(either[0].id, "3304557");
    }

    #[tokio::test]
    async fn test_resolve_reports_catalog_errors() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselTargetRepository::new(pool);

        let err = repo.resolve(Some("no_such_column = 1")).await.unwrap_err();
        assert!(err.to_string().starts_with("Target catalog unreachable"));
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselTargetRepository::new(pool);

        let target = Target::new("4314902", "Porto Alegre", "https://poa.example.gov.br");
        repo.save(&target, Some("RS")).await.unwrap();
        repo.save(&target, Some("RS")).await.unwrap();

        let rows = repo.list().await.unwrap();
        assert_eq!(rows.len(), 6);
        let poa = rows.iter().find(|r| r.id == "4314902").unwrap();
        assert_eq!(poa.region.as_deref(), Some("RS"));
    }
}
