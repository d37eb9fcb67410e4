//! A worker drains one chunk of targets with its own browser session and
//! store connection.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{LogLevel, WorkerMessage};
use crate::browser::{DriverFactory, PortalDriver};
use crate::error::WorkerFatal;
use crate::extract::{ColumnResolver, ExtractionEngine, SessionContext};
use crate::models::{Target, TargetCounts};
use crate::repository::{AsyncSqlitePool, DieselRecordRepository};

pub struct Worker<F: DriverFactory> {
    id: usize,
    factory: Arc<F>,
    pool: AsyncSqlitePool,
    resolver: ColumnResolver,
    ctx: SessionContext,
    cancel: CancellationToken,
}

impl<F: DriverFactory> Worker<F> {
    pub fn new(
        id: usize,
        factory: Arc<F>,
        pool: AsyncSqlitePool,
        resolver: ColumnResolver,
        ctx: SessionContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            factory,
            pool,
            resolver,
            ctx,
            cancel,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process `targets` in order, reporting each one on `tx`.
    ///
    /// A failing target is reported with its error and the worker moves on.
    /// A setup failure ends the worker with `WorkerFailed`; its targets are
    /// left unreported.
    pub async fn run(self, targets: Vec<Target>, tx: mpsc::Sender<WorkerMessage>) {
        let worker_id = self.id;
        let mut engine = match self.setup().await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Worker {} failed to start: {}", worker_id, e);
                let _ = tx
                    .send(WorkerMessage::WorkerFailed {
                        worker_id,
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        debug!("Worker {} started with {} targets", worker_id, targets.len());

        for target in targets {
            if self.cancel.is_cancelled() {
                info!("Worker {} cancelled before {}", worker_id, target.id);
                break;
            }

            let started = Instant::now();
            let counts = match engine.extract(&self.ctx, &target).await {
                Ok(result) => {
                    if !result.drill_failures.is_empty() {
                        let _ = tx
                            .send(WorkerMessage::Log {
                                worker_id,
                                level: LogLevel::Warn,
                                msg: format!(
                                    "{}: {} of {} drill-downs had failures",
                                    target.display_name,
                                    distinct_records(&result.drill_failures),
                                    result.explored
                                ),
                            })
                            .await;
                    }
                    TargetCounts {
                        found: result.found,
                        new: result.new_records,
                        updated: result.updated_records,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(
                        "Worker {}: {} failed ({}): {}",
                        worker_id,
                        target.display_name,
                        e.kind(),
                        e
                    );
                    TargetCounts::failed(e.to_string())
                }
            };

            let _ = tx
                .send(WorkerMessage::TargetDone {
                    worker_id,
                    target,
                    counts,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
                .await;
        }

        engine.shutdown().await;
        let _ = tx.send(WorkerMessage::WorkerDone { worker_id }).await;
    }

    /// Start the browser session, then open the store connection. The
    /// browser is shut down again if the connection cannot be opened.
    async fn setup(&self) -> Result<ExtractionEngine<F::Driver>, WorkerFatal> {
        let mut driver = self.factory.launch(self.id).await?;
        let records = match DieselRecordRepository::connect(&self.pool).await {
            Ok(records) => records,
            Err(e) => {
                driver.shutdown().await;
                return Err(WorkerFatal::StoreConnection(e.to_string()));
            }
        };
        Ok(ExtractionEngine::new(driver, records, self.resolver.clone()))
    }
}

fn distinct_records(failures: &[crate::extract::DrillFailure]) -> usize {
    let mut ids: Vec<&str> = failures.iter().map(|f| f.record_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}
