//! Shared fixtures: a scripted portal driver and a throwaway store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use bidharvest::browser::{
    DetailPanel, DriverFactory, Listing, ListingBody, PortalDriver, RowHandle, RowKey,
};
use bidharvest::models::Target;
use bidharvest::repository::{init_schema, AsyncSqlitePool, DieselTargetRepository};
use bidharvest::{ExtractionError, WorkerFatal};

pub const FUTURE: &str = "15/03/2099 09:00";
pub const PAST: &str = "15/03/2001 09:00";

pub const ITEMS_HTML: &str = r#"<table>
    <tr><th>Item</th><th>Código</th><th>Descrição</th><th>Unid.</th>
        <th>Quant.</th><th>Valor Unitário</th><th>Valor Total</th></tr>
    <tr><td>1</td><td>100</td><td>Arroz tipo 1</td><td>KG</td><td>500</td><td>5,00</td><td>2.500,00</td></tr>
    <tr><td>2</td><td>200</td><td>Feijão carioca</td><td>KG</td><td>300</td><td>8,00</td><td>2.400,00</td></tr>
</table>"#;

pub const METADATA_HTML: &str = r#"<table>
    <tr><td>Modo de disputa</td><td>Aberto</td></tr>
    <tr><td>Valor estimado</td><td>R$ 4.900,00</td></tr>
</table>"#;

/// Listing row in the legacy grid layout (closing date at column 6).
pub fn row(process: &str, organization: &str, closing: &str) -> Vec<String> {
    vec![
        format!("id-{}", process),
        String::new(),
        String::new(),
        process.to_string(),
        organization.to_string(),
        "Aberto".to_string(),
        closing.to_string(),
        format!("Aquisição referente ao processo {}", process),
        String::new(),
        "Pregão Eletrônico".to_string(),
    ]
}

pub fn target(id: &str) -> Target {
    Target::new(id, format!("Prefeitura {}", id), format!("https://{}.example.gov.br", id))
}

#[derive(Debug, Clone, Default)]
pub enum ListingScript {
    Rows(Vec<Vec<String>>),
    #[default]
    Empty,
    Timeout,
    /// A payload without a rows array.
    Malformed,
}

/// How one target's portal behaves.
#[derive(Debug, Clone, Default)]
pub struct PortalScript {
    pub listing: ListingScript,
    pub failing_panels: Vec<DetailPanel>,
    /// Every `is_attached` check reports the handle as detached.
    pub stale_handles: bool,
    /// Process numbers `find_row` cannot locate.
    pub unlocatable: Vec<String>,
}

impl PortalScript {
    pub fn rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            listing: ListingScript::Rows(rows),
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            listing: ListingScript::Timeout,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load(String),
    IsAttached(RowKey),
    FindRow(RowKey),
    /// Index of the listing row whose detail view was opened.
    Open(usize),
    ReadPanel(DetailPanel),
    Close,
    Shutdown,
}

pub type CallLog = Arc<Mutex<Vec<(usize, Call)>>>;

#[derive(Clone, Default)]
pub struct ScriptedFactory {
    portals: Arc<HashMap<String, PortalScript>>,
    failing_workers: Arc<HashSet<usize>>,
    pub calls: CallLog,
}

impl ScriptedFactory {
    pub fn new(portals: impl IntoIterator<Item = (String, PortalScript)>) -> Self {
        Self {
            portals: Arc::new(portals.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Workers with these ids fail to start their browser session.
    pub fn failing_workers(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.failing_workers = Arc::new(ids.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<(usize, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, worker_id: usize) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|(w, _)| *w == worker_id)
            .map(|(_, c)| c)
            .collect()
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn launch(&self, worker_id: usize) -> Result<ScriptedDriver, WorkerFatal> {
        if self.failing_workers.contains(&worker_id) {
            return Err(WorkerFatal::BrowserLaunch("no browser".to_string()));
        }
        Ok(ScriptedDriver {
            worker_id,
            portals: self.portals.clone(),
            calls: self.calls.clone(),
            current: None,
            generation: 0,
            open: None,
        })
    }
}

pub struct ScriptedDriver {
    worker_id: usize,
    portals: Arc<HashMap<String, PortalScript>>,
    calls: CallLog,
    current: Option<(PortalScript, Vec<Vec<String>>)>,
    generation: u64,
    open: Option<usize>,
}

impl ScriptedDriver {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((self.worker_id, call));
    }

    fn script(&self) -> Result<&(PortalScript, Vec<Vec<String>>), ExtractionError> {
        self.current
            .as_ref()
            .ok_or_else(|| ExtractionError::NavigationFailed("no listing loaded".into()))
    }
}

#[async_trait]
impl PortalDriver for ScriptedDriver {
    async fn load_listing(&mut self, target: &Target) -> Result<Listing, ExtractionError> {
        self.record(Call::Load(target.id.clone()));
        let script = self.portals.get(&target.id).cloned().ok_or_else(|| {
            ExtractionError::NavigationFailed(format!("unknown portal {}", target.id))
        })?;

        let (body, rows) = match &script.listing {
            ListingScript::Timeout => return Err(ExtractionError::Timeout),
            ListingScript::Malformed => (json!({ "total": 0 }), Vec::new()),
            ListingScript::Empty => (json!({ "rows": [] }), Vec::new()),
            ListingScript::Rows(rows) => (json!({ "rows": rows }), rows.clone()),
        };
        self.generation += 1;
        self.current = Some((script, rows));
        Ok(Listing {
            generation: self.generation,
            body: ListingBody::Json(body),
        })
    }

    async fn is_attached(&mut self, row: &RowHandle) -> Result<bool, ExtractionError> {
        self.record(Call::IsAttached(row.key.clone()));
        let (script, rows) = self.script()?;
        Ok(!script.stale_handles
            && row.generation == self.generation
            && rows.get(row.index).is_some_and(|cells| row.key.matches(cells)))
    }

    async fn find_row(&mut self, key: &RowKey) -> Result<Option<RowHandle>, ExtractionError> {
        self.record(Call::FindRow(key.clone()));
        let (script, rows) = self.script()?;
        if script.unlocatable.contains(&key.process_number) {
            return Ok(None);
        }
        Ok(rows
            .iter()
            .position(|cells| key.matches(cells))
            .map(|index| RowHandle {
                index,
                key: key.clone(),
                generation: self.generation,
            }))
    }

    async fn open_detail(&mut self, row: &RowHandle) -> Result<(), ExtractionError> {
        self.record(Call::Open(row.index));
        self.open = Some(row.index);
        Ok(())
    }

    async fn read_panel(&mut self, panel: DetailPanel) -> Result<String, ExtractionError> {
        self.record(Call::ReadPanel(panel));
        let (script, rows) = self.script()?;
        if script.failing_panels.contains(&panel) {
            return Err(ExtractionError::ParseFailed(format!(
                "{} panel not rendered",
                panel.as_str()
            )));
        }
        let cells = self.open.and_then(|index| rows.get(index)).cloned().unwrap_or_default();
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Ok(match panel {
            DetailPanel::Description => format!(
                "<div><p>Objeto completo do processo {} de {}</p></div>",
                cell(3),
                cell(4)
            ),
            DetailPanel::Metadata => METADATA_HTML.to_string(),
            DetailPanel::Items => ITEMS_HTML.to_string(),
        })
    }

    async fn close_detail(&mut self) -> Result<(), ExtractionError> {
        self.record(Call::Close);
        self.open = None;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.record(Call::Shutdown);
    }
}

/// A fresh store with the schema applied.
pub async fn temp_store() -> (TempDir, AsyncSqlitePool) {
    let dir = tempdir().unwrap();
    let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
    init_schema(&pool).await.unwrap();
    (dir, pool)
}

pub async fn seed_targets(pool: &AsyncSqlitePool, targets: &[Target], region: Option<&str>) {
    let repo = DieselTargetRepository::new(pool.clone());
    for target in targets {
        repo.save(target, region).await.unwrap();
    }
}
