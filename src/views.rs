//! Fetched views: one rebuilt forest per session and record type.
//!
//! Every refresh takes a ticket from the [`FetchSequencer`]. Starting a new
//! refresh cancels the previous in-flight fetch for the same view, and a
//! result is only committed while its ticket is still the newest one, so a
//! slow response can never overwrite a newer view.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RecordTypeConfig;
use crate::erp_client::RecordSource;
use crate::error::{DashboardError, Result};
use crate::schema::{now_iso8601, RowPage, TreeView, ViewSummary};
use crate::session::Session;
use crate::tree::{build_forest, flatten_with_depth, records_from_values, FlatRow, Forest};

/// Deepest forest served as nested JSON.
pub const MAX_TREE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub session_id: String,
    pub record_type: String,
}

impl ViewKey {
    pub fn new(session: &Session, record_type: &RecordTypeConfig) -> Self {
        Self {
            session_id: session.id.clone(),
            record_type: record_type.name.clone(),
        }
    }
}

/// Permission to commit one fetch result.
#[derive(Debug)]
pub struct FetchTicket {
    pub key: ViewKey,
    pub seq: u64,
    token: CancellationToken,
}

impl FetchTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct Inflight {
    seq: u64,
    token: CancellationToken,
}

/// Hands out monotonically increasing fetch tickets per view.
#[derive(Debug, Clone, Default)]
pub struct FetchSequencer {
    counter: Arc<AtomicU64>,
    inflight: Arc<Mutex<HashMap<ViewKey, Inflight>>>,
}

impl FetchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch for `key`, cancelling any fetch already running for it.
    pub fn begin(&self, key: &ViewKey) -> FetchTicket {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let previous = self.inflight.lock().unwrap().insert(
            key.clone(),
            Inflight {
                seq,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Fetch #{} for {}/{} supersedes #{}",
                seq, key.session_id, key.record_type, previous.seq
            );
            previous.token.cancel();
        }

        FetchTicket {
            key: key.clone(),
            seq,
            token,
        }
    }

    /// Whether `ticket` is still the newest fetch for its view.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.inflight
            .lock()
            .unwrap()
            .get(&ticket.key)
            .map(|inflight| inflight.seq == ticket.seq)
            .unwrap_or(false)
    }

    /// Release the in-flight slot held by `ticket`, if it still holds it.
    pub fn finish(&self, ticket: &FetchTicket) {
        let mut inflight = self.inflight.lock().unwrap();
        if inflight.get(&ticket.key).map(|i| i.seq) == Some(ticket.seq) {
            inflight.remove(&ticket.key);
        }
    }

    /// Cancel the in-flight fetch for `key`, if any. Its result can no longer
    /// be committed.
    pub fn cancel(&self, key: &ViewKey) -> bool {
        match self.inflight.lock().unwrap().remove(key) {
            Some(inflight) => {
                debug!(
                    "Fetch #{} for {}/{} cancelled",
                    inflight.seq, key.session_id, key.record_type
                );
                inflight.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight fetch belonging to a session.
    pub fn cancel_session(&self, session_id: &str) {
        self.inflight.lock().unwrap().retain(|key, inflight| {
            if key.session_id == session_id {
                inflight.token.cancel();
                false
            } else {
                true
            }
        });
    }
}

/// A committed view: the forest plus its pre-order rows.
#[derive(Debug)]
pub struct View {
    pub record_type: String,
    pub seq: u64,
    pub fetched_at: String,
    pub forest: Forest,
    pub rows: Vec<FlatRow>,
}

impl View {
    fn new(record_type: String, seq: u64, forest: Forest) -> Self {
        let rows = flatten_with_depth(&forest);
        Self {
            record_type,
            seq,
            fetched_at: now_iso8601(),
            forest,
            rows,
        }
    }

    pub fn summary(&self) -> ViewSummary {
        ViewSummary {
            record_type: self.record_type.clone(),
            seq: self.seq,
            fetched_at: self.fetched_at.clone(),
            total_rows: self.rows.len(),
            root_count: self.forest.roots.len(),
        }
    }

    /// The nested forest. Views deeper than [`MAX_TREE_DEPTH`] are only
    /// served as rows.
    pub fn tree(&self) -> Result<TreeView> {
        let depth = self.depth();
        if depth > MAX_TREE_DEPTH {
            return Err(DashboardError::TreeTooDeep {
                depth,
                max: MAX_TREE_DEPTH,
            });
        }

        Ok(TreeView {
            record_type: self.record_type.clone(),
            seq: self.seq,
            fetched_at: self.fetched_at.clone(),
            roots: self.forest.clone(),
        })
    }

    /// Number of levels, counting the roots as one.
    pub fn depth(&self) -> usize {
        self.rows.iter().map(|row| row.level + 1).max().unwrap_or(0)
    }

    /// Serve flattened rows with pagination.
    pub fn page(&self, offset: usize, limit: usize) -> RowPage {
        let total_rows = self.rows.len();
        let start = offset.min(total_rows);
        let end = offset.saturating_add(limit).min(total_rows);

        RowPage {
            rows: self.rows[start..end].to_vec(),
            offset,
            limit,
            total_rows,
            has_more: end < total_rows,
        }
    }
}

/// In-memory store of the latest committed view per session and record type.
#[derive(Debug, Clone, Default)]
pub struct ViewStore {
    sequencer: FetchSequencer,
    views: Arc<RwLock<HashMap<ViewKey, Arc<View>>>>,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the flat list, rebuild the forest, and commit it if no newer
    /// refresh for the same view has started in the meantime.
    pub async fn refresh(
        &self,
        source: &dyn RecordSource,
        session: &Session,
        record_type: &RecordTypeConfig,
    ) -> Result<Arc<View>> {
        let key = ViewKey::new(session, record_type);
        let ticket = self.sequencer.begin(&key);

        let built = tokio::select! {
            _ = ticket.token.cancelled() => Err(DashboardError::Superseded),
            result = fetch_forest(source, session, record_type) => result,
        };

        match built {
            Ok(forest) => self.commit(&ticket, forest),
            Err(e) => {
                self.sequencer.finish(&ticket);
                Err(e)
            }
        }
    }

    /// Store `forest` under the ticket's view unless the ticket went stale.
    pub fn commit(&self, ticket: &FetchTicket, forest: Forest) -> Result<Arc<View>> {
        if ticket.is_cancelled() || !self.sequencer.is_current(ticket) {
            debug!(
                "Discarding stale fetch #{} for {}",
                ticket.seq, ticket.key.record_type
            );
            return Err(DashboardError::Superseded);
        }

        let view = Arc::new(View::new(ticket.key.record_type.clone(), ticket.seq, forest));
        {
            let mut views = self.views.write().unwrap();
            if let Some(existing) = views.get(&ticket.key) {
                if existing.seq > ticket.seq {
                    return Err(DashboardError::Superseded);
                }
            }
            views.insert(ticket.key.clone(), view.clone());
        }
        self.sequencer.finish(ticket);

        info!(
            "View {} #{} committed ({} rows, {} roots)",
            view.record_type,
            view.seq,
            view.rows.len(),
            view.forest.roots.len()
        );
        Ok(view)
    }

    pub fn get(&self, key: &ViewKey) -> Option<Arc<View>> {
        self.views.read().unwrap().get(key).cloned()
    }

    /// The committed view, refreshing first when there is none yet.
    pub async fn get_or_refresh(
        &self,
        source: &dyn RecordSource,
        session: &Session,
        record_type: &RecordTypeConfig,
    ) -> Result<Arc<View>> {
        match self.get(&ViewKey::new(session, record_type)) {
            Some(view) => Ok(view),
            None => self.refresh(source, session, record_type).await,
        }
    }

    /// Forget a view after the underlying records changed. A fetch already
    /// running for the view may have read pre-change data, so it is cancelled.
    pub fn invalidate(&self, key: &ViewKey) -> bool {
        self.sequencer.cancel(key);
        self.views.write().unwrap().remove(key).is_some()
    }

    /// Drop every view and cancel every fetch of a session (logout).
    pub fn drop_session(&self, session_id: &str) {
        self.sequencer.cancel_session(session_id);
        let mut views = self.views.write().unwrap();
        let before = views.len();
        views.retain(|key, _| key.session_id != session_id);
        debug!(
            "Dropped {} view(s) for session {}",
            before - views.len(),
            session_id
        );
    }
}

async fn fetch_forest(
    source: &dyn RecordSource,
    session: &Session,
    record_type: &RecordTypeConfig,
) -> Result<Forest> {
    let values: Vec<Value> = source.fetch_records(session, record_type).await?;
    let records = records_from_values(
        values,
        &record_type.id_fields,
        record_type.parent_field.as_deref(),
    )?;
    Ok(build_forest(records, &record_type.root_sentinel)?)
}
