/*
    handle.rs - An opened document store

    Owns one replica of a store: the append log, the index derived from it,
    the optional commit log, and the background replication tasks.

    Lifecycle:
    Uninitialized -> Opening -> Loading -> Ready

    put/get are valid in every state and act on whatever index exists.
    Before `load` that is only what was written or merged in this process.

    Locking:
    A single RwLock guards (log, index) so merges, rebuilds and local
    appends are serialized. It is never held across an await.

    Handles are cheap clones of one replica. The background tasks stop
    when the last clone is dropped.
*/

use crate::core_session::{ContentStore, Transport};
use crate::core_store::crdt::VectorClock;
use crate::core_store::model::{to_record, ContentAddress, Document, DocumentId, PeerId, StoreAddress};
use crate::core_store::store::access::AccessPolicy;
use crate::core_store::store::allocator;
use crate::core_store::store::append_log::{AppendLog, LogEntry, MergeOutcome, Operation};
use crate::core_store::store::commit_log::CommitLog;
use crate::core_store::store::errors::{StoreError, StoreResult};
use crate::core_store::store::index::MaterializedIndex;
use crate::core_store::sync::{replicator, ReplicationEvent, ReplicationNotifier};
use crate::metrics;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Helper to convert lock poisoning into StoreError
fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::Internal("store lock poisoned".to_string())
}

/// Per-store tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Heads announcement period; zero disables periodic announcements
    pub sync_interval: Duration,

    /// Deadline for publishing a batch of local writes
    pub ack_timeout: Duration,

    /// Replication event buffer
    pub event_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            sync_interval: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreState {
    #[default]
    Uninitialized,
    Opening,
    Loading,
    Ready,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreState::Uninitialized => "uninitialized",
            StoreState::Opening => "opening",
            StoreState::Loading => "loading",
            StoreState::Ready => "ready",
        };
        f.write_str(name)
    }
}

struct Replica {
    log: AppendLog,
    index: MaterializedIndex,
}

/// Everything a store needs from its session
pub(crate) struct StoreContext {
    pub address: StoreAddress,
    pub local: PeerId,
    pub policy: AccessPolicy,
    pub options: StoreOptions,
    pub transport: Arc<dyn Transport>,
    pub content: Arc<ContentStore>,
    pub commit_log_path: Option<PathBuf>,
}

/// State shared between the handle and its background tasks
pub(crate) struct StoreShared {
    address: StoreAddress,
    local: PeerId,
    policy: AccessPolicy,
    options: StoreOptions,
    state: RwLock<StoreState>,
    replica: RwLock<Replica>,
    commit_log: Option<Mutex<CommitLog>>,
    content: Arc<ContentStore>,
    transport: Arc<dyn Transport>,
    notifier: ReplicationNotifier,
    outbound: mpsc::UnboundedSender<LogEntry>,
}

impl StoreShared {
    pub(crate) fn address(&self) -> &StoreAddress {
        &self.address
    }

    pub(crate) fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub(crate) fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn read_replica(&self) -> StoreResult<RwLockReadGuard<'_, Replica>> {
        self.replica.read().map_err(handle_poison)
    }

    fn write_replica(&self) -> StoreResult<RwLockWriteGuard<'_, Replica>> {
        self.replica.write().map_err(handle_poison)
    }

    /// Reads never fail: a poisoned lock still holds a consistent replica
    /// because every mutation finishes before it can panic.
    fn read_index<R>(&self, f: impl FnOnce(&MaterializedIndex) -> R) -> R {
        let replica = self.replica.read().unwrap_or_else(PoisonError::into_inner);
        f(&replica.index)
    }

    fn state(&self) -> StoreState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: StoreState) -> StoreResult<()> {
        let mut state = self.state.write().map_err(handle_poison)?;
        trace!(store = %self.address, from = %*state, to = %next, "store state change");
        *state = next;
        Ok(())
    }

    pub(crate) fn heads(&self) -> StoreResult<VectorClock> {
        Ok(self.read_replica()?.log.heads().clone())
    }

    /// Entries a peer with `heads` is missing, plus our own heads
    pub(crate) fn entries_since(&self, heads: &VectorClock) -> StoreResult<(Vec<LogEntry>, VectorClock)> {
        let replica = self.read_replica()?;
        Ok((replica.log.entries_since(heads), replica.log.heads().clone()))
    }

    /// Write admitted entries to the commit log and the content store.
    /// Entries already on disk are skipped.
    ///
    /// A storage failure does not undo the in-memory write; it is reported
    /// and the entry will be missing after a restart.
    fn persist(&self, entries: &[LogEntry]) {
        for entry in entries {
            if self.content.contains(&entry.hash) {
                continue;
            }
            if let Ok(body) = entry.body_bytes() {
                self.content.put(&body);
            }
        }

        let Some(commit_log) = &self.commit_log else {
            return;
        };
        let mut commit_log = match commit_log.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!(store = %self.address, "commit log lock poisoned, entries not persisted");
                return;
            }
        };
        for entry in entries {
            if let Err(e) = commit_log.append(entry) {
                error!(store = %self.address, origin = %entry.origin, seq = entry.seq, error = %e, "failed to persist entry");
            }
        }
    }

    /// Persist a local entry and queue it for propagation
    fn commit_local(&self, entry: LogEntry) {
        self.persist(std::slice::from_ref(&entry));
        metrics::record_appended(&self.address.name);
        if self.outbound.send(entry).is_err() {
            debug!(store = %self.address, "propagation task stopped, entry kept local");
        }
    }

    /// Merge entries from a peer, then persist, rebuild and notify
    pub(crate) fn merge_remote(&self, entries: Vec<LogEntry>) -> StoreResult<MergeOutcome> {
        let received = entries.len();
        let (outcome, documents) = {
            let mut replica = self.write_replica()?;
            let outcome = replica.log.merge_remote(entries, &self.policy);
            if outcome.is_empty() {
                drop(replica);
                metrics::record_dropped(&self.address.name, outcome.rejected);
                trace!(store = %self.address, received, duplicates = outcome.duplicates, "nothing new to merge");
                return Ok(outcome);
            }
            replica.index = MaterializedIndex::rebuild(replica.log.entries());
            let documents = replica.index.documents();
            (outcome, documents)
        };

        self.persist(&outcome.admitted);
        metrics::record_merged(&self.address.name, outcome.admitted.len());
        metrics::record_dropped(&self.address.name, outcome.rejected);

        debug!(
            store = %self.address,
            merged = outcome.admitted.len(),
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            documents = documents.len(),
            "merged remote entries"
        );

        let event = ReplicationEvent::new(self.address.clone(), outcome.admitted.len(), documents);
        self.notifier.notify(event);
        Ok(outcome)
    }
}

/// Background tasks of one replica, aborted when the last handle goes
pub(crate) struct StoreTasks {
    shared: Arc<StoreShared>,
    handles: Vec<JoinHandle<()>>,
}

impl Drop for StoreTasks {
    fn drop(&mut self) {
        for task in &self.handles {
            task.abort();
        }
        if self.shared.state() != StoreState::Ready {
            warn!(store = %self.shared.address, state = %self.shared.state(), "store closed before it was loaded");
        }
    }
}

/// Handle to an opened store. Clones share one replica; dropping the last
/// one stops replication.
#[derive(Clone)]
pub struct StoreHandle {
    shared: Arc<StoreShared>,
    tasks: Arc<StoreTasks>,
}

impl StoreHandle {
    /// Open the commit log, subscribe to the store topic and start the
    /// background tasks
    pub(crate) async fn open(ctx: StoreContext) -> StoreResult<Self> {
        let StoreContext { address, local, policy, options, transport, content, commit_log_path } = ctx;

        let mut log = AppendLog::new(local.clone());
        let commit_log = match commit_log_path {
            Some(path) => {
                let commit_log = CommitLog::open(path.clone()).map_err(|e| {
                    StoreError::StoreOpen(format!("cannot open commit log {}: {}", path.display(), e))
                })?;
                // Persisted entries are replayed by `load`; until then only
                // the clock and local sequence are advanced past them.
                let persisted = commit_log.read_entries().map_err(|e| {
                    StoreError::StoreOpen(format!("cannot read commit log {}: {}", path.display(), e))
                })?;
                for entry in &persisted {
                    log.observe(entry);
                }
                Some(Mutex::new(commit_log))
            }
            None => None,
        };

        let topic = address.to_string();
        let inbound = transport
            .subscribe(&topic)
            .await
            .map_err(|e| StoreError::StoreOpen(format!("cannot subscribe to {}: {}", topic, e)))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(StoreShared {
            address,
            local,
            policy,
            notifier: ReplicationNotifier::new(options.event_capacity),
            options,
            state: RwLock::new(StoreState::Uninitialized),
            replica: RwLock::new(Replica { log, index: MaterializedIndex::new() }),
            commit_log,
            content,
            transport,
            outbound: outbound_tx,
        });
        shared.set_state(StoreState::Opening)?;

        let mut handles = vec![
            tokio::spawn(replicator::run_inbound(shared.clone(), inbound)),
            tokio::spawn(replicator::run_outbound(shared.clone(), outbound_rx)),
        ];
        if !shared.options.sync_interval.is_zero() {
            handles.push(tokio::spawn(replicator::run_announcer(
                shared.clone(),
                shared.options.sync_interval,
            )));
        }
        let tasks = Arc::new(StoreTasks { shared: shared.clone(), handles });

        info!(
            store = %shared.address,
            peer = %shared.local,
            persistent = shared.commit_log.is_some(),
            "store opened"
        );
        Ok(StoreHandle { shared, tasks })
    }

    /// Weak reference that does not keep replication alive
    pub(crate) fn downgrade(&self) -> Weak<StoreTasks> {
        Arc::downgrade(&self.tasks)
    }

    /// Another handle to a replica that still has a live handle
    pub(crate) fn upgrade(tasks: &Weak<StoreTasks>) -> Option<StoreHandle> {
        tasks.upgrade().map(|tasks| StoreHandle { shared: tasks.shared.clone(), tasks })
    }

    /// Replay every locally known entry into the index, then announce our
    /// heads so peers can send what we are missing. Idempotent.
    pub async fn load(&self) -> StoreResult<()> {
        self.shared.set_state(StoreState::Loading)?;

        let persisted = match &self.shared.commit_log {
            Some(commit_log) => commit_log.lock().map_err(handle_poison)?.read_entries()?,
            None => Vec::new(),
        };

        let (outcome, documents, entries) = {
            let mut replica = self.shared.write_replica()?;
            let outcome = replica.log.merge_remote(persisted, &self.shared.policy);
            replica.index = MaterializedIndex::rebuild(replica.log.entries());
            (outcome, replica.index.len(), replica.log.len())
        };
        metrics::record_dropped(&self.shared.address.name, outcome.rejected);

        self.shared.set_state(StoreState::Ready)?;
        info!(
            store = %self.shared.address,
            replayed = outcome.admitted.len(),
            entries,
            documents,
            "store loaded"
        );

        if let Err(e) = self.announce().await {
            debug!(store = %self.shared.address, error = %e, "initial heads announcement failed");
        }
        Ok(())
    }

    /// Commit a document under a freshly allocated id.
    ///
    /// The id is final locally but a concurrent writer elsewhere may have
    /// picked the same one; the causally later write then wins.
    pub fn put<T: Serialize + ?Sized>(&self, document: &T) -> StoreResult<DocumentId> {
        let fields = to_record(document)?;
        self.ensure_writer()?;

        let entry = {
            let mut replica = self.shared.write_replica()?;
            let id = allocator::next_id(&replica.index);
            let entry = replica.log.append_local(Operation::Put, id, Some(fields))?;
            replica.index.apply(&entry);
            entry
        };

        let id = entry.key;
        debug!(store = %self.shared.address, id = %id, position = %entry.position, "put");
        self.shared.commit_local(entry);
        Ok(id)
    }

    /// Remove a document; returns the address of the DELETE entry
    pub fn delete(&self, id: DocumentId) -> StoreResult<ContentAddress> {
        self.ensure_writer()?;

        let entry = {
            let mut replica = self.shared.write_replica()?;
            let entry = replica.log.append_local(Operation::Delete, id, None)?;
            replica.index.apply(&entry);
            entry
        };

        let hash = entry.hash.clone();
        debug!(store = %self.shared.address, id = %id, "delete");
        self.shared.commit_local(entry);
        Ok(hash)
    }

    fn ensure_writer(&self) -> StoreResult<()> {
        if self.shared.policy.permits(&self.shared.local) {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied(format!(
                "{} may not write to {}",
                self.shared.local, self.shared.address
            )))
        }
    }

    /// Current index contents in id order
    pub fn get_all(&self) -> Vec<Document> {
        self.shared.read_index(|index| index.documents())
    }

    pub fn get_count(&self) -> usize {
        self.shared.read_index(|index| index.len())
    }

    /// Id the next local put would receive
    pub fn next_id(&self) -> DocumentId {
        self.shared.read_index(allocator::next_id)
    }

    /// Documents whose id starts with `key`; an empty key matches all
    pub fn get(&self, key: &str) -> Vec<Document> {
        self.shared.read_index(|index| index.with_prefix(key))
    }

    pub fn get_by_id(&self, id: DocumentId) -> Option<Document> {
        self.shared.read_index(|index| index.get(id).cloned())
    }

    pub fn query<F>(&self, predicate: F) -> Vec<Document>
    where
        F: FnMut(&Document) -> bool,
    {
        self.shared.read_index(|index| index.query(predicate))
    }

    /// Log entries newest first; a negative limit returns all of them
    pub fn iterator(&self, limit: isize) -> StoreResult<Vec<LogEntry>> {
        let replica = self.shared.read_replica()?;
        let newest_first = replica.log.entries().iter().rev().cloned();
        Ok(if limit < 0 {
            newest_first.collect()
        } else {
            newest_first.take(limit as usize).collect()
        })
    }

    /// Look up an entry by its content address, e.g. the one `delete`
    /// returned. Only entries this session has stored or merged resolve.
    pub fn resolve(&self, hash: &ContentAddress) -> StoreResult<Option<LogEntry>> {
        match self.shared.content.get(hash) {
            Some(body) => LogEntry::from_body(&body).map(Some),
            None => Ok(None),
        }
    }

    /// Every log entry that targeted `id`, in causal order
    pub fn entries_for(&self, id: DocumentId) -> StoreResult<Vec<LogEntry>> {
        let replica = self.shared.read_replica()?;
        Ok(replica.log.entries().iter().filter(|e| e.key == id).cloned().collect())
    }

    pub fn log_len(&self) -> usize {
        self.shared
            .replica
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .log
            .len()
    }

    pub fn heads(&self) -> StoreResult<VectorClock> {
        self.shared.heads()
    }

    pub fn address(&self) -> &StoreAddress {
        &self.shared.address
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.shared.local
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.shared.policy
    }

    pub fn state(&self) -> StoreState {
        self.shared.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.shared.notifier.subscribe()
    }

    /// Register a callback for replication events
    pub fn on_replicated<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: FnMut(ReplicationEvent) + Send + 'static,
    {
        self.shared.notifier.on_replicated(handler)
    }

    /// Publish our heads now; returns how many peers were reached
    pub async fn announce(&self) -> StoreResult<usize> {
        replicator::announce(&self.shared).await
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("address", &self.shared.address)
            .field("local", &self.shared.local)
            .field("state", &self.shared.state())
            .finish()
    }
}
