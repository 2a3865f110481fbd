//! Optimistic three-way editing against a live entity.
//!
//! A staging session snapshots an entity into `base` and `local` copies.
//! The user edits `local`; the live cell keeps moving underneath as
//! realtime events land. Saving performs a three-way merge of
//! base/local/remote under a chosen strategy and submits the merged
//! fields as one update.
//!
//! Server-owned bookkeeping columns are excluded from divergence
//! tracking: only the server writes them, so they would otherwise count
//! every echo as a remote edit.

use crate::cache::{EntityCache, EntityCell, MutationSink};
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use syncmirror_protocol::{
    CallResult, FieldValue, MutationKind, Record, COL_ID, SERVER_OWNED_COLUMNS,
};

/// One field where both sides diverged from base to different values.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    /// The field name.
    pub field: String,
    /// The value at session open (absent = not readable then).
    pub base: Option<FieldValue>,
    /// The local working value.
    pub local: Option<FieldValue>,
    /// The current live value.
    pub remote: Option<FieldValue>,
}

/// Divergence of one tracked field across base, local and remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// Neither side moved from base.
    Clean,
    /// Only the local copy moved.
    LocalDiverge,
    /// Only the live value moved.
    RemoteDiverge,
    /// Both moved, to the same value.
    Diverged,
    /// Both moved, to different values.
    Conflicted,
}

/// Aggregate divergence of the whole session.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeState {
    /// Nothing moved.
    Clean,
    /// Only local edits exist.
    LocalDiverge,
    /// Only remote changes arrived.
    RemoteDiverge,
    /// Both sides moved without conflicting.
    Diverged,
    /// At least one field conflicts.
    Conflicted(Vec<FieldConflict>),
}

/// How a save resolves the three-way merge.
#[derive(Clone)]
pub enum SaveStrategy {
    /// Abort if the live value moved at all since the session opened.
    IfClean,
    /// Local values win unconditionally, overwriting remote changes.
    Force,
    /// Conflicts resolve to the local value; clean remote changes stand.
    PreferLocal,
    /// Conflicts resolve to the live value; clean local edits still save.
    PreferRemote,
    /// Merge non-overlapping changes; abort if any field conflicts.
    MergeClean,
    /// Always abort, surfacing the conflict list for interactive review.
    Manual,
    /// A caller-supplied resolver produces the merged record.
    Custom(Resolver),
}

/// Resolver for [`SaveStrategy::Custom`]: receives base, local, remote and
/// the conflict list, and returns the record the save should converge on.
pub type Resolver =
    Arc<dyn Fn(&Record, &Record, &Record, &[FieldConflict]) -> Record + Send + Sync>;

impl fmt::Debug for SaveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveStrategy::IfClean => "IfClean",
            SaveStrategy::Force => "Force",
            SaveStrategy::PreferLocal => "PreferLocal",
            SaveStrategy::PreferRemote => "PreferRemote",
            SaveStrategy::MergeClean => "MergeClean",
            SaveStrategy::Manual => "Manual",
            SaveStrategy::Custom(_) => "Custom(..)",
        };
        f.write_str(name)
    }
}

struct Analysis {
    local_changed: Vec<String>,
    remote_changed: Vec<String>,
    conflicts: Vec<FieldConflict>,
}

/// An optimistic editing session over one cached entity.
pub struct StagingSession {
    cache: Arc<EntityCache>,
    cell: Arc<EntityCell>,
    base: RwLock<Record>,
    local: RwLock<Record>,
    recreate_on_delete: bool,
}

impl StagingSession {
    /// Opens a session over a cached entity.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityDeleted`] if the identity is tombstoned,
    /// [`EngineError::Operation`] if it is simply not cached.
    pub fn open(
        cache: Arc<EntityCache>,
        id: &str,
        recreate_on_delete: bool,
    ) -> EngineResult<Self> {
        if cache.is_deleted(id) {
            return Err(EngineError::EntityDeleted(id.to_owned()));
        }
        let cell = cache
            .get(id)
            .ok_or_else(|| EngineError::Operation(format!("entity '{id}' is not cached")))?;
        let snapshot = cell.get();
        Ok(Self {
            cache,
            cell,
            base: RwLock::new(snapshot.clone()),
            local: RwLock::new(snapshot),
            recreate_on_delete,
        })
    }

    /// The identity being edited.
    pub fn id(&self) -> &str {
        self.cell.id()
    }

    /// Snapshot of the session-open baseline.
    pub fn base(&self) -> Record {
        self.base.read().clone()
    }

    /// Snapshot of the local working copy.
    pub fn local(&self) -> Record {
        self.local.read().clone()
    }

    /// Snapshot of the current live value.
    pub fn remote(&self) -> Record {
        self.cell.get()
    }

    /// Sets a field on the local working copy.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] for the identity column and
    /// server-owned columns, which sessions may not edit.
    pub fn set(&self, field: &str, value: FieldValue) -> EngineResult<()> {
        if field == COL_ID || SERVER_OWNED_COLUMNS.contains(&field) {
            return Err(EngineError::Validation(format!(
                "field '{field}' is not editable"
            )));
        }
        self.local.write().set(field, value);
        Ok(())
    }

    /// Returns a field from the local working copy.
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.local.read().get(field).cloned()
    }

    /// Returns true if the local copy diverged from base.
    pub fn is_dirty_local(&self) -> bool {
        !self.analyze().local_changed.is_empty()
    }

    /// Returns true if the live value diverged from base.
    pub fn is_dirty_remote(&self) -> bool {
        !self.analyze().remote_changed.is_empty()
    }

    /// Returns true if the underlying entity was deleted.
    pub fn is_deleted(&self) -> bool {
        self.cache.is_deleted(self.cell.id())
    }

    /// Divergence of one field.
    pub fn field_state(&self, field: &str) -> FieldState {
        if field == COL_ID || SERVER_OWNED_COLUMNS.contains(&field) {
            return FieldState::Clean;
        }
        let base = self.base.read().get(field).cloned();
        let local = self.local.read().get(field).cloned();
        let remote = self.cell.get().get(field).cloned();
        Self::classify(&base, &local, &remote)
    }

    /// Aggregate divergence of the session.
    pub fn merge_state(&self) -> MergeState {
        let analysis = self.analyze();
        if !analysis.conflicts.is_empty() {
            return MergeState::Conflicted(analysis.conflicts);
        }
        match (
            analysis.local_changed.is_empty(),
            analysis.remote_changed.is_empty(),
        ) {
            (true, true) => MergeState::Clean,
            (false, true) => MergeState::LocalDiverge,
            (true, false) => MergeState::RemoteDiverge,
            (false, false) => MergeState::Diverged,
        }
    }

    /// Discards local edits, restoring fields to the baseline.
    ///
    /// With `fields` given, only those are restored; otherwise the whole
    /// working copy resets.
    pub fn rollback(&self, fields: Option<&[&str]>) {
        let base = self.base.read().clone();
        let mut local = self.local.write();
        match fields {
            None => *local = base,
            Some(names) => {
                for name in names {
                    match base.get(name) {
                        Some(value) => {
                            local.set(*name, value.clone());
                        }
                        None => {
                            local.unset(name);
                        }
                    }
                }
            }
        }
    }

    /// Merges and submits the session as one update.
    ///
    /// On success the baseline is reset to the working copy, so the next
    /// save diffs against what was just submitted. Strategies that abort
    /// return [`EngineError::Conflict`] with the offending fields and
    /// leave the session untouched.
    ///
    /// If the entity was deleted while the session was open, saving fails
    /// with [`EngineError::EntityDeleted`] unless the session was opened
    /// with re-create enabled, in which case the working copy is submitted
    /// as a fresh create under the same identity.
    pub fn save(&self, strategy: &SaveStrategy, sink: &dyn MutationSink) -> EngineResult<CallResult> {
        if self.is_deleted() {
            return self.save_recreate(sink);
        }

        let analysis = self.analyze();
        let base = self.base.read().clone();
        let local = self.local.read().clone();
        let remote = self.cell.get();

        let mut adopt: Vec<(String, FieldValue)> = Vec::new();
        let merged: Vec<(String, FieldValue)> = match strategy {
            SaveStrategy::IfClean => {
                if !analysis.remote_changed.is_empty() {
                    return Err(EngineError::Conflict {
                        conflicts: Self::describe(&analysis.remote_changed, &base, &local, &remote),
                    });
                }
                Self::pick(&analysis.local_changed, &local)
            }
            SaveStrategy::Force => {
                let differing: Vec<String> = local
                    .differing_fields(&remote)
                    .into_iter()
                    .filter(|name| Self::tracked(name))
                    .collect();
                Self::pick(&differing, &local)
            }
            SaveStrategy::PreferLocal => Self::pick(&analysis.local_changed, &local),
            SaveStrategy::PreferRemote => {
                let conflicted: BTreeSet<&str> = analysis
                    .conflicts
                    .iter()
                    .map(|c| c.field.as_str())
                    .collect();
                for conflict in &analysis.conflicts {
                    if let Some(value) = &conflict.remote {
                        adopt.push((conflict.field.clone(), value.clone()));
                    }
                }
                let clean_local: Vec<String> = analysis
                    .local_changed
                    .iter()
                    .filter(|name| !conflicted.contains(name.as_str()))
                    .cloned()
                    .collect();
                Self::pick(&clean_local, &local)
            }
            SaveStrategy::MergeClean => {
                if !analysis.conflicts.is_empty() {
                    return Err(EngineError::Conflict {
                        conflicts: analysis.conflicts,
                    });
                }
                Self::pick(&analysis.local_changed, &local)
            }
            SaveStrategy::Manual => {
                return Err(EngineError::Conflict {
                    conflicts: analysis.conflicts,
                });
            }
            SaveStrategy::Custom(resolve) => {
                let resolved = resolve(&base, &local, &remote, &analysis.conflicts);
                for (name, value) in resolved.iter() {
                    if Self::tracked(name) {
                        adopt.push((name.to_owned(), value.clone()));
                    }
                }
                resolved
                    .differing_fields(&remote)
                    .into_iter()
                    .filter(|name| Self::tracked(name))
                    .filter_map(|name| {
                        resolved.get(&name).map(|value| (name, value.clone()))
                    })
                    .collect()
            }
        };

        if merged.is_empty() {
            self.commit(adopt);
            return Ok(CallResult::success());
        }

        let mut payload = Record::with_id(self.cell.id());
        payload.merge_fields(merged.iter().cloned());
        let result = sink.submit(MutationKind::Update, payload)?;
        if result.success {
            self.commit(adopt);
        }
        Ok(result)
    }

    fn save_recreate(&self, sink: &dyn MutationSink) -> EngineResult<CallResult> {
        if !self.recreate_on_delete {
            return Err(EngineError::EntityDeleted(self.cell.id().to_owned()));
        }
        let local = self.local.read().clone();
        let result = sink.submit(MutationKind::Create, local.outgoing_payload())?;
        if result.success {
            // Re-admit the entity optimistically; the create echo confirms.
            let _ = self.cache.obtain(local);
            self.commit(Vec::new());
        }
        Ok(result)
    }

    /// Resets base to the working copy after a successful save.
    fn commit(&self, adopt: Vec<(String, FieldValue)>) {
        let mut local = self.local.write();
        local.merge_fields(adopt);
        *self.base.write() = local.clone();
    }

    fn analyze(&self) -> Analysis {
        let base = self.base.read().clone();
        let local = self.local.read().clone();
        let remote = self.cell.get();

        let mut names: BTreeSet<String> = BTreeSet::new();
        for record in [&base, &local, &remote] {
            names.extend(
                record
                    .field_names()
                    .filter(|name| Self::tracked(name))
                    .map(str::to_owned),
            );
        }

        let mut analysis = Analysis {
            local_changed: Vec::new(),
            remote_changed: Vec::new(),
            conflicts: Vec::new(),
        };
        for name in names {
            let b = base.get(&name).cloned();
            let l = local.get(&name).cloned();
            let r = remote.get(&name).cloned();
            match Self::classify(&b, &l, &r) {
                FieldState::Clean => {}
                FieldState::LocalDiverge => analysis.local_changed.push(name),
                FieldState::RemoteDiverge => analysis.remote_changed.push(name),
                FieldState::Diverged => {
                    analysis.local_changed.push(name.clone());
                    analysis.remote_changed.push(name);
                }
                FieldState::Conflicted => {
                    analysis.local_changed.push(name.clone());
                    analysis.remote_changed.push(name.clone());
                    analysis.conflicts.push(FieldConflict {
                        field: name,
                        base: b,
                        local: l,
                        remote: r,
                    });
                }
            }
        }
        analysis
    }

    fn classify(
        base: &Option<FieldValue>,
        local: &Option<FieldValue>,
        remote: &Option<FieldValue>,
    ) -> FieldState {
        let local_moved = local != base;
        let remote_moved = remote != base;
        match (local_moved, remote_moved) {
            (false, false) => FieldState::Clean,
            (true, false) => FieldState::LocalDiverge,
            (false, true) => FieldState::RemoteDiverge,
            (true, true) if local == remote => FieldState::Diverged,
            (true, true) => FieldState::Conflicted,
        }
    }

    fn tracked(field: &str) -> bool {
        field != COL_ID && !SERVER_OWNED_COLUMNS.contains(&field)
    }

    fn pick(names: &[String], source: &Record) -> Vec<(String, FieldValue)> {
        names
            .iter()
            .filter_map(|name| source.get(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }

    fn describe(
        names: &[String],
        base: &Record,
        local: &Record,
        remote: &Record,
    ) -> Vec<FieldConflict> {
        names
            .iter()
            .map(|name| FieldConflict {
                field: name.clone(),
                base: base.get(name).cloned(),
                local: local.get(name).cloned(),
                remote: remote.get(name).cloned(),
            })
            .collect()
    }
}
