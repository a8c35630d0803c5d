use loro::{ExportMode, LoroDoc, VersionVector};

/// Text container holding the document body. Editor bindings on the
/// client attach to the same key.
pub const CONTENT_KEY: &str = "content";

#[derive(Debug)]
pub enum DocError {
    Import(String),
    Export(String),
    BadStateVector(String),
    Edit(String),
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::Import(e) => write!(f, "failed to apply fragment: {}", e),
            DocError::Export(e) => write!(f, "failed to export document state: {}", e),
            DocError::BadStateVector(e) => write!(f, "invalid state vector: {}", e),
            DocError::Edit(e) => write!(f, "failed to edit document: {}", e),
        }
    }
}

impl std::error::Error for DocError {}

/// One room's replicated document.
///
/// Fragment application is commutative and idempotent (Loro queues
/// updates whose causal dependencies have not arrived yet and ignores
/// duplicates), so replicas that have seen the same set of fragments
/// converge to identical content regardless of arrival order. Concurrent
/// insertions at the same position are totally ordered by Loro's
/// (lamport clock, peer id) pair, identically on every replica.
pub struct SyncDoc {
    doc: LoroDoc,
}

impl SyncDoc {
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Create a document rehydrated from previously persisted text.
    pub fn with_seed(seed: &str) -> Self {
        let sync_doc = Self::new();
        if let Err(e) = sync_doc.insert(0, seed) {
            tracing::error!("Failed to seed document: {}", e);
        }
        sync_doc
    }

    /// Merge an incoming update fragment. Malformed fragments fail here
    /// without corrupting the document for subsequent fragments.
    pub fn apply_fragment(&self, fragment: &[u8]) -> Result<(), DocError> {
        self.doc
            .import(fragment)
            .map(|_| ())
            .map_err(|e| DocError::Import(e.to_string()))
    }

    /// Compact summary of everything this replica has incorporated.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.oplog_vv().encode()
    }

    /// The fragments a replica holding `state_vector` is missing. An empty
    /// state vector requests everything.
    ///
    /// Fails when the remote state vector predates compacted history; the
    /// caller falls back to a full snapshot.
    pub fn diff_since(&self, state_vector: &[u8]) -> Result<Vec<u8>, DocError> {
        let vv = if state_vector.is_empty() {
            VersionVector::default()
        } else {
            VersionVector::decode(state_vector)
                .map_err(|e| DocError::BadStateVector(e.to_string()))?
        };
        self.doc
            .export(ExportMode::updates(&vv))
            .map_err(|e| DocError::Export(e.to_string()))
    }

    /// Full snapshot export, importable by a fresh replica.
    pub fn snapshot(&self) -> Result<Vec<u8>, DocError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| DocError::Export(e.to_string()))
    }

    /// Materialize the current text. Used by the persistence bridge only,
    /// never by the merge protocol.
    pub fn content(&self) -> String {
        self.doc.get_text(CONTENT_KEY).to_string()
    }

    /// Apply a local edit. Only the seed path and tests edit server-side;
    /// everything else arrives as fragments.
    pub fn insert(&self, pos: usize, text: &str) -> Result<(), DocError> {
        self.doc
            .get_text(CONTENT_KEY)
            .insert(pos, text)
            .map_err(|e| DocError::Edit(e.to_string()))?;
        self.doc.commit();
        Ok(())
    }

    /// Compact the update history down to current state plus the tombstone
    /// metadata needed for future merges. Called while a room has no
    /// connections, so no live replica depends on the discarded history;
    /// replicas holding pre-compaction state vectors receive a full
    /// snapshot instead of a diff.
    pub fn compact(&mut self) -> Result<(), DocError> {
        let state = self
            .doc
            .export(ExportMode::state_only(None))
            .map_err(|e| DocError::Export(e.to_string()))?;
        let fresh = LoroDoc::new();
        fresh
            .import(&state)
            .map_err(|e| DocError::Import(e.to_string()))?;
        self.doc = fresh;
        Ok(())
    }
}

impl Default for SyncDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_into(target: &SyncDoc, source: &SyncDoc) {
        let missing = source.diff_since(&target.state_vector()).unwrap();
        target.apply_fragment(&missing).unwrap();
    }

    #[test]
    fn test_seeded_content() {
        let doc = SyncDoc::with_seed("hello");
        assert_eq!(doc.content(), "hello");
    }

    #[test]
    fn test_snapshot_brings_fresh_replica_current() {
        let a = SyncDoc::new();
        a.insert(0, "hello").unwrap();

        let b = SyncDoc::new();
        b.apply_fragment(&a.snapshot().unwrap()).unwrap();
        assert_eq!(b.content(), "hello");
    }

    #[test]
    fn test_idempotent_fragment_application() {
        let a = SyncDoc::new();
        let before = a.state_vector();
        a.insert(0, "hello").unwrap();
        let fragment = a.diff_since(&before).unwrap();

        let b = SyncDoc::new();
        b.apply_fragment(&fragment).unwrap();
        let once = b.content();
        b.apply_fragment(&fragment).unwrap();
        assert_eq!(b.content(), once);
    }

    #[test]
    fn test_out_of_order_fragments_converge() {
        let a = SyncDoc::new();
        let sv0 = a.state_vector();
        a.insert(0, "hello").unwrap();
        let sv1 = a.state_vector();
        a.insert(5, " world").unwrap();

        let first = a.diff_since(&sv0).unwrap();
        let second = a.diff_since(&sv1).unwrap();

        // The later fragment arrives first; Loro holds it pending until
        // its causal dependency shows up.
        let b = SyncDoc::new();
        b.apply_fragment(&second).unwrap();
        b.apply_fragment(&first).unwrap();
        assert_eq!(b.content(), "hello world");
    }

    #[test]
    fn test_concurrent_appends_converge() {
        let a = SyncDoc::new();
        a.insert(0, "hello").unwrap();
        let b = SyncDoc::new();
        sync_into(&b, &a);

        // Both replicas append at the same position before seeing each
        // other's edit.
        let a_before = a.state_vector();
        let b_before = b.state_vector();
        a.insert(5, " world").unwrap();
        b.insert(5, "!").unwrap();

        let from_a = a.diff_since(&a_before).unwrap();
        let from_b = b.diff_since(&b_before).unwrap();
        a.apply_fragment(&from_b).unwrap();
        b.apply_fragment(&from_a).unwrap();

        assert_eq!(a.content(), b.content());
        assert!(a.content().contains(" world"));
        assert!(a.content().contains('!'));
    }

    #[test]
    fn test_diff_since_only_carries_missing_fragments() {
        let a = SyncDoc::new();
        a.insert(0, "hello").unwrap();
        let b = SyncDoc::new();
        sync_into(&b, &a);

        a.insert(5, "!").unwrap();
        sync_into(&b, &a);
        assert_eq!(b.content(), "hello!");

        // Nothing new: the diff merges as a no-op.
        let before = b.content();
        sync_into(&b, &a);
        assert_eq!(b.content(), before);
    }

    #[test]
    fn test_compaction_preserves_content_and_future_merges() {
        let mut a = SyncDoc::new();
        a.insert(0, "hello").unwrap();
        a.insert(5, " world").unwrap();
        a.compact().unwrap();
        assert_eq!(a.content(), "hello world");

        // A replica joining after compaction still syncs from a snapshot,
        // and its subsequent edits still merge back.
        let b = SyncDoc::new();
        b.apply_fragment(&a.snapshot().unwrap()).unwrap();
        assert_eq!(b.content(), "hello world");

        let b_before = b.state_vector();
        b.insert(11, "!").unwrap();
        a.apply_fragment(&b.diff_since(&b_before).unwrap()).unwrap();
        assert_eq!(a.content(), "hello world!");
    }
}
