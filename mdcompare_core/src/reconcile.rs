use crate::fetcher::{DetailFetcher, OrgConnection};
use crate::identity::{canonical_body, record_key};
use crate::line_diff::{differ_for, LineDiffer, PositionalDiffer};
use futures::future::try_join;
use mdcompare_common::{
    ChangedRecord, CompareResult, DiffAlgorithm, FetchError, Record, RecordEntry, RecordKind,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Records of one side indexed by comparison key, in first-seen order.
///
/// A repeated key replaces the earlier record but keeps its position.
struct KeyedRecords {
    entries: Vec<(String, Option<Record>)>,
    positions: HashMap<String, usize>,
}

impl KeyedRecords {
    fn build(records: Vec<Record>, kind: &RecordKind, side: &str) -> Self {
        let mut entries: Vec<(String, Option<Record>)> = Vec::with_capacity(records.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());

        for record in records {
            let key = record_key(&record, kind);
            match positions.get(&key) {
                Some(&position) => {
                    warn!("Duplicate {} key {:?} on {} side, keeping the last record", kind, key, side);
                    entries[position].1 = Some(record);
                }
                None => {
                    positions.insert(key.clone(), entries.len());
                    entries.push((key, Some(record)));
                }
            }
        }

        Self { entries, positions }
    }

    fn take(&mut self, key: &str) -> Option<Record> {
        let position = *self.positions.get(key)?;
        self.entries[position].1.take()
    }
}

/// Classifies two record collections into unchanged, added, removed and changed
pub struct ReconcileEngine {
    differ: Box<dyn LineDiffer>,
}

impl ReconcileEngine {
    pub fn new() -> Self {
        Self {
            differ: Box::new(PositionalDiffer),
        }
    }

    pub fn with_algorithm(algorithm: DiffAlgorithm) -> Self {
        Self {
            differ: differ_for(algorithm),
        }
    }

    pub fn with_differ(differ: Box<dyn LineDiffer>) -> Self {
        Self { differ }
    }

    /// Reconcile `source` against `target` for one record kind.
    ///
    /// Source-only keys are `added`, target-only keys are `removed`. Keys on
    /// both sides are `unchanged` when their canonical bodies are equal and
    /// `changed` otherwise. Output follows source order, with removed records
    /// in target order.
    pub fn reconcile(
        &self,
        source: Vec<Record>,
        target: Vec<Record>,
        kind: &RecordKind,
    ) -> CompareResult {
        info!(
            "Comparing {} source records with {} target records for type {}",
            source.len(),
            target.len(),
            kind
        );

        let source_map = KeyedRecords::build(source, kind, "source");
        let mut target_map = KeyedRecords::build(target, kind, "target");
        let mut result = CompareResult::new();

        for (name, source_record) in source_map.entries {
            let Some(source_record) = source_record else {
                continue;
            };

            let Some(target_record) = target_map.take(&name) else {
                debug!("Added: {}", name);
                result.added.push(entry(name, kind, source_record));
                continue;
            };

            let source_body = canonical_body(&source_record, kind);
            let target_body = canonical_body(&target_record, kind);

            if source_body == target_body {
                result.unchanged.push(entry(name, kind, source_record));
            } else {
                debug!("Changed: {}", name);
                let differences = self.differ.diff_lines(&source_body, &target_body);
                result.changed.push(ChangedRecord {
                    id: source_record.id().to_string(),
                    name,
                    kind: kind.clone(),
                    source: source_record,
                    target: target_record,
                    differences,
                });
            }
        }

        // Whatever was not taken by the source pass exists only in the target.
        for (name, target_record) in target_map.entries {
            if let Some(target_record) = target_record {
                debug!("Removed: {}", name);
                result.removed.push(entry(name, kind, target_record));
            }
        }

        let summary = result.summary();
        info!(
            "{}: {} unchanged, {} added, {} removed, {} changed",
            kind, summary.unchanged, summary.added, summary.removed, summary.changed
        );

        result
    }
}

impl Default for ReconcileEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn entry(name: String, kind: &RecordKind, record: Record) -> RecordEntry {
    RecordEntry {
        id: record.id().to_string(),
        name,
        kind: kind.clone(),
        record,
    }
}

/// Reconcile with the positional line differ
pub fn reconcile(source: Vec<Record>, target: Vec<Record>, kind: &RecordKind) -> CompareResult {
    ReconcileEngine::new().reconcile(source, target, kind)
}

/// Hydrate both sides concurrently, then reconcile them.
///
/// Fetch failures on either side abort before any reconciliation happens.
pub async fn compare_org_kind(
    fetcher: &DetailFetcher,
    engine: &ReconcileEngine,
    source: &OrgConnection,
    target: &OrgConnection,
    kind: &RecordKind,
    source_ids: &[String],
    target_ids: &[String],
) -> Result<CompareResult, FetchError> {
    let (source_records, target_records) = try_join(
        fetcher.fetch_details(source, source_ids, kind),
        fetcher.fetch_details(target, target_ids, kind),
    )
    .await?;

    Ok(engine.reconcile(source_records, target_records, kind))
}
