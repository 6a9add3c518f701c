use mdcompare_common::{DiffAlgorithm, LineDiff};
use similar::{Algorithm, DiffOp, TextDiff};

/// Produces the differing lines between two canonical bodies
pub trait LineDiffer: Send + Sync {
    fn diff_lines(&self, source: &str, target: &str) -> Vec<LineDiff>;
}

/// Index-by-index line comparison.
///
/// Lines are compared exactly (case and whitespace sensitive). An inserted
/// or deleted line shifts every following line, so each of them is reported
/// as changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalDiffer;

impl LineDiffer for PositionalDiffer {
    fn diff_lines(&self, source: &str, target: &str) -> Vec<LineDiff> {
        let source_lines: Vec<&str> = source.split('\n').collect();
        let target_lines: Vec<&str> = target.split('\n').collect();
        let len = source_lines.len().max(target_lines.len());

        (0..len)
            .filter_map(|i| {
                let left = source_lines.get(i).copied();
                let right = target_lines.get(i).copied();
                (left != right).then(|| LineDiff::new(i + 1, left, right))
            })
            .collect()
    }
}

/// Myers-aligned line comparison.
///
/// Replaced and deleted lines are reported at their source line number,
/// inserted lines at their target line number.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignedDiffer;

impl LineDiffer for AlignedDiffer {
    fn diff_lines(&self, source: &str, target: &str) -> Vec<LineDiff> {
        let source_lines: Vec<&str> = source.split('\n').collect();
        let target_lines: Vec<&str> = target.split('\n').collect();
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_slices(&source_lines, &target_lines);
        let mut result = Vec::new();

        for op in diff.ops() {
            match *op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for i in old_index..old_index + old_len {
                        result.push(LineDiff::new(i + 1, Some(source_lines[i]), None));
                    }
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    for i in new_index..new_index + new_len {
                        result.push(LineDiff::new(i + 1, None, Some(target_lines[i])));
                    }
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    for offset in 0..old_len.max(new_len) {
                        let left = (offset < old_len).then(|| source_lines[old_index + offset]);
                        let right = (offset < new_len).then(|| target_lines[new_index + offset]);
                        let line = if offset < old_len {
                            old_index + offset + 1
                        } else {
                            new_index + offset + 1
                        };
                        result.push(LineDiff::new(line, left, right));
                    }
                }
            }
        }

        result
    }
}

/// Build the differ selected by configuration
pub fn differ_for(algorithm: DiffAlgorithm) -> Box<dyn LineDiffer> {
    match algorithm {
        DiffAlgorithm::Positional => Box::new(PositionalDiffer),
        DiffAlgorithm::Aligned => Box::new(AlignedDiffer),
    }
}

/// Positional diff of two bodies
pub fn diff_lines(source: &str, target: &str) -> Vec<LineDiff> {
    PositionalDiffer.diff_lines(source, target)
}
