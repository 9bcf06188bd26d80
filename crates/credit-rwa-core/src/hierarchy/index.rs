use std::collections::HashMap;

use crate::issues::{IssueCode, IssueLog};

/// Dense arena slots for a table of referenced records.
///
/// The first record carrying a reference owns the slot; later duplicates are
/// reported and left out of the arena.
#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    positions: HashMap<String, usize>,
    /// Input position of the record owning each slot.
    pub records: Vec<usize>,
}

impl ReferenceIndex {
    pub fn build<'a>(
        references: impl IntoIterator<Item = &'a str>,
        table: &str,
        issues: &mut IssueLog,
    ) -> Self {
        let mut index = ReferenceIndex::default();
        for (position, reference) in references.into_iter().enumerate() {
            if index.positions.contains_key(reference) {
                issues.error(
                    IssueCode::DuplicateReference,
                    vec![reference.to_string()],
                    format!(
                        "Duplicate {} reference '{}' at row {}; first occurrence kept.",
                        table, reference, position
                    ),
                );
                continue;
            }
            index
                .positions
                .insert(reference.to_string(), index.records.len());
            index.records.push(position);
        }
        index
    }

    pub fn get(&self, reference: &str) -> Option<usize> {
        self.positions.get(reference).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_keep_first() {
        let mut issues = IssueLog::new();
        let index = ReferenceIndex::build(["A", "B", "A", "C"], "counterparty", &mut issues);
        assert_eq!(index.len(), 3);
        assert_eq!(index.records, vec![0, 1, 3]);
        assert_eq!(index.get("C"), Some(2));
        assert_eq!(index.get("Z"), None);
        let issues = issues.into_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::DuplicateReference);
    }
}
