//! Scaffold -> accession grouping built during indexing

use std::collections::HashMap;

/// Accessions grouped by the scaffold they align to, in file-scan order.
///
/// Callers must not rely on the order in which scaffolds are iterated.
#[derive(Debug, Clone, Default)]
pub struct ScaffoldGroups {
    scaffolds: Vec<String>,
    groups: HashMap<String, Vec<String>>,
}

impl ScaffoldGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scaffold: &str, accession: &str) {
        match self.groups.get_mut(scaffold) {
            Some(accessions) => accessions.push(accession.to_string()),
            None => {
                self.scaffolds.push(scaffold.to_string());
                self.groups.insert(scaffold.to_string(), vec![accession.to_string()]);
            }
        }
    }

    /// Drop `accession` from `scaffold`; empty groups are removed
    pub fn remove(&mut self, scaffold: &str, accession: &str) -> bool {
        let Some(accessions) = self.groups.get_mut(scaffold) else {
            return false;
        };
        let before = accessions.len();
        accessions.retain(|a| a != accession);
        let removed = accessions.len() != before;

        if accessions.is_empty() {
            self.groups.remove(scaffold);
            self.scaffolds.retain(|s| s != scaffold);
        }
        removed
    }

    pub fn get(&self, scaffold: &str) -> Option<&[String]> {
        self.groups.get(scaffold).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.scaffolds
            .iter()
            .filter_map(|s| self.groups.get(s).map(|accs| (s.as_str(), accs.as_slice())))
    }

    /// Number of scaffolds
    pub fn len(&self) -> usize {
        self.scaffolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaffolds.is_empty()
    }

    pub fn total_accessions(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
