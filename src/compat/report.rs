use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_REPORT_CHANGES;
use crate::constants::MAX_REPORT_RESOURCES;

/// Entity touched by a compatibility change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl Resource {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: String,
    pub resources: Vec<Resource>,
}

/// Changes applied to one payload, in the order they were first recorded.
///
/// At most [`MAX_REPORT_CHANGES`] change ids and [`MAX_REPORT_RESOURCES`]
/// resources per id are kept; the rest are dropped silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeReport {
    changes: Vec<ReportEntry>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `resource` against `change_id`. Returns false when the entry
    /// was a duplicate or a cap was hit.
    pub fn add(
        &mut self,
        change_id: &str,
        resource: Resource,
    ) -> bool {
        let index = match self.changes.iter().position(|e| e.id == change_id) {
            Some(index) => index,
            None => {
                if self.changes.len() >= MAX_REPORT_CHANGES {
                    return false;
                }
                self.changes.push(ReportEntry {
                    id: change_id.to_string(),
                    resources: Vec::new(),
                });
                self.changes.len() - 1
            }
        };

        let entry = &mut self.changes[index];
        if entry.resources.len() >= MAX_REPORT_RESOURCES || entry.resources.contains(&resource) {
            return false;
        }
        entry.resources.push(resource);
        true
    }

    pub fn get(
        &self,
        change_id: &str,
    ) -> Option<&ReportEntry> {
        self.changes.iter().find(|e| e.id == change_id)
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.changes
    }

    pub fn change_ids(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|e| e.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_seen_order_and_dedupes() {
        let mut report = ChangeReport::new();
        assert!(report.add("P116", Resource::new("plugin", "b")));
        assert!(report.add("C101", Resource::new("vault", "v")));
        assert!(report.add("P116", Resource::new("plugin", "a")));
        assert!(!report.add("P116", Resource::new("plugin", "b")));

        assert_eq!(report.change_ids().collect::<Vec<_>>(), vec!["P116", "C101"]);
        let ids: Vec<_> = report.get("P116").unwrap().resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn caps_are_enforced_silently() {
        let mut report = ChangeReport::new();
        for i in 0..(MAX_REPORT_CHANGES + 10) {
            report.add(&format!("X{i:03}"), Resource::new("plugin", "p"));
        }
        assert_eq!(report.len(), MAX_REPORT_CHANGES);

        let mut report = ChangeReport::new();
        for i in 0..(MAX_REPORT_RESOURCES + 10) {
            report.add("P116", Resource::new("plugin", i.to_string()));
        }
        assert_eq!(report.get("P116").unwrap().resources.len(), MAX_REPORT_RESOURCES);
    }

    #[test]
    fn serializes_as_a_list() {
        let mut report = ChangeReport::new();
        report.add("P116", Resource::new("plugin", "z1"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!([{"id": "P116", "resources": [{"type": "plugin", "id": "z1"}]}]));
    }
}
