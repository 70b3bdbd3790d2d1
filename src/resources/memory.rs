use std::collections::BTreeMap;

use super::ResourceStore;

/// In-process resource table.
///
/// Entries registered through [`MemoryStore::insert_unreadable`] are listed but have
/// no content, mirroring packaged resources whose stream cannot be opened.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl AsRef<[u8]>) {
        self.entries
            .insert(name.into(), Some(content.as_ref().to_vec()));
    }

    pub fn insert_unreadable(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), None);
    }

    pub fn with(mut self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceStore for MemoryStore {
    fn list_resource_names(&self, prefix: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn read_resource(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.get(name).cloned().flatten()
    }
}
