use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use super::{ResourceStore, dotted_name};

/// Resources bundled as a directory tree on disk.
///
/// `root/Tables/Users.sql` is exposed as `{namespace}.Tables.Users.sql`. The tree is
/// rescanned on every call so edits between test runs are picked up.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    namespace: String,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespace: String::new(),
        }
    }

    /// Mount the directory under a namespace prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn index(&self) -> BTreeMap<String, PathBuf> {
        let mut index = BTreeMap::new();

        if !self.root.is_dir() {
            return index;
        }

        let root = Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/**/*", root.trim_end_matches('/'));
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };

        let paths = match glob::glob_with(&pattern, options) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Invalid resource directory pattern {}: {}", pattern, e);
                return index;
            }
        };

        for path in paths.filter_map(|entry| entry.ok()) {
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let name = dotted_name(&self.namespace, &relative.to_string_lossy());
            index.insert(name, path);
        }

        index
    }
}

impl ResourceStore for DirectoryStore {
    fn list_resource_names(&self, prefix: &str) -> Vec<String> {
        self.index()
            .into_keys()
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    fn read_resource(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.index().remove(name)?;
        std::fs::read(path).ok()
    }
}
