//! Discovery of packaged SQL scripts.
//!
//! Scripts live in a [`ResourceStore`] under dotted names such as
//! `App.Schema.Tables.Users.sql`. Discovery narrows a store to one namespace and
//! produces [`ScriptResource`]s named relative to it (`Tables.Users`). It imposes
//! no order; that is the selector's job.

pub mod directory;
pub mod embedded;
pub mod memory;

pub use directory::DirectoryStore;
pub use embedded::EmbeddedStore;
pub use memory::MemoryStore;

use serde::Serialize;
use tracing::debug;

use crate::constants::{NAMESPACE_SEPARATOR, SCRIPT_EXTENSION};

/// A discovered script, named relative to its namespace and without extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptResource {
    pub name: String,
    pub content: String,
}

impl ScriptResource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Read-only access to packaged resources addressed by dotted names.
pub trait ResourceStore: Send + Sync {
    /// Names of all resources starting with `prefix`.
    fn list_resource_names(&self, prefix: &str) -> Vec<String>;

    /// Raw bytes of a resource, or `None` when it has no retrievable content.
    fn read_resource(&self, name: &str) -> Option<Vec<u8>>;
}

/// Collect every `.sql` resource below `namespace`.
///
/// Resources without content and names that do not carry the script extension are
/// skipped silently.
pub fn discover_scripts(store: &dyn ResourceStore, namespace: &str) -> Vec<ScriptResource> {
    let scripts: Vec<ScriptResource> = store
        .list_resource_names(namespace)
        .into_iter()
        .filter(|name| name.starts_with(namespace))
        .filter_map(|name| load_script(store, namespace, &name))
        .collect();

    debug!(
        "Discovered {} script(s) under namespace '{}'",
        scripts.len(),
        namespace
    );

    scripts
}

fn load_script(store: &dyn ResourceStore, namespace: &str, resource: &str) -> Option<ScriptResource> {
    let stem = strip_script_extension(resource)?;
    let name = stem[namespace.len().min(stem.len())..].trim_start_matches(NAMESPACE_SEPARATOR);

    if name.is_empty() {
        debug!("Ignoring resource without a script name: {}", resource);
        return None;
    }

    let Some(bytes) = store.read_resource(resource) else {
        debug!("Ignoring resource with no content: {}", resource);
        return None;
    };

    Some(ScriptResource::new(name, decode_content(&bytes)))
}

/// Read an ad-hoc script by convention: `{namespace}.{name}.sql`.
pub fn read_test_script(store: &dyn ResourceStore, namespace: &str, name: &str) -> Option<String> {
    let resource = test_script_resource_name(namespace, name);
    store.read_resource(&resource).map(|bytes| decode_content(&bytes))
}

pub fn test_script_resource_name(namespace: &str, name: &str) -> String {
    format!(
        "{}{}{}{}{}",
        namespace, NAMESPACE_SEPARATOR, name, NAMESPACE_SEPARATOR, SCRIPT_EXTENSION
    )
}

/// Strip a case-insensitive `.sql` extension, returning `None` for other resources.
pub fn strip_script_extension(name: &str) -> Option<&str> {
    let (stem, extension) = name.rsplit_once(NAMESPACE_SEPARATOR)?;
    extension
        .eq_ignore_ascii_case(SCRIPT_EXTENSION)
        .then_some(stem)
}

/// Decode resource bytes as UTF-8 text, dropping a leading byte-order mark.
pub fn decode_content(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&*text).to_string()
}

/// Convert a `/`-separated relative path into a dotted resource name under `root`.
pub(crate) fn dotted_name(root: &str, relative_path: &str) -> String {
    let dotted = relative_path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".");

    if root.is_empty() {
        dotted
    } else {
        format!("{}{}{}", root, NAMESPACE_SEPARATOR, dotted)
    }
}
