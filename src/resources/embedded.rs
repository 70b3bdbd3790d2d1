use rust_embed::RustEmbed;
use std::marker::PhantomData;

use super::{ResourceStore, dotted_name};

/// Resources compiled into the binary with `rust-embed`.
///
/// ```ignore
/// #[derive(rust_embed::Embed)]
/// #[folder = "sql/"]
/// struct SchemaAssets;
///
/// let store = EmbeddedStore::<SchemaAssets>::new("App.Schema");
/// ```
pub struct EmbeddedStore<E> {
    namespace: String,
    assets: PhantomData<fn() -> E>,
}

impl<E: RustEmbed> EmbeddedStore<E> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            assets: PhantomData,
        }
    }

    fn asset_path(&self, name: &str) -> Option<String> {
        E::iter()
            .find(|path| dotted_name(&self.namespace, path) == name)
            .map(|path| path.into_owned())
    }
}

impl<E: RustEmbed> ResourceStore for EmbeddedStore<E> {
    fn list_resource_names(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = E::iter()
            .map(|path| dotted_name(&self.namespace, &path))
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names
    }

    fn read_resource(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.asset_path(name)?;
        E::get(&path).map(|file| file.data.into_owned())
    }
}
