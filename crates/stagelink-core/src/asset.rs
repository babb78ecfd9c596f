//! Selectable stage sources and file-name based identity.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A stage the remote host can be asked to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Display name.
    pub name: String,
    /// Location handed to the host in `openStageRequest`.
    pub url: String,
    /// Camera prims the stage exposes, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cameras: Vec<String>,
}

impl Asset {
    /// Create an asset without cameras.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            cameras: Vec::new(),
        }
    }

    /// Attach camera prim paths.
    #[must_use]
    pub fn with_cameras<I>(mut self, cameras: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.cameras = cameras.into_iter().map(Into::into).collect();
        self
    }

    /// Terminal file-name component of the url; this is the asset's identity.
    #[must_use]
    pub fn file_name(&self) -> &str {
        file_name(&self.url)
    }

    /// Whether the asset exposes the given camera prim.
    #[must_use]
    pub fn has_camera(&self, path: &str) -> bool {
        self.cameras.iter().any(|c| c == path)
    }
}

/// Last component of a path, splitting on both `/` and `\`.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Ordered asset list with exactly one selected entry.
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    assets: Vec<Asset>,
    selected: usize,
}

impl AssetCatalog {
    /// Build a catalog selecting the first asset.
    ///
    /// # Errors
    /// Returns error if the list is empty.
    pub fn new(assets: Vec<Asset>) -> Result<Self, ConfigError> {
        if assets.is_empty() {
            return Err(ConfigError::NoAssets);
        }
        Ok(Self {
            assets,
            selected: 0,
        })
    }

    /// All assets, in configuration order.
    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// The currently selected asset.
    #[must_use]
    pub fn selected(&self) -> &Asset {
        &self.assets[self.selected]
    }

    /// Index of the currently selected asset.
    #[must_use]
    pub const fn selected_index(&self) -> usize {
        self.selected
    }

    /// Select by index. Returns false if out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.assets.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Index of the first asset with the given display name.
    #[must_use]
    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.assets.iter().position(|a| a.name == name)
    }

    /// Resolve a host-reported url to the first asset sharing its file name.
    ///
    /// An empty url never resolves.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<usize> {
        if url.is_empty() {
            return None;
        }
        let wanted = file_name(url);
        self.assets.iter().position(|a| a.file_name() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AssetCatalog {
        AssetCatalog::new(vec![
            Asset::new("A", "x/a.usd"),
            Asset::new("B", "y/b.usd"),
            Asset::new("A2", r"C:\stages\a.usd"),
        ])
        .unwrap()
    }

    #[test]
    fn test_file_name_handles_both_separators() {
        assert_eq!(file_name("x/y/z.usd"), "z.usd");
        assert_eq!(file_name(r"C:\x\z.usd"), "z.usd");
        assert_eq!(file_name("z.usd"), "z.usd");
        assert_eq!(file_name("a/b\\c.usd"), "c.usd");
    }

    #[test]
    fn test_resolve_by_file_name_returns_first_match() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("z/a.usd"), Some(0));
        assert_eq!(catalog.resolve(r"D:\other\b.usd"), Some(1));
    }

    #[test]
    fn test_resolve_misses() {
        let catalog = catalog();
        assert_eq!(catalog.resolve(""), None);
        assert_eq!(catalog.resolve("x/c.usd"), None);
        // Directory component alone is not identity.
        assert_eq!(catalog.resolve("x/"), None);
    }

    #[test]
    fn test_resolve_is_independent_of_unrelated_order() {
        let reordered = AssetCatalog::new(vec![
            Asset::new("B", "y/b.usd"),
            Asset::new("A", "x/a.usd"),
        ])
        .unwrap();
        let a = reordered.resolve("q/a.usd").map(|i| &reordered.assets()[i].name);
        assert_eq!(a.map(String::as_str), Some("A"));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            AssetCatalog::new(Vec::new()),
            Err(ConfigError::NoAssets)
        ));
    }

    #[test]
    fn test_select_and_cameras() {
        let mut catalog = AssetCatalog::new(vec![
            Asset::new("A", "a.usd"),
            Asset::new("B", "b.usd").with_cameras(["/World/Cam"]),
        ])
        .unwrap();
        assert!(!catalog.select(5));
        assert!(catalog.select(1));
        assert!(catalog.selected().has_camera("/World/Cam"));
        assert_eq!(catalog.position_by_name("A"), Some(0));
    }
}
