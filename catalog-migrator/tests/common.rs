#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use catalog_migrator::{
    primitives::filesystem::{FileSystem, LocalFileSystem},
    source::{FileSystemMediaSource, LegacyCategorySource, LegacyProductSource, MediaSource},
    test_utils::{test_config, MockHttpClient},
    MigrationConfig, MigrationEngine,
};
use tempfile::TempDir;

/// A scratch directory holding the mapping files, plus the scripted target API.
pub struct Workspace {
    pub dir: TempDir,
    pub mock: Arc<MockHttpClient>,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            mock: Arc::new(MockHttpClient::new()),
        }
    }

    pub fn filesystem(&self) -> Arc<dyn FileSystem> {
        Arc::new(LocalFileSystem::new(Some(self.dir.path().to_path_buf())))
    }

    pub fn config(&self) -> MigrationConfig {
        test_config()
    }

    pub fn engine(
        &self,
        config: MigrationConfig,
        categories: Arc<dyn LegacyCategorySource>,
        products: Option<Arc<dyn LegacyProductSource>>,
    ) -> Arc<MigrationEngine> {
        self.build(config, categories, products, None)
    }

    /// Like `engine`, reading pictures from `pictures/` inside the workspace.
    pub fn engine_with_media(
        &self,
        config: MigrationConfig,
        categories: Arc<dyn LegacyCategorySource>,
        products: Option<Arc<dyn LegacyProductSource>>,
    ) -> Arc<MigrationEngine> {
        let media: Arc<dyn MediaSource> =
            Arc::new(FileSystemMediaSource::new(self.filesystem(), "pictures"));
        self.build(config, categories, products, Some(media))
    }

    fn build(
        &self,
        config: MigrationConfig,
        categories: Arc<dyn LegacyCategorySource>,
        products: Option<Arc<dyn LegacyProductSource>>,
        media: Option<Arc<dyn MediaSource>>,
    ) -> Arc<MigrationEngine> {
        MigrationEngine::new(
            config,
            categories,
            products,
            media,
            self.mock.clone(),
            self.filesystem(),
        )
        .expect("valid config")
    }

    pub fn path(&self, relative: &str) -> std::path::PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }

    pub fn read_mapping(&self, relative: &str) -> BTreeMap<String, String> {
        read_json(&self.path(relative))
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let raw = std::fs::read_to_string(path).expect("file exists");
    serde_json::from_str(&raw).expect("valid json")
}
