use crate::synthesis::types::SynthesizedResource;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("resource {0} is not in the store")]
    NotFound(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owning store for synthesized resources, keyed by id with a name index.
///
/// Names map to the most recently inserted resource carrying that name.
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: DashMap<String, Arc<SynthesizedResource>>,
    by_name: DashMap<String, String>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: SynthesizedResource) -> Arc<SynthesizedResource> {
        let resource = Arc::new(resource);
        self.by_name.insert(resource.name.clone(), resource.id.clone());
        self.resources.insert(resource.id.clone(), resource.clone());
        debug!("Stored resource {} ({})", resource.id, resource.name);
        resource
    }

    pub fn get(&self, id: &str) -> Option<Arc<SynthesizedResource>> {
        self.resources.get(id).map(|entry| entry.value().clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<SynthesizedResource>> {
        let id = self.by_name.get(name).map(|entry| entry.value().clone())?;
        self.get(&id)
    }

    /// All resources, oldest first
    pub fn list(&self) -> Vec<Arc<SynthesizedResource>> {
        let mut resources: Vec<_> = self.resources.iter().map(|entry| entry.value().clone()).collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        resources
    }

    pub fn remove(&self, id: &str) -> Option<Arc<SynthesizedResource>> {
        let (_, resource) = self.resources.remove(id)?;
        self.by_name.remove_if(&resource.name, |_, indexed| indexed == id);
        Some(resource)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Write a resource's rendered source verbatim to `path`
    pub async fn export(&self, id: &str, path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let resource = self.get(id).ok_or_else(|| ExportError::NotFound(id.to_string()))?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ExportError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, resource.source.as_bytes())
            .await
            .map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;

        info!("Exported resource {} to {}", id, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::{ResourceCategory, ResourceRequirement, ResourceSynthesizer};
    use serde_json::json;
    use tempfile::TempDir;

    fn echo_tool(synthesizer: &ResourceSynthesizer) -> SynthesizedResource {
        let requirement = ResourceRequirement::new("echo", ResourceCategory::Tool, "command")
            .with_parameters(json!({ "program": "echo", "args": ["hi"] }));
        synthesizer.synthesize(&requirement).unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let synthesizer = ResourceSynthesizer::new();
        let store = ResourceStore::new();
        let stored = store.insert(echo_tool(&synthesizer));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&stored.id).unwrap().name, "echo");
        assert_eq!(store.find_by_name("echo").unwrap().id, stored.id);
        assert!(store.find_by_name("missing").is_none());
    }

    #[test]
    fn test_name_index_tracks_latest() {
        let synthesizer = ResourceSynthesizer::new();
        let store = ResourceStore::new();
        let first = store.insert(echo_tool(&synthesizer));
        let second = store.insert(echo_tool(&synthesizer));

        assert_eq!(store.find_by_name("echo").unwrap().id, second.id);
        // removing the older one leaves the index alone
        store.remove(&first.id);
        assert_eq!(store.find_by_name("echo").unwrap().id, second.id);
        store.remove(&second.id);
        assert!(store.find_by_name("echo").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_export_writes_source_verbatim() {
        let synthesizer = ResourceSynthesizer::new();
        let store = ResourceStore::new();
        let stored = store.insert(echo_tool(&synthesizer));
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/tools/echo.sh");

        let written = store.export(&stored.id, &target).await.unwrap();
        assert_eq!(written, target);
        let contents = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(contents, stored.source);
    }

    #[tokio::test]
    async fn test_export_unknown_resource() {
        let store = ResourceStore::new();
        let dir = TempDir::new().unwrap();
        let result = store.export("tool-missing", dir.path().join("x.sh")).await;
        assert!(matches!(result, Err(ExportError::NotFound(id)) if id == "tool-missing"));
    }
}
