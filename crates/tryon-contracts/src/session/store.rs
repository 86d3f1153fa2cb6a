use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

/// String-valued key/value file, the on-disk stand-in for browser storage.
///
/// Every operation re-reads the file so separate instances pointed at the
/// same path observe each other's writes; the last write wins per key.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    path: PathBuf,
}

impl KeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        read_json_object(&self.path)?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(key).and_then(Value::as_str) == Some(value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(());
        };
        if on_disk.remove(key).is_none() {
            return Ok(());
        }
        write_json_object(&self.path, &on_disk)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::KeyValueStore;

    #[test]
    fn set_get_remove() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = KeyValueStore::new(temp.path().join("session.json"));
        assert_eq!(store.get("token"), None);

        store.set("token", "abc")?;
        assert_eq!(store.get("token").as_deref(), Some("abc"));

        store.remove("token")?;
        assert_eq!(store.get("token"), None);
        Ok(())
    }

    #[test]
    fn instances_share_the_file_and_keep_other_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.json");
        let store_a = KeyValueStore::new(&path);
        let store_b = KeyValueStore::new(&path);

        store_a.set("token", "t-1")?;
        store_b.set("api_key", "k-1")?;
        store_a.set("token", "t-2")?;

        let reloaded = KeyValueStore::new(path);
        assert_eq!(reloaded.get("token").as_deref(), Some("t-2"));
        assert_eq!(reloaded.get("api_key").as_deref(), Some("k-1"));
        Ok(())
    }

    #[test]
    fn unreadable_file_behaves_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.json");
        std::fs::write(&path, "{not json")?;
        let store = KeyValueStore::new(&path);
        assert_eq!(store.get("token"), None);
        store.remove("token")?;

        store.set("token", "fresh")?;
        assert_eq!(store.get("token").as_deref(), Some("fresh"));
        Ok(())
    }

    #[test]
    fn non_string_values_are_ignored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.json");
        std::fs::write(&path, r#"{"token": 42, "api_key": "k"}"#)?;
        let store = KeyValueStore::new(&path);
        assert_eq!(store.get("token"), None);
        assert_eq!(store.get("api_key").as_deref(), Some("k"));
        Ok(())
    }
}
