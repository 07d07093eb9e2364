//! 字段布局缓存
//!
//! 键为规范化 URL（去掉查询串与片段），值为抽取时形态的字段列表；整条覆盖，从不局部更新。
//! 持久化为单个 JSON 文件，写入先落临时文件再 rename，保证存储边界上的原子替换。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use url::Url;

use crate::form::field::FieldDescriptor;

/// 规范化 URL：origin + path，去掉查询串；无法解析时原样返回
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// 规范化 URL -> 字段列表
#[derive(Debug, Default)]
pub struct FieldCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, Vec<FieldDescriptor>>>,
}

impl FieldCache {
    /// 仅内存缓存
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 从 JSON 文件加载；文件不存在或损坏时从空缓存开始
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<HashMap<String, Vec<FieldDescriptor>>>(&data) {
                Ok(map) => {
                    tracing::info!(forms = map.len(), path = %path.display(), "loaded field cache");
                    map
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "field cache unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, url: &str) -> Option<Vec<FieldDescriptor>> {
        let key = normalize_url(url);
        self.entries.read().ok()?.get(&key).cloned()
    }

    /// 整条写入（覆盖同键旧值）并落盘
    pub fn put(&self, url: &str, fields: &[FieldDescriptor]) {
        let key = normalize_url(url);
        let shaped: Vec<FieldDescriptor> = fields.iter().map(|f| f.extraction_shape()).collect();
        let snapshot = match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(key, shaped);
                entries.clone()
            }
            Err(_) => return,
        };
        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &snapshot) {
                tracing::error!(error = %e, path = %path.display(), "failed to save field cache");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn persist(path: &Path, entries: &HashMap<String, Vec<FieldDescriptor>>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::field::{FieldType, ValueSource};

    #[test]
    fn test_normalize_strips_query() {
        assert_eq!(
            normalize_url("https://f.example/x?id=1"),
            normalize_url("https://f.example/x?id=2")
        );
        assert_eq!(normalize_url("https://f.example/x?id=1#top"), "https://f.example/x");
        assert_ne!(normalize_url("https://f.example/x"), normalize_url("https://f.example/y"));
        assert_eq!(normalize_url("not a url"), "not a url");
    }

    #[test]
    fn test_put_overwrites_whole_entry() {
        let cache = FieldCache::in_memory();
        cache.put(
            "https://f.example/x?id=1",
            &[FieldDescriptor::new("#a", "A", FieldType::Text)],
        );
        cache.put(
            "https://f.example/x?id=2",
            &[FieldDescriptor::new("#b", "B", FieldType::Email)],
        );
        let fields = cache.get("https://f.example/x").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].selector, "#b");
    }

    #[test]
    fn test_persist_and_reload_without_runtime_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form_cache.json");

        let mut phone = FieldDescriptor::new("#phone", "Phone", FieldType::Tel);
        phone.resolved_value = Some("12345".into());
        phone.value_source = Some(ValueSource::Human);
        FieldCache::open(&path).put("https://f.example/x?id=9", &[phone]);

        let reloaded = FieldCache::open(&path);
        let fields = reloaded.get("https://f.example/x").unwrap();
        assert_eq!(fields[0].label, "Phone");
        assert!(fields[0].resolved_value.is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
