//! 落盘：跨 episode 失败列表、轨迹记录、工作目录清理
//!
//! 失败列表是单个 JSON 数组文件，写入为整文件「读-追加-写」，假定同一时刻只有一个写者。

use std::path::{Path, PathBuf};

use serde::Serialize;

/// 跨 episode 的失败路径列表（只追加）
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取已有条目；文件不存在、损坏或不是数组时视为空
    pub fn load(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|data| serde_json::from_str::<serde_json::Value>(&data).ok())
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// 追加一条路径并整体写回；父目录不存在时自动创建
    pub fn append(&self, episode_path: &str) -> anyhow::Result<()> {
        let mut entries = self.load();
        entries.push(serde_json::Value::String(episode_path.to_string()));
        save_json(&self.path, &entries)?;
        tracing::info!(path = %self.path.display(), entry = episode_path, "failure list updated");
        Ok(())
    }
}

/// 以 pretty JSON 写文件；父目录不存在时自动创建
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// 清空目录内容（目录本身保留）；目录不存在时什么也不做
pub fn clear_folder(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(path)? {
        let p = entry?.path();
        if p.is_dir() {
            std::fs::remove_dir_all(&p)?;
        } else {
            std::fs::remove_file(&p)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_failure_log_appends_preserving_existing() {
        let dir = TempDir::new().unwrap();
        let log = FailureLog::new(dir.path().join("nested/failures.json"));
        assert!(log.load().is_empty());

        log.append("data/a").unwrap();
        log.append("data/b").unwrap();

        let entries = log.load();
        assert_eq!(entries, vec![serde_json::json!("data/a"), serde_json::json!("data/b")]);
    }

    #[test]
    fn test_failure_log_recovers_from_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.json");
        std::fs::write(&path, r#"{"not": "a list"}"#).unwrap();
        let log = FailureLog::new(&path);
        log.append("data/c").unwrap();
        assert_eq!(log.load().len(), 1);
    }

    #[test]
    fn test_clear_folder_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let episode = dir.path().join("episode");
        std::fs::create_dir_all(episode.join("metadata")).unwrap();
        std::fs::write(episode.join("0_init_observe.png"), b"png").unwrap();
        std::fs::write(episode.join("metadata/0.json"), b"{}").unwrap();

        clear_folder(&episode).unwrap();

        assert!(episode.exists());
        assert_eq!(std::fs::read_dir(&episode).unwrap().count(), 0);
        clear_folder(&dir.path().join("missing")).unwrap();
    }
}
