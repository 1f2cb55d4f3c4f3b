//! 配置模块，负责从JSON配置文件加载行过滤配置

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认允许的表达式最大长度（字节）
pub const DEFAULT_MAX_EXPRESSION_LEN: usize = 4096;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 单行求值失败（缺失键、除零、非数值）时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// 丢弃出错的行并记录失败，继续处理其余行
    #[default]
    Exclude,
    /// 遇到第一个出错的行即中止整批处理
    Surface,
}

/// 行过滤配置结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub on_error: ErrorPolicy,
    /// 超过该长度的表达式在词法分析之前即被拒绝
    pub max_expression_len: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::default(),
            max_expression_len: DEFAULT_MAX_EXPRESSION_LEN,
        }
    }
}

impl FilterConfig {
    /// 从JSON文件加载配置，缺省字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound { path: path_ref.to_path_buf() });
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        // 解析JSON
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 加载配置，失败时记录警告并回退到默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}，使用默认配置", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_valid_json_config() {
        let file = write_config(r#"{ "on_error": "surface", "max_expression_len": 128 }"#);

        let config = FilterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.on_error, ErrorPolicy::Surface);
        assert_eq!(config.max_expression_len, 128);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let file = write_config(r#"{ "on_error": "exclude" }"#);

        let config = FilterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.on_error, ErrorPolicy::Exclude);
        assert_eq!(config.max_expression_len, DEFAULT_MAX_EXPRESSION_LEN);
    }

    #[test]
    fn test_invalid_json_config() {
        let file = write_config("invalid json");
        let result = FilterConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        // 未知字段视为配置错误
        let file = write_config(r#"{ "on_eror": "surface" }"#);
        assert!(FilterConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = FilterConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
        assert_eq!(FilterConfig::load_or_default("non_existent_file.json"), FilterConfig::default());
    }

    #[test]
    fn test_default_config() {
        let config = FilterConfig::default();
        assert_eq!(config.on_error, ErrorPolicy::Exclude);
        assert_eq!(config.max_expression_len, DEFAULT_MAX_EXPRESSION_LEN);
    }
}
