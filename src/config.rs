//! 应用配置模块

use crate::error::MirrorError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析配置文件 \"{}\": {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置项 \"{0}\" 不能为空")]
    Empty(&'static str),

    #[error("无法根据配置生成 URL: scheme={scheme}, hostUrl={host_url}, hostPath={host_path}: {source}")]
    BaseUrl {
        scheme: String,
        host_url: String,
        host_path: String,
        #[source]
        source: MirrorError,
    },
}

/// 镜像配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// "http" 或 "https"
    pub scheme: String,
    pub host_url: String,
    pub host_path: String,
    pub output_dir: PathBuf,
    /// 必须已存在且可写
    pub log_dir: PathBuf,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 保留的轮转日志文件数
    #[serde(default = "default_log_backups")]
    pub log_backups: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_backups() -> usize {
    17 // 每周轮转，约 4 个月
}

impl MirrorConfig {
    /// 从 JSON 配置文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// 只检查必填项存在，不做其他校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("scheme", self.scheme.as_str()),
            ("hostUrl", self.host_url.as_str()),
            ("hostPath", self.host_path.as_str()),
            ("outputDir", self.output_dir.to_str().unwrap_or("?")),
            ("logDir", self.log_dir.to_str().unwrap_or("?")),
        ];

        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some(&(name, _)) => Err(ConfigError::Empty(name)),
            None => Ok(()),
        }
    }

    /// 拼接根目录 URL
    ///
    /// hostPath 必须以 `/` 结尾，否则后续的 URL join 会丢掉最后一级目录。
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let fail = |source: MirrorError| ConfigError::BaseUrl {
            scheme: self.scheme.clone(),
            host_url: self.host_url.clone(),
            host_path: self.host_path.clone(),
            source,
        };

        let scheme = self.scheme.trim().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(fail(MirrorError::UnsupportedScheme(self.scheme.clone())));
        }

        let mut path = self.host_path.trim().to_string();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !path.ends_with('/') {
            path.push('/');
        }

        let raw = format!("{}://{}{}", scheme, self.host_url.trim().trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| {
            fail(MirrorError::InvalidUrl {
                url: raw.clone(),
                reason: e.to_string(),
            })
        })
    }
}
