use crate::error::{MirrorError, MirrorResult};
use crate::storage::{LocalFileInfo, ProbeHeaders};
use chrono::{DateTime, Utc};

/// 远程文件元数据（来自 Content-Length 和 Last-Modified 响应头）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

impl RemoteFileInfo {
    /// 从探测到的响应头解析远程文件信息
    ///
    /// Last-Modified 格式为 `%a, %d %b %Y %H:%M:%S GMT`。
    pub fn from_headers(url: &str, headers: &ProbeHeaders) -> MirrorResult<Self> {
        let unavailable = |reason: String| MirrorError::RemoteMetadataUnavailable {
            url: url.to_string(),
            reason,
        };

        let length = headers
            .content_length
            .as_deref()
            .ok_or_else(|| unavailable("缺少 Content-Length".to_string()))?;
        let size_bytes = length
            .trim()
            .parse::<u64>()
            .map_err(|e| unavailable(format!("Content-Length \"{}\": {}", length, e)))?;

        let modified = headers
            .last_modified
            .as_deref()
            .ok_or_else(|| unavailable("缺少 Last-Modified".to_string()))?;
        let last_modified = DateTime::parse_from_rfc2822(modified.trim())
            .map_err(|e| unavailable(format!("Last-Modified \"{}\": {}", modified, e)))?
            .with_timezone(&Utc);

        Ok(Self {
            size_bytes,
            last_modified,
        })
    }
}

/// 需要重新下载的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// 本地文件不存在
    Missing,
    /// 大小不同或远程文件更新
    Mismatch,
    /// 本地元数据读取失败
    LocalUnavailable,
    /// 远程元数据解析失败
    RemoteUnavailable,
}

/// 单个文件的同步决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// 本地文件已是最新
    Skip,
    Fetch(FetchReason),
}

/// 文件比较器
///
/// 只比较大小和时间，不做内容校验。
#[derive(Debug, Clone, Copy, Default)]
pub struct FileComparator;

impl FileComparator {
    pub fn new() -> Self {
        Self
    }

    /// 大小相同且远程修改时间不晚于本地 ctime 时跳过下载
    pub fn decide(&self, remote: &RemoteFileInfo, local: &LocalFileInfo) -> SyncDecision {
        if remote.size_bytes != local.size_bytes {
            tracing::debug!(
                "文件大小不同 (src={}, dst={})",
                remote.size_bytes,
                local.size_bytes
            );
            return SyncDecision::Fetch(FetchReason::Mismatch);
        }

        if remote.last_modified > local.created_at {
            tracing::debug!(
                "源文件更新 (src_time={}, dst_time={})",
                remote.last_modified,
                local.created_at
            );
            return SyncDecision::Fetch(FetchReason::Mismatch);
        }

        SyncDecision::Skip
    }
}
