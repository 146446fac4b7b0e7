//! 错误类型

use std::path::PathBuf;

/// 镜像过程中的错误
///
/// 由调用方决定是否致命：根目录列表失败会终止整个运行，
/// 单个子目录或文件的失败只记录日志并跳过。
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("URL \"{url}\" 返回的内容类型 \"{content_type}\" 不是 text/html，无法解析")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("HTML 数据中没有可用的目录表格")]
    NoTableFound,

    #[error("无法打开 URL \"{url}\": {reason}")]
    RemoteUnreachable { url: String, reason: String },

    #[error("URL \"{url}\" 返回 HTTP 状态 {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("无法获取目标文件 \"{}\" 的大小或 ctime: {source}", path.display())]
    LocalMetadataUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法获取源文件 \"{url}\" 的大小或修改时间: {reason}")]
    RemoteMetadataUnavailable { url: String, reason: String },

    #[error("不支持的 URL 协议 \"{0}\"")]
    UnsupportedScheme(String),

    #[error("无效的 URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("IO 错误 \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unreachable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteUnreachable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;
