pub mod http;
pub mod local;

use crate::error::MirrorResult;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use std::path::Path;

pub use http::HttpSource;
pub use local::{create_output_dir, has_local_copy, local_file_info, LocalFileInfo};

/// 一次页面请求的结果
#[derive(Debug, Clone)]
pub struct RemotePage {
    /// 跟随重定向之后实际响应的 URL
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// 元数据探测得到的响应头（原始文本，未解析）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeHeaders {
    pub content_length: Option<String>,
    pub last_modified: Option<String>,
}

/// 远程数据源抽象接口
///
/// 所有调用都是顺序执行的，实现不需要考虑并发。
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// 获取一个目录列表页面
    async fn fetch_page(&self, url: &Url) -> MirrorResult<RemotePage>;

    /// 只读取响应头的 GET 请求，用于比较文件大小和修改时间
    async fn probe(&self, url: &Url) -> MirrorResult<ProbeHeaders>;

    /// 下载文件并覆盖 target，返回写入的字节数
    async fn download(&self, url: &Url, target: &Path) -> MirrorResult<u64>;

    /// 获取数据源名称（用于日志）
    fn name(&self) -> &str;
}
