use crate::error::{MirrorError, MirrorResult};
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::Path;
use tokio::fs;

/// 本地已下载文件的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileInfo {
    pub size_bytes: u64,
    /// Unix 上为 inode 变更时间（ctime），其他平台为创建时间
    pub created_at: DateTime<Utc>,
}

/// 路径上已有非目录的条目
///
/// 不跟随符号链接，所以无法解析的链接也算已存在，
/// 之后读取元数据失败时由调用方重新下载。
pub async fn has_local_copy(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|m| !m.is_dir())
        .unwrap_or(false)
}

/// 读取本地文件的大小和 ctime
pub async fn local_file_info(path: &Path) -> MirrorResult<LocalFileInfo> {
    let unavailable = |source| MirrorError::LocalMetadataUnavailable {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(path).await.map_err(unavailable)?;
    let created_at = change_time(&metadata).map_err(unavailable)?;

    Ok(LocalFileInfo {
        size_bytes: metadata.len(),
        created_at,
    })
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> io::Result<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;

    DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "ctime 超出范围"))
}

#[cfg(not(unix))]
fn change_time(metadata: &Metadata) -> io::Result<DateTime<Utc>> {
    let time = metadata.created().or_else(|_| metadata.modified())?;
    Ok(DateTime::<Utc>::from(time))
}

/// 创建输出目录，目录已存在不算错误
pub async fn create_output_dir(path: &Path) -> MirrorResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| MirrorError::io(path, e))
}
