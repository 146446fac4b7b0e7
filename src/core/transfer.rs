//! 单个文件的同步：探测远程元数据，与本地文件比较，必要时重新下载

use crate::core::comparator::{FetchReason, FileComparator, RemoteFileInfo, SyncDecision};
use crate::error::{MirrorError, MirrorResult};
use crate::storage::{self, RemoteSource};
use reqwest::Url;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 一个待同步的文件
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub remote_directory_url: Url,
    pub file_name: String,
    pub local_path: PathBuf,
}

impl SyncTarget {
    pub fn new(remote_directory_url: Url, file_name: impl Into<String>, local_path: PathBuf) -> Self {
        Self {
            remote_directory_url,
            file_name: file_name.into(),
            local_path,
        }
    }

    /// 目录 URL 与文件名拼接后的完整 URL
    pub fn remote_url(&self) -> MirrorResult<Url> {
        self.remote_directory_url
            .join(&self.file_name)
            .map_err(|e| MirrorError::InvalidUrl {
                url: format!("{}{}", self.remote_directory_url, self.file_name),
                reason: e.to_string(),
            })
    }
}

/// 文件名只含一个普通路径组件，拼接到输出目录后不会落到目录之外
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// 单个文件的同步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 本地文件已是最新，未下载
    Skipped,
    Downloaded { bytes: u64 },
    /// 下载或写入失败（已记录日志）
    Failed,
}

impl SyncOutcome {
    /// 文件现在是否存在且为最新
    pub fn is_current(&self) -> bool {
        !matches!(self, SyncOutcome::Failed)
    }
}

/// 文件同步器
pub struct FileSyncer {
    source: Arc<dyn RemoteSource>,
    comparator: FileComparator,
}

impl FileSyncer {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            comparator: FileComparator::new(),
        }
    }

    /// 决定是否需要下载；本地或远程元数据不可用时一律重新下载
    async fn decide(&self, target: &SyncTarget, url: &Url) -> MirrorResult<SyncDecision> {
        // 远程连接失败直接返回给调用方
        let headers = self.source.probe(url).await?;

        if !storage::has_local_copy(&target.local_path).await {
            return Ok(SyncDecision::Fetch(FetchReason::Missing));
        }

        let local = match storage::local_file_info(&target.local_path).await {
            Ok(local) => local,
            Err(e) => {
                warn!("{}", e);
                warn!("重新尝试下载 \"{}\"", url);
                return Ok(SyncDecision::Fetch(FetchReason::LocalUnavailable));
            }
        };

        let remote = match RemoteFileInfo::from_headers(url.as_str(), &headers) {
            Ok(remote) => remote,
            Err(e) => {
                warn!("{}", e);
                warn!("重新尝试下载 \"{}\"", url);
                return Ok(SyncDecision::Fetch(FetchReason::RemoteUnavailable));
            }
        };

        let decision = self.comparator.decide(&remote, &local);
        if decision != SyncDecision::Skip {
            warn!(
                "目标 \"{}\" 已存在，但与源 \"{}\" 不一致，重新下载",
                target.local_path.display(),
                url
            );
            warn!(
                "目标 size={}, ctime={}. 源 size={}, ctime={}",
                local.size_bytes,
                local.created_at,
                remote.size_bytes,
                remote.last_modified
            );
        }

        Ok(decision)
    }

    /// 同步一个文件
    ///
    /// 只有远程探测的连接失败会作为错误返回；下载和写入失败记录警告后返回
    /// [`SyncOutcome::Failed`]，不影响其他文件。
    pub async fn sync_one(&self, target: &SyncTarget) -> MirrorResult<SyncOutcome> {
        let url = target.remote_url()?;

        if self.decide(target, &url).await? == SyncDecision::Skip {
            info!("文件 \"{}\" 已获取，跳过", url);
            return Ok(SyncOutcome::Skipped);
        }

        info!("下载文件 {} 到 {}", url, target.local_path.display());
        match self.source.download(&url, &target.local_path).await {
            Ok(bytes) => Ok(SyncOutcome::Downloaded { bytes }),
            Err(e @ MirrorError::Io { .. }) => {
                warn!("无法写入目标文件: {}", e);
                Ok(SyncOutcome::Failed)
            }
            Err(e) => {
                warn!("获取文件 \"{}\" 时出错: {}", url, e);
                Ok(SyncOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::{ProbeHeaders, RemotePage};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 内存中的远程数据源
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub pages: HashMap<String, RemotePage>,
        pub files: HashMap<String, (Vec<u8>, String)>,
        pub unreachable: Vec<String>,
        pub fail_downloads: bool,
        pub fetched_pages: Mutex<Vec<String>>,
        pub downloads: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub fn with_page(mut self, url: &str, html: String) -> Self {
            self.pages.insert(
                url.to_string(),
                RemotePage {
                    final_url: Url::parse(url).unwrap(),
                    content_type: Some("text/html;charset=UTF-8".to_string()),
                    body: Bytes::from(html),
                },
            );
            self
        }

        pub fn with_file(mut self, url: &str, data: &[u8], last_modified: &str) -> Self {
            self.files
                .insert(url.to_string(), (data.to_vec(), last_modified.to_string()));
            self
        }

        pub fn download_count(&self) -> usize {
            self.downloads.lock().unwrap().len()
        }

        fn check(&self, url: &Url) -> MirrorResult<()> {
            if self.unreachable.iter().any(|u| u == url.as_str()) {
                return Err(MirrorError::unreachable(url.as_str(), "connection refused"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteSource for FakeSource {
        async fn fetch_page(&self, url: &Url) -> MirrorResult<RemotePage> {
            self.check(url)?;
            self.fetched_pages.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| MirrorError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
        }

        async fn probe(&self, url: &Url) -> MirrorResult<ProbeHeaders> {
            self.check(url)?;
            let (data, last_modified) = self.files.get(url.as_str()).ok_or_else(|| {
                MirrorError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }
            })?;
            Ok(ProbeHeaders {
                content_length: Some(data.len().to_string()),
                last_modified: Some(last_modified.clone()),
            })
        }

        async fn download(&self, url: &Url, target: &Path) -> MirrorResult<u64> {
            self.check(url)?;
            if self.fail_downloads {
                return Err(MirrorError::unreachable(url.as_str(), "connection reset"));
            }
            let (data, _) = &self.files[url.as_str()];
            std::fs::write(target, data).map_err(|e| MirrorError::io(target, e))?;
            self.downloads.lock().unwrap().push(url.to_string());
            Ok(data.len() as u64)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    const DIR: &str = "https://www.ncei.noaa.gov/data/sst/202403/";
    const FILE: &str = "https://www.ncei.noaa.gov/data/sst/202403/a.nc";
    const LONG_AGO: &str = "Mon, 01 Jan 2001 00:00:00 GMT";
    const FAR_FUTURE: &str = "Fri, 01 Jan 2100 00:00:00 GMT";

    fn target(dir: &Path) -> SyncTarget {
        SyncTarget::new(Url::parse(DIR).unwrap(), "a.nc", dir.join("a.nc"))
    }

    fn syncer(source: FakeSource) -> (Arc<FakeSource>, FileSyncer) {
        let source = Arc::new(source);
        (source.clone(), FileSyncer::new(source))
    }

    #[test]
    fn test_remote_url_join() {
        let t = SyncTarget::new(Url::parse(DIR).unwrap(), "a.nc", PathBuf::from("a.nc"));
        assert_eq!(t.remote_url().unwrap().as_str(), FILE);
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("oisst-avhrr-v02r01.20240301.nc"));
        assert!(is_plain_file_name("..nc"));
        assert!(!is_plain_file_name("../escape.nc"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name("sub/a.nc"));
        assert!(!is_plain_file_name("..\\escape.nc"));
    }

    #[tokio::test]
    async fn test_missing_local_file_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[7u8; 100], LONG_AGO));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Downloaded { bytes: 100 });
        assert!(outcome.is_current());
        assert_eq!(source.download_count(), 1);
        assert_eq!(std::fs::read(dir.path().join("a.nc")).unwrap(), vec![7u8; 100]);
    }

    #[tokio::test]
    async fn test_current_file_is_downloaded_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO));

        let first = syncer.sync_one(&target(dir.path())).await.unwrap();
        let second = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(first, SyncOutcome::Downloaded { bytes: 100 });
        assert_eq!(second, SyncOutcome::Skipped);
        assert!(second.is_current());
        assert_eq!(source.download_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_same_size_older_remote_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nc"), [0u8; 100]).unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(source.download_count(), 0);
        assert_eq!(std::fs::read(dir.path().join("a.nc")).unwrap(), vec![0u8; 100]);
    }

    #[tokio::test]
    async fn test_size_change_triggers_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nc"), [0u8; 100]).unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 200], LONG_AGO));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Downloaded { bytes: 200 });
        assert_eq!(source.download_count(), 1);
        assert_eq!(std::fs::metadata(dir.path().join("a.nc")).unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_newer_remote_triggers_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nc"), [0u8; 100]).unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 100], FAR_FUTURE));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Downloaded { bytes: 100 });
        assert_eq!(source.download_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_remote_metadata_triggers_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nc"), [0u8; 100]).unwrap();
        let (source, syncer) =
            syncer(FakeSource::default().with_file(FILE, &[1u8; 100], "yesterday"));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Downloaded { bytes: 100 });
        assert_eq!(source.download_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_probe_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO);
        fake.unreachable.push(FILE.to_string());
        let (source, syncer) = syncer(fake);

        let result = syncer.sync_one(&target(dir.path())).await;

        assert!(matches!(result, Err(MirrorError::RemoteUnreachable { .. })));
        assert_eq!(source.download_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_download_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO);
        fake.fail_downloads = true;
        let (_, syncer) = syncer(fake);

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Failed);
        assert!(!outcome.is_current());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_local_metadata_triggers_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nc");
        std::os::unix::fs::symlink(&path, &path).unwrap();
        let (_, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO));
        let target = target(dir.path());

        let decision = syncer
            .decide(&target, &target.remote_url().unwrap())
            .await
            .unwrap();

        assert_eq!(decision, SyncDecision::Fetch(FetchReason::LocalUnavailable));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_local_metadata_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nc");
        std::os::unix::fs::symlink("missing.nc", &path).unwrap();
        let (source, syncer) = syncer(FakeSource::default().with_file(FILE, &[1u8; 100], LONG_AGO));

        let outcome = syncer.sync_one(&target(dir.path())).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Downloaded { bytes: 100 });
        assert_eq!(source.download_count(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 100]);
    }
}
