use crate::core::listing::{fetch_listing, Entry};
use crate::core::transfer::{is_plain_file_name, FileSyncer, SyncOutcome, SyncTarget};
use crate::core::window::compute_window;
use crate::error::{MirrorError, MirrorResult};
use crate::storage::{self, RemoteSource};
use chrono::NaiveDateTime;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 一次镜像运行的统计
#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    pub output_dir: PathBuf,
    pub start_time: i64,
    pub end_time: i64,
    pub directories_visited: u32,
    pub directories_failed: u32,
    pub files_skipped: u32,
    pub files_downloaded: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
    /// 耗时（毫秒）
    pub duration: u64,
    pub errors: Vec<String>,
}

impl MirrorReport {
    pub fn files_total(&self) -> u32 {
        self.files_skipped + self.files_downloaded + self.files_failed
    }

    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Skipped => self.files_skipped += 1,
            SyncOutcome::Downloaded { bytes } => {
                self.files_downloaded += 1;
                self.bytes_transferred += bytes;
            }
            SyncOutcome::Failed => self.files_failed += 1,
        }
    }
}

/// 输出子目录名，例如 `MAR2024`
pub fn output_dir_name(now: NaiveDateTime) -> String {
    now.format("%b%Y").to_string().to_uppercase()
}

/// 镜像引擎：获取根目录列表，按时间窗口筛选月份目录，逐个文件同步
pub struct MirrorEngine {
    source: Arc<dyn RemoteSource>,
    syncer: FileSyncer,
}

impl MirrorEngine {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            syncer: FileSyncer::new(source.clone()),
            source,
        }
    }

    /// 运行一次镜像
    ///
    /// 只有输出目录创建失败和根目录列表获取失败会返回错误，
    /// 单个目录或文件的失败记录在报告中并继续处理其余部分。
    pub async fn run(
        &self,
        base_url: &Url,
        output_root: &Path,
        now: NaiveDateTime,
    ) -> MirrorResult<MirrorReport> {
        let started = Instant::now();
        let mut report = MirrorReport {
            start_time: chrono::Utc::now().timestamp(),
            ..Default::default()
        };

        let output_dir = output_root.join(output_dir_name(now));
        storage::create_output_dir(&output_dir).await?;
        report.output_dir = output_dir.clone();

        info!("开始镜像 {} ({}) 到 {}", base_url, self.source.name(), output_dir.display());

        let root = match fetch_listing(self.source.as_ref(), base_url).await {
            Ok(page) => page,
            Err(e) => {
                error!("无法获取根目录列表 \"{}\": {}", base_url, e);
                return Err(e);
            }
        };

        let window = compute_window(now.date());
        debug!("同步窗口: {:?}", window.partitions());

        for partition in window.iter() {
            let Some(entry) = root.listing.directory(partition) else {
                debug!("远程不存在目录 {}，跳过", partition);
                continue;
            };

            if let Err(e) = self.sync_directory(base_url, entry, &output_dir, &mut report).await {
                warn!("跳过目录 {}: {}", entry.name, e);
                report.directories_failed += 1;
                report.errors.push(format!("{}: {}", entry.name, e));
            }
        }

        report.end_time = chrono::Utc::now().timestamp();
        report.duration = started.elapsed().as_millis() as u64;

        info!(
            "镜像完成: {} 个目录, {} 个文件 (下载 {}, 跳过 {}, 失败 {}), {} 字节, 耗时 {}ms",
            report.directories_visited,
            report.files_total(),
            report.files_downloaded,
            report.files_skipped,
            report.files_failed,
            report.bytes_transferred,
            report.duration
        );

        Ok(report)
    }

    /// 同步一个月份目录中的全部文件
    async fn sync_directory(
        &self,
        base_url: &Url,
        entry: &Entry,
        output_dir: &Path,
        report: &mut MirrorReport,
    ) -> MirrorResult<()> {
        let dir_url = base_url.join(&entry.name).map_err(|e| MirrorError::InvalidUrl {
            url: format!("{}{}", base_url, entry.name),
            reason: e.to_string(),
        })?;

        let page = fetch_listing(self.source.as_ref(), &dir_url).await?;
        report.directories_visited += 1;

        info!("目录 {}: {} 个文件", dir_url, page.listing.files.len());

        for file in &page.listing.files {
            if !is_plain_file_name(&file.name) {
                warn!("跳过不安全的文件名 \"{}\" ({})", file.name, dir_url);
                report.files_failed += 1;
                report
                    .errors
                    .push(format!("{}{}: 文件名不是单一路径组件", entry.name, file.name));
                continue;
            }

            let target = SyncTarget::new(
                dir_url.clone(),
                file.name.as_str(),
                output_dir.join(&file.name),
            );

            match self.syncer.sync_one(&target).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!("无法同步文件 \"{}\": {}", file.name, e);
                    report.files_failed += 1;
                    report.errors.push(format!("{}{}: {}", entry.name, file.name, e));
                }
            }
        }

        Ok(())
    }
}
