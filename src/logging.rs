//! 日志模块 - 提供文件日志和按周轮转功能
//!
//! 日志始终写入 `<logDir>/get_oisst.log`；在终端中运行时同时输出到控制台。
//! 日志文件在每周日 0 点（本地时间）轮转，旧文件名追加 `.YYYY-MM-DD` 后缀。

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "get_oisst.log";

const BACKUP_DATE_FORMAT: &str = "%Y-%m-%d";

/// 日志初始化错误
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("日志目录 '{}' 不存在，请创建后重试", .0.display())]
    MissingDir(PathBuf),

    #[error("日志目录 '{}' 的权限不允许当前用户写入日志文件，请修改权限后重试", .0.display())]
    NotWritable(PathBuf),

    #[error("无法打开日志文件 '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无法设置全局日志: {0}")]
    Init(String),
}

/// 将配置的日志级别转换为 tracing Level
pub fn tracing_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "error" | "critical" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// `after` 之后最近的一个周日 0 点
pub fn next_rollover(after: NaiveDateTime) -> NaiveDateTime {
    let days = 7 - i64::from(after.weekday().num_days_from_sunday());
    (after.date() + Duration::days(days)).and_time(NaiveTime::default())
}

fn backup_date(name: &str) -> Option<&str> {
    let suffix = name.strip_prefix(LOG_FILE_NAME)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(suffix, BACKUP_DATE_FORMAT).ok()?;
    Some(suffix)
}

/// 删除超出数量的旧日志，返回删除的文件数。`keep` 为 0 表示全部保留
pub fn prune_backups(log_dir: &Path, keep: usize) -> io::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }

    let mut backups: Vec<(String, PathBuf)> = fs::read_dir(log_dir)?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let date = backup_date(&name)?.to_string();
            Some((date, entry.path()))
        })
        .collect();

    if backups.len() <= keep {
        return Ok(0);
    }

    backups.sort();
    let excess = backups.len() - keep;
    for (_, path) in backups.iter().take(excess) {
        fs::remove_file(path)?;
    }
    Ok(excess)
}

/// 按周轮转的日志写入器
pub struct WeeklyRotatingWriter {
    log_dir: PathBuf,
    file_path: PathBuf,
    backups: usize,
    writer: Option<BufWriter<File>>,
    rollover_at: NaiveDateTime,
}

impl WeeklyRotatingWriter {
    pub fn new(log_dir: &Path, backups: usize) -> io::Result<Self> {
        let file_path = log_dir.join(LOG_FILE_NAME);

        // 已有日志文件时从其修改时间计算下一次轮转
        let since = fs::metadata(&file_path)
            .and_then(|m| m.modified())
            .map(|t| chrono::DateTime::<Local>::from(t).naive_local())
            .unwrap_or_else(|_| Local::now().naive_local());

        let writer = Self::open_file(&file_path)?;

        Ok(Self {
            log_dir: log_dir.to_path_buf(),
            file_path,
            backups,
            writer: Some(writer),
            rollover_at: next_rollover(since),
        })
    }

    fn open_file(file_path: &Path) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(BufWriter::new(file))
    }

    /// 轮转日志文件
    ///
    /// 备份或清理失败时继续写入当前文件，下一次轮转时间照常推进。
    fn rotate(&mut self, now: NaiveDateTime) -> io::Result<()> {
        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }

        let period_start = self.rollover_at - Duration::days(7);
        let backup_path = self.log_dir.join(format!(
            "{}.{}",
            LOG_FILE_NAME,
            period_start.format(BACKUP_DATE_FORMAT)
        ));
        self.rollover_at = next_rollover(now);

        let _ = Self::move_to_backup(&self.file_path, &backup_path);
        self.writer = Some(Self::open_file(&self.file_path)?);

        let _ = prune_backups(&self.log_dir, self.backups);
        Ok(())
    }

    fn move_to_backup(file_path: &Path, backup_path: &Path) -> io::Result<()> {
        if backup_path.exists() {
            fs::remove_file(backup_path)?;
        }
        if file_path.exists() {
            fs::rename(file_path, backup_path)?;
        }
        Ok(())
    }
}

impl Write for WeeklyRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = Local::now().naive_local();
        if now >= self.rollover_at {
            self.rotate(now)?;
        }

        match self.writer.as_mut() {
            Some(writer) => {
                let written = writer.write(buf)?;
                writer.flush()?;
                Ok(written)
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "Writer not available")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// 初始化日志系统
///
/// 返回的 guard 必须在程序结束前一直持有，否则缓冲中的日志会丢失。
pub fn init_logging(
    log_dir: &Path,
    level: &str,
    backups: usize,
) -> Result<WorkerGuard, LoggingError> {
    if !log_dir.is_dir() {
        return Err(LoggingError::MissingDir(log_dir.to_path_buf()));
    }

    let writer = WeeklyRotatingWriter::new(log_dir, backups).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            LoggingError::NotWritable(log_dir.to_path_buf())
        } else {
            LoggingError::Open {
                path: log_dir.join(LOG_FILE_NAME),
                source: e,
            }
        }
    })?;
    let (file_writer, guard) = tracing_appender::non_blocking(writer);

    // 创建日志级别过滤器
    let mut env_filter = EnvFilter::from_default_env().add_directive(tracing_level(level).into());
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "html5ever=warn", "selectors=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    // 文件日志层 - 始终输出到文件
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // 在终端中运行时也输出到控制台
    let console_layer = io::stdin().is_terminal().then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .without_time()
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}
