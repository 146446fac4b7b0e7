//! 同步时间窗口
//!
//! 窗口从上一年 12 月开始，到当前月份结束。计算方式：以上一年 12 月 15 日为起点，
//! 以当前月 15 日再加一个月为终点，取两者之间（含端点）的每一个月末。
//! 锚定在 15 日是为了避免月末边界上多算或漏算一个月。

use chrono::{Datelike, Months, NaiveDate};

/// 本次运行需要同步的月份分区（`YYYYMM/`），按时间升序，不含重复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWindow {
    partitions: Vec<String>,
}

impl SyncWindow {
    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p == name)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(String::as_str)
    }
}

/// 分区目录名，例如 `202403/`
pub fn partition_name(date: NaiveDate) -> String {
    format!("{}/", date.format("%Y%m"))
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}

/// 计算以 `now` 为参考日期的同步窗口
pub fn compute_window(now: NaiveDate) -> SyncWindow {
    let mut partitions = Vec::new();

    let (Some(last_december), Some(window_end)) = (
        NaiveDate::from_ymd_opt(now.year() - 1, 12, 15),
        NaiveDate::from_ymd_opt(now.year(), now.month(), 15)
            .and_then(|d| d.checked_add_months(Months::new(1))),
    ) else {
        return SyncWindow { partitions };
    };

    let (mut year, mut month) = (last_december.year(), last_december.month());
    while let Some(end) = month_end(year, month) {
        if end > window_end {
            break;
        }
        if end >= last_december {
            partitions.push(partition_name(end));
        }
        (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    }

    SyncWindow { partitions }
}
