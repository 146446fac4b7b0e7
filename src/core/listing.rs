//! 目录列表解析
//!
//! 被镜像的服务器把目录和文件放在页面唯一的表格里，前三行是表头和分隔行。
//! 服务器版本或页面格式变化时只需要修改本模块。

use crate::error::{MirrorError, MirrorResult};
use crate::storage::RemoteSource;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// 表格中数据行之前的行数（表头、分隔线、上级目录）
pub const HEADER_ROWS: usize = 3;

/// 数据行至少需要的单元格数
pub const MIN_CELLS: usize = 4;

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// 列表中的一项（目录或文件），字段保留页面上显示的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub modified_at: String,
    pub size: String,
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// 一个页面解析出的目录和文件，顺序与页面行顺序一致
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub directories: Vec<Entry>,
    pub files: Vec<Entry>,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.directories.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按名称查找目录
    pub fn directory(&self, name: &str) -> Option<&Entry> {
        self.directories.iter().find(|d| d.name == name)
    }
}

/// 检测到的重定向（请求主机与实际响应主机不同）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

/// 获取并解析后的列表页面
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub url: Url,
    pub listing: Listing,
    pub redirect: Option<Redirect>,
}

fn is_html(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "text/html" || media_type == "application/xhtml+xml"
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// 解析一行，单元格不足或第一列没有链接时返回 None
fn parse_row(row: ElementRef<'_>) -> Option<Entry> {
    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
    if cells.len() < MIN_CELLS {
        return None;
    }

    let anchor = cells[0].select(&ANCHOR).next()?;

    Some(Entry {
        name: cell_text(&anchor),
        modified_at: cell_text(&cells[1]),
        size: cell_text(&cells[2]),
    })
}

/// 把目录列表 HTML 解析为 [`Listing`]
pub fn parse(html: &[u8], content_type: &str) -> MirrorResult<Listing> {
    if !is_html(content_type) {
        return Err(MirrorError::UnsupportedContentType {
            url: String::new(),
            content_type: content_type.to_string(),
        });
    }

    let document = Html::parse_document(&String::from_utf8_lossy(html));
    let table = document
        .select(&TABLE)
        .next()
        .ok_or(MirrorError::NoTableFound)?;

    let mut listing = Listing::default();
    for row in table.select(&ROW).skip(HEADER_ROWS) {
        let Some(entry) = parse_row(row) else {
            continue;
        };
        if entry.is_directory() {
            listing.directories.push(entry);
        } else {
            listing.files.push(entry);
        }
    }

    // 请求成功但没有任何数据，视为错误而不是“没有数据”
    if listing.is_empty() {
        return Err(MirrorError::NoTableFound);
    }

    Ok(listing)
}

fn netloc(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    }
}

/// 获取并解析一个目录列表页面
///
/// 重定向到其他主机只记录警告，页面仍然会被解析。
pub async fn fetch_listing(source: &dyn RemoteSource, url: &Url) -> MirrorResult<ListingPage> {
    let page = source.fetch_page(url).await?;

    let requested = netloc(url);
    let resolved = netloc(&page.final_url);
    let redirect = if requested != resolved {
        tracing::warn!(
            "检测到 \"{}\" 被重定向到 \"{}\"，数据可能不可靠",
            requested,
            resolved
        );
        Some(Redirect {
            from: requested,
            to: resolved,
        })
    } else {
        None
    };

    let content_type = page.content_type.as_deref().unwrap_or_default();
    let listing = parse(&page.body, content_type).map_err(|e| match e {
        MirrorError::UnsupportedContentType { content_type, .. } => {
            MirrorError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            }
        }
        other => other,
    })?;

    tracing::debug!(
        "{}: {} 个目录, {} 个文件",
        url,
        listing.directories.len(),
        listing.files.len()
    );

    Ok(ListingPage {
        url: page.final_url,
        listing,
        redirect,
    })
}
