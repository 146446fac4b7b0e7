use super::{ProbeHeaders, RemotePage, RemoteSource};
use crate::error::{MirrorError, MirrorResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, Response, Url};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

const USER_AGENT: &str = concat!("oisst-mirror/", env!("CARGO_PKG_VERSION"));

/// 基于 reqwest 的 HTTP(S) 数据源
pub struct HttpSource {
    client: Client,
    name: String,
}

impl HttpSource {
    pub fn new(base_url: &Url) -> MirrorResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MirrorError::unreachable(base_url.as_str(), e))?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &Url) -> Self {
        let name = format!(
            "{}://{}",
            base_url.scheme(),
            base_url.host_str().unwrap_or_default()
        );

        Self { client, name }
    }

    /// 发送 GET 请求，非 2xx 状态视为失败
    async fn get(&self, url: &Url) -> MirrorResult<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MirrorError::unreachable(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn header_text(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

async fn write_body(response: Response, url: &Url, path: &Path) -> MirrorResult<u64> {
    let file = File::create(path)
        .await
        .map_err(|e| MirrorError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream
        .try_next()
        .await
        .map_err(|e| MirrorError::unreachable(url.as_str(), e))?
    {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| MirrorError::io(path, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| MirrorError::io(path, e))?;
    Ok(written)
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_page(&self, url: &Url) -> MirrorResult<RemotePage> {
        let response = self.get(url).await?;

        let final_url = response.url().clone();
        let content_type = header_text(response.headers(), CONTENT_TYPE);
        let body = response
            .bytes()
            .await
            .map_err(|e| MirrorError::unreachable(url.as_str(), e))?;

        tracing::debug!("获取页面 {} ({} 字节)", final_url, body.len());

        Ok(RemotePage {
            final_url,
            content_type,
            body,
        })
    }

    async fn probe(&self, url: &Url) -> MirrorResult<ProbeHeaders> {
        let response = self.get(url).await?;
        let headers = response.headers();

        // 响应体不读取，直接丢弃连接
        Ok(ProbeHeaders {
            content_length: header_text(headers, CONTENT_LENGTH),
            last_modified: header_text(headers, LAST_MODIFIED),
        })
    }

    async fn download(&self, url: &Url, target: &Path) -> MirrorResult<u64> {
        let response = self.get(url).await?;

        // 先写入同目录的临时文件，完整收到后再替换目标，中断时保留旧文件
        let partial = partial_path(target);
        let written = match write_body(response, url, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| MirrorError::io(target, e))?;

        Ok(written)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
