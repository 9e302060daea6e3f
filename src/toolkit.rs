// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Toolkit 模块
//!
//! `Toolkit` 持有宿主设置的 [`ToolkitConfig`]，上传、JSON 读取等需要配置的操作都以它的方法形式提供。
//! 每次调用开始时把配置解析为一份不可变快照，因此同一个实例可以被多个任务并发使用。

use std::{
    io::{self, SeekFrom},
    path::Path,
};

use chrono::{DateTime, Utc};
use log::debug;
use tokio::io::AsyncSeekExt;

use crate::{
    config::ToolkitConfig,
    exception::Exception,
    param::{HttpRequestMethod, MIME_TYPES, OCTET_STREAM},
    random::{self, OsEntropy},
    request::{Body, Request},
    response::Response,
    util,
};

#[derive(Debug, Clone, Default)]
pub struct Toolkit {
    config: ToolkitConfig,
}

impl Toolkit {
    pub fn new(config: ToolkitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    /// 修改配置。应当在开始处理请求之前完成。
    pub fn config_mut(&mut self) -> &mut ToolkitConfig {
        &mut self.config
    }

    /// 使用操作系统熵源生成长度为 `length` 的随机字符串
    pub fn random_string(&self, length: usize) -> Result<String, Exception> {
        random::random_string(&mut OsEntropy, length)
    }

    pub fn slugify(&self, s: &str) -> Result<String, Exception> {
        util::slugify(s)
    }

    pub async fn create_dir_if_not_exist(&self, path: &Path) -> Result<(), Exception> {
        util::create_dir_if_not_exist(path).await
    }

    /// 构造一个强制浏览器下载 `dir/file` 的响应，保存时使用 `display_name` 作为文件名。
    ///
    /// 支持单区间 Range 请求与 HEAD 请求。`file` 只能是 `dir` 内的相对路径。
    /// 响应体是流式的，由 [`Response::write_to`] 边读文件边写出。
    pub async fn download_static_file(
        &self,
        request: &Request,
        dir: &Path,
        file: &str,
        display_name: &str,
    ) -> Result<Response, Exception> {
        let id = request.id();
        if !util::is_contained(file) {
            debug!("[ID{}]拒绝越界的下载路径：{}", id, file);
            return Err(Exception::InvalidPath);
        }
        let path = dir.join(file);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(Exception::FileNotFound),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Exception::FileNotFound),
            Err(e) => return Err(Exception::io("stat download file", e)),
        };
        let size = metadata.len();

        let mut response = Response::new();
        response
            .set_content_type(mime_type_for(file))
            .set_accept_ranges("bytes");
        if let Ok(modified) = metadata.modified() {
            response.set_last_modified(DateTime::<Utc>::from(modified));
        }
        response.headers_mut().set(
            "Content-Disposition",
            &format!("attachment; filename=\"{}\"", header_safe(display_name)),
        );

        // [start, end)
        let (start, end) = match request.range() {
            None => (0, size),
            Some((start, last)) => {
                let last = last.map(|l| l.min(size.saturating_sub(1)));
                if start >= size || last.is_some_and(|l| l < start) {
                    debug!("[ID{}]无法满足的范围请求，文件大小 {}", id, size);
                    response
                        .set_code(416)
                        .set_content_range(format!("bytes */{}", size));
                    return Ok(response);
                }
                let last = last.unwrap_or(size - 1);
                response
                    .set_code(206)
                    .set_content_range(format!("bytes {}-{}/{}", start, last, size));
                (start, last + 1)
            }
        };

        if request.method() == HttpRequestMethod::Head {
            response.set_content_length(end - start);
            return Ok(response);
        }

        let mut f = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Exception::io("open download file", e))?;
        if start > 0 {
            f.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| Exception::io("seek download file", e))?;
        }
        debug!(
            "[ID{}]下载 {}，{}",
            id,
            path.display(),
            util::format_file_size(end - start)
        );
        // 文件内容在写出响应时才按块读取
        response.set_stream(Body::from_reader(f), end - start);
        Ok(response)
    }
}

fn mime_type_for(file: &str) -> &'static str {
    let extension = util::file_extension(file).trim_start_matches('.').to_lowercase();
    MIME_TYPES
        .get(extension.as_str())
        .copied()
        .unwrap_or(OCTET_STREAM)
}

/// 响应头的值中不能出现换行
fn header_safe(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    /// 写出响应并返回空行之后的响应体
    async fn written_body(response: &mut Response) -> Vec<u8> {
        let mut sink = Vec::new();
        response.write_to(&mut sink).await.unwrap();
        let end = sink.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        sink[end + 4..].to_vec()
    }

    #[test]
    fn test_random_string_length() {
        let toolkit = Toolkit::default();
        let s = toolkit.random_string(25).unwrap();
        assert_eq!(s.len(), 25);
    }

    #[test]
    fn test_config_mut() {
        let mut toolkit = Toolkit::default();
        toolkit.config_mut().max_json_bytes = 16;
        assert_eq!(toolkit.config().max_json_bytes, 16);
        assert_eq!(toolkit.config().resolve().max_json_bytes(), 16);
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("report.PDF"), "application/pdf");
        assert_eq!(mime_type_for("a/b/pic.png"), "image/png");
        assert_eq!(mime_type_for("README"), OCTET_STREAM);
        assert_eq!(mime_type_for("data.unknownext"), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_download_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "report.txt", b"hello download");
        let request = Request::new(HttpRequestMethod::Get, "/download/report.txt");

        let mut response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "report.txt", "Quarterly Report.txt")
            .await
            .unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_type(), Some("text/plain;charset=utf-8"));
        assert_eq!(response.content_length(), 14);
        assert_eq!(
            response.headers().get("content-disposition"),
            Some("attachment; filename=\"Quarterly Report.txt\"")
        );
        let raw = String::from_utf8_lossy(&response.as_bytes()).to_string();
        assert!(raw.contains("Accept-Ranges: bytes\r\n"));
        assert!(raw.contains("Last-Modified: "));
        assert_eq!(written_body(&mut response).await, b"hello download");
    }

    #[tokio::test]
    async fn test_download_range() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "digits.bin", b"0123456789");
        let mut request = Request::new(HttpRequestMethod::Get, "/download/digits.bin");
        request.set_range(Some((2, Some(5))));

        let mut response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "digits.bin", "digits.bin")
            .await
            .unwrap();

        assert_eq!(response.status_code(), 206);
        assert_eq!(response.content_length(), 4);
        assert_eq!(written_body(&mut response).await, b"2345");
        assert_eq!(response.content_range(), Some("bytes 2-5/10"));

        request.set_range(Some((7, None)));
        let mut response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "digits.bin", "digits.bin")
            .await
            .unwrap();
        assert_eq!(written_body(&mut response).await, b"789");
        assert_eq!(response.content_range(), Some("bytes 7-9/10"));
    }

    #[tokio::test]
    async fn test_download_unsatisfiable_range() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "digits.bin", b"0123456789");
        let mut request = Request::new(HttpRequestMethod::Get, "/download/digits.bin");
        request.set_range(Some((10, None)));

        let response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "digits.bin", "digits.bin")
            .await
            .unwrap();

        assert_eq!(response.status_code(), 416);
        assert_eq!(response.content_range(), Some("bytes */10"));
        assert!(response.content().is_none());
        assert!(!response.has_stream());
    }

    #[tokio::test]
    async fn test_download_head_has_no_body() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "digits.bin", b"0123456789");
        let request = Request::new(HttpRequestMethod::Head, "/download/digits.bin");

        let response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "digits.bin", "digits.bin")
            .await
            .unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_length(), 10);
        assert!(response.content().is_none());
        assert!(!response.has_stream());
    }

    /// 文件内容不在构造响应时读入内存
    #[tokio::test]
    async fn test_download_body_is_streamed() {
        let tmp = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        write_fixture(tmp.path(), "big.bin", &content);
        let request = Request::new(HttpRequestMethod::Get, "/download/big.bin");

        let mut response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "big.bin", "big.bin")
            .await
            .unwrap();

        assert!(response.content().is_none());
        assert!(response.has_stream());
        assert_eq!(response.content_length(), content.len() as u64);
        assert_eq!(written_body(&mut response).await, content);
    }

    #[tokio::test]
    async fn test_download_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/download/x");

        let result = Toolkit::default()
            .download_static_file(&request, tmp.path(), "../etc/passwd", "passwd")
            .await;

        assert!(matches!(result, Err(Exception::InvalidPath)));
    }

    #[tokio::test]
    async fn test_download_missing_and_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/download/x");
        let toolkit = Toolkit::default();

        let missing = toolkit
            .download_static_file(&request, tmp.path(), "nope.txt", "nope.txt")
            .await;
        assert!(matches!(missing, Err(Exception::FileNotFound)));

        let directory = toolkit
            .download_static_file(&request, tmp.path(), "sub", "sub")
            .await;
        assert!(matches!(directory, Err(Exception::FileNotFound)));
    }

    #[tokio::test]
    async fn test_display_name_cannot_inject_headers() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "a.txt", b"a");
        let request = Request::new(HttpRequestMethod::Get, "/download/a.txt");

        let response = Toolkit::default()
            .download_static_file(&request, tmp.path(), "a.txt", "a\r\nSet-Cookie: x=1")
            .await
            .unwrap();

        let raw = String::from_utf8_lossy(&response.as_bytes()).to_string();
        assert!(!raw.contains("\r\nSet-Cookie"));
    }
}
