// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{exception::Exception, param::*, request::Body};

use bytes::Bytes;
use chrono::prelude::*;
use log::trace;
use tokio::io::{self, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 由 `Response` 自己计算的响应头，附加响应头中的同名项不会被写出
const OWNED_HEADERS: [&str; 7] = [
    "Content-Type",
    "Content-Length",
    "Date",
    "Server",
    "Last-Modified",
    "Accept-Ranges",
    "Content-Range",
];

/// 附加响应头。名称比较大小写不敏感，保持插入顺序。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置响应头，已存在的同名响应头（不区分大小写）会被整体替换
    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 合并另一组响应头，同名者以 `other` 为准
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }
}

#[derive(Debug)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    server_name: String,
    last_modified: Option<DateTime<Utc>>,
    content: Option<Bytes>,
    /// 流式响应体，写出时按 `content_length` 从中复制
    stream: Option<Body>,
    content_range: Option<String>,
    accept_ranges: Option<String>,
    headers: Headers,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            last_modified: None,
            content: None,
            stream: None,
            content_range: None,
            accept_ranges: None,
            headers: Headers::new(),
        }
    }

    /// 设置状态码。未收录的状态码使用空的原因短语，HTTP/1.1 允许这样做。
    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = STATUS_CODES.get(&code).copied().unwrap_or("").to_string();
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// 设置响应体，同时更新 Content-Length
    pub fn set_content(&mut self, content: Bytes) -> &mut Self {
        self.content_length = content.len() as u64;
        self.content = Some(content);
        self.stream = None;
        self
    }

    /// 设置长度为 `length` 的流式响应体，`write_to` 时才从 `stream` 读取
    pub fn set_stream(&mut self, stream: Body, length: u64) -> &mut Self {
        self.content_length = length;
        self.content = None;
        self.stream = Some(stream);
        self
    }

    /// 取走流式响应体
    pub fn take_stream(&mut self) -> Option<Body> {
        self.stream.take()
    }

    /// 只设置 Content-Length 而不携带响应体（HEAD 请求）
    pub fn set_content_length(&mut self, length: u64) -> &mut Self {
        self.content_length = length;
        self
    }

    pub fn set_last_modified(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.last_modified = Some(time);
        self
    }

    pub fn set_content_range(&mut self, range: String) -> &mut Self {
        self.content_range = Some(range);
        self
    }

    pub fn set_accept_ranges(&mut self, unit: &str) -> &mut Self {
        self.accept_ranges = Some(unit.to_string());
        self
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// 序列化状态行、响应头和内存中的响应体。流式响应体不包含在内。
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            push_header(&mut header, "Content-Type", t);
        }
        push_header(&mut header, "Content-Length", &self.content_length.to_string());
        push_header(&mut header, "Date", &format_date(&self.date));
        push_header(&mut header, "Server", &self.server_name);
        if let Some(m) = &self.last_modified {
            push_header(&mut header, "Last-Modified", &format_date(m));
        }
        if let Some(r) = &self.accept_ranges {
            push_header(&mut header, "Accept-Ranges", r);
        }
        if let Some(r) = &self.content_range {
            push_header(&mut header, "Content-Range", r);
        }
        for (name, value) in self.headers.iter() {
            if OWNED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                continue;
            }
            push_header(&mut header, name, value);
        }
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        if let Some(c) = &self.content {
            bytes.extend_from_slice(c);
        }
        bytes
    }

    /// 将完整报文写入任意异步输出流并刷新。流式响应体会被消耗。
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<(), Exception>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let bytes = self.as_bytes();
        trace!("写出响应 {}，共 {} 字节", self.status_code, bytes.len());
        sink.write_all(&bytes)
            .await
            .map_err(|e| Exception::io("write response", e))?;
        if let Some(stream) = self.stream.take() {
            let mut limited = stream.take(self.content_length);
            let copied = io::copy(&mut limited, sink)
                .await
                .map_err(|e| Exception::io("write response body", e))?;
            trace!("流式响应体写出 {} 字节", copied);
            // 已经发出的 Content-Length 无法收回，长度不足只能报错
            if copied != self.content_length {
                return Err(Exception::io(
                    "write response body",
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stream ended after {} of {} bytes", copied, self.content_length),
                    ),
                ));
            }
        }
        sink.flush()
            .await
            .map_err(|e| Exception::io("flush response", e))
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn content_range(&self) -> Option<&str> {
        self.content_range.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

/// HTTP-date（RFC 9110 IMF-fixdate），例如 `Sun, 06 Nov 1994 08:49:37 GMT`
fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        let date = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(format_date(&date), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_response_new() {
        let response = Response::new();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
        assert!(response.content().is_none());
    }

    #[test]
    fn test_response_as_bytes_basic() {
        let response = Response::new();
        let bytes = response.as_bytes();
        let response_str = String::from_utf8_lossy(&bytes);

        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Length: 0"));
        assert!(response_str.contains("Server: webtoolkit"));
        assert!(response_str.contains("Date: "));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_response_as_bytes_with_content() {
        let mut response = Response::new();
        response
            .set_content_type("text/plain")
            .set_content(Bytes::from("Hello"));

        let bytes = response.as_bytes();
        let response_str = String::from_utf8_lossy(&bytes);

        assert!(response_str.contains("Content-Type: text/plain"));
        assert!(response_str.contains("Content-Length: 5"));
        assert!(response_str.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_response_status_code_various() {
        for (code, expected_info) in [
            (200, "OK"),
            (201, "Created"),
            (206, "Partial Content"),
            (400, "Bad Request"),
            (404, "Not Found"),
            (413, "Content Too Large"),
            (415, "Unsupported Media Type"),
            (416, "Range Not Satisfiable"),
            (503, "Service Unavailable"),
        ] {
            let mut response = Response::new();
            response.set_code(code);
            assert_eq!(response.status_code(), code);
            assert_eq!(response.information(), expected_info);
        }
    }

    #[test]
    fn test_unknown_status_code_has_empty_reason() {
        let mut response = Response::new();
        response.set_code(299);
        let response_str = String::from_utf8(response.as_bytes()).unwrap();
        assert!(response_str.starts_with("HTTP/1.1 299 \r\n"));
    }

    #[test]
    fn test_extra_headers_are_written() {
        let mut response = Response::new();
        response
            .headers_mut()
            .set("X-Request-Id", "abc")
            .set("Content-Disposition", "attachment; filename=\"a.txt\"");

        let response_str = String::from_utf8(response.as_bytes()).unwrap();

        assert!(response_str.contains("X-Request-Id: abc\r\n"));
        assert!(response_str.contains("Content-Disposition: attachment; filename=\"a.txt\"\r\n"));
    }

    #[test]
    fn test_headers_set_replaces_case_insensitively() {
        let mut headers = Headers::new();
        headers.set("x-trace", "1").set("X-Trace", "2");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-TRACE"), Some("2"));

        headers.remove("x-TRACE");
        assert!(headers.is_empty());
    }

    /// 附加响应头不能覆盖或重复由响应自己计算的头
    #[test]
    fn test_extra_headers_cannot_duplicate_owned_ones() {
        let mut response = Response::new();
        response.set_content(Bytes::from("hello"));
        response
            .headers_mut()
            .set("content-length", "0")
            .set("Server", "spoofed")
            .set("X-Trace", "1");

        let response_str = String::from_utf8(response.as_bytes()).unwrap();

        assert_eq!(response_str.matches("Content-Length").count(), 1);
        assert!(response_str.contains("Content-Length: 5\r\n"));
        assert!(!response_str.contains("content-length: 0"));
        assert!(!response_str.contains("spoofed"));
        assert!(response_str.contains("X-Trace: 1\r\n"));
    }

    #[tokio::test]
    async fn test_write_stream_body() {
        let mut response = Response::new();
        response.set_stream(Body::from("0123456789"), 4);

        let mut sink: Vec<u8> = Vec::new();
        response.write_to(&mut sink).await.unwrap();

        let response_str = String::from_utf8(sink).unwrap();
        assert!(response_str.contains("Content-Length: 4\r\n"));
        assert!(response_str.ends_with("\r\n\r\n0123"));
        assert!(!response.has_stream());
    }

    #[tokio::test]
    async fn test_write_short_stream_is_error() {
        let mut response = Response::new();
        response.set_stream(Body::from("abc"), 10);

        let mut sink: Vec<u8> = Vec::new();
        let result = response.write_to(&mut sink).await;

        assert!(matches!(result, Err(Exception::Io { .. })));
    }

    #[tokio::test]
    async fn test_write_to_sink() {
        let mut response = Response::new();
        response.set_code(201).set_content(Bytes::from("done"));

        let mut sink: Vec<u8> = Vec::new();
        response.write_to(&mut sink).await.unwrap();

        assert_eq!(sink, response.as_bytes());
    }
}
