// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将原始字节（或异步字节流）解析为强类型的 `Request` 结构体，供上传和 JSON
//! 解码使用。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、路径、版本）。
//! 2. 常用 HTTP 标头（Headers）的提取，包括 multipart 所需的 `Content-Type`。
//! 3. 范围请求（Range Requests）的解析。
//! 4. 请求体（Body）的流式访问，请求体只能被取走一次。

use crate::{exception::Exception, param::*};

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf};

use std::{
    fmt,
    io::{self, Cursor},
    pin::Pin,
    task::{Context, Poll},
};

/// 请求体：任意异步字节流。
pub struct Body {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_reader(tokio::io::empty())
    }

    pub fn from_reader<R: AsyncRead + Send + Sync + 'static>(reader: R) -> Self {
        Self {
            inner: Box::pin(reader),
        }
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body { .. }")
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::from(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::from(Bytes::from_static(s.as_bytes()))
    }
}

/// 表示一个 HTTP 请求：请求头元数据加上尚未读取的请求体。
#[derive(Debug)]
pub struct Request {
    /// 请求 ID，用于在多任务环境下追踪日志
    id: u128,
    /// HTTP 请求方法（GET, POST 等）
    method: HttpRequestMethod,
    /// 请求的资源路径（包含查询字符串）
    path: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端接受的内容类型（MIME）
    accept: Option<String>,
    /// 请求体的媒体类型，multipart 请求从中取得 boundary
    content_type: Option<String>,
    /// 请求体长度
    content_length: Option<u64>,
    /// 范围请求参数：(起始字节, 结束字节)
    /// 其中结束字节为 `None` 表示请求从起始位置到文件末尾的所有数据。
    range: Option<(u64, Option<u64>)>,
    body: Body,
}

impl Request {
    /// 构造一个没有请求头、请求体为空的请求，主要供宿主程序和测试使用。
    pub fn new(method: HttpRequestMethod, path: &str) -> Self {
        Self {
            id: 0,
            method,
            path: path.to_string(),
            version: HttpVersion::V1_1,
            user_agent: String::new(),
            accept: None,
            content_type: None,
            content_length: None,
            range: None,
            body: Body::empty(),
        }
    }

    /// 从完整的请求字节缓冲区构建 `Request`。
    ///
    /// # 逻辑步骤
    /// 1. 以第一个空行切分请求头与请求体。
    /// 2. 验证请求头是合法的 UTF-8 字符串。
    /// 3. 解析请求行和各个标头。
    /// 4. 空行之后的全部字节作为请求体。
    ///
    /// # 参数
    /// * `buffer` - 完整的请求报文。
    /// * `id` - 全局请求 ID，用于日志追踪。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, body) = match find_head_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + 4..]),
            None => (buffer, &[][..]),
        };
        let head = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                debug!("[ID{}]请求头不是合法的UTF-8", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let lines: Vec<&str> = head.split(CRLF).collect();
        let mut request = Self::parse_head(&lines, id)?;
        request.body = Body::from(Bytes::copy_from_slice(body));
        Ok(request)
    }

    /// 从异步字节流中读取请求头，剩余部分按 `Content-Length` 作为流式请求体。
    ///
    /// 请求头最多读取 16 KiB，超出视为畸形请求。没有 `Content-Length` 的请求体为空。
    pub async fn read_from<R>(reader: R, id: u128) -> Result<Self, Exception>
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        let mut reader = BufReader::new(reader);
        let mut lines = Vec::new();
        let mut head_bytes = 0usize;
        loop {
            let mut raw = Vec::new();
            // 上限在读取过程中生效，没有换行的超长行不会被整个读入内存
            let remaining = (MAX_HEAD_BYTES - head_bytes + 1) as u64;
            let n = (&mut reader)
                .take(remaining)
                .read_until(b'\n', &mut raw)
                .await
                .map_err(|e| Exception::io("read request head", e))?;
            if n == 0 {
                return Err(Exception::MalformedRequest("connection closed before end of head"));
            }
            head_bytes += n;
            if head_bytes > MAX_HEAD_BYTES {
                return Err(Exception::MalformedRequest("request head too large"));
            }
            let line = String::from_utf8(raw).map_err(|_| Exception::RequestIsNotUtf8)?;
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if line.is_empty() {
                if lines.is_empty() {
                    // 请求之间多余的空行
                    continue;
                }
                break;
            }
            lines.push(line);
        }
        let lines: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let mut request = Self::parse_head(&lines, id)?;
        let length = request.content_length.unwrap_or(0);
        trace!("[ID{}]请求体长度: {}", id, length);
        request.body = Body::from_reader(reader.take(length));
        Ok(request)
    }

    fn parse_head(lines: &[&str], id: u128) -> Result<Self, Exception> {
        let request_line = match lines.first() {
            Some(line) if !line.is_empty() => *line,
            _ => return Err(Exception::MalformedRequest("missing request line")),
        };

        // 1. 解析请求行 (e.g., "POST /upload HTTP/1.1")
        let first_line_parts: Vec<&str> = request_line.split(' ').collect();
        if first_line_parts.len() < 3 {
            debug!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::UnSupportedRequestMethod);
        }

        // 解析方法名
        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                debug!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        // 解析协议版本
        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                debug!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 解析路径（路径中含空格虽不规范，但通过 join 尝试恢复）
        let path = first_line_parts[1..first_line_parts.len() - 1].join(" ");

        let mut request = Self::new(method, &path);
        request.id = id;
        request.version = version;

        // 2. 迭代各行解析 Headers，名称大小写不敏感
        for line in &lines[1..] {
            let (name, value) = match line.split_once(':') {
                Some((n, v)) => (n.trim().to_lowercase(), v.trim()),
                None => continue,
            };
            match name.as_str() {
                "user-agent" => request.user_agent = value.to_string(),
                "accept" => request.accept = Some(value.to_string()),
                "content-type" => request.content_type = Some(value.to_string()),
                "content-length" => request.content_length = value.parse::<u64>().ok(),
                // 格式示例: Range: bytes=0-1023
                "range" => request.range = parse_range(value),
                _ => {}
            }
        }
        Ok(request)
    }

    /// 取走请求体。之后再次调用将得到一个空请求体。
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn set_range(&mut self, range: Option<(u64, Option<u64>)>) -> &mut Self {
        self.range = range;
        self
    }
}

/// 解析 RFC 7233 单区间范围：`bytes=a-b` 或 `bytes=a-`
fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let bytes_part = value.strip_prefix("bytes=")?;
    let (start, end) = bytes_part.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        e => Some(e.parse::<u64>().ok()?),
    };
    Some((start, end))
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求路径（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端接受的文件 MIME 类型
    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// 获取 Range 请求的分片范围
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        self.range
    }
}
