// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # JSON 编解码模块
//!
//! - **读取**：请求体最多读取 `max_json_bytes` 字节，必须恰好包含一个 JSON 值；
//!   严格模式下目标结构中不存在的字段会导致失败。所有失败都被归类为 [`Exception`] 的某个 JSON 变体。
//! - **写出**：把任意可序列化的数据写成 `application/json` 响应；
//!   [`error_json`] 使用统一的 [`JsonResponse`] 信封。

use std::fmt;

use bytes::Bytes;
use log::debug;
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::error::Category;
use tokio::io::{AsyncReadExt, AsyncWrite};

use crate::{
    exception::Exception,
    param::JSON_CONTENT_TYPE,
    request::Request,
    response::{Headers, Response},
    toolkit::Toolkit,
};

/// 所有 JSON 响应使用的信封：`{"error": bool, "message": string, "data": ...}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonResponse<T = serde_json::Value> {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Toolkit {
    /// 按工具包配置读取并解码请求体
    pub async fn read_json<T: DeserializeOwned>(&self, request: &mut Request) -> Result<T, Exception> {
        self.read_json_with(request, None, None).await
    }

    /// 读取并解码请求体，`max_bytes` 和 `allow_unknown` 为 `None` 时使用工具包配置。
    ///
    /// 失败时请求体已经被消耗，解码目标不会被返回。
    pub async fn read_json_with<T: DeserializeOwned>(
        &self,
        request: &mut Request,
        max_bytes: Option<usize>,
        allow_unknown: Option<bool>,
    ) -> Result<T, Exception> {
        let config = self.config().resolve();
        let limit = max_bytes
            .filter(|n| *n > 0)
            .unwrap_or(config.max_json_bytes());
        let allow_unknown = allow_unknown.unwrap_or(config.allow_unknown_json_fields());

        let mut bytes = Vec::new();
        request
            .take_body()
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| Exception::io("read request body", e))?;
        debug!("[ID{}]读取 JSON 请求体 {} 字节", request.id(), bytes.len());
        decode_json(&bytes, limit, allow_unknown)
    }
}

/// 将一段完整的字节解码为恰好一个 JSON 值。
pub fn decode_json<T: DeserializeOwned>(
    bytes: &[u8],
    limit: usize,
    allow_unknown: bool,
) -> Result<T, Exception> {
    if bytes.len() > limit {
        return Err(Exception::BodyTooLarge {
            limit: limit as u64,
        });
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(Exception::JsonEmptyBody);
    }

    let mut unknown: Option<String> = None;
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let decoded: Result<T, _> = {
        // 只保留键名本身，与顶层未知字段的报告方式一致
        let mut record = |path: serde_ignored::Path<'_>| {
            if unknown.is_none() {
                unknown = Some(match path {
                    serde_ignored::Path::Map { key, .. } => key,
                    other => other.to_string(),
                });
            }
        };
        let tracked = serde_ignored::Deserializer::new(&mut de, &mut record);
        serde_path_to_error::deserialize(tracked)
    };

    let value = match decoded {
        Ok(value) => value,
        Err(e) => return Err(classify(bytes, e, unknown.filter(|_| !allow_unknown))),
    };
    if let (false, Some(field)) = (allow_unknown, unknown) {
        return Err(Exception::JsonUnknownField { field });
    }
    if de.end().is_err() {
        return Err(Exception::JsonMultipleValues);
    }
    Ok(value)
}

/// 语法和截断错误优先；其次是解码失败前已经遇到的未知字段。
fn classify(
    bytes: &[u8],
    err: serde_path_to_error::Error<serde_json::Error>,
    unknown: Option<String>,
) -> Exception {
    let path = err.path().to_string();
    let inner = err.into_inner();
    let offset = byte_offset(bytes, inner.line(), inner.column());
    match inner.classify() {
        Category::Syntax => Exception::JsonSyntax { offset },
        Category::Eof => Exception::JsonTruncated,
        Category::Io => Exception::io("decode JSON", inner.into()),
        Category::Data => {
            if let Some(field) = unknown {
                return Exception::JsonUnknownField { field };
            }
            let message = inner.to_string();
            if let Some(field) = message.strip_prefix("unknown field `") {
                let field = field.split('`').next().unwrap_or_default();
                return Exception::JsonUnknownField {
                    field: field.to_string(),
                };
            }
            let mismatch = ["invalid type", "invalid value", "invalid length", "unknown variant"]
                .iter()
                .any(|p| message.starts_with(p));
            if mismatch {
                let field = match path.as_str() {
                    "" | "." => None,
                    _ => Some(path),
                };
                Exception::JsonTypeMismatch { field, offset }
            } else {
                Exception::JsonInvalidTarget { reason: message }
            }
        }
    }
}

/// 由 1 起始的行号和列号换算出字节偏移
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> u64 {
    let line_start = if line <= 1 {
        0
    } else {
        bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line - 2)
            .map(|(i, _)| i + 1)
            .unwrap_or(bytes.len())
    };
    (line_start + column) as u64
}

/// 以 `status` 写出 JSON 响应。
///
/// `headers` 中的 `Content-Type`、`Content-Length`、`Date` 等由响应自己计算的头会被忽略，
/// `Content-Type` 总是 `application/json`。
pub async fn write_json<W, T>(
    sink: &mut W,
    status: u16,
    data: &T,
    headers: Option<&Headers>,
) -> Result<(), Exception>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: serde::Serialize + ?Sized,
{
    let body = serde_json::to_vec(data).map_err(Exception::JsonSerialize)?;
    let mut response = Response::new();
    response.set_code(status);
    if let Some(extra) = headers {
        response.headers_mut().extend(extra);
    }
    response
        .set_content_type(JSON_CONTENT_TYPE)
        .set_content(Bytes::from(body));
    response.write_to(sink).await
}

/// 写出 `{"error": true, "message": <err>}`，状态码默认为 400。
pub async fn error_json<W, E>(sink: &mut W, err: &E, status: Option<u16>) -> Result<(), Exception>
where
    W: AsyncWrite + Unpin + ?Sized,
    E: fmt::Display + ?Sized,
{
    let payload: JsonResponse = JsonResponse {
        error: true,
        message: err.to_string(),
        data: None,
    };
    write_json(sink, status.unwrap_or(400), &payload, None).await
}
