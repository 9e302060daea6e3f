// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了工具包在解析请求、处理上传、编解码 JSON 以及提供下载时可能返回的各类异常。
//!
//! ## 设计意图
//! - **错误分类**：每个变体都带有一个离散的 [`ErrorKind`] 标签，调用方可以据此分支处理。
//! - **附带元数据**：字节偏移、字段名、字节上限、嗅探到的类型等信息随变体一同返回。
//! - **语义映射**：[`Exception::status_code`] 给出建议的 HTTP 状态码，便于宿主直接生成响应。
//! - **用户友好**：`Display` 输出的文本可以直接放进 JSON 信封的 `message` 字段。

use std::{error::Error, fmt, io, path::PathBuf};

/// 工具包处理过程中发生的异常类型。
#[derive(Debug)]
pub enum Exception {
    /// 请求头字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了暂不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求头结构不完整、过长或请求行缺失。
    MalformedRequest(&'static str),
    /// 下载的目标文件不存在（或是一个目录）。
    FileNotFound,
    /// 下载的文件名包含 `..` 或绝对路径成分。
    InvalidPath,
    /// 上传目录不存在且无法创建。
    DirectoryCreateFailed { path: PathBuf, source: io::Error },
    /// 请求体超过了配置的字节上限（上传和 JSON 共用）。
    BodyTooLarge { limit: u64 },
    /// 嗅探得到的类型不在允许列表中。
    TypeNotAllowed { detected: String },
    /// multipart 请求体缺少边界或结构损坏。
    InvalidMultipart(String),
    /// `upload_one_file` 没有在表单中找到任何文件。
    NoFilesUploaded,
    /// 打开、读取、定位、复制或创建文件/流时失败。
    Io { context: &'static str, source: io::Error },
    /// 系统熵源不可用。
    RandomSourceFailed(String),
    /// JSON 语法错误，附带出错位置的字节偏移。
    JsonSyntax { offset: u64 },
    /// JSON 在一个值结束前被截断。
    JsonTruncated,
    /// JSON 值的类型与目标字段不符。
    JsonTypeMismatch { field: Option<String>, offset: u64 },
    /// 请求体为空。
    JsonEmptyBody,
    /// 请求体包含目标结构中不存在的字段。
    JsonUnknownField { field: String },
    /// 请求体中第一个 JSON 值之后还有其他内容。
    JsonMultipleValues,
    /// 目标结构无法由该请求体构建（缺少必需字段、自定义校验失败等）。
    JsonInvalidTarget { reason: String },
    /// 响应数据无法序列化为 JSON。
    JsonSerialize(serde_json::Error),
    /// slug 的输入为空字符串。
    EmptySlugInput,
    /// 去除非法字符后 slug 为空。
    EmptySlug,
}

/// 异常的离散分类标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    FileNotFound,
    InvalidPath,
    DirectoryCreateFailed,
    BodyTooLarge,
    TypeNotAllowed,
    InvalidMultipart,
    NoFilesUploaded,
    IoFailure,
    RandomSourceFailed,
    JsonSyntax,
    JsonTruncated,
    JsonTypeMismatch,
    JsonEmptyBody,
    JsonUnknownField,
    JsonMultipleValues,
    JsonInvalidTarget,
    JsonSerialize,
    InvalidSlug,
}

impl ErrorKind {
    /// 返回分类标签的 kebab-case 名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid-request",
            ErrorKind::FileNotFound => "file-not-found",
            ErrorKind::InvalidPath => "invalid-path",
            ErrorKind::DirectoryCreateFailed => "directory-create-failed",
            ErrorKind::BodyTooLarge => "body-too-large",
            ErrorKind::TypeNotAllowed => "type-not-allowed",
            ErrorKind::InvalidMultipart => "invalid-multipart",
            ErrorKind::NoFilesUploaded => "no-files-uploaded",
            ErrorKind::IoFailure => "io-failure",
            ErrorKind::RandomSourceFailed => "random-source-failed",
            ErrorKind::JsonSyntax => "json-syntax",
            ErrorKind::JsonTruncated => "json-truncated",
            ErrorKind::JsonTypeMismatch => "json-type-mismatch",
            ErrorKind::JsonEmptyBody => "json-empty-body",
            ErrorKind::JsonUnknownField => "json-unknown-field",
            ErrorKind::JsonMultipleValues => "json-multiple-values",
            ErrorKind::JsonInvalidTarget => "json-invalid-target",
            ErrorKind::JsonSerialize => "json-serialize",
            ErrorKind::InvalidSlug => "invalid-slug",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Exception::*;

impl Exception {
    /// 为底层 I/O 错误附加操作描述
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Io { context, source }
    }

    /// 返回该异常的分类标签
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestIsNotUtf8
            | UnSupportedRequestMethod
            | UnsupportedHttpVersion
            | MalformedRequest(_) => ErrorKind::InvalidRequest,
            FileNotFound => ErrorKind::FileNotFound,
            InvalidPath => ErrorKind::InvalidPath,
            DirectoryCreateFailed { .. } => ErrorKind::DirectoryCreateFailed,
            BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            TypeNotAllowed { .. } => ErrorKind::TypeNotAllowed,
            InvalidMultipart(_) => ErrorKind::InvalidMultipart,
            NoFilesUploaded => ErrorKind::NoFilesUploaded,
            Io { .. } => ErrorKind::IoFailure,
            RandomSourceFailed(_) => ErrorKind::RandomSourceFailed,
            JsonSyntax { .. } => ErrorKind::JsonSyntax,
            JsonTruncated => ErrorKind::JsonTruncated,
            JsonTypeMismatch { .. } => ErrorKind::JsonTypeMismatch,
            JsonEmptyBody => ErrorKind::JsonEmptyBody,
            JsonUnknownField { .. } => ErrorKind::JsonUnknownField,
            JsonMultipleValues => ErrorKind::JsonMultipleValues,
            JsonInvalidTarget { .. } => ErrorKind::JsonInvalidTarget,
            JsonSerialize(_) => ErrorKind::JsonSerialize,
            EmptySlugInput | EmptySlug => ErrorKind::InvalidSlug,
        }
    }

    /// 建议的 HTTP 响应状态码。
    ///
    /// 服务端自身的故障（文件系统、熵源、序列化）映射为 500，其余客户端输入问题映射为 4xx。
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::BodyTooLarge => 413,
            ErrorKind::TypeNotAllowed => 415,
            ErrorKind::FileNotFound => 404,
            ErrorKind::DirectoryCreateFailed
            | ErrorKind::IoFailure
            | ErrorKind::RandomSourceFailed
            | ErrorKind::JsonSerialize => 500,
            _ => 400,
        }
    }
}

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
///
/// 这些描述信息会作为 `error_json` 信封中的 `message` 返回给客户端。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest(reason) => write!(f, "Malformed request: {}", reason),
            FileNotFound => write!(f, "File not found (404)"),
            InvalidPath => write!(f, "Invalid path (400)"),
            DirectoryCreateFailed { path, source } => {
                write!(f, "unable to create directory {}: {}", path.display(), source)
            }
            BodyTooLarge { limit } => write!(f, "body must not be larger than {} bytes", limit),
            TypeNotAllowed { detected } => {
                write!(f, "the uploaded file type is not permitted ({})", detected)
            }
            InvalidMultipart(reason) => write!(f, "invalid multipart form: {}", reason),
            NoFilesUploaded => write!(f, "no files were uploaded"),
            Io { context, source } => write!(f, "{}: {}", context, source),
            RandomSourceFailed(reason) => {
                write!(f, "unable to read from the system entropy source: {}", reason)
            }
            JsonSyntax { offset } => write!(
                f,
                "body contains badly-formed JSON (at character {})",
                offset
            ),
            JsonTruncated => write!(f, "body contains badly-formed JSON"),
            JsonTypeMismatch {
                field: Some(field), ..
            } => write!(f, "body contains incorrect JSON type for field {:?}", field),
            JsonTypeMismatch { field: None, offset } => write!(
                f,
                "body contains incorrect JSON type (at character {})",
                offset
            ),
            JsonEmptyBody => write!(f, "body must not be empty"),
            JsonUnknownField { field } => write!(f, "body contains unknown key {:?}", field),
            JsonMultipleValues => write!(f, "body must contain only one JSON value"),
            JsonInvalidTarget { reason } => write!(f, "error unmarshaling JSON: {}", reason),
            JsonSerialize(e) => write!(f, "unable to serialize JSON response: {}", e),
            EmptySlugInput => write!(f, "empty string not permitted"),
            EmptySlug => write!(f, "after removing characters, slug is zero length"),
        }
    }
}

impl Error for Exception {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DirectoryCreateFailed { source, .. } | Io { source, .. } => Some(source),
            JsonSerialize(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_messages() {
        assert_eq!(
            JsonSyntax { offset: 8 }.to_string(),
            "body contains badly-formed JSON (at character 8)"
        );
        assert_eq!(
            JsonUnknownField {
                field: "unexpected".to_string()
            }
            .to_string(),
            "body contains unknown key \"unexpected\""
        );
        assert_eq!(
            JsonTypeMismatch {
                field: Some("foo".to_string()),
                offset: 9
            }
            .to_string(),
            "body contains incorrect JSON type for field \"foo\""
        );
        assert_eq!(
            BodyTooLarge { limit: 1024 }.to_string(),
            "body must not be larger than 1024 bytes"
        );
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(JsonMultipleValues.kind().as_str(), "json-multiple-values");
        assert_eq!(EmptySlug.kind(), ErrorKind::InvalidSlug);
        assert_eq!(
            Exception::io("copy", io::Error::other("boom")).kind(),
            ErrorKind::IoFailure
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BodyTooLarge { limit: 1 }.status_code(), 413);
        assert_eq!(
            TypeNotAllowed {
                detected: "image/gif".to_string()
            }
            .status_code(),
            415
        );
        assert_eq!(FileNotFound.status_code(), 404);
        assert_eq!(JsonEmptyBody.status_code(), 400);
        assert_eq!(RandomSourceFailed("gone".to_string()).status_code(), 500);
    }

    #[test]
    fn test_io_source_is_exposed() {
        let e = Exception::io("create destination file", io::Error::other("disk full"));
        assert!(e.source().is_some());
        assert_eq!(e.to_string(), "create destination file: disk full");
    }
}
