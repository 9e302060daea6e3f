// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 文件上传模块
//!
//! 处理 `multipart/form-data` 请求体，将其中的每个文件按表单顺序保存到目标目录。
//!
//! ## 处理流程
//! 1. 解析配置快照，确保目标目录存在。
//! 2. 将请求体写入匿名临时文件，超过 `max_upload_bytes` 立即失败，此时还没有检查任何文件。
//! 3. 依次读取每个文件分段：收集前 512 字节嗅探 MIME 类型并与允许列表比对，
//!    然后把这段前缀和剩余数据一起写入目标文件。
//! 4. 任何一个分段失败都会中止整批上传，已经保存的文件随错误一并返回，不会被删除。

use std::{fmt, path::Path};

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use serde_derive::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;

use crate::{
    config::ResolvedConfig,
    exception::Exception,
    param::{RANDOM_NAME_LENGTH, SNIFF_LEN},
    random::{random_string, OsEntropy},
    request::{Body, Request},
    sniff::detect_content_type,
    toolkit::Toolkit,
    util::{base_name, create_dir_if_not_exist, file_extension, format_file_size},
};

/// 一个已经保存到磁盘的上传文件。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    new_file_name: String,
    original_file_name: String,
    file_size: u64,
}

impl UploadedFile {
    /// 磁盘上的文件名（位于目标目录内）
    pub fn new_file_name(&self) -> &str {
        &self.new_file_name
    }

    /// 客户端提交的文件名，只保留最后一个路径成分
    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    /// 实际写入磁盘的字节数
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

/// 批量上传失败：失败原因以及失败前已经保存的文件。
///
/// 已保存的文件仍在磁盘上，需要原子性的调用方可以据此自行清理。
#[derive(Debug)]
pub struct UploadBatchError {
    uploaded: Vec<UploadedFile>,
    cause: Exception,
}

impl UploadBatchError {
    pub fn uploaded(&self) -> &[UploadedFile] {
        &self.uploaded
    }

    pub fn cause(&self) -> &Exception {
        &self.cause
    }

    pub fn into_parts(self) -> (Vec<UploadedFile>, Exception) {
        (self.uploaded, self.cause)
    }
}

impl From<Exception> for UploadBatchError {
    fn from(cause: Exception) -> Self {
        Self {
            uploaded: Vec::new(),
            cause,
        }
    }
}

impl fmt::Display for UploadBatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for UploadBatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl Toolkit {
    /// 保存请求中的所有上传文件。
    ///
    /// `rename` 默认为 `true`：使用 25 位随机字符串加原扩展名作为新文件名。
    /// 为 `false` 时直接使用客户端提交的文件名，同名文件会被覆盖。
    ///
    /// 内容为空的文件部分不算错误：嗅探结果为 `text/plain; charset=utf-8`，
    /// 保存为 0 字节的文件，`file_size` 为 0。
    pub async fn upload_files(
        &self,
        request: &mut Request,
        dir: &Path,
        rename: Option<bool>,
    ) -> Result<Vec<UploadedFile>, UploadBatchError> {
        let id = request.id();
        let config = self.config().resolve();
        let rename = rename.unwrap_or(true);

        create_dir_if_not_exist(dir).await?;

        let boundary = multer::parse_boundary(request.content_type().unwrap_or(""))
            .map_err(|e| Exception::InvalidMultipart(e.to_string()))?;
        let spool = spool_body(request.take_body(), config.max_upload_bytes()).await?;
        let mut multipart = multer::Multipart::new(ReaderStream::new(spool), boundary);

        let mut uploaded = Vec::new();
        loop {
            let mut field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    return Err(UploadBatchError {
                        uploaded,
                        cause: multipart_error(e),
                    })
                }
            };
            let original = match field.file_name().map(base_name) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    trace!("[ID{}]跳过非文件字段 {:?}", id, field.name());
                    continue;
                }
            };
            match store_part(&mut field, &original, dir, rename, &config).await {
                Ok(file) => {
                    debug!(
                        "[ID{}]已保存上传文件 {} -> {}，{}",
                        id,
                        file.original_file_name,
                        file.new_file_name,
                        format_file_size(file.file_size)
                    );
                    uploaded.push(file);
                }
                Err(cause) => {
                    debug!("[ID{}]上传文件 {} 失败：{}", id, original, cause);
                    return Err(UploadBatchError { uploaded, cause });
                }
            }
        }
        Ok(uploaded)
    }

    /// 只保存一个文件的便捷版本，返回表单中的第一个文件。
    ///
    /// 表单中没有任何文件时返回 [`Exception::NoFilesUploaded`]。
    pub async fn upload_one_file(
        &self,
        request: &mut Request,
        dir: &Path,
        rename: Option<bool>,
    ) -> Result<UploadedFile, UploadBatchError> {
        let mut files = self.upload_files(request, dir, rename).await?;
        if files.is_empty() {
            return Err(Exception::NoFilesUploaded.into());
        }
        Ok(files.swap_remove(0))
    }
}

/// 把请求体完整写入匿名临时文件，并回到文件开头。
async fn spool_body(body: Body, limit: u64) -> Result<File, Exception> {
    let spool = tempfile::tempfile().map_err(|e| Exception::io("create spool file", e))?;
    let mut spool = File::from_std(spool);
    let mut limited = body.take(limit.saturating_add(1));
    let copied = tokio::io::copy(&mut limited, &mut spool)
        .await
        .map_err(|e| Exception::io("read request body", e))?;
    if copied > limit {
        return Err(Exception::BodyTooLarge { limit });
    }
    spool
        .rewind()
        .await
        .map_err(|e| Exception::io("rewind spool file", e))?;
    Ok(spool)
}

/// 保存单个文件分段。类型不被允许时不会创建目标文件。
async fn store_part(
    field: &mut multer::Field<'_>,
    original: &str,
    dir: &Path,
    rename: bool,
    config: &ResolvedConfig,
) -> Result<UploadedFile, Exception> {
    let mut head = BytesMut::with_capacity(SNIFF_LEN);
    let mut rest: Option<Bytes> = None;
    while head.len() < SNIFF_LEN {
        let Some(chunk) = field.chunk().await.map_err(multipart_error)? else {
            break;
        };
        let need = SNIFF_LEN - head.len();
        if chunk.len() > need {
            head.extend_from_slice(&chunk[..need]);
            rest = Some(chunk.slice(need..));
        } else {
            head.extend_from_slice(&chunk);
        }
    }

    let detected = detect_content_type(&head);
    if !config.is_type_allowed(detected) {
        return Err(Exception::TypeNotAllowed {
            detected: detected.to_string(),
        });
    }

    let new_file_name = if rename {
        format!(
            "{}{}",
            random_string(&mut OsEntropy, RANDOM_NAME_LENGTH)?,
            file_extension(original)
        )
    } else {
        original.to_string()
    };
    let path = dir.join(&new_file_name);
    let mut out = File::create(&path)
        .await
        .map_err(|e| Exception::io("create destination file", e))?;

    let mut file_size = 0u64;
    let copied = async {
        out.write_all(&head)
            .await
            .map_err(|e| Exception::io("write destination file", e))?;
        file_size += head.len() as u64;
        if let Some(chunk) = rest {
            out.write_all(&chunk)
                .await
                .map_err(|e| Exception::io("write destination file", e))?;
            file_size += chunk.len() as u64;
        }
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            out.write_all(&chunk)
                .await
                .map_err(|e| Exception::io("write destination file", e))?;
            file_size += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| Exception::io("flush destination file", e))
    }
    .await;

    if let Err(e) = copied {
        drop(out);
        // 不留下写了一半的文件
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    Ok(UploadedFile {
        new_file_name,
        original_file_name: original.to_string(),
        file_size,
    })
}

fn multipart_error(e: multer::Error) -> Exception {
    match e {
        multer::Error::StreamReadFailed(source) => {
            Exception::io("read multipart stream", std::io::Error::other(source))
        }
        other => Exception::InvalidMultipart(other.to_string()),
    }
}
