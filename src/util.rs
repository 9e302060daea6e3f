// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{
    io,
    path::{Component, Path},
};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::{exception::Exception, param::UPLOAD_DIR_MODE};

lazy_static! {
    static ref SLUG_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid");
}

/// 生成 URL slug：转小写，非 `[a-z0-9]` 的连续字符替换为 `-`，再去掉首尾的 `-`。
pub fn slugify(s: &str) -> Result<String, Exception> {
    if s.is_empty() {
        return Err(Exception::EmptySlugInput);
    }
    let lower = s.to_lowercase();
    let slug = SLUG_SEPARATORS
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        return Err(Exception::EmptySlug);
    }
    Ok(slug)
}

/// 创建目录及其所有父目录（unix 下权限为 0755）。目录已存在时什么也不做。
pub async fn create_dir_if_not_exist(path: &Path) -> Result<(), Exception> {
    let failed = |source: io::Error| Exception::DirectoryCreateFailed {
        path: path.to_path_buf(),
        source,
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(failed(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists and is not a directory",
            )))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(failed(e)),
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(UPLOAD_DIR_MODE);
    builder.create(path).await.map_err(failed)?;
    debug!("已创建目录 {}", path.display());
    Ok(())
}

/// 文件名最后一个路径成分。`/` 和 `\` 都视为分隔符。
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// 文件扩展名（含前导的 `.`），没有扩展名时为空字符串
pub fn file_extension(name: &str) -> &str {
    let name = base_name(name);
    match name.rfind('.') {
        Some(i) => &name[i..],
        None => "",
    }
}

/// 文件名只能是目录内的相对路径，不允许 `..` 或根路径成分
pub fn is_contained(file: &str) -> bool {
    !file.is_empty()
        && Path::new(file)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
