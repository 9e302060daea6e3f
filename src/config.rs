// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::param::{DEFAULT_MAX_JSON_BYTES, DEFAULT_MAX_UPLOAD_BYTES};

/// 工具包配置。
///
/// 所有字段都是普通的公开字段，由宿主在使用前设置一次。数值字段为 0 表示“未设置”，
/// 在每次调用开始时由 [`ToolkitConfig::resolve`] 解析为默认值，存储的配置本身不会被修改。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ToolkitConfig {
    /// 上传请求体的最大字节数，0 表示使用 1 GiB
    pub max_upload_bytes: u64,
    /// 允许的 MIME 类型（大小写不敏感），空表示全部允许
    pub allowed_types: Vec<String>,
    /// JSON 请求体的最大字节数，0 表示使用 1 MiB
    pub max_json_bytes: usize,
    /// 是否容忍目标结构中不存在的 JSON 字段
    pub allow_unknown_json_fields: bool,
}

/// 一次调用所使用的、已经填充默认值的不可变配置快照。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    max_upload_bytes: u64,
    allowed_types: Vec<String>,
    max_json_bytes: usize,
    allow_unknown_json_fields: bool,
}

impl ToolkitConfig {
    pub fn resolve(&self) -> ResolvedConfig {
        ResolvedConfig {
            max_upload_bytes: match self.max_upload_bytes {
                0 => DEFAULT_MAX_UPLOAD_BYTES,
                n => n,
            },
            allowed_types: self
                .allowed_types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            max_json_bytes: match self.max_json_bytes {
                0 => DEFAULT_MAX_JSON_BYTES,
                n => n,
            },
            allow_unknown_json_fields: self.allow_unknown_json_fields,
        }
    }
}

impl ResolvedConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn max_json_bytes(&self) -> usize {
        self.max_json_bytes
    }

    pub fn allow_unknown_json_fields(&self) -> bool {
        self.allow_unknown_json_fields
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }

    /// 判断嗅探到的类型是否被允许。允许列表为空时接受所有类型。
    pub fn is_type_allowed(&self, detected: &str) -> bool {
        self.allowed_types.is_empty()
            || self
                .allowed_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(detected))
    }
}

/// 演示服务器的运行配置，从 TOML 文件读取。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    worker_threads: usize,
    local: bool,
    #[serde(default = "default_upload_dir")]
    upload_dir: String,
    #[serde(default = "default_static_dir")]
    static_dir: String,
    #[serde(default)]
    toolkit: ToolkitConfig,
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 7878,
            worker_threads: 0,
            local: true,
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            toolkit: ToolkitConfig::default(),
        }
    }

    /// 从 TOML 文件读取配置。文件缺失或格式错误时记录日志并回退到默认配置。
    pub fn from_toml(filename: &str) -> Self {
        let mut str_val = String::new();
        let read = File::open(filename).and_then(|mut file| file.read_to_string(&mut str_val));
        let mut raw_config = match read {
            Ok(_) => match toml::from_str::<Config>(&str_val) {
                Ok(c) => c,
                Err(e) => {
                    error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                    Config::new()
                }
            },
            Err(e) => {
                error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.toolkit.allowed_types.is_empty() {
            warn!("allowed_types为空，上传接口将接受任意类型的文件");
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn upload_dir(&self) -> &str {
        &self.upload_dir
    }

    pub fn static_dir(&self) -> &str {
        &self.static_dir
    }

    pub fn toolkit(&self) -> &ToolkitConfig {
        &self.toolkit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fills_defaults() {
        let config = ToolkitConfig::default();
        let resolved = config.resolve();
        assert_eq!(resolved.max_upload_bytes(), 1 << 30);
        assert_eq!(resolved.max_json_bytes(), 1 << 20);
        assert!(!resolved.allow_unknown_json_fields());
        // 存储的配置保持未设置状态
        assert_eq!(config.max_upload_bytes, 0);
        assert_eq!(config.max_json_bytes, 0);
    }

    #[test]
    fn test_resolve_keeps_explicit_values() {
        let config = ToolkitConfig {
            max_upload_bytes: 10,
            allowed_types: vec!["Image/PNG".to_string()],
            max_json_bytes: 20,
            allow_unknown_json_fields: true,
        };
        let resolved = config.resolve();
        assert_eq!(resolved.max_upload_bytes(), 10);
        assert_eq!(resolved.max_json_bytes(), 20);
        assert!(resolved.allow_unknown_json_fields());
        assert_eq!(resolved.allowed_types(), &["image/png".to_string()]);
    }

    #[test]
    fn test_type_allowed_is_case_insensitive() {
        let config = ToolkitConfig {
            allowed_types: vec!["image/png".to_string(), "IMAGE/JPEG".to_string()],
            ..Default::default()
        };
        let resolved = config.resolve();
        assert!(resolved.is_type_allowed("image/png"));
        assert!(resolved.is_type_allowed("Image/Jpeg"));
        assert!(!resolved.is_type_allowed("image/gif"));
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let resolved = ToolkitConfig::default().resolve();
        assert!(resolved.is_type_allowed("application/octet-stream"));
        assert!(resolved.is_type_allowed("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_config_from_toml_str() {
        let raw = r#"
            port = 8080
            worker_threads = 2
            local = false
            upload_dir = "data/uploads"

            [toolkit]
            max_upload_bytes = 4096
            allowed_types = ["image/png"]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.upload_dir(), "data/uploads");
        assert_eq!(config.static_dir(), "static");
        assert_eq!(config.toolkit().max_upload_bytes, 4096);
        assert_eq!(config.toolkit().max_json_bytes, 0);
        assert!(!config.toolkit().allow_unknown_json_fields);
    }

    #[test]
    fn test_config_missing_file_falls_back() {
        let config = Config::from_toml("config/does-not-exist.toml");
        assert_eq!(config.port(), 7878);
        assert!(config.worker_threads() > 0);
    }
}
