// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod config;
pub mod exception;
pub mod json;
pub mod param;
pub mod random;
pub mod request;
pub mod response;
pub mod sniff;
pub mod toolkit;
pub mod upload;
pub mod util;

pub use config::{Config, ResolvedConfig, ToolkitConfig};
pub use exception::{ErrorKind, Exception};
pub use json::{decode_json, error_json, write_json, JsonResponse};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::{Body, Request};
pub use response::{Headers, Response};
pub use toolkit::Toolkit;
pub use upload::{UploadBatchError, UploadedFile};
