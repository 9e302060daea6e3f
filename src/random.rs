// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 随机字符串模块
//!
//! 从固定的 64 符号字母表中生成随机字符串，用于上传文件的重命名。
//! 熵来自操作系统的 CSPRNG；熵源失败时直接返回错误，不会退化为弱随机数。
//! 下标选择采用拒绝采样，保证每个符号被选中的概率完全相同。

use rand::{rngs::OsRng, RngCore};

use crate::{exception::Exception, param::RANDOM_STRING_SOURCE};

/// 随机字节的来源。
#[cfg_attr(test, mockall::automock)]
pub trait EntropySource {
    /// 用随机字节填满 `buf`
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), Exception>;
}

/// 操作系统提供的密码学安全随机源。
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), Exception> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| Exception::RandomSourceFailed(e.to_string()))
    }
}

/// 生成长度恰好为 `length` 的随机字符串。
pub fn random_string<E: EntropySource + ?Sized>(
    source: &mut E,
    length: usize,
) -> Result<String, Exception> {
    let alphabet = RANDOM_STRING_SOURCE.as_bytes();
    let symbols = alphabet.len();
    // 大于等于 limit 的字节会引入取模偏差，直接丢弃
    let limit = 256 - (256 % symbols);

    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        source.fill(&mut buf)?;
        for &byte in buf.iter() {
            let byte = byte as usize;
            if byte >= limit {
                continue;
            }
            out.push(alphabet[byte % symbols] as char);
            if out.len() == length {
                break;
            }
        }
    }
    Ok(out)
}
