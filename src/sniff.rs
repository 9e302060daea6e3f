// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 内容嗅探模块
//!
//! 根据文件前 512 字节推断 MIME 类型，而不是信任客户端提交的 `Content-Type`。
//! 签名表遵循 WHATWG MIME Sniffing 标准（<https://mimesniff.spec.whatwg.org/>），
//! 匹配顺序即表中顺序；都不匹配时，无二进制字节的内容视为纯文本，否则为
//! `application/octet-stream`。

use lazy_static::lazy_static;

use crate::param::{OCTET_STREAM, SNIFF_LEN};

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// 一条嗅探签名
enum Signature {
    /// HTML 标签：跳过前导空白，大小写不敏感，后面必须跟空格或 `>`
    Html(&'static [u8]),
    /// 带掩码的字节模式
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        content_type: &'static str,
    },
    /// 精确前缀
    Exact {
        prefix: &'static [u8],
        content_type: &'static str,
    },
    /// ISO 基础媒体文件格式中的 mp4 品牌
    Mp4,
    /// 兜底的纯文本判断
    Text,
}

const fn exact(prefix: &'static [u8], content_type: &'static str) -> Signature {
    Signature::Exact {
        prefix,
        content_type,
    }
}

const fn masked(
    mask: &'static [u8],
    pattern: &'static [u8],
    content_type: &'static str,
) -> Signature {
    Signature::Masked {
        mask,
        pattern,
        skip_ws: false,
        content_type,
    }
}

lazy_static! {
    static ref SIGNATURES: Vec<Signature> = vec![
        Signature::Html(b"<!DOCTYPE HTML"),
        Signature::Html(b"<HTML"),
        Signature::Html(b"<HEAD"),
        Signature::Html(b"<SCRIPT"),
        Signature::Html(b"<IFRAME"),
        Signature::Html(b"<H1"),
        Signature::Html(b"<DIV"),
        Signature::Html(b"<FONT"),
        Signature::Html(b"<TABLE"),
        Signature::Html(b"<A"),
        Signature::Html(b"<STYLE"),
        Signature::Html(b"<TITLE"),
        Signature::Html(b"<B"),
        Signature::Html(b"<BODY"),
        Signature::Html(b"<BR"),
        Signature::Html(b"<P"),
        Signature::Html(b"<!--"),
        Signature::Masked {
            mask: b"\xFF\xFF\xFF\xFF\xFF",
            pattern: b"<?xml",
            skip_ws: true,
            content_type: "text/xml; charset=utf-8",
        },
        exact(b"%PDF-", "application/pdf"),
        exact(b"%!PS-Adobe-", "application/postscript"),
        // 字节序标记
        masked(b"\xFF\xFF", b"\xFE\xFF", "text/plain; charset=utf-16be"),
        masked(b"\xFF\xFF", b"\xFF\xFE", "text/plain; charset=utf-16le"),
        masked(b"\xFF\xFF\xFF", b"\xEF\xBB\xBF", TEXT_PLAIN_UTF8),
        // 图片
        exact(b"\x00\x00\x01\x00", "image/x-icon"),
        exact(b"\x00\x00\x02\x00", "image/x-icon"),
        exact(b"BM", "image/bmp"),
        exact(b"GIF87a", "image/gif"),
        exact(b"GIF89a", "image/gif"),
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00WEBPVP",
            "image/webp",
        ),
        exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
        exact(b"\xFF\xD8\xFF", "image/jpeg"),
        // 音视频
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"FORM\x00\x00\x00\x00AIFF",
            "audio/aiff",
        ),
        masked(b"\xFF\xFF\xFF", b"ID3", "audio/mpeg"),
        masked(b"\xFF\xFF\xFF\xFF\xFF", b"OggS\x00", "application/ogg"),
        masked(
            b"\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF",
            b"MThd\x00\x00\x00\x06",
            "audio/midi",
        ),
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00AVI ",
            "video/avi",
        ),
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00WAVE",
            "audio/wave",
        ),
        Signature::Mp4,
        exact(b"\x1A\x45\xDF\xA3", "video/webm"),
        // 字体
        exact(b"\x00\x01\x00\x00", "font/ttf"),
        exact(b"OTTO", "font/otf"),
        exact(b"ttcf", "font/collection"),
        exact(b"wOFF", "font/woff"),
        exact(b"wOF2", "font/woff2"),
        // 压缩包
        exact(b"\x1F\x8B\x08", "application/x-gzip"),
        exact(b"PK\x03\x04", "application/zip"),
        exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
        exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
        exact(b"\x00\x61\x73\x6D", "application/wasm"),
        Signature::Text,
    ];
}

/// 根据数据前缀推断 MIME 类型。超过 512 字节的部分会被忽略。
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data
        .iter()
        .position(|b| !is_whitespace(*b))
        .unwrap_or(data.len());

    SIGNATURES
        .iter()
        .find_map(|sig| sig.matches(data, first_non_ws))
        .unwrap_or(OCTET_STREAM)
}

impl Signature {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = &data[first_non_ws..];
                if data.len() < tag.len() + 1 {
                    return None;
                }
                for (i, &expected) in tag.iter().enumerate() {
                    let mut actual = data[i];
                    if expected.is_ascii_uppercase() {
                        actual &= 0xDF;
                    }
                    if actual != expected {
                        return None;
                    }
                }
                // 标签后必须紧跟一个结束字节
                match data[tag.len()] {
                    b' ' | b'>' => Some("text/html; charset=utf-8"),
                    _ => None,
                }
            }
            Signature::Masked {
                mask,
                pattern,
                skip_ws,
                content_type,
            } => {
                let data = if *skip_ws { &data[first_non_ws..] } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                let hit = pattern
                    .iter()
                    .zip(mask.iter())
                    .zip(data.iter())
                    .all(|((p, m), d)| d & m == *p);
                hit.then_some(*content_type)
            }
            Signature::Exact {
                prefix,
                content_type,
            } => data.starts_with(prefix).then_some(*content_type),
            Signature::Mp4 => match_mp4(data),
            Signature::Text => {
                let binary = data[first_non_ws..].iter().any(|b| is_binary(*b));
                (!binary).then_some(TEXT_PLAIN_UTF8)
            }
        }
    }
}

fn match_mp4(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 {
        return None;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 {
        return None;
    }
    if &data[4..8] != b"ftyp" {
        return None;
    }
    // 从第 8 字节开始每 4 字节一个品牌，第 12 字节处是次版本号
    (8..box_size)
        .step_by(4)
        .filter(|&st| st != 12)
        .any(|st| &data[st..st + 3] == b"mp4")
        .then_some("video/mp4")
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
