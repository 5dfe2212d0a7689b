//! # 内联图片提取模块
//!
//! ## 设计思路
//!
//! 远程桌面等来源的粘贴只携带富标记与其中的图片引用，没有任何二进制
//! 图片数据。本模块从布局提示里解析 `<img>` 引用：嵌入式 Data URL
//! 直接解码为二进制，网络地址通过注入的抓取器解析。
//!
//! 结构化解析是主路径；正则扫描只作为结构化解析无产出时的备用策略，
//! 避免在嵌套或畸形标记上误解析。
//!
//! ## 实现思路
//!
//! - 单个候选的解析失败记录警告后跳过，不中断整体提取。
//! - 网络响应仅保留声明类型为图片的，或类型缺失但响应体非空的
//!   （后者用字节签名补推子类型）。
//! - Data URL 解码后同样做签名校验，尽早拒绝非图片内容。

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::capability::CapabilityAdapter;
use crate::error::PasteError;
use crate::platform::{ClipboardPlatform, ResourceFetcher};

use super::image_source::{CandidateImage, dedup_candidates, is_image_media_type};
use super::{PasteEngine, PasteOptions, emit_warning};

static INLINE_IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// 正则备用扫描：仅在结构化解析无产出时使用。
static IMG_SRC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img[^>]*?\ssrc\s*=\s*["']?([^"'\s>]+)"#).unwrap());

/// 类型缺失且签名无法识别时采用的兜底子类型。
const SNIFF_FALLBACK_TYPE: &str = "image/png";

impl<A, P, F> PasteEngine<A, P, F>
where
    A: CapabilityAdapter,
    P: ClipboardPlatform,
    F: ResourceFetcher,
{
    /// 从布局提示提取内联图片候选。
    pub(crate) async fn extract_inline_images(
        &self,
        hint: &str,
        options: &PasteOptions,
    ) -> Vec<CandidateImage> {
        let sources = extract_img_sources(hint);
        let mut candidates = Vec::new();

        for src in sources {
            match self.resolve_inline_source(&src).await {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {
                    log::debug!("⏭️ 内联引用不可解析为图片，跳过：{}", redact_source(&src));
                }
                Err(err) => {
                    emit_warning(
                        &options.rasterization,
                        &format!("内联图片解析失败，跳过该候选：{}", redact_source(&src)),
                        Some(&err),
                    );
                }
            }
        }

        dedup_candidates(candidates)
    }

    /// 解析单个 `src` 引用。
    ///
    /// 返回 `Ok(None)` 表示该引用不是可用的图片来源（相对路径、
    /// 非图片响应、空响应体等），应静默跳过。
    async fn resolve_inline_source(&self, src: &str) -> Result<Option<CandidateImage>, PasteError> {
        if src.starts_with("data:") {
            return decode_data_url(src).map(Some);
        }

        if src.starts_with("http://") || src.starts_with("https://") {
            let fetched = self.fetcher.fetch(src).await?;

            return Ok(match fetched.media_type {
                Some(media_type) if is_image_media_type(&media_type) => Some(CandidateImage {
                    media_type,
                    bytes: fetched.bytes,
                    modified_at: None,
                }),
                Some(_) => None,
                None if !fetched.bytes.is_empty() => Some(CandidateImage {
                    media_type: sniff_media_type(&fetched.bytes),
                    bytes: fetched.bytes,
                    modified_at: None,
                }),
                None => None,
            });
        }

        Ok(None)
    }
}

/// 从标记中提取全部 `<img>` 的 `src` 引用。
fn extract_img_sources(hint: &str) -> Vec<String> {
    let parsed = Html::parse_document(hint);
    let structural: Vec<String> = parsed
        .select(&INLINE_IMG_SELECTOR)
        .filter_map(|element| element.value().attr("src"))
        .map(str::to_string)
        .collect();

    if !structural.is_empty() {
        return structural;
    }

    IMG_SRC_PATTERN
        .captures_iter(hint)
        .map(|capture| capture[1].to_string())
        .collect()
}

/// 解码一个图片 Data URL。
///
/// 支持 `data:<media-type>;base64,<payload>` 形式；类型段缺失时按
/// 兜底子类型处理。
fn decode_data_url(src: &str) -> Result<CandidateImage, PasteError> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| PasteError::InvalidFormat("不是 Data URL".to_string()))?;

    let marker = rest
        .find(";base64,")
        .ok_or_else(|| PasteError::InvalidFormat("Data URL 缺少 base64 标记".to_string()))?;

    let declared = rest[..marker].trim();
    let payload = &rest[marker + ";base64,".len()..];

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PasteError::Decode(format!("Data URL 解码失败：{}", e)))?;

    validate_image_bytes(&bytes)?;

    let media_type = if declared.is_empty() {
        sniff_media_type(&bytes)
    } else {
        declared.to_ascii_lowercase()
    };

    Ok(CandidateImage {
        media_type,
        bytes: Bytes::from(bytes),
        modified_at: None,
    })
}

/// 通过文件签名校验字节是否为图片。
fn validate_image_bytes(bytes: &[u8]) -> Result<(), PasteError> {
    if bytes.is_empty() {
        return Err(PasteError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| PasteError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(PasteError::InvalidFormat(format!(
            "内容签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 用字节签名补推媒体子类型。
fn sniff_media_type(bytes: &[u8]) -> String {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| SNIFF_FALLBACK_TYPE.to_string())
}

/// 日志用来源摘要：避免把超长 Data URL 整段写进日志。
fn redact_source(src: &str) -> String {
    const MAX_LOGGED: usize = 64;
    if src.len() <= MAX_LOGGED {
        return src.to_string();
    }

    let cut = src
        .char_indices()
        .take_while(|(idx, _)| *idx < MAX_LOGGED)
        .last()
        .map(|(idx, ch)| idx + ch.len_utf8())
        .unwrap_or(0);

    format!("{}…（共 {} 字符）", &src[..cut], src.len())
}
