//! # 图片来源采集模块
//!
//! ## 设计思路
//!
//! 三个来源按严格优先级尝试，任一来源产出至少一张图片即停止：
//! 1. 事件同步数据（粘贴事件直接携带的文件型条目）；
//! 2. 平台异步读取（仅在事件来源为空时）；
//! 3. 内联标记提取（仅在布局提示存在且前两个来源皆为空时）。
//!
//! 该顺序保证结果相对触发事件是确定的，也避免了二进制图片已存在时
//! 的多余网络活动。
//!
//! ## 实现思路
//!
//! - 候选去重按标识三元组（媒体子类型、字节长度、来源声明修改戳），
//!   不做内容比较。
//! - 平台条目逐个选出一个首选图片表示（固定偏好表，否则第一个图片
//!   子类型）；跨条目出现的第一个富标记表示在事件未提供提示时充当
//!   布局提示。
//! - 任何单来源、单候选的失败都记录警告并跳过，绝不中断整体采集。

use bytes::Bytes;
use std::collections::HashSet;

use crate::capability::CapabilityAdapter;
use crate::platform::{ClipboardPlatform, PasteEvent, PlatformItem, PlatformRepresentation, ResourceFetcher};

use super::text_merge::TextFormat;
use super::{PasteEngine, PasteOptions, emit_warning};

/// 平台条目图片表示的固定偏好表（按序）。
const PREFERRED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// 参与合成的一个候选图片。
#[derive(Debug, Clone)]
pub struct CandidateImage {
    /// 来源声明的媒体子类型。
    pub media_type: String,
    /// 不透明的二进制内容。
    pub bytes: Bytes,
    /// 来源声明的修改时间戳（毫秒），仅参与去重标识。
    pub modified_at: Option<u64>,
}

impl CandidateImage {
    /// 字节长度。
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// 去重标识三元组。
    fn identity(&self) -> (String, usize, Option<u64>) {
        (
            self.media_type.to_ascii_lowercase(),
            self.byte_len(),
            self.modified_at,
        )
    }
}

/// 判断媒体类型是否属于图片（允许携带参数部分）。
pub(crate) fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 按标识三元组去重，保持到达顺序。
pub(crate) fn dedup_candidates(candidates: Vec<CandidateImage>) -> Vec<CandidateImage> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.identity()))
        .collect()
}

/// 为一个平台条目选出首选图片表示。
fn select_preferred_image_representation(item: &PlatformItem) -> Option<&PlatformRepresentation> {
    for preferred in PREFERRED_IMAGE_TYPES {
        if let Some(rep) = item.representation(preferred) {
            return Some(rep);
        }
    }

    item.representations
        .iter()
        .find(|rep| is_image_media_type(&rep.media_type))
}

/// 一次图片采集的产出。
pub(crate) struct ImageCollection {
    /// 去重后的候选图片（可能为空）。
    pub(crate) candidates: Vec<CandidateImage>,
    /// 布局提示（事件优先，其次平台条目）。
    pub(crate) hint: Option<String>,
    /// 已读取的平台条目快照，供文本回退复用。
    ///
    /// 平台读取每次调用至多尝试一次；`None` 表示未尝试或尝试已失败，
    /// 后续路径不得再次读取条目。
    pub(crate) platform_items: Option<Vec<PlatformItem>>,
}

impl<A, P, F> PasteEngine<A, P, F>
where
    A: CapabilityAdapter,
    P: ClipboardPlatform,
    F: ResourceFetcher,
{
    /// 采集候选图片与可选的布局提示。
    pub(crate) async fn collect_candidate_images(
        &self,
        event: Option<&dyn PasteEvent>,
        options: &PasteOptions,
    ) -> ImageCollection {
        let mut hint: Option<String> = None;

        // 来源 1：事件同步数据。
        if let Some(event) = event {
            hint = event
                .string_data(TextFormat::Html.media_type())
                .filter(|markup| !markup.trim().is_empty());

            let event_candidates: Vec<CandidateImage> = event
                .file_entries()
                .into_iter()
                .filter(|entry| is_image_media_type(&entry.media_type))
                .map(|entry| CandidateImage {
                    media_type: entry.media_type.to_ascii_lowercase(),
                    bytes: entry.bytes,
                    modified_at: entry.modified_at,
                })
                .collect();

            let event_candidates = dedup_candidates(event_candidates);
            if !event_candidates.is_empty() {
                log::debug!("📋 事件来源产出 {} 个候选图片", event_candidates.len());
                return ImageCollection {
                    candidates: event_candidates,
                    hint,
                    platform_items: None,
                };
            }
        }

        // 来源 2：平台异步读取（仅在事件来源为空时，至多尝试一次）。
        let mut platform_candidates = Vec::new();
        let platform_items = match self.platform.read_items().await {
            Ok(items) => {
                for item in &items {
                    if hint.is_none() {
                        if let Some(rep) = item.representation(TextFormat::Html.media_type()) {
                            let markup = String::from_utf8_lossy(&rep.bytes).into_owned();
                            if !markup.trim().is_empty() {
                                hint = Some(markup);
                            }
                        }
                    }

                    if let Some(rep) = select_preferred_image_representation(item) {
                        platform_candidates.push(CandidateImage {
                            media_type: rep.media_type.to_ascii_lowercase(),
                            bytes: rep.bytes.clone(),
                            modified_at: None,
                        });
                    }
                }
                Some(items)
            }
            Err(err) => {
                emit_warning(
                    &options.rasterization,
                    "平台剪贴板读取失败，按空来源继续",
                    Some(&err),
                );
                None
            }
        };

        let platform_candidates = dedup_candidates(platform_candidates);
        if !platform_candidates.is_empty() {
            log::debug!("📋 平台读取产出 {} 个候选图片", platform_candidates.len());
            return ImageCollection {
                candidates: platform_candidates,
                hint,
                platform_items,
            };
        }

        // 来源 3：内联标记提取（仅在提示存在且前两个来源皆为空时）。
        let inline_candidates = match hint.as_deref() {
            Some(markup) => self.extract_inline_images(markup, options).await,
            None => Vec::new(),
        };

        if !inline_candidates.is_empty() {
            log::debug!("📋 内联提取产出 {} 个候选图片", inline_candidates.len());
        }

        ImageCollection {
            candidates: inline_candidates,
            hint,
            platform_items,
        }
    }
}
