//! # 粘贴归一化引擎（paste）
//!
//! ## 设计思路
//!
//! 该模块将“文本分桶合并 → 图片来源采集 → 布局推断 → 合成 / 栅格化回退”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `text_merge`：文本片段分桶与按格式合并
//! - `image_source`：三级优先来源的候选图片采集
//! - `inline`：内联 `<img>` 引用提取（结构化解析 + 正则备用）
//! - `layout`：行分组推断
//! - `compositor`：按布局合成单张编码图片
//! - `rasterize`：无二进制图片时的富标记栅格化回退
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型与入口操作，内部细节保持 `mod` 私有。
//! 协作方（能力适配器、平台剪贴板、资源抓取器）在构造引擎时注入，
//! 事件句柄按次传入，所有中间实体都是单次调用内创建、调用结束即弃。
//!
//! ## 调用链
//!
//! ```text
//! perform_paste(want_image, event, options)
//!    ├─ want_image = false ──► collect_text ──► TextFragmentBucket::merge
//!    └─ want_image = true ───► collect_candidate_images
//!         ├─ 0 张：有提示且启用 ──► render_markup_to_image（失败转文本回退）
//!         ├─ 1 张且无提示 ──► 原字节透传
//!         └─ 其余 ──► infer_row_structure ──► composite_candidates
//! ```

pub mod layout;
pub mod text_merge;

mod compositor;
mod image_source;
mod inline;
mod rasterize;

pub use image_source::CandidateImage;
pub use rasterize::{SnapshotPlan, VECTOR_MEDIA_TYPE};
pub use text_merge::{MergedTextPayload, TextFormat, TextFragmentBucket};

use std::fmt;
use std::sync::Arc;

use crate::capability::CapabilityAdapter;
use crate::error::PasteError;
use crate::platform::{ClipboardPlatform, PasteEvent, PlatformItem, ResourceFetcher};

/// 一张编码后的输出图片。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// 输出媒体类型。
    pub media_type: String,
    /// 编码字节。
    pub bytes: Vec<u8>,
}

/// 入口操作的归一化结果（带标签的两种形态，调用方按分支匹配）。
#[derive(Debug, Clone)]
pub enum PasteOutcome {
    /// 单张合成 / 透传 / 栅格化图片。
    Image(EncodedImage),
    /// 合并后的多格式文本负载。
    Text(MergedTextPayload),
}

/// 警告回调：接收消息与可选的底层错误。
pub type WarningHook = Arc<dyn Fn(&str, Option<&PasteError>) + Send + Sync>;

/// 栅格化相关选项。
#[derive(Clone)]
pub struct RasterizationOptions {
    /// 候选级失败与降级事件的警告回调；缺省走 `log::warn!`。
    pub on_warning: Option<WarningHook>,
    /// 请求的输出媒体类型；矢量类型表示直接透传序列化文档。
    pub output_media_type: String,
}

impl Default for RasterizationOptions {
    fn default() -> Self {
        Self {
            on_warning: None,
            output_media_type: "image/png".to_string(),
        }
    }
}

impl fmt::Debug for RasterizationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterizationOptions")
            .field("on_warning", &self.on_warning.is_some())
            .field("output_media_type", &self.output_media_type)
            .finish()
    }
}

/// 入口操作选项。
#[derive(Debug, Clone)]
pub struct PasteOptions {
    /// 是否允许在无二进制图片时走富标记栅格化回退（缺省开启）。
    pub enable_markup_rasterization: bool,
    /// 栅格化选项。
    pub rasterization: RasterizationOptions,
}

impl Default for PasteOptions {
    fn default() -> Self {
        Self {
            enable_markup_rasterization: true,
            rasterization: RasterizationOptions::default(),
        }
    }
}

/// 发出一条候选级警告。
///
/// 表面日志抑制窗口内降为 debug 日志；否则优先走注入回调，
/// 缺省落到 `log::warn!`。
pub(crate) fn emit_warning(
    options: &RasterizationOptions,
    message: &str,
    cause: Option<&PasteError>,
) {
    if rasterize::surface_log_suppressed() {
        match cause {
            Some(cause) => log::debug!("🔇 {}：{}", message, cause),
            None => log::debug!("🔇 {}", message),
        }
        return;
    }

    if let Some(hook) = &options.on_warning {
        hook(message, cause);
        return;
    }

    match cause {
        Some(cause) => log::warn!("⚠️ {}：{}", message, cause),
        None => log::warn!("⚠️ {}", message),
    }
}

/// 粘贴归一化引擎。
///
/// 封装注入的三个协作方并编排各子模块实现完整流程。
pub struct PasteEngine<A, P, F> {
    pub(crate) capability: A,
    pub(crate) platform: P,
    pub(crate) fetcher: F,
}

impl<A, P, F> PasteEngine<A, P, F>
where
    A: CapabilityAdapter,
    P: ClipboardPlatform,
    F: ResourceFetcher,
{
    /// 注入协作方创建引擎。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use paste_compose::capability::ImageCapability;
    /// use paste_compose::paste::PasteEngine;
    /// use paste_compose::platform::{HttpFetcher, SystemClipboard};
    ///
    /// let engine = PasteEngine::new(ImageCapability, SystemClipboard, HttpFetcher::new()?);
    /// # Ok::<(), paste_compose::error::PasteError>(())
    /// ```
    pub fn new(capability: A, platform: P, fetcher: F) -> Self {
        Self {
            capability,
            platform,
            fetcher,
        }
    }

    /// 处理主入口：把一次粘贴归一化为图片或文本。
    ///
    /// `want_image` 指定请求的内容形态；`event` 是触发事件携带的
    /// 同步数据（可缺失）。请求形态的数据完全缺失时返回对应错误。
    pub async fn perform_paste(
        &self,
        want_image: bool,
        event: Option<&dyn PasteEvent>,
        options: &PasteOptions,
    ) -> Result<PasteOutcome, PasteError> {
        if !want_image {
            let merged = self
                .collect_text(event, options)
                .await
                .ok_or(PasteError::NoTextData)?;
            return Ok(PasteOutcome::Text(merged));
        }

        let collection = self.collect_candidate_images(event, options).await;

        if collection.candidates.is_empty() {
            if options.enable_markup_rasterization {
                if let Some(markup) = collection.hint.as_deref() {
                    match self.render_markup_to_image(markup, &options.rasterization) {
                        Ok(image) => return Ok(PasteOutcome::Image(image)),
                        Err(err) => {
                            emit_warning(
                                &options.rasterization,
                                "标记栅格化未产出结果，转文本回退",
                                Some(&err),
                            );
                        }
                    }
                }
            }

            // 平台条目读取每次调用至多一次：回退复用图片采集阶段的快照。
            let merged = self
                .merge_text_sources(event, collection.platform_items.as_deref(), options)
                .await;
            if let Some(merged) = merged {
                log::debug!("📄 图片请求无可用图片，回退为文本负载");
                return Ok(PasteOutcome::Text(merged));
            }

            return Err(PasteError::NoImageData);
        }

        // 单张且无布局提示：原字节透传，不重编码。
        if collection.candidates.len() == 1 && collection.hint.is_none() {
            let single = &collection.candidates[0];
            log::debug!("🖼️ 单张图片无布局提示，直接透传（{}）", single.media_type);
            return Ok(PasteOutcome::Image(EncodedImage {
                media_type: single.media_type.clone(),
                bytes: single.bytes.to_vec(),
            }));
        }

        let rows =
            layout::infer_row_structure(collection.hint.as_deref(), collection.candidates.len());
        let image = self.composite_candidates(&collection.candidates, &rows, options)?;

        Ok(PasteOutcome::Image(image))
    }

    /// 采集并合并文本片段。
    ///
    /// 事件同步数据优先；事件没有任何片段时才走平台异步读取，
    /// 读取失败记录警告并按空来源处理。
    async fn collect_text(
        &self,
        event: Option<&dyn PasteEvent>,
        options: &PasteOptions,
    ) -> Option<MergedTextPayload> {
        let mut bucket = bucket_from_event(event);

        if bucket.is_empty() {
            match self.platform.read_items().await {
                Ok(items) => extend_bucket_from_items(&mut bucket, &items),
                Err(err) => {
                    emit_warning(
                        &options.rasterization,
                        "平台剪贴板读取失败，按无文本处理",
                        Some(&err),
                    );
                }
            }

            if bucket.is_empty() {
                self.read_text_into_bucket(&mut bucket, options).await;
            }
        }

        bucket.merge()
    }

    /// 用已有的平台条目快照合并文本（图片请求的文本回退路径）。
    ///
    /// `items` 为 `None` 表示条目读取未尝试或已失败，此路径不再读取条目；
    /// 纯文本读取此前未尝试过，仍允许一次。
    async fn merge_text_sources(
        &self,
        event: Option<&dyn PasteEvent>,
        items: Option<&[PlatformItem]>,
        options: &PasteOptions,
    ) -> Option<MergedTextPayload> {
        let mut bucket = bucket_from_event(event);

        if bucket.is_empty() {
            if let Some(items) = items {
                extend_bucket_from_items(&mut bucket, items);
            }

            if bucket.is_empty() {
                self.read_text_into_bucket(&mut bucket, options).await;
            }
        }

        bucket.merge()
    }

    /// 尝试一次平台纯文本读取，结果并入桶。
    async fn read_text_into_bucket(&self, bucket: &mut TextFragmentBucket, options: &PasteOptions) {
        match self.platform.read_text().await {
            Ok(Some(text)) if !text.is_empty() => {
                bucket.push(TextFormat::Plain, text);
            }
            Ok(_) => {}
            Err(err) => {
                emit_warning(
                    &options.rasterization,
                    "平台纯文本读取失败，按无文本处理",
                    Some(&err),
                );
            }
        }
    }
}

/// 从事件同步数据收集文本片段。
fn bucket_from_event(event: Option<&dyn PasteEvent>) -> TextFragmentBucket {
    let mut bucket = TextFragmentBucket::default();

    if let Some(event) = event {
        for format in TextFormat::PRIORITY {
            if let Some(fragment) = event.string_data(format.media_type()) {
                if !fragment.is_empty() {
                    bucket.push(format, fragment);
                }
            }
        }
    }

    bucket
}

/// 把平台条目里的文本表示并入桶（条目顺序即片段到达顺序）。
fn extend_bucket_from_items(bucket: &mut TextFragmentBucket, items: &[PlatformItem]) {
    for item in items {
        for rep in &item.representations {
            if let Some(format) = TextFormat::from_media_type(&rep.media_type) {
                let fragment = String::from_utf8_lossy(&rep.bytes).into_owned();
                if !fragment.is_empty() {
                    bucket.push(format, fragment);
                }
            }
        }
    }
}
