//! # 图片合成模块
//!
//! ## 设计思路
//!
//! 把 N 张候选图片按推断出的行分组画到一张表面上并导出为单张编码图片。
//! 行内从左到右、行间自上而下；画布宽度取各行宽度的最大值，高度为各行
//! 高度（行内最大图高）之和。表面先用不透明白色整体填充，带透明通道的
//! 图片叠加结果因此是可预期的。
//!
//! ## 实现思路
//!
//! - 行分组少算时，剩余图片按单图行追加在下方。
//! - 输出子类型偏好：输入里出现过常用无损类型（png / webp）则复用，
//!   否则复用任一输入子类型，再否则回退无损栅格类型。
//! - 解码位图由 RAII 守卫集中持有，导出完成或任一路径提前失败时
//!   统一交还能力适配器释放。
//! - 单张候选解码失败记录警告后跳过，只有全部解码失败才算操作失败。

use crate::capability::CapabilityAdapter;
use crate::error::PasteError;
use crate::platform::{ClipboardPlatform, ResourceFetcher};

use super::image_source::{CandidateImage, is_image_media_type};
use super::layout::RowStructure;
use super::{EncodedImage, PasteEngine, PasteOptions, emit_warning};

/// 合成与栅格化共用的不透明白色背景。
pub(crate) const COMPOSITE_BACKGROUND: [u8; 4] = [255, 255, 255, 255];

/// 输出子类型偏好表（按序）。
const PREFERRED_OUTPUT_TYPES: [&str; 2] = ["image/png", "image/webp"];

/// 无任何可复用输入子类型时的无损回退。
const LOSSLESS_FALLBACK_TYPE: &str = "image/png";

/// 合成布局：画布总尺寸与每张图片的左上角放置偏移（输入顺序）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompositeLayout {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) offsets: Vec<(u32, u32)>,
}

/// 按行分组规划画布尺寸与放置偏移。
pub(crate) fn plan_composite_layout(
    dimensions: &[(u32, u32)],
    rows: &RowStructure,
) -> CompositeLayout {
    let mut row_counts: Vec<usize> = rows.counts().to_vec();

    // 行分组少算时，剩余图片按单图行追加。
    let assigned: usize = row_counts.iter().sum();
    for _ in assigned..dimensions.len() {
        row_counts.push(1);
    }

    let mut offsets = Vec::with_capacity(dimensions.len());
    let mut cursor = 0usize;
    let mut total_width = 0u32;
    let mut total_height = 0u32;

    for count in row_counts {
        if cursor >= dimensions.len() {
            break;
        }

        let take = count.min(dimensions.len() - cursor);
        let mut x = 0u32;
        let mut row_height = 0u32;

        for (width, height) in &dimensions[cursor..cursor + take] {
            offsets.push((x, total_height));
            x = x.saturating_add(*width);
            row_height = row_height.max(*height);
        }

        total_width = total_width.max(x);
        total_height = total_height.saturating_add(row_height);
        cursor += take;
    }

    CompositeLayout {
        width: total_width.max(1),
        height: total_height.max(1),
        offsets,
    }
}

/// 选择合成结果的输出子类型。
fn choose_output_media_type(candidates: &[CandidateImage]) -> String {
    for preferred in PREFERRED_OUTPUT_TYPES {
        if candidates
            .iter()
            .any(|candidate| candidate.media_type.eq_ignore_ascii_case(preferred))
        {
            return preferred.to_string();
        }
    }

    candidates
        .iter()
        .find(|candidate| is_image_media_type(&candidate.media_type))
        .map(|candidate| candidate.media_type.clone())
        .unwrap_or_else(|| LOSSLESS_FALLBACK_TYPE.to_string())
}

/// 解码位图的 RAII 持有集。
///
/// 无论导出成功还是任一路径提前失败，离开作用域时都会把全部位图
/// 交还能力适配器释放。
struct DecodedBitmaps<'a, A: CapabilityAdapter> {
    adapter: &'a A,
    bitmaps: Vec<Option<A::Bitmap>>,
}

impl<'a, A: CapabilityAdapter> DecodedBitmaps<'a, A> {
    fn new(adapter: &'a A) -> Self {
        Self {
            adapter,
            bitmaps: Vec::new(),
        }
    }

    fn push(&mut self, bitmap: A::Bitmap) {
        self.bitmaps.push(Some(bitmap));
    }

    fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &A::Bitmap> {
        self.bitmaps.iter().filter_map(|slot| slot.as_ref())
    }
}

impl<A: CapabilityAdapter> Drop for DecodedBitmaps<'_, A> {
    fn drop(&mut self) {
        for slot in &mut self.bitmaps {
            if let Some(bitmap) = slot.take() {
                self.adapter.release_bitmap(bitmap);
            }
        }
    }
}

impl<A, P, F> PasteEngine<A, P, F>
where
    A: CapabilityAdapter,
    P: ClipboardPlatform,
    F: ResourceFetcher,
{
    /// 把候选图片按行分组合成为单张编码图片。
    pub(crate) fn composite_candidates(
        &self,
        candidates: &[CandidateImage],
        rows: &RowStructure,
        options: &PasteOptions,
    ) -> Result<EncodedImage, PasteError> {
        let mut decoded = DecodedBitmaps::new(&self.capability);
        let mut dimensions = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self
                .capability
                .decode_bitmap(&candidate.bytes, &candidate.media_type)
            {
                Ok(bitmap) => {
                    dimensions.push(self.capability.bitmap_dimensions(&bitmap));
                    decoded.push(bitmap);
                }
                Err(err) => {
                    emit_warning(
                        &options.rasterization,
                        &format!("候选图片解码失败，跳过（{}）", candidate.media_type),
                        Some(&err),
                    );
                }
            }
        }

        if decoded.is_empty() {
            return Err(PasteError::Decode("没有任何候选图片能够解码".to_string()));
        }

        let layout = plan_composite_layout(&dimensions, rows);
        log::debug!(
            "🧩 合成布局：画布 {}x{}，{} 张图片",
            layout.width,
            layout.height,
            layout.offsets.len()
        );

        let mut surface = self.capability.create_surface(layout.width, layout.height)?;
        self.capability.fill_surface(&mut surface, COMPOSITE_BACKGROUND);

        for (bitmap, (x, y)) in decoded.iter().zip(layout.offsets.iter()) {
            self.capability.draw_bitmap(&mut surface, bitmap, *x, *y);
        }

        let media_type = choose_output_media_type(candidates);
        let bytes = self.capability.export_surface(surface, &media_type)?;

        Ok(EncodedImage { media_type, bytes })
    }
}
