//! # 富标记栅格化回退模块
//!
//! ## 设计思路
//!
//! 粘贴只携带富标记、没有任何二进制图片且内联引用也无法解析时，
//! 把标记片段本身转换为一张图片：先离屏测量片段的自然盒尺寸，再把
//! 片段（克隆并限定命名空间）序列化进一个按该尺寸定尺的最小矢量文档，
//! 最后经能力适配器解码、绘制到白底表面并按请求子类型导出。
//!
//! 解码或绘制阶段的任何失败都降级为直接透传矢量文档，而不是让整个
//! 操作失败；只有序列化本身无法进行（空片段）时操作才无产出。
//!
//! ## 实现思路
//!
//! - 尺寸钳制在 [1, 4096]，测量缺失时使用 512×512 默认值。
//! - 表面创建前取得日志抑制守卫，RAII 保证所有退出路径都释放；
//!   该开关是进程级的，**不可重入**：并发重叠的调用需由嵌入方串行化。
//! - 请求的输出就是矢量格式时跳过解码环节，直接返回序列化文档。

use std::sync::atomic::{AtomicBool, Ordering};

use crate::capability::CapabilityAdapter;
use crate::error::PasteError;
use crate::platform::{ClipboardPlatform, ResourceFetcher};

use super::compositor::COMPOSITE_BACKGROUND;
use super::{EncodedImage, PasteEngine, RasterizationOptions, emit_warning};

/// 快照单边钳制上限。
pub(crate) const SNAPSHOT_MAX_DIMENSION: u32 = 4096;
/// 测量缺失时的默认单边尺寸。
pub(crate) const SNAPSHOT_DEFAULT_DIMENSION: u32 = 512;

/// 矢量透传使用的媒体类型。
pub const VECTOR_MEDIA_TYPE: &str = "image/svg+xml";

// ============================================================================
// 日志抑制守卫
// ============================================================================

/// 进程级开关：栅格化期间抑制候选级警告进入警告通道。
static SURFACE_LOG_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// 表面操作期间的日志抑制 RAII 守卫。
///
/// 构造时立即安装抑制开关，`Drop` 时无条件撤除，任何提前失败的
/// 退出路径都不例外。开关是进程级单实例，**不支持重入**：并发重叠的
/// 栅格化调用会互相干扰，需要并发时应由嵌入方串行化调用。
pub(crate) struct SurfaceQuietGuard;

impl SurfaceQuietGuard {
    pub(crate) fn new() -> Self {
        SURFACE_LOG_SUPPRESSED.store(true, Ordering::SeqCst);
        log::debug!("🔇 已安装表面日志抑制开关");
        Self
    }
}

impl Drop for SurfaceQuietGuard {
    fn drop(&mut self) {
        SURFACE_LOG_SUPPRESSED.store(false, Ordering::SeqCst);
    }
}

/// 当前是否处于日志抑制窗口内。
pub(crate) fn surface_log_suppressed() -> bool {
    SURFACE_LOG_SUPPRESSED.load(Ordering::SeqCst)
}

// ============================================================================
// 快照计划
// ============================================================================

/// 一次栅格化的快照计划。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPlan {
    /// 目标宽度（已钳制）。
    pub width: u32,
    /// 目标高度（已钳制）。
    pub height: u32,
    /// 包裹原始片段的序列化矢量文档。
    pub document: String,
}

/// 把任意单边尺寸钳制到 [1, 4096]。
fn clamp_dimension(value: u32) -> u32 {
    value.clamp(1, SNAPSHOT_MAX_DIMENSION)
}

/// 把标记片段包进一个按尺寸定尺的最小矢量文档。
fn wrap_in_vector_document(markup: &str, width: u32, height: u32) -> String {
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">"#,
            r#"<foreignObject width="100%" height="100%">"#,
            r#"<div xmlns="http://www.w3.org/1999/xhtml">{body}</div>"#,
            r#"</foreignObject></svg>"#,
        ),
        w = width,
        h = height,
        body = markup,
    )
}

impl<A, P, F> PasteEngine<A, P, F>
where
    A: CapabilityAdapter,
    P: ClipboardPlatform,
    F: ResourceFetcher,
{
    /// 构建快照计划：测量、钳制、序列化。
    pub(crate) fn build_snapshot_plan(&self, markup: &str) -> Result<SnapshotPlan, PasteError> {
        if markup.trim().is_empty() {
            return Err(PasteError::NoImageData);
        }

        let (measured_width, measured_height) = self
            .capability
            .measure_markup(markup)
            .unwrap_or((SNAPSHOT_DEFAULT_DIMENSION, SNAPSHOT_DEFAULT_DIMENSION));

        let width = clamp_dimension(measured_width);
        let height = clamp_dimension(measured_height);

        Ok(SnapshotPlan {
            width,
            height,
            document: wrap_in_vector_document(markup, width, height),
        })
    }

    /// 把一段富标记渲染为编码图片。
    ///
    /// 解码/绘制失败时降级为矢量文档透传；只有片段本身无法序列化
    /// （空内容）时返回错误。
    pub fn render_markup_to_image(
        &self,
        markup: &str,
        options: &RasterizationOptions,
    ) -> Result<EncodedImage, PasteError> {
        let plan = self.build_snapshot_plan(markup)?;

        if options.output_media_type.eq_ignore_ascii_case(VECTOR_MEDIA_TYPE) {
            return Ok(EncodedImage {
                media_type: VECTOR_MEDIA_TYPE.to_string(),
                bytes: plan.document.into_bytes(),
            });
        }

        let rasterized = {
            let _quiet = SurfaceQuietGuard::new();
            self.rasterize_plan(&plan, options)
        };

        match rasterized {
            Ok(image) => Ok(image),
            Err(err) => {
                emit_warning(options, "栅格化失败，降级为矢量文档透传", Some(&err));
                Ok(EncodedImage {
                    media_type: VECTOR_MEDIA_TYPE.to_string(),
                    bytes: plan.document.into_bytes(),
                })
            }
        }
    }

    /// 解码矢量文档并绘制、导出。
    fn rasterize_plan(
        &self,
        plan: &SnapshotPlan,
        options: &RasterizationOptions,
    ) -> Result<EncodedImage, PasteError> {
        let bitmap = self
            .capability
            .decode_bitmap(plan.document.as_bytes(), VECTOR_MEDIA_TYPE)?;

        let exported = (|| -> Result<Vec<u8>, PasteError> {
            let mut surface = self.capability.create_surface(plan.width, plan.height)?;
            self.capability.fill_surface(&mut surface, COMPOSITE_BACKGROUND);
            self.capability.draw_bitmap(&mut surface, &bitmap, 0, 0);
            self.capability
                .export_surface(surface, &options.output_media_type)
        })();

        self.capability.release_bitmap(bitmap);

        Ok(EncodedImage {
            media_type: options.output_media_type.clone(),
            bytes: exported?,
        })
    }
}
