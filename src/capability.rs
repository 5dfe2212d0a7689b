//! # 宿主能力适配模块
//!
//! ## 设计思路
//!
//! 引擎本身从不探测运行环境具备哪些原语，所有“宿主能不能做某件事”的差异
//! 都收敛到 `CapabilityAdapter` 这一个注入点上。已归档的适配器形态有两种：
//!
//! - **完整宿主**：具备位图解码、矢量文档解码与标记测量能力
//!   （例如内嵌了排版引擎的桌面宿主），`measure_markup` 返回自然尺寸。
//! - **默认适配器** [`ImageCapability`]：仅具备栅格位图解码与导出能力，
//!   不具备矢量文档解码与标记测量。引擎在矢量解码失败时降级为直接
//!   透传矢量文档，在测量缺失时使用固定默认尺寸。
//!
//! ## 实现思路
//!
//! - 适配器以关联类型暴露位图与绘图表面，引擎对二者完全不透明。
//! - 解码前先用 `infer` 做文件签名校验，尽早拒绝非图片字节。
//! - 位图释放是显式契约：合成/栅格化操作创建的位图由同一操作在导出完成后
//!   全部交还 `release_bitmap`，任何提前失败的退出路径也不例外。

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use std::io::Cursor;

use crate::error::PasteError;

/// 宿主能力适配器。
///
/// 覆盖四类原语：位图解码、绘图表面工厂、表面导出、资源释放；
/// 另附标记自然尺寸测量（可缺失）。
pub trait CapabilityAdapter {
    /// 解码后的位图资源，具体表示由宿主决定。
    type Bitmap;
    /// 可绘制表面，具体表示由宿主决定。
    type Surface;

    /// 将编码字节解码为位图。
    ///
    /// `media_type` 为来源声明的媒体类型，宿主可用其选择解码路径；
    /// 默认适配器只信任字节签名。
    fn decode_bitmap(&self, bytes: &[u8], media_type: &str) -> Result<Self::Bitmap, PasteError>;

    /// 读取位图像素尺寸。
    fn bitmap_dimensions(&self, bitmap: &Self::Bitmap) -> (u32, u32);

    /// 创建指定尺寸的绘图表面。
    fn create_surface(&self, width: u32, height: u32) -> Result<Self::Surface, PasteError>;

    /// 以指定 RGBA 颜色整体填充表面。
    fn fill_surface(&self, surface: &mut Self::Surface, rgba: [u8; 4]);

    /// 将位图绘制到表面的指定左上角偏移处。
    fn draw_bitmap(&self, surface: &mut Self::Surface, bitmap: &Self::Bitmap, x: u32, y: u32);

    /// 按请求的媒体类型把表面导出为编码字节。
    fn export_surface(&self, surface: Self::Surface, media_type: &str) -> Result<Vec<u8>, PasteError>;

    /// 显式释放一个解码位图。
    ///
    /// 创建该位图的操作负责在所有退出路径上调用本方法。
    fn release_bitmap(&self, bitmap: Self::Bitmap);

    /// 离屏测量一段标记的自然盒尺寸。
    ///
    /// 返回 `None` 表示宿主不具备测量能力，引擎将使用固定默认尺寸。
    fn measure_markup(&self, markup: &str) -> Option<(u32, u32)>;
}

/// 默认能力适配器：基于 `image` crate 的纯栅格实现。
///
/// 不支持矢量文档解码与标记测量（两者分别触发引擎的矢量透传与默认尺寸）。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCapability;

impl ImageCapability {
    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), PasteError> {
        if bytes.is_empty() {
            return Err(PasteError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| PasteError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(PasteError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 将媒体类型映射到 `image` 的编码格式。
    fn encode_format_for(media_type: &str) -> Option<ImageFormat> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::WebP),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }
}

impl CapabilityAdapter for ImageCapability {
    type Bitmap = RgbaImage;
    type Surface = RgbaImage;

    fn decode_bitmap(&self, bytes: &[u8], media_type: &str) -> Result<Self::Bitmap, PasteError> {
        Self::validate_image_signature(bytes)?;

        let decoded = image::load_from_memory(bytes).map_err(|e| {
            PasteError::Decode(format!("图片解码失败（{}）：{}", media_type, e))
        })?;

        Ok(decoded.to_rgba8())
    }

    fn bitmap_dimensions(&self, bitmap: &Self::Bitmap) -> (u32, u32) {
        bitmap.dimensions()
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<Self::Surface, PasteError> {
        if width == 0 || height == 0 {
            return Err(PasteError::SurfaceUnavailable(format!(
                "表面尺寸不合法：{}x{}",
                width, height
            )));
        }

        Ok(RgbaImage::new(width, height))
    }

    fn fill_surface(&self, surface: &mut Self::Surface, rgba: [u8; 4]) {
        for pixel in surface.pixels_mut() {
            *pixel = Rgba(rgba);
        }
    }

    fn draw_bitmap(&self, surface: &mut Self::Surface, bitmap: &Self::Bitmap, x: u32, y: u32) {
        imageops::overlay(surface, bitmap, x as i64, y as i64);
    }

    fn export_surface(&self, surface: Self::Surface, media_type: &str) -> Result<Vec<u8>, PasteError> {
        let format = Self::encode_format_for(media_type).ok_or_else(|| {
            PasteError::InvalidFormat(format!("不支持的导出媒体类型：{}", media_type))
        })?;

        // JPEG 编码器不接受带 alpha 的像素，导出前压平为 RGB。
        let exportable = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(surface).to_rgb8())
        } else {
            DynamicImage::ImageRgba8(surface)
        };

        let mut cursor = Cursor::new(Vec::new());
        exportable
            .write_to(&mut cursor, format)
            .map_err(|e| PasteError::Decode(format!("表面导出失败（{}）：{}", media_type, e)))?;

        Ok(cursor.into_inner())
    }

    fn release_bitmap(&self, bitmap: Self::Bitmap) {
        drop(bitmap);
    }

    fn measure_markup(&self, _markup: &str) -> Option<(u32, u32)> {
        None
    }
}
