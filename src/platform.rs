//! # 平台协作方契约模块
//!
//! ## 设计思路
//!
//! 将引擎消费的三个外部协作方收敛为注入式契约，与能力适配器一样由
//! 嵌入方提供，引擎内部不做任何存在性探测：
//!
//! - [`PasteEvent`]：触发粘贴的事件所携带的同步数据
//!   （文件型附件 + 按格式标签取字符串）。
//! - [`ClipboardPlatform`]：平台剪贴板的异步读取
//!   （条目列表 + 纯文本读取，均为每次调用至多尝试一次）。
//! - [`ResourceFetcher`]：按 URL 抓取内联图片引用。
//!
//! ## 实现思路
//!
//! - 契约方法保持最小：引擎只依赖“拿到哪些表示、取某个表示的字节”。
//! - 自带两个生产可用的适配器：[`SystemClipboard`]（arboard 系统剪贴板）
//!   与 [`HttpFetcher`]（reqwest，带超时与错误归类）。
//! - 所有读取失败都映射为 `PasteError::Platform` / `Network`，
//!   由采集层决定是否就地恢复。

use bytes::Bytes;
use std::time::Duration;

use crate::error::PasteError;

/// 抓取资源时的总超时（秒）。
const FETCH_TIMEOUT_SECS: u64 = 30;
/// 建立连接（TCP/TLS）超时（秒）。
const FETCH_CONNECT_TIMEOUT_SECS: u64 = 8;

// ============================================================================
// 粘贴事件
// ============================================================================

/// 粘贴事件附带的一个文件型条目。
#[derive(Debug, Clone)]
pub struct EventFileEntry {
    /// 来源声明的媒体类型（如 `image/png`）。
    pub media_type: String,
    /// 原始字节。
    pub bytes: Bytes,
    /// 来源声明的修改时间戳（毫秒），参与候选去重标识。
    pub modified_at: Option<u64>,
}

/// 触发粘贴的事件句柄。
///
/// 对应平台剪贴板的“事件绑定同步数据”访问面：文件型附件列表，
/// 以及按格式标签读取字符串数据。
pub trait PasteEvent {
    /// 事件附带的全部文件型条目（到达顺序）。
    fn file_entries(&self) -> Vec<EventFileEntry>;

    /// 按格式标签读取事件附带的字符串数据。
    fn string_data(&self, media_type: &str) -> Option<String>;
}

// ============================================================================
// 平台剪贴板（异步读取）
// ============================================================================

/// 剪贴板条目的一个类型化表示。
#[derive(Debug, Clone)]
pub struct PlatformRepresentation {
    /// 媒体类型标签。
    pub media_type: String,
    /// 该表示的字节内容。
    pub bytes: Bytes,
}

/// 异步读取返回的一个剪贴板条目。
#[derive(Debug, Clone, Default)]
pub struct PlatformItem {
    /// 条目提供的全部表示（平台给出的顺序）。
    pub representations: Vec<PlatformRepresentation>,
}

impl PlatformItem {
    /// 查找指定媒体类型的表示。
    pub fn representation(&self, media_type: &str) -> Option<&PlatformRepresentation> {
        self.representations
            .iter()
            .find(|rep| rep.media_type.eq_ignore_ascii_case(media_type))
    }
}

/// 平台剪贴板的异步读取契约。
pub trait ClipboardPlatform {
    /// 枚举剪贴板当前提供的条目及其表示。
    fn read_items(&self) -> impl Future<Output = Result<Vec<PlatformItem>, PasteError>> + Send;

    /// 读取剪贴板纯文本（若有）。
    fn read_text(&self) -> impl Future<Output = Result<Option<String>, PasteError>> + Send;
}

// ============================================================================
// 资源抓取
// ============================================================================

/// 一次抓取的结果。
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// 响应声明的媒体类型（已去除参数部分），缺失时为 `None`。
    pub media_type: Option<String>,
    /// 响应体字节。
    pub bytes: Bytes,
}

/// 按 URL 抓取内联图片引用的契约。
pub trait ResourceFetcher {
    /// 抓取一个 URL，返回声明类型与响应体。
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedResource, PasteError>> + Send;
}

// ============================================================================
// SystemClipboard — arboard 系统剪贴板适配器
// ============================================================================

/// 基于 arboard 的系统剪贴板适配器。
///
/// arboard 暴露的是扁平剪贴板（一份文本 + 一份 RGBA 图像），映射为
/// 单个条目：图像重编码为 PNG 作为唯一图片表示，文本作为 `text/plain` 表示。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    fn snapshot_item() -> Result<Option<PlatformItem>, PasteError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| PasteError::Platform(format!("打开剪贴板失败：{}", e)))?;

        let mut item = PlatformItem::default();

        if let Ok(image_data) = clipboard.get_image() {
            let width = image_data.width as u32;
            let height = image_data.height as u32;
            let raw = image_data.bytes.into_owned();

            let buffer = image::RgbaImage::from_raw(width, height, raw)
                .ok_or_else(|| PasteError::Platform("创建图像缓冲区失败".to_string()))?;

            let mut cursor = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgba8(buffer)
                .write_to(&mut cursor, image::ImageFormat::Png)
                .map_err(|e| PasteError::Platform(format!("剪贴板图像编码失败：{}", e)))?;

            item.representations.push(PlatformRepresentation {
                media_type: "image/png".to_string(),
                bytes: Bytes::from(cursor.into_inner()),
            });
        }

        if let Ok(text) = clipboard.get_text() {
            if !text.is_empty() {
                item.representations.push(PlatformRepresentation {
                    media_type: "text/plain".to_string(),
                    bytes: Bytes::from(text.into_bytes()),
                });
            }
        }

        if item.representations.is_empty() {
            Ok(None)
        } else {
            Ok(Some(item))
        }
    }
}

impl ClipboardPlatform for SystemClipboard {
    async fn read_items(&self) -> Result<Vec<PlatformItem>, PasteError> {
        Ok(Self::snapshot_item()?.into_iter().collect())
    }

    async fn read_text(&self) -> Result<Option<String>, PasteError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| PasteError::Platform(format!("打开剪贴板失败：{}", e)))?;

        Ok(clipboard.get_text().ok().filter(|text| !text.is_empty()))
    }
}

// ============================================================================
// HttpFetcher — reqwest 抓取适配器
// ============================================================================

/// 基于 reqwest 的资源抓取适配器。
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// 构建带超时配置的复用型 HTTP 客户端。
    pub fn new() -> Result<Self, PasteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(FETCH_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PasteError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client })
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error) -> PasteError {
        if e.is_timeout() {
            PasteError::Network(format!("抓取超时（{}秒）", FETCH_TIMEOUT_SECS))
        } else if e.is_connect() {
            PasteError::Network(format!("无法连接：{}", e))
        } else {
            PasteError::Network(format!("请求失败：{}", e))
        }
    }
}

impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, PasteError> {
        log::debug!("🌐 抓取内联图片 - URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(PasteError::Network(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());

        let bytes = response.bytes().await.map_err(Self::map_reqwest_error)?;

        Ok(FetchedResource { media_type, bytes })
    }
}
