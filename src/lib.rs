//! # 粘贴归一化与合成引擎 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    嵌入方（宿主应用）                      │
//! │                                                          │
//! │  CapabilityAdapter ── ClipboardPlatform ── ResourceFetcher│
//! │  （位图/表面/测量）    （异步读取）         （URL 抓取）    │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ 注入（构造引擎时）+ PasteEvent（按次传入）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            引擎（本 crate）                       │
//! │                                                          │
//! │  ┌─ error ────── PasteError (统一错误类型)                │
//! │  │                                                       │
//! │  ├─ capability ── 能力适配契约 + ImageCapability 默认实现  │
//! │  ├─ platform ──── 协作方契约 + SystemClipboard/HttpFetcher│
//! │  │                                                       │
//! │  └─ paste ─────── PasteEngine 编排                        │
//! │      ├─ text_merge   文本片段分桶·按格式合并               │
//! │      ├─ image_source 三级优先来源候选采集                  │
//! │      ├─ inline       内联 <img> 提取（结构化+正则备用）    │
//! │      ├─ layout       行分组推断                            │
//! │      ├─ compositor   白底行列合成                          │
//! │      └─ rasterize    富标记栅格化回退（矢量透传降级）       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `PasteError`，所有公开操作的返回类型 |
//! | [`capability`] | 宿主能力适配契约与基于 `image` 的默认适配器 |
//! | [`platform`] | 粘贴事件 / 平台剪贴板 / 资源抓取契约与生产适配器 |
//! | [`paste`] | 归一化引擎：文本合并、图片采集、布局推断、合成、栅格化回退 |

pub mod capability;
pub mod error;
pub mod paste;
pub mod platform;

pub use capability::{CapabilityAdapter, ImageCapability};
pub use error::PasteError;
pub use paste::{
    EncodedImage, MergedTextPayload, PasteEngine, PasteOptions, PasteOutcome,
    RasterizationOptions, TextFormat,
};
pub use platform::{ClipboardPlatform, HttpFetcher, PasteEvent, ResourceFetcher, SystemClipboard};
