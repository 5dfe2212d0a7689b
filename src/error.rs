//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `PasteError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 面向调用方的三个缺失类错误（`NoTextData` / `NoImageData` /
//! `SurfaceUnavailable`）与内部链路错误（解码 / 网络 / 格式 / 平台）
//! 共用一个枚举，调用侧可按分支匹配。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 单个候选的失败（一次抓取、一次解码）在采集层就地恢复并记录日志，
//!   不会以错误形式冒泡到调用方；只有“请求的输出整体缺失”才返回错误。

/// 粘贴处理统一错误类型。
///
/// 所有公开操作均返回 `Result<T, PasteError>`，确保调用方收到一致的错误格式。
#[derive(Debug, thiserror::Error)]
pub enum PasteError {
    /// 任何来源都没有找到任何格式的文本片段。
    #[error("剪贴板中没有可用的文本数据")]
    NoTextData,

    /// 没有找到二进制图片，且标记栅格化被禁用、不可用或未产出结果。
    #[error("剪贴板中没有可用的图片数据")]
    NoImageData,

    /// 宿主能力适配器无法提供绘图表面。
    #[error("无法创建绘图表面：{0}")]
    SurfaceUnavailable(String),

    /// 图片解码或编码导出失败。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 网络抓取失败。
    #[error("网络错误：{0}")]
    Network(String),

    /// 输入格式不合法（非图片字节、非法 Data URL 等）。
    #[error("格式错误：{0}")]
    InvalidFormat(String),

    /// 平台剪贴板读取失败（权限、无数据等）。
    #[error("剪贴板平台错误：{0}")]
    Platform(String),
}

impl From<PasteError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: PasteError) -> Self {
        error.to_string()
    }
}
