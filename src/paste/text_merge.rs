//! # 文本片段收集与合并模块
//!
//! ## 设计思路
//!
//! 同一次粘贴可能携带多个同格式文本片段（例如表格软件复制产生的多个
//! HTML 表格片段、异步读取返回的多个条目）。本模块把片段按格式分桶，
//! 再按各格式的结构规则合并成单个字符串。
//!
//! 格式优先级固定为 富标记 > RTF > 纯文本，不会被内容重排。
//!
//! ## 实现思路
//!
//! - 桶内保持到达顺序，合并时行序即片段到达顺序。
//! - HTML 多片段合并为一张合成表格：片段自带表格则直接收编其行；
//!   含行元素则收编行元素；否则整个片段作为一行单元格，空内容用
//!   `&nbsp;` 占位避免行静默塌陷。
//! - RTF 没有结构化合并规则，只保留第一个片段。
//! - 纯文本按“是否已含换行”选择连接符（换行 / 制表符），
//!   合并后统一规范化行尾为 `\n`。

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;

static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());

/// 文本格式标签（按固定优先级排序：富标记 > RTF > 纯文本）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextFormat {
    /// 富标记（`text/html`）。
    Html,
    /// 富文本格式（`text/rtf`）。
    Rtf,
    /// 纯文本（`text/plain`）。
    Plain,
}

impl TextFormat {
    /// 固定的格式优先级，高优先在前。
    pub const PRIORITY: [TextFormat; 3] = [TextFormat::Html, TextFormat::Rtf, TextFormat::Plain];

    /// 格式对应的媒体类型标签。
    pub fn media_type(self) -> &'static str {
        match self {
            TextFormat::Html => "text/html",
            TextFormat::Rtf => "text/rtf",
            TextFormat::Plain => "text/plain",
        }
    }

    /// 从媒体类型标签解析格式。
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "text/html" => Some(TextFormat::Html),
            "text/rtf" => Some(TextFormat::Rtf),
            "text/plain" => Some(TextFormat::Plain),
            _ => None,
        }
    }
}

/// 按格式分桶的文本片段集合（桶惰性存在，桶内按到达顺序）。
#[derive(Debug, Default)]
pub struct TextFragmentBucket {
    html: Vec<String>,
    rtf: Vec<String>,
    plain: Vec<String>,
}

impl TextFragmentBucket {
    /// 追加一个 (格式, 片段) 对。
    pub fn push(&mut self, format: TextFormat, fragment: String) {
        match format {
            TextFormat::Html => self.html.push(fragment),
            TextFormat::Rtf => self.rtf.push(fragment),
            TextFormat::Plain => self.plain.push(fragment),
        }
    }

    /// 是否尚未收到任何片段。
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.rtf.is_empty() && self.plain.is_empty()
    }

    /// 按格式规则合并全部片段。
    ///
    /// 没有任何片段时返回 `None`，由调用方转换为“没有文本数据”。
    pub fn merge(self) -> Option<MergedTextPayload> {
        if self.is_empty() {
            return None;
        }

        Some(MergedTextPayload {
            html: merge_html_fragments(&self.html),
            rtf: self.rtf.into_iter().next(),
            plain: merge_plain_fragments(&self.plain),
        })
    }
}

/// 合并结果：每个格式要么缺失，要么是单个合并后的字符串。
#[derive(Debug, Clone, Serialize)]
pub struct MergedTextPayload {
    /// 富标记合并结果。
    pub html: Option<String>,
    /// RTF 合并结果（仅保留首个片段）。
    pub rtf: Option<String>,
    /// 纯文本合并结果。
    pub plain: Option<String>,
}

impl MergedTextPayload {
    /// 最高优先级非空格式的合并字符串。
    pub fn preferred(&self) -> Option<(TextFormat, &str)> {
        for format in TextFormat::PRIORITY {
            let value = match format {
                TextFormat::Html => self.html.as_deref(),
                TextFormat::Rtf => self.rtf.as_deref(),
                TextFormat::Plain => self.plain.as_deref(),
            };

            if let Some(value) = value {
                return Some((format, value));
            }
        }

        None
    }
}

/// 合并富标记片段。
///
/// 单片段原样返回；多片段逐个转换为合成表格的行。
fn merge_html_fragments(fragments: &[String]) -> Option<String> {
    match fragments {
        [] => None,
        [single] => Some(single.clone()),
        many => {
            let mut rows = Vec::new();
            for fragment in many {
                rows.extend(html_fragment_to_rows(fragment));
            }
            Some(format!("<table>{}</table>", rows.concat()))
        }
    }
}

/// 把一个富标记片段转换为合成表格的行序列。
fn html_fragment_to_rows(fragment: &str) -> Vec<String> {
    let parsed = Html::parse_fragment(fragment);

    // 片段自带表格：直接收编表格内的行。
    if let Some(table) = parsed.select(&TABLE_SELECTOR).next() {
        let adopted: Vec<String> = table.select(&ROW_SELECTOR).map(|row| row.html()).collect();
        if !adopted.is_empty() {
            return adopted;
        }
    }

    // 无表格但含行元素：收编行元素。
    let row_like: Vec<String> = parsed.select(&ROW_SELECTOR).map(|row| row.html()).collect();
    if !row_like.is_empty() {
        return row_like;
    }

    // 其余情况：片段主体作为一行单元格，空内容用占位符。
    let body = fragment.trim();
    let cell = if body.is_empty() { "&nbsp;" } else { body };
    vec![format!("<tr><td>{}</td></tr>", cell)]
}

/// 合并纯文本片段。
///
/// 任一片段已含换行则用换行连接（保持行语义），
/// 否则用制表符连接（保留单行单元格粘贴的行列感）。
fn merge_plain_fragments(fragments: &[String]) -> Option<String> {
    match fragments {
        [] => None,
        [single] => Some(single.clone()),
        many => {
            let has_line_break = many
                .iter()
                .any(|fragment| fragment.contains('\n') || fragment.contains('\r'));
            let separator = if has_line_break { "\n" } else { "\t" };

            Some(normalize_line_endings(&many.join(separator)))
        }
    }
}

/// 把所有行尾统一为单个 `\n`。
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
