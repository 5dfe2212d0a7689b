//! # 布局推断模块
//!
//! ## 设计思路
//!
//! 多图粘贴的二进制候选是无序的，原始的行列排布只能从伴随标记里推断。
//! 表格软件与编辑器产生的剪贴板标记可靠地用结构（表格行、块级元素）
//! 编码行分组；纯换行分隔的来源则需要文本回退。
//!
//! “行计数之和必须恰好等于候选图片数”这一校验用来防御引用了
//! 装饰性图标等并不存在于二进制候选中的图片的提示：与其产出错误的
//! 分组，不如整体拒绝该次结构化猜测。
//!
//! ## 实现思路
//!
//! 策略按序尝试，首个成功者生效（成功 = 行计数之和恰为 N）：
//! 1. 提示完全不含图片引用标记 → 直接单行回退。
//! 2. 结构化解析：含表格则按表格行计数。
//! 3. 否则按块级元素计数，类别列表固定有序（`p`、`li`、`div`），
//!    停在第一个产出行的类别。
//! 4. 结构化解析不可用或无产出 → 按换行标记切分原始文本逐段计数。
//! 5. 以上都未凑齐 N → 全部 N 张图片归入单行。
//!
//! 对相同 (提示, N) 的推断是幂等的。

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static IMG_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img[\s/>]").unwrap());
static LINE_BREAK_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br[^>]*>|\r\n|\r|\n").unwrap());

static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static TABLE_ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("table tr").unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// 固定有序的块级元素类别表。
static BLOCK_CATEGORY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["p", "li", "div"]
        .iter()
        .map(|category| Selector::parse(category).unwrap())
        .collect()
});

/// 推断出的行分组：每项是该行放置的图片数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStructure {
    counts: Vec<usize>,
}

impl RowStructure {
    /// 单行回退：全部 N 张图片放在一行。
    pub fn single_row(image_count: usize) -> Self {
        if image_count == 0 {
            return Self { counts: Vec::new() };
        }
        Self {
            counts: vec![image_count],
        }
    }

    /// 校验一组候选计数：非空、全为正、总和恰为 N 才被接受。
    fn validated(counts: Vec<usize>, image_count: usize) -> Option<Self> {
        if counts.is_empty() || counts.iter().any(|count| *count == 0) {
            return None;
        }
        if counts.iter().sum::<usize>() != image_count {
            return None;
        }
        Some(Self { counts })
    }

    /// 每行的图片数（自上而下）。
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }
}

/// 从可选的布局提示推断 N 张图片的行分组。
pub fn infer_row_structure(hint: Option<&str>, image_count: usize) -> RowStructure {
    let Some(hint) = hint else {
        return RowStructure::single_row(image_count);
    };

    if !IMG_MARKER.is_match(hint) {
        log::debug!("🧭 布局提示不含图片引用，使用单行回退");
        return RowStructure::single_row(image_count);
    }

    if let Some(structure) = structural_rows(hint, image_count) {
        log::debug!("🧭 结构化布局推断成功：{:?}", structure.counts());
        return structure;
    }

    if let Some(structure) = line_break_rows(hint, image_count) {
        log::debug!("🧭 换行切分布局推断成功：{:?}", structure.counts());
        return structure;
    }

    log::debug!("🧭 布局提示与候选数不符，使用单行回退");
    RowStructure::single_row(image_count)
}

/// 结构化推断：表格行优先，其次块级元素类别。
fn structural_rows(hint: &str, image_count: usize) -> Option<RowStructure> {
    let parsed = Html::parse_document(hint);

    if parsed.select(&TABLE_SELECTOR).next().is_some() {
        let counts: Vec<usize> = parsed
            .select(&TABLE_ROW_SELECTOR)
            .map(|row| row.select(&IMG_SELECTOR).count())
            .filter(|count| *count > 0)
            .collect();

        return RowStructure::validated(counts, image_count);
    }

    for selector in BLOCK_CATEGORY_SELECTORS.iter() {
        let counts: Vec<usize> = parsed
            .select(selector)
            .map(|element| element.select(&IMG_SELECTOR).count())
            .filter(|count| *count > 0)
            .collect();

        if !counts.is_empty() {
            return RowStructure::validated(counts, image_count);
        }
    }

    None
}

/// 文本回退：按换行标记切分原始提示，逐段统计图片引用。
fn line_break_rows(hint: &str, image_count: usize) -> Option<RowStructure> {
    let counts: Vec<usize> = LINE_BREAK_SPLIT
        .split(hint)
        .map(|segment| IMG_MARKER.find_iter(segment).count())
        .filter(|count| *count > 0)
        .collect();

    RowStructure::validated(counts, image_count)
}
