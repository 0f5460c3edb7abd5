//! 标签段提取：`<Subgoal1>…</Subgoal1>`、`<Subtask2>…</Subtask2>`
//!
//! 开闭标签的序号必须一致；regex 不支持反向引用，这里先找开标签，再按字面量查找对应闭标签。
//! 内容可跨行，取最短匹配并去掉首尾空白，结果按文档顺序排列。

use std::sync::LazyLock;

/// 任意带序号的开标签：`<名称N>`
static NUMBERED_OPEN_TAG: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"<([A-Za-z_]+)(\d+)>").unwrap());

/// 提取所有 `<{tag}N>内容</{tag}N>` 的内容
pub fn extract_tagged(text: &str, tag: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(caps) = NUMBERED_OPEN_TAG.captures_at(text, pos) {
        let (Some(whole), Some(name), Some(index)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        if name.as_str() != tag {
            pos = whole.end();
            continue;
        }
        let close = format!("</{}{}>", tag, index.as_str());
        match text[whole.end()..].find(&close) {
            Some(offset) => {
                let inner_end = whole.end() + offset;
                out.push(text[whole.end()..inner_end].trim().to_string());
                pos = inner_end + close.len();
            }
            None => pos = whole.end(),
        }
    }
    out
}

/// 提取单个 `<{tag}>内容</{tag}>`（无序号，取第一个）
pub fn extract_single(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    let inner = text[start..end].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}
