//! 条目处理上下文
//!
//! 封装"我正在处理哪个任务的第几个条目"这一信息

use std::fmt::Display;

use crate::utils::truncate_text;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 任务ID
    pub job_id: String,

    /// 条目在任务中的索引（从1开始）
    pub item_index: usize,

    /// 条目 key（行 key 或关键词）
    pub key: String,
}

impl ItemCtx {
    /// 创建新的条目上下文
    ///
    /// `position` 从 0 开始
    pub fn new(job_id: &str, position: usize, key: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            item_index: position + 1,
            key: key.to_string(),
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} 第{}项 {}]",
            self.job_id,
            self.item_index,
            truncate_text(&self.key, 40)
        )
    }
}
