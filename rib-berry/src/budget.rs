//! 单个病例的取消与超时控制.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 可跨线程共享的取消标记. 克隆得到的所有副本共享同一个状态.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 创建一个未取消的标记.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消. 正在运行的病例会在下一个检查点退出.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// 是否已请求取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 单个病例的运行预算: 截止时间和取消标记.
///
/// 检查是协作式的. 连通分量提取在每个水平切片前检查一次, 流水线在各阶段之间检查一次.
#[derive(Clone, Debug, Default)]
pub struct Budget {
    deadline: Option<Instant>,
    token: Option<CancelToken>,
}

impl Budget {
    /// 无限制预算.
    #[inline]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// 从现在开始计时, 最多运行 `timeout`, 并可通过 `token` 取消.
    pub fn new(timeout: Option<Duration>, token: Option<CancelToken>) -> Self {
        Self {
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            token,
        }
    }

    /// 检查预算. 取消优先于超时.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.token.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Timeout);
        }
        Ok(())
    }
}
