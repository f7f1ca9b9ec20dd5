//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 用单一错误枚举承载交接链路的全部失败来源，并按阶段归类：
//! - 无图片：正常的否定结果，不是故障
//! - 加载/解码：单个附件失败只丢弃该附件
//! - 持久化：本次交接终止，不重试
//! - 唤醒：只记录日志，永不上抛
//!
//! 各阶段在出错处就地转换为 `HandoffOutcome` / `WakeOutcome`，
//! 因此该类型不会穿过生产者进程边界。

/// 交接链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("未找到图片附件")]
    ContentAbsent,

    #[error("附件加载错误：{0}")]
    Load(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 共享容器授权缺失，属于部署前置条件，不可重试。
    #[error("共享容器不可用：{0}")]
    ContainerUnavailable(String),

    #[error("写入共享容器失败：{0}")]
    Persist(String),

    #[error("唤醒信号失败：{0}")]
    Signal(String),
}

impl HandoffError {
    /// 是否属于单附件级别的加载失败（含解码与格式、资源限制）。
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Load(_) | Self::Decode(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_)
        )
    }

    /// 是否属于共享容器写入阶段的失败。
    pub fn is_persist_error(&self) -> bool {
        matches!(self, Self::ContainerUnavailable(_) | Self::Persist(_))
    }
}
