//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 交接流程内部的错误（`HandoffError`）在编排器中被转换为终态，不会外泄；
//! `AppError` 只服务于命令行入口与配置加载，给出一致的错误格式。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `HandoffError` / `std::io::Error` 提供 `From` 转换，无需手动 map。

use crate::handoff::HandoffError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 交接流程错误（加载 / 写入 / 唤醒）
    #[error("{0}")]
    Handoff(#[from] HandoffError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件缺失字段、格式错误或校验失败
    #[error("配置错误: {0}")]
    Config(String),
}
