//! # 分享图片交接 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            生产者（分享扩展，短生命周期进程）              │
//! │                                                          │
//! │  ShareRequest ── HandoffController (InFlightGuard RAII)  │
//! │       │   resolve → load → persist → signal → complete   │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↓ 共享容器（图片槽位 + 交接标记）   ↓ URL 激活 / 本地通知
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓            消费者（主应用）                        │
//! │                                                          │
//! │  SharedInbox ── peek / take / clear                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，命令行入口与配置加载的返回类型 |
//! | [`handoff`] | 交接流水线：附件识别、并发加载、原子写入、双通道唤醒、状态机 |
//! | [`platform`] | 桌面平台适配：文件/Base64 附件、URL 处理程序、桌面通知、终端宿主 |
//! | [`settings`] | JSON 配置文件与环境变量覆盖 |

pub mod error;
pub mod handoff;
pub mod platform;
pub mod settings;
