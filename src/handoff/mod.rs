//! # 图片交接模块（handoff）
//!
//! ## 设计思路
//!
//! 生产者（分享扩展）寿命短、内存受限，不能直接打开消费者（主应用）。
//! 两者只共享一个容器目录，交接被拆成一条固定流水线：
//! “识别图片附件 → 加载解码 → 写入共享容器 → 唤醒消费者 → 结束请求”。
//!
//! - `source`：分享请求、附件、图片负载等中间数据模型
//! - `resolver`：判断请求中是否有可交接的图片
//! - `loader`：并发加载所有图片附件，选出唯一结果
//! - `pipeline`：字节校验、解码、像素限制、JPEG 编码
//! - `store` / `marker`：共享容器的原子写入与交接标记
//! - `wake`：URL 激活 + 本地通知两种唤醒机制
//! - `controller`：状态机编排与结束逻辑
//! - `inbox`：消费者侧读取与清空
//! - `config/error`：配置、错误
//!
//! ## 新同事快速上手
//!
//! ```text
//! 宿主触发分享
//!    ↓
//! controller.rs（InFlightGuard 防重入 + 阶段耗时日志）
//!    ├─ resolver.rs（有无图片附件）
//!    ├─ loader.rs（JoinSet 并发加载，最小下标胜出）
//!    │    └─ pipeline.rs（签名校验 + 像素限制 + 解码）
//!    ├─ store.rs（JPEG 编码 → 原子替换图片 → 写标记）
//!    └─ wake.rs（URL 激活 ∥ 延迟通知）
//!    ↓
//! ProducerHost::complete（必要时先 acknowledge）
//!
//! 主应用被唤醒
//!    ↓
//! inbox.rs（peek / take / clear）
//! ```

mod config;
mod controller;
mod error;
mod inbox;
mod loader;
mod marker;
mod pipeline;
mod resolver;
mod source;
mod store;
mod wake;

#[cfg(test)]
mod test_support;

pub use config::{HandoffConfig, JPEG_QUALITY};
pub use controller::{
    Acknowledgment, HandoffController, HandoffOutcome, HandoffReport, HandoffState, ProducerHost,
};
pub use error::HandoffError;
pub use inbox::{PendingHandoff, SharedInbox};
pub use loader::AttachmentLoader;
pub use marker::HandoffMarker;
pub use pipeline::encode_jpeg;
pub use resolver::{has_qualifying_content, qualifying_attachments};
pub use source::{
    Attachment, AttachmentContent, AttachmentProvider, ImagePayload, ShareItem, ShareRequest,
    TypeTag,
};
pub use store::SharedStore;
pub use wake::{
    ActivationService, NotificationRequest, NotificationScheduler, ROUTING_TAG_KEY, WakeOutcome,
    WakeSignaler,
};
