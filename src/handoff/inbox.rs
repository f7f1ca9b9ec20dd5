//! # 消费者收件模块
//!
//! 主应用被唤醒后从共享容器读取待处理图片，处理完成后清空槽位。
//! 这里只认“标记 + 完整图片”同时存在的状态，残留的临时文件或
//! 没有图片的标记都不会被当成待处理内容。
//!
//! 取出时先认领标记（改名为私有文件），不删除图片槽位，
//! 因此不会误删生产者在此期间写入的新交接。

use std::fs;

use image::GenericImageView;

use super::marker::HandoffMarker;
use super::store::SharedStore;
use super::{HandoffConfig, HandoffError};

/// 一份待处理的交接内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandoff {
    pub marker: HandoffMarker,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 共享容器的消费者视图。
pub struct SharedInbox {
    store: SharedStore,
    routing_tag: String,
}

impl SharedInbox {
    /// 开通共享容器（容器由消费者拥有）。已存在时直接打开。
    pub fn provision(config: &HandoffConfig) -> Result<Self, HandoffError> {
        let root = SharedStore::container_root(config)?;
        fs::create_dir_all(&root).map_err(|e| {
            HandoffError::ContainerUnavailable(format!("创建共享容器 {} 失败：{}", root.display(), e))
        })?;
        log::info!("📦 共享容器已就绪 - {}", root.display());
        Self::open(config)
    }

    pub fn open(config: &HandoffConfig) -> Result<Self, HandoffError> {
        Ok(Self {
            store: SharedStore::resolve(config)?,
            routing_tag: config.routing_tag.clone(),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// 通知负载中的路由标签是否指向“共享图片”。
    pub fn is_routing_tag(&self, tag: &str) -> bool {
        tag == self.routing_tag
    }

    /// 查看待处理内容但不清空。
    pub fn peek(&self) -> Result<Option<PendingHandoff>, HandoffError> {
        let Some(marker) = self.store.read_marker()? else {
            return Ok(None);
        };
        self.load_pending(marker)
    }

    /// 取出待处理内容。
    ///
    /// 先认领标记再读取图片，认领之后生产者写入的新交接保持待处理。
    /// 图片槽位不删除：没有标记的图片不算待处理，下一次交接会原子覆盖它。
    pub fn take(&self) -> Result<Option<PendingHandoff>, HandoffError> {
        let Some(marker) = self.store.claim_marker()? else {
            return Ok(None);
        };

        let pending = self.load_pending(marker);
        self.store.release_claim()?;
        let pending = pending?;

        if let Some(pending) = &pending {
            log::info!(
                "📸 已取出共享图片 - {}x{} 标记: {}",
                pending.width,
                pending.height,
                pending.marker.to_file_contents()
            );
        }
        Ok(pending)
    }

    fn load_pending(&self, marker: HandoffMarker) -> Result<Option<PendingHandoff>, HandoffError> {
        let Some(jpeg) = self.store.read_artifact()? else {
            log::warn!("⚠️ 存在交接标记但图片缺失，忽略");
            return Ok(None);
        };

        let image = match image::load_from_memory(&jpeg) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("⚠️ 共享图片无法解码，忽略：{}", err);
                return Ok(None);
            }
        };
        let (width, height) = image.dimensions();

        Ok(Some(PendingHandoff {
            marker,
            jpeg,
            width,
            height,
        }))
    }

    /// 清空容器（会删除图片槽位），只应在没有生产者运行时调用。
    pub fn clear(&self) -> Result<(), HandoffError> {
        self.store.clear()
    }
}
