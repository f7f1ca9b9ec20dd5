//! # 附件加载模块
//!
//! ## 设计思路
//!
//! 每个图片类附件独立发起一次异步加载（fan-out），全部结束后再汇总（fan-in）。
//! 单个附件的加载或解码失败只记录日志并丢弃该附件，不影响其它附件。
//!
//! ## 实现思路
//!
//! - 每个附件一个 `JoinSet` 任务，任务内按内容形态处理：
//!   - 内存字节：解码
//!   - 文件引用：在阻塞线程中读取后解码
//!   - 已解码图像：只做尺寸校验
//! - 汇总时选取请求顺序中下标最小的成功结果，与完成先后无关，
//!   保证多附件时选择结果确定。
//! - 不设置超时：生产者进程的总寿命由系统限制。

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::pipeline;
use super::resolver::qualifying_attachments;
use super::source::{AttachmentContent, AttachmentProvider, ImagePayload, ShareRequest, TypeTag};
use super::{HandoffConfig, HandoffError};

/// 附件加载器。
pub struct AttachmentLoader {
    config: Arc<HandoffConfig>,
}

impl AttachmentLoader {
    pub fn new(config: Arc<HandoffConfig>) -> Self {
        Self { config }
    }

    /// 加载请求中的图片附件，返回请求顺序中第一个成功解码的结果。
    ///
    /// 没有任何附件解码成功时返回 `None`。
    pub async fn load(&self, request: &ShareRequest) -> Option<ImagePayload> {
        let attachments = qualifying_attachments(request);
        if attachments.is_empty() {
            return None;
        }

        log::info!("📥 开始加载图片附件 - 数量: {}", attachments.len());

        let mut tasks = JoinSet::new();
        for (index, attachment) in attachments.into_iter().enumerate() {
            let provider = attachment.provider();
            let type_tag = attachment.type_tag().clone();
            let config = Arc::clone(&self.config);

            tasks.spawn(async move {
                let result = Self::load_one(provider, &type_tag, config).await;
                (index, type_tag, result)
            });
        }

        let mut selected: Option<(usize, ImagePayload)> = None;
        let mut failures = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(payload))) => {
                    let replace = selected
                        .as_ref()
                        .map(|(current, _)| index < *current)
                        .unwrap_or(true);
                    if replace {
                        selected = Some((index, payload));
                    }
                }
                Ok((index, type_tag, Err(err))) => {
                    failures += 1;
                    if err.is_load_error() {
                        log::warn!("⚠️ 附件 #{} ({}) 加载失败，已跳过：{}", index, type_tag, err);
                    } else {
                        log::error!("❌ 附件 #{} ({}) 出现意外错误，已跳过：{}", index, type_tag, err);
                    }
                }
                Err(err) => {
                    failures += 1;
                    log::warn!("⚠️ 附件加载任务异常退出，已跳过：{}", err);
                }
            }
        }

        match selected {
            Some((index, payload)) => {
                log::info!(
                    "✅ 附件加载完成 - 选用 #{} ({}x{}，来源: {})，失败 {} 个",
                    index,
                    payload.width,
                    payload.height,
                    payload.source_hint,
                    failures
                );
                Some(payload)
            }
            None => {
                log::warn!("❌ 所有图片附件均加载失败 - 失败 {} 个", failures);
                None
            }
        }
    }

    async fn load_one(
        provider: Arc<dyn AttachmentProvider>,
        type_tag: &TypeTag,
        config: Arc<HandoffConfig>,
    ) -> Result<ImagePayload, HandoffError> {
        let content = provider.load(type_tag).await?;
        let source_hint = content.source_hint();

        match content {
            AttachmentContent::Data(bytes) => {
                tokio::task::spawn_blocking(move || {
                    pipeline::decode_bytes(&bytes, source_hint, &config)
                })
                .await
                .map_err(|e| HandoffError::Decode(format!("解码线程执行失败：{}", e)))?
            }
            AttachmentContent::File(path) => {
                tokio::task::spawn_blocking(move || {
                    let bytes = read_file_reference(&path, &config)?;
                    pipeline::decode_bytes(&bytes, source_hint, &config)
                })
                .await
                .map_err(|e| HandoffError::Decode(format!("读取线程执行失败：{}", e)))?
            }
            AttachmentContent::Decoded(image) => {
                pipeline::accept_decoded(image, source_hint, &config)
            }
        }
    }
}

/// 读取文件引用指向的原始字节。
fn read_file_reference(path: &Path, config: &HandoffConfig) -> Result<Vec<u8>, HandoffError> {
    log::debug!("📁 读取附件文件 - 路径: {}", path.display());

    let metadata = std::fs::metadata(path)
        .map_err(|e| HandoffError::Load(format!("无法读取文件信息 {}：{}", path.display(), e)))?;

    if !metadata.is_file() {
        return Err(HandoffError::Load(format!("不是普通文件：{}", path.display())));
    }

    if metadata.len() > config.max_file_size {
        return Err(HandoffError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    std::fs::read(path)
        .map_err(|e| HandoffError::Load(format!("无法读取图片文件 {}：{}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::source::{Attachment, ShareItem};
    use crate::handoff::test_support::{
        DelayedProvider, FailingProvider, NeverCalledProvider, jpeg_bytes, png_bytes, test_image,
    };
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    struct StaticProvider(fn() -> AttachmentContent);

    #[async_trait]
    impl AttachmentProvider for StaticProvider {
        async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
            Ok((self.0)())
        }
    }

    struct FileProvider(PathBuf);

    #[async_trait]
    impl AttachmentProvider for FileProvider {
        async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
            Ok(AttachmentContent::File(self.0.clone()))
        }
    }

    fn loader() -> AttachmentLoader {
        AttachmentLoader::new(Arc::new(HandoffConfig::default()))
    }

    fn image_attachment(provider: Arc<dyn AttachmentProvider>) -> Attachment {
        Attachment::new(TypeTag::new("public.image"), provider)
    }

    #[tokio::test]
    async fn picks_lowest_index_regardless_of_completion_order() {
        let slow_first = Arc::new(DelayedProvider::new(png_bytes(40, 30), 80));
        let fast_second = Arc::new(DelayedProvider::new(png_bytes(20, 10), 0));

        let request = ShareRequest::new(vec![
            ShareItem::new(vec![image_attachment(slow_first.clone())]),
            ShareItem::new(vec![image_attachment(fast_second.clone())]),
        ]);

        let payload = loader().load(&request).await.expect("payload expected");

        assert_eq!((payload.width, payload.height), (40, 30));
        assert_eq!(slow_first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fast_second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_sibling_does_not_abort_success() {
        let request = ShareRequest::new(vec![ShareItem::new(vec![
            image_attachment(Arc::new(DelayedProvider::new(b"not an image".to_vec(), 0))),
            image_attachment(Arc::new(FailingProvider)),
            image_attachment(Arc::new(DelayedProvider::new(jpeg_bytes(64, 48), 10))),
        ])]);

        let payload = loader().load(&request).await.expect("payload expected");
        assert_eq!((payload.width, payload.height), (64, 48));
        assert_eq!(payload.source_hint, "data");
    }

    #[tokio::test]
    async fn all_failures_yield_none() {
        let request = ShareRequest::new(vec![ShareItem::new(vec![
            image_attachment(Arc::new(DelayedProvider::new(b"garbage".to_vec(), 0))),
            image_attachment(Arc::new(FailingProvider)),
        ])]);

        assert!(loader().load(&request).await.is_none());
    }

    #[tokio::test]
    async fn non_image_attachments_are_never_loaded() {
        let request = ShareRequest::new(vec![ShareItem::new(vec![
            Attachment::new(TypeTag::new("public.url"), Arc::new(NeverCalledProvider)),
            image_attachment(Arc::new(DelayedProvider::new(png_bytes(8, 8), 0))),
        ])]);

        let payload = loader().load(&request).await.expect("payload expected");
        assert_eq!((payload.width, payload.height), (8, 8));
    }

    #[tokio::test]
    async fn decoded_image_is_used_directly() {
        let request = ShareRequest::new(vec![ShareItem::new(vec![image_attachment(Arc::new(
            StaticProvider(|| AttachmentContent::Decoded(test_image(12, 7))),
        ))])]);

        let payload = loader().load(&request).await.expect("payload expected");
        assert_eq!((payload.width, payload.height), (12, 7));
        assert_eq!(payload.source_hint, "decoded");
    }

    #[tokio::test]
    async fn file_reference_is_read_and_decoded() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("photo.png");
        std::fs::write(&path, png_bytes(33, 22)).expect("write test image");

        let request = ShareRequest::new(vec![ShareItem::new(vec![image_attachment(Arc::new(
            FileProvider(path),
        ))])]);

        let payload = loader().load(&request).await.expect("payload expected");
        assert_eq!((payload.width, payload.height), (33, 22));
        assert_eq!(payload.source_hint, "file");
    }

    #[tokio::test]
    async fn missing_file_reference_is_dropped() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let request = ShareRequest::new(vec![ShareItem::new(vec![image_attachment(Arc::new(
            FileProvider(dir.path().join("missing.png")),
        ))])]);

        assert!(loader().load(&request).await.is_none());
    }

    #[test]
    fn read_file_reference_enforces_size_limit() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("big.png");
        std::fs::write(&path, png_bytes(64, 64)).expect("write test image");

        let mut config = HandoffConfig::default();
        config.max_file_size = 8;

        let result = read_file_reference(&path, &config);
        assert!(matches!(result, Err(HandoffError::ResourceLimit(_))));
    }
}
