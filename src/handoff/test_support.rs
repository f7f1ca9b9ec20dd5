//! 单元测试共用的图片构造与假平台服务。

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

use super::source::{AttachmentContent, AttachmentProvider, TypeTag};
use super::wake::{ActivationService, NotificationRequest, NotificationScheduler};
use super::HandoffError;

pub(crate) fn test_image(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let r = (x % 255) as u8;
        let g = (y % 255) as u8;
        let b = ((x + y) % 255) as u8;
        Rgba([r, g, b, 255])
    });
    DynamicImage::ImageRgba8(img)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(test_image(width, height).to_rgb8()),
        _ => test_image(width, height),
    };
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .expect("failed to encode test image");
    cursor.into_inner()
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

/// 断言从未被加载的附件。
pub(crate) struct NeverCalledProvider;

#[async_trait]
impl AttachmentProvider for NeverCalledProvider {
    async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        panic!("provider should not be called");
    }
}

/// 可配置延迟的内存附件，用于制造乱序完成。
pub(crate) struct DelayedProvider {
    pub(crate) bytes: Bytes,
    pub(crate) delay: Duration,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl DelayedProvider {
    pub(crate) fn new(bytes: Vec<u8>, delay_ms: u64) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            delay: Duration::from_millis(delay_ms),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl AttachmentProvider for DelayedProvider {
    async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(AttachmentContent::Data(self.bytes.clone()))
    }
}

pub(crate) struct FailingProvider;

#[async_trait]
impl AttachmentProvider for FailingProvider {
    async fn load(&self, type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        Err(HandoffError::Load(format!("{} 不可用", type_tag)))
    }
}

/// 记录调用次数与 URL 的激活服务。
pub(crate) struct RecordingActivation {
    pub(crate) accept: bool,
    pub(crate) fail: bool,
    pub(crate) opened: Mutex<Vec<String>>,
}

impl RecordingActivation {
    pub(crate) fn accepting(accept: bool) -> Self {
        Self {
            accept,
            fail: false,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            accept: false,
            fail: true,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActivationService for RecordingActivation {
    async fn open(&self, url: &str) -> Result<bool, HandoffError> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        if self.fail {
            return Err(HandoffError::Signal("activation denied".to_string()));
        }
        Ok(self.accept)
    }
}

/// 记录通知请求的调度服务。
pub(crate) struct RecordingNotifier {
    pub(crate) fail: bool,
    pub(crate) scheduled: Mutex<Vec<NotificationRequest>>,
}

impl RecordingNotifier {
    pub(crate) fn new(fail: bool) -> Self {
        Self {
            fail,
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn scheduled(&self) -> Vec<NotificationRequest> {
        self.scheduled.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationScheduler for RecordingNotifier {
    async fn schedule(&self, request: NotificationRequest) -> Result<(), HandoffError> {
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.push(request);
        }
        if self.fail {
            return Err(HandoffError::Signal("notifications not permitted".to_string()));
        }
        Ok(())
    }
}
