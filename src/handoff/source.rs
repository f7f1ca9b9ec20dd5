//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“系统交给生产者的分享请求”和“流水线中间结果”解耦：
//! - `ShareRequest` / `ShareItem` / `Attachment` 表示系统分享面板给出的描述符
//! - `AttachmentContent` 表示单个附件加载后的三种形态
//! - `ImagePayload` 表示已解码、待写入共享容器的像素数据
//!
//! 附件本身不携带字节，只携带类型标签与一个异步加载能力（`AttachmentProvider`），
//! 每个附件可以独立失败。

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;

use super::HandoffError;

/// 属于图片类别的统一类型标识（UTI 风格）。
const IMAGE_TYPE_IDENTIFIERS: &[&str] = &[
    "public.image",
    "public.jpeg",
    "public.png",
    "public.heic",
    "public.heif",
    "public.tiff",
    "com.compuserve.gif",
    "com.microsoft.bmp",
    "org.webmproject.webp",
];

/// 附件类型标签。
///
/// 同时接受 MIME（`image/jpeg`）与统一类型标识（`public.jpeg`）两种写法。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否属于图片类别。空标签或无法识别的标签一律视为否。
    pub fn is_image(&self) -> bool {
        let tag = self.0.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return false;
        }

        if let Some(subtype) = tag.strip_prefix("image/") {
            return !subtype.is_empty();
        }

        tag == "image" || IMAGE_TYPE_IDENTIFIERS.contains(&tag.as_str())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 附件加载后的内容形态，取决于来源应用如何提供。
pub enum AttachmentContent {
    /// 内存中的原始编码字节。
    Data(Bytes),
    /// 文件引用，需要读取后再解码。
    File(PathBuf),
    /// 已解码的图像，直接使用。
    Decoded(DynamicImage),
}

impl AttachmentContent {
    /// 来源提示（用于日志与诊断）。
    pub fn source_hint(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::File(_) => "file",
            Self::Decoded(_) => "decoded",
        }
    }
}

/// 附件内容加载能力。
///
/// 对应平台的“按类型加载”服务：异步执行，结果为错误或内容。
#[async_trait]
pub trait AttachmentProvider: Send + Sync {
    async fn load(&self, type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError>;
}

/// 单个附件描述符：类型标签 + 加载能力。
#[derive(Clone)]
pub struct Attachment {
    type_tag: TypeTag,
    provider: Arc<dyn AttachmentProvider>,
}

impl Attachment {
    pub fn new(type_tag: TypeTag, provider: Arc<dyn AttachmentProvider>) -> Self {
        Self { type_tag, provider }
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub(crate) fn provider(&self) -> Arc<dyn AttachmentProvider> {
        Arc::clone(&self.provider)
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

/// 分享请求中的一个条目，可包含多个附件。
#[derive(Debug, Clone, Default)]
pub struct ShareItem {
    pub attachments: Vec<Attachment>,
}

impl ShareItem {
    pub fn new(attachments: Vec<Attachment>) -> Self {
        Self { attachments }
    }
}

/// 系统在一次生产者调用中交付的全部条目。创建后不可变。
#[derive(Debug, Clone, Default)]
pub struct ShareRequest {
    items: Vec<ShareItem>,
}

impl ShareRequest {
    pub fn new(items: Vec<ShareItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ShareItem] {
        &self.items
    }

    /// 按请求顺序遍历全部附件。
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter().flat_map(|item| item.attachments.iter())
    }
}

/// 解码后的图片：像素数据与尺寸。
///
/// 只在单次交接期间由控制器持有，写入共享容器后即释放。
pub struct ImagePayload {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    /// 来源提示（用于日志与诊断）。
    pub source_hint: &'static str,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("source_hint", &self.source_hint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_recognizes_mime_and_uti() {
        assert!(TypeTag::new("image/jpeg").is_image());
        assert!(TypeTag::new("IMAGE/PNG").is_image());
        assert!(TypeTag::new("public.image").is_image());
        assert!(TypeTag::new("public.heic").is_image());
        assert!(TypeTag::new("image").is_image());
    }

    #[test]
    fn type_tag_rejects_other_categories() {
        assert!(!TypeTag::new("").is_image());
        assert!(!TypeTag::new("   ").is_image());
        assert!(!TypeTag::new("image/").is_image());
        assert!(!TypeTag::new("text/plain").is_image());
        assert!(!TypeTag::new("public.url").is_image());
        assert!(!TypeTag::new("application/pdf").is_image());
    }
}
