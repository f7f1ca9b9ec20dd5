//! # 配置模块
//!
//! ## 设计思路
//!
//! 将交接链路中所有“约定值”集中到 `HandoffConfig`：共享容器授权标识、
//! 固定文件名、唤醒 URL、通知文案与解码上限。生产者与消费者必须读到同一份配置，
//! 否则两侧看到的固定路径不一致。
//!
//! ## 实现思路
//!
//! - `Default` 提供与主应用一致的生产默认值。
//! - `#[serde(default)]` 允许配置文件只写需要覆盖的字段。
//! - `validate` 在进入交接流程前拒绝无效配置。
//! - JPEG 质量不是配置项，固定在 [`JPEG_QUALITY`]。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::HandoffError;

/// 共享图片的 JPEG 编码质量（0–100，对应 0.8）。
pub const JPEG_QUALITY: u8 = 80;

/// 交接配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// 共享容器授权标识，决定容器根目录名。
    pub group_id: String,
    /// 所有共享容器的父目录；为空时使用用户数据目录下的 `shared-containers`。
    pub container_base: Option<PathBuf>,
    /// 图片固定槽位文件名。
    pub artifact_file_name: String,
    /// 交接标记固定文件名。
    pub marker_file_name: String,
    /// 唤醒消费者使用的 URL scheme。
    pub url_scheme: String,
    /// 唤醒 URL 的固定路径段（表示“有图片等待处理”）。
    pub activation_path: String,
    /// 通知负载中 `action` 字段的路由值。
    pub routing_tag: String,
    pub notification_title: String,
    pub notification_body: String,
    pub notification_category: String,
    /// 通知延迟投递时间（毫秒）。
    pub notification_delay_ms: u64,
    /// 主唤醒机制被拒绝时的提示标题。
    pub acknowledgment_title: String,
    pub acknowledgment_message: String,
    /// 单个附件原始字节上限。
    pub max_file_size: u64,
    /// 解码后像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            group_id: "group.preppi-ai.shared".to_string(),
            container_base: None,
            artifact_file_name: "shared_image.jpg".to_string(),
            marker_file_name: "shared_image_notification.txt".to_string(),
            url_scheme: "preppi-ai".to_string(),
            activation_path: "shared-image".to_string(),
            routing_tag: "shared_image".to_string(),
            notification_title: "Preppi AI".to_string(),
            notification_body: "Your image is ready! Click here to open and get your recipe.".to_string(),
            notification_category: "SHARED_IMAGE".to_string(),
            notification_delay_ms: 1_000,
            acknowledgment_title: "Image Saved!".to_string(),
            acknowledgment_message: "Your image has been saved. Please open Preppi AI to continue with recipe analysis.".to_string(),
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
        }
    }
}

impl HandoffConfig {
    /// 唤醒消费者的完整 URL，例如 `preppi-ai://shared-image`。
    pub fn activation_url(&self) -> String {
        format!("{}://{}", self.url_scheme, self.activation_path)
    }

    pub fn notification_delay(&self) -> Duration {
        Duration::from_millis(self.notification_delay_ms)
    }

    /// 校验配置，任一约定值无效即拒绝。
    pub fn validate(&self) -> Result<(), HandoffError> {
        Self::validate_file_name("group_id", &self.group_id)?;
        Self::validate_file_name("artifact_file_name", &self.artifact_file_name)?;
        Self::validate_file_name("marker_file_name", &self.marker_file_name)?;

        if self.artifact_file_name == self.marker_file_name {
            return Err(invalid(
                "artifact_file_name 与 marker_file_name 不能相同",
            ));
        }

        if !Self::is_valid_scheme(&self.url_scheme) {
            return Err(invalid(format!(
                "无效的 URL scheme：{}",
                self.url_scheme
            )));
        }

        if self.activation_path.is_empty()
            || self.activation_path.contains(['?', '#', ' '])
        {
            return Err(invalid(
                "activation_path 不能为空且不能包含查询参数",
            ));
        }

        if self.routing_tag.trim().is_empty() {
            return Err(invalid("routing_tag 不能为空"));
        }

        if self.max_file_size == 0 || self.max_decoded_pixels == 0 || self.max_decoded_bytes == 0 {
            return Err(invalid("资源上限必须大于 0"));
        }

        Ok(())
    }

    fn validate_file_name(field: &str, value: &str) -> Result<(), HandoffError> {
        if value.trim().is_empty() {
            return Err(invalid(format!("{} 不能为空", field)));
        }
        if value.contains(['/', '\\']) || value == "." || value == ".." {
            return Err(invalid(format!(
                "{} 不能包含路径分隔符：{}",
                field, value
            )));
        }
        Ok(())
    }

    /// RFC 3986：`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`。
    fn is_valid_scheme(scheme: &str) -> bool {
        let mut chars = scheme.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    }
}

fn invalid(message: impl Into<String>) -> HandoffError {
    HandoffError::InvalidFormat(message.into())
}
