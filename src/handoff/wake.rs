//! # 唤醒信号模块
//!
//! ## 设计思路
//!
//! 生产者无法确认消费者是否真的被唤醒，因此同时尝试两种互不依赖的机制：
//! 1. 通过自定义 URL scheme 请求系统激活消费者（主机制）
//! 2. 调度一条短延迟的本地通知，携带路由标签（兜底机制，总会尝试）
//!
//! 两者各自在独立任务中执行，任何一方的失败只记录日志，不影响另一方。
//!
//! ## 实现思路
//!
//! - 平台能力通过 `ActivationService` / `NotificationScheduler` 两个 trait 注入。
//! - `signal` 返回的 `WakeOutcome` 只反映主机制“系统是否接受激活请求”，
//!   接受不代表消费者已运行。
//! - 两个任务的汇合只用于输出日志，不参与任何流程判断。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::marker::HandoffMarker;
use super::{HandoffConfig, HandoffError};

/// 通知负载中承载路由标签的字段名。
pub const ROUTING_TAG_KEY: &str = "action";

/// 主唤醒机制的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// 系统接受了激活请求。
    Delivered,
    /// 系统拒绝或无法处理激活请求。
    Unreachable,
}

/// 平台进程激活服务：`open(url) -> 系统是否接受`。
#[async_trait]
pub trait ActivationService: Send + Sync {
    async fn open(&self, url: &str) -> Result<bool, HandoffError>;
}

/// 平台本地通知调度服务。
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    async fn schedule(&self, request: NotificationRequest) -> Result<(), HandoffError>;
}

/// 本地通知请求。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    pub category: String,
    /// 结构化负载，`action` 字段为路由标签。
    pub user_info: BTreeMap<String, String>,
    #[serde(serialize_with = "delay_millis::serialize")]
    pub delay: Duration,
}

impl NotificationRequest {
    pub fn routing_tag(&self) -> Option<&str> {
        self.user_info.get(ROUTING_TAG_KEY).map(String::as_str)
    }
}

mod delay_millis {
    use std::time::Duration;

    pub(super) fn serialize<S>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(delay.as_millis() as u64)
    }
}

/// 唤醒信号发送器。
pub struct WakeSignaler {
    activation: Arc<dyn ActivationService>,
    notifier: Arc<dyn NotificationScheduler>,
    config: Arc<HandoffConfig>,
}

impl WakeSignaler {
    pub fn new(
        activation: Arc<dyn ActivationService>,
        notifier: Arc<dyn NotificationScheduler>,
        config: Arc<HandoffConfig>,
    ) -> Self {
        Self {
            activation,
            notifier,
            config,
        }
    }

    /// 构造携带路由标签的通知请求。
    pub fn notification_request(&self, tag: &str) -> NotificationRequest {
        let mut user_info = BTreeMap::new();
        user_info.insert(ROUTING_TAG_KEY.to_string(), tag.to_string());

        NotificationRequest {
            identifier: format!("{}_{}", tag, HandoffMarker::now().to_file_contents()),
            title: self.config.notification_title.clone(),
            body: self.config.notification_body.clone(),
            category: self.config.notification_category.clone(),
            user_info,
            delay: self.config.notification_delay(),
        }
    }

    /// 同时尝试两种唤醒机制，返回主机制的结果。
    pub async fn signal(&self, tag: &str) -> WakeOutcome {
        let url = self.config.activation_url();
        let request = self.notification_request(tag);

        log::info!("🚀 发送唤醒信号 - url={} tag={}", url, tag);

        let activation = Arc::clone(&self.activation);
        let activation_task = tokio::spawn(async move { activation.open(&url).await });

        let notifier = Arc::clone(&self.notifier);
        let notification_task = tokio::spawn(async move { notifier.schedule(request).await });

        let (activation_result, notification_result) =
            tokio::join!(activation_task, notification_task);

        match notification_result {
            Ok(Ok(())) => log::info!("✅ 本地通知已调度"),
            Ok(Err(err)) => log::warn!("⚠️ 本地通知调度失败（已忽略）：{}", err),
            Err(err) => log::warn!("⚠️ 本地通知任务异常退出（已忽略）：{}", err),
        }

        match activation_result {
            Ok(Ok(true)) => {
                log::info!("✅ 系统已接受激活请求");
                WakeOutcome::Delivered
            }
            Ok(Ok(false)) => {
                log::warn!("⚠️ 系统拒绝了激活请求");
                WakeOutcome::Unreachable
            }
            Ok(Err(err)) => {
                log::warn!("⚠️ 激活请求失败：{}", err);
                WakeOutcome::Unreachable
            }
            Err(err) => {
                log::warn!("⚠️ 激活任务异常退出：{}", err);
                WakeOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::test_support::{RecordingActivation, RecordingNotifier};

    fn signaler(
        activation: Arc<RecordingActivation>,
        notifier: Arc<RecordingNotifier>,
    ) -> WakeSignaler {
        WakeSignaler::new(activation, notifier, Arc::new(HandoffConfig::default()))
    }

    #[tokio::test]
    async fn accepted_activation_is_delivered_and_notification_still_scheduled() {
        let activation = Arc::new(RecordingActivation::accepting(true));
        let notifier = Arc::new(RecordingNotifier::new(false));

        let outcome = signaler(activation.clone(), notifier.clone())
            .signal("shared_image")
            .await;

        assert_eq!(outcome, WakeOutcome::Delivered);
        assert_eq!(activation.opened(), vec!["preppi-ai://shared-image".to_string()]);

        let scheduled = notifier.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].routing_tag(), Some("shared_image"));
        assert_eq!(scheduled[0].delay, Duration::from_secs(1));
        assert_eq!(scheduled[0].category, "SHARED_IMAGE");
    }

    #[tokio::test]
    async fn rejected_or_failed_activation_is_unreachable() {
        let notifier = Arc::new(RecordingNotifier::new(false));

        let rejected = signaler(Arc::new(RecordingActivation::accepting(false)), notifier.clone())
            .signal("shared_image")
            .await;
        assert_eq!(rejected, WakeOutcome::Unreachable);

        let failed = signaler(Arc::new(RecordingActivation::failing()), notifier.clone())
            .signal("shared_image")
            .await;
        assert_eq!(failed, WakeOutcome::Unreachable);

        assert_eq!(notifier.scheduled().len(), 2);
    }

    #[tokio::test]
    async fn notification_failure_does_not_affect_outcome() {
        let activation = Arc::new(RecordingActivation::accepting(true));
        let notifier = Arc::new(RecordingNotifier::new(true));

        let outcome = signaler(activation, notifier.clone()).signal("shared_image").await;

        assert_eq!(outcome, WakeOutcome::Delivered);
        assert_eq!(notifier.scheduled().len(), 1);
    }

    #[test]
    fn notification_request_serializes_routing_tag() {
        let signaler = signaler(
            Arc::new(RecordingActivation::accepting(true)),
            Arc::new(RecordingNotifier::new(false)),
        );
        let request = signaler.notification_request("shared_image");
        let json = serde_json::to_value(&request).expect("serialize request");

        assert_eq!(json["user_info"]["action"], "shared_image");
        assert_eq!(json["delay"], 1000);
        assert!(request.identifier.starts_with("shared_image_"));
    }
}
