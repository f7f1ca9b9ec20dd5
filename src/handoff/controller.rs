//! # 交接编排模块
//!
//! ## 设计思路
//!
//! `HandoffController` 是唯一与生产者单次调用生命周期绑定的组件，
//! 负责把识别、加载、持久化、唤醒串成一条固定流程，并决定如何结束进程：
//!
//! ```text
//! Idle → ResolvingAttachment → Loading → Persisting → Signaling → Terminated(outcome)
//! ```
//!
//! - 没有图片：直接结束，不展示任何界面
//! - 加载全部失败 / 写入失败：静默结束，不重试
//! - 已发出唤醒信号：视为成功，不等待消费者确认
//! - 唯一的可见分支：主唤醒机制明确返回 `Unreachable` 时，展示一次阻塞提示后再结束
//!
//! ## 实现思路
//!
//! - `InFlightGuard` 以 RAII 方式持有“进行中”标志，重复触发直接返回 `None`。
//! - 编码与文件写入在阻塞线程中执行，图片写入成功后才写标记，标记写入后才发唤醒信号。
//! - 所有错误在此处转换为 `HandoffOutcome`，`run` 本身不返回错误。
//! - 不设置超时，生产者进程的总寿命由系统限制。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use super::loader::AttachmentLoader;
use super::marker::HandoffMarker;
use super::resolver::has_qualifying_content;
use super::source::{ImagePayload, ShareRequest};
use super::store::SharedStore;
use super::wake::{ActivationService, NotificationScheduler, WakeOutcome, WakeSignaler};
use super::{HandoffConfig, HandoffError};

/// 交接终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    Success,
    NoContent,
    LoadFailure,
    PersistFailure,
}

/// 编排状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    Idle,
    ResolvingAttachment,
    Loading,
    Persisting,
    Signaling,
    Terminated(HandoffOutcome),
}

/// 单次交接的结果汇总。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffReport {
    pub outcome: HandoffOutcome,
    /// 仅在进入 Signaling 后有值。
    pub wake: Option<WakeOutcome>,
    /// 仅在标记写入成功后有值。
    pub marker: Option<HandoffMarker>,
    /// 是否展示过阻塞提示。
    pub acknowledged: bool,
}

/// 展示给用户的阻塞提示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub title: String,
    pub message: String,
}

/// 生产者宿主：负责结束请求与展示唯一的阻塞提示。
#[async_trait]
pub trait ProducerHost: Send + Sync {
    /// 展示阻塞提示，用户确认后返回。
    async fn acknowledge(&self, notice: &Acknowledgment);

    /// 结束生产者请求，不返回任何条目。
    fn complete(&self);
}

/// “进行中”标志的 RAII 守卫：获取时置位，`Drop` 时清除。
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 交接编排器。
pub struct HandoffController {
    config: Arc<HandoffConfig>,
    loader: AttachmentLoader,
    signaler: WakeSignaler,
    host: Arc<dyn ProducerHost>,
    in_flight: AtomicBool,
    state: Mutex<HandoffState>,
}

impl HandoffController {
    pub fn new(
        config: HandoffConfig,
        activation: Arc<dyn ActivationService>,
        notifier: Arc<dyn NotificationScheduler>,
        host: Arc<dyn ProducerHost>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            loader: AttachmentLoader::new(Arc::clone(&config)),
            signaler: WakeSignaler::new(activation, notifier, Arc::clone(&config)),
            config,
            host,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(HandoffState::Idle),
        }
    }

    /// 预检：请求中是否有可交接的图片。决定生产者界面是否可进入。
    pub fn is_content_valid(&self, request: &ShareRequest) -> bool {
        has_qualifying_content(request)
    }

    /// 当前状态快照。
    pub fn state(&self) -> HandoffState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: HandoffState) {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        log::debug!("🔀 交接状态：{:?} → {:?}", previous, next);
    }

    /// 生产者入口：执行一次完整交接并结束请求。
    ///
    /// 已有交接在进行中时为空操作，返回 `None`。
    pub async fn run(&self, request: &ShareRequest) -> Option<HandoffReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            log::debug!("⏭️ 交接已在进行中，忽略重复触发");
            return None;
        };

        log::info!("📸 开始处理分享内容");
        let total_start = Instant::now();

        let (outcome, wake, marker) = self.drive(request).await;
        self.transition(HandoffState::Terminated(outcome));

        let acknowledged = self.terminate(outcome, wake).await;

        log::info!(
            "🏁 交接结束 - outcome={:?} wake={:?} total={}ms",
            outcome,
            wake,
            total_start.elapsed().as_millis()
        );

        Some(HandoffReport {
            outcome,
            wake,
            marker,
            acknowledged,
        })
    }

    async fn drive(
        &self,
        request: &ShareRequest,
    ) -> (HandoffOutcome, Option<WakeOutcome>, Option<HandoffMarker>) {
        self.transition(HandoffState::ResolvingAttachment);
        if !has_qualifying_content(request) {
            log::info!("❌ {}，静默结束", HandoffError::ContentAbsent);
            return (HandoffOutcome::NoContent, None, None);
        }

        self.transition(HandoffState::Loading);
        let load_start = Instant::now();
        let Some(payload) = self.loader.load(request).await else {
            return (HandoffOutcome::LoadFailure, None, None);
        };
        let load_elapsed = load_start.elapsed();

        self.transition(HandoffState::Persisting);
        let persist_start = Instant::now();
        let marker = match self.persist(payload).await {
            Ok(marker) => marker,
            Err(err) => {
                match &err {
                    HandoffError::ContainerUnavailable(_) => {
                        log::error!("❌ 共享容器授权缺失，本次交接终止：{}", err)
                    }
                    err if err.is_persist_error() => {
                        log::error!("❌ 写入共享容器失败，本次交接终止：{}", err)
                    }
                    err => log::error!("❌ 写入阶段出现意外错误，本次交接终止：{}", err),
                }
                return (HandoffOutcome::PersistFailure, None, None);
            }
        };
        let persist_elapsed = persist_start.elapsed();

        self.transition(HandoffState::Signaling);
        let signal_start = Instant::now();
        let wake = self.signaler.signal(&self.config.routing_tag).await;

        log::info!(
            "✅ 交接完成 - load={}ms persist={}ms signal={}ms",
            load_elapsed.as_millis(),
            persist_elapsed.as_millis(),
            signal_start.elapsed().as_millis()
        );

        (HandoffOutcome::Success, Some(wake), Some(marker))
    }

    /// 编码并写入图片，成功后写入标记。
    async fn persist(&self, payload: ImagePayload) -> Result<HandoffMarker, HandoffError> {
        let config = Arc::clone(&self.config);

        tokio::task::spawn_blocking(move || {
            let store = SharedStore::resolve(&config)?;
            store.put_image(&payload)?;
            store.stamp_marker()
        })
        .await
        .map_err(|e| HandoffError::Persist(format!("写入线程执行失败：{}", e)))?
    }

    /// 结束生产者请求；返回是否展示过阻塞提示。
    async fn terminate(&self, outcome: HandoffOutcome, wake: Option<WakeOutcome>) -> bool {
        let needs_notice =
            outcome == HandoffOutcome::Success && wake == Some(WakeOutcome::Unreachable);

        if needs_notice {
            log::info!("💬 无法直接打开主应用，展示提示后结束");
            let notice = Acknowledgment {
                title: self.config.acknowledgment_title.clone(),
                message: self.config.acknowledgment_message.clone(),
            };
            self.host.acknowledge(&notice).await;
        }

        self.host.complete();
        needs_notice
    }
}
