//! # 平台适配模块
//!
//! 把交接流水线依赖的平台能力落到桌面环境上：
//! - 附件来源：本地文件、内存字节、Data URL / Base64
//! - `SchemeLauncher`：通过系统 URL 处理程序激活消费者
//! - `DesktopNotifier`：延迟投递的桌面通知（Unix 下为 `notify-send`）
//! - `TerminalHost`：命令行宿主，负责阻塞提示与结束请求

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::handoff::{
    Acknowledgment, ActivationService, Attachment, AttachmentContent, AttachmentProvider,
    HandoffError, NotificationRequest, NotificationScheduler, ProducerHost, TypeTag,
};

/// 无法识别时使用的通用数据类型标签（不属于图片类别）。
const GENERIC_DATA_TAG: &str = "public.data";

// ===================== 附件来源 =====================

/// 按魔数识别字节的类型标签。
fn sniff_type_tag(bytes: &[u8]) -> Option<TypeTag> {
    infer::get(bytes).map(|kind| TypeTag::new(kind.mime_type()))
}

/// 按扩展名推断类型标签。
fn type_tag_from_extension(path: &Path) -> Option<TypeTag> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let tag = match ext.as_str() {
        "jpg" | "jpeg" => "public.jpeg",
        "png" => "public.png",
        "heic" => "public.heic",
        "heif" => "public.heif",
        "gif" => "com.compuserve.gif",
        "bmp" => "com.microsoft.bmp",
        "tif" | "tiff" => "public.tiff",
        "webp" => "org.webmproject.webp",
        _ => return None,
    };
    Some(TypeTag::new(tag))
}

/// 本地文件附件，加载结果为文件引用。
pub struct FileAttachment {
    path: PathBuf,
}

impl FileAttachment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 识别文件类型：优先读取文件头魔数，失败时回退到扩展名。
    pub fn type_tag(&self) -> TypeTag {
        match infer::get_from_path(&self.path) {
            Ok(Some(kind)) => return TypeTag::new(kind.mime_type()),
            Ok(None) => {}
            Err(err) => log::debug!("读取文件头失败 {}: {}", self.path.display(), err),
        }
        type_tag_from_extension(&self.path).unwrap_or_else(|| TypeTag::new(GENERIC_DATA_TAG))
    }

    pub fn into_attachment(self) -> Attachment {
        let type_tag = self.type_tag();
        Attachment::new(type_tag, Arc::new(self))
    }
}

#[async_trait]
impl AttachmentProvider for FileAttachment {
    async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        Ok(AttachmentContent::File(self.path.clone()))
    }
}

/// 内存字节附件（例如从标准输入读取）。
pub struct InlineAttachment {
    bytes: Bytes,
}

impl InlineAttachment {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// 从流中读取附件，最多读取 `limit + 1` 字节。
    ///
    /// 多出的一个字节让超限内容在加载阶段被识别为资源超限。
    pub async fn read_limited<R>(reader: R, limit: u64) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = Vec::new();
        reader.take(limit.saturating_add(1)).read_to_end(&mut bytes).await?;
        if bytes.len() as u64 > limit {
            log::warn!("⚠️ 输入流超过 {} 字节上限，已截断", limit);
        }
        Ok(Self::new(bytes))
    }

    pub fn into_attachment(self) -> Attachment {
        let type_tag =
            sniff_type_tag(&self.bytes).unwrap_or_else(|| TypeTag::new(GENERIC_DATA_TAG));
        Attachment::new(type_tag, Arc::new(self))
    }
}

#[async_trait]
impl AttachmentProvider for InlineAttachment {
    async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        Ok(AttachmentContent::Data(self.bytes.clone()))
    }
}

/// Data URL（`data:image/png;base64,...`）或纯 Base64 附件。
///
/// 解码在 `load` 时进行，解码前先按 Base64 长度估算体积上限。
pub struct DataUrlAttachment {
    data: String,
    max_file_size: u64,
}

impl DataUrlAttachment {
    pub fn new(data: impl Into<String>, max_file_size: u64) -> Self {
        Self {
            data: data.into(),
            max_file_size,
        }
    }

    /// Data URL 声明的 MIME 类型；纯 Base64 视为通用图片。
    pub fn type_tag(&self) -> TypeTag {
        let normalized = self.data.trim();
        match normalized.strip_prefix("data:") {
            Some(rest) => {
                let mime = rest.split([';', ',']).next().unwrap_or_default();
                if mime.is_empty() {
                    TypeTag::new(GENERIC_DATA_TAG)
                } else {
                    TypeTag::new(mime)
                }
            }
            None => TypeTag::new("public.image"),
        }
    }

    pub fn into_attachment(self) -> Attachment {
        let type_tag = self.type_tag();
        Attachment::new(type_tag, Arc::new(self))
    }
}

#[async_trait]
impl AttachmentProvider for DataUrlAttachment {
    async fn load(&self, _type_tag: &TypeTag) -> Result<AttachmentContent, HandoffError> {
        parse_base64_with_limit(&self.data, self.max_file_size)
            .map(|bytes| AttachmentContent::Data(Bytes::from(bytes)))
    }
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, HandoffError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| HandoffError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| HandoffError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 解析 Data URL 或纯 Base64，超过上限时在解码前拒绝。
fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, HandoffError> {
    let normalized = data.trim();

    let base64_data = if let Some(rest) = normalized.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| HandoffError::InvalidFormat("Data URL 缺少数据段".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(HandoffError::InvalidFormat("缺少 base64 标记".to_string()));
        }
        payload
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(base64_data)?;
    if estimated_len > max_file_size {
        return Err(HandoffError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| HandoffError::Decode(format!("Base64 解码失败：{}", e)))
}

// ===================== 激活 =====================

/// 通过系统 URL 处理程序打开激活 URL。
///
/// 处理程序退出码为 0 视为系统接受了请求。
pub struct SchemeLauncher {
    program: String,
    args: Vec<String>,
}

impl SchemeLauncher {
    /// 使用自定义处理程序，URL 追加在 `args` 之后。
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for SchemeLauncher {
    #[cfg(target_os = "macos")]
    fn default() -> Self {
        Self::with_command("open", Vec::new())
    }

    #[cfg(target_os = "windows")]
    fn default() -> Self {
        Self::with_command(
            "cmd",
            vec!["/C".to_string(), "start".to_string(), String::new()],
        )
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn default() -> Self {
        Self::with_command("xdg-open", Vec::new())
    }
}

#[async_trait]
impl ActivationService for SchemeLauncher {
    async fn open(&self, url: &str) -> Result<bool, HandoffError> {
        log::debug!("🔗 调用 URL 处理程序 - {} {}", self.program, url);

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                HandoffError::Signal(format!("无法启动 URL 处理程序 {}：{}", self.program, e))
            })?;

        if !status.success() {
            log::debug!("URL 处理程序退出状态: {}", status);
        }
        Ok(status.success())
    }
}

// ===================== 通知 =====================

/// 桌面通知调度器。
///
/// 生产者进程在调度后立即退出，因此延迟由一个脱离的子进程承担。
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::with_program("notify-send")
    }
}

/// 组装 `notify-send` 参数：类别、路由标签提示、标题、正文。
pub fn notify_send_args(request: &NotificationRequest) -> Vec<String> {
    let mut args = vec![
        format!("--category={}", request.category),
        format!("--app-name={}", request.title),
    ];
    for (key, value) in &request.user_info {
        args.push(format!("--hint=string:{}:{}", key, value));
    }
    args.push(request.title.clone());
    args.push(request.body.clone());
    args
}

#[cfg(unix)]
#[async_trait]
impl NotificationScheduler for DesktopNotifier {
    async fn schedule(&self, request: NotificationRequest) -> Result<(), HandoffError> {
        let delay = format!(
            "{}.{:03}",
            request.delay.as_secs(),
            request.delay.subsec_millis()
        );

        let child = Command::new("sh")
            .arg("-c")
            .arg(r#"sleep "$1"; shift; exec "$@""#)
            .arg("sh")
            .arg(&delay)
            .arg(&self.program)
            .args(notify_send_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HandoffError::Signal(format!("无法调度桌面通知：{}", e)))?;

        log::debug!(
            "🔔 桌面通知已调度 - id={} delay={}s pid={:?}",
            request.identifier,
            delay,
            child.id()
        );
        Ok(())
    }
}

#[cfg(not(unix))]
#[async_trait]
impl NotificationScheduler for DesktopNotifier {
    async fn schedule(&self, request: NotificationRequest) -> Result<(), HandoffError> {
        log::debug!("当前平台不支持桌面通知 - id={}", request.identifier);
        Err(HandoffError::Signal("unsupported".to_string()))
    }
}

// ===================== 宿主 =====================

/// 命令行宿主：提示输出到 stderr，保持 stdout 干净。
#[derive(Default)]
pub struct TerminalHost;

#[async_trait]
impl ProducerHost for TerminalHost {
    async fn acknowledge(&self, notice: &Acknowledgment) {
        eprintln!("{}\n{}", notice.title, notice.message);

        if !std::io::stdin().is_terminal() {
            return;
        }

        eprintln!("按回车键继续…");
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if let Err(err) = reader.read_line(&mut line).await {
            log::warn!("读取确认输入失败: {}", err);
        }
    }

    fn complete(&self) {
        log::info!("✅ 分享请求已结束");
    }
}
