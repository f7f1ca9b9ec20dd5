//! # 共享容器模块
//!
//! ## 设计思路
//!
//! 生产者与消费者通过同一个共享容器目录交接内容，容器内只有两个固定文件：
//! - 图片槽位（JPEG，单槽，后写覆盖先写）
//! - 交接标记（十进制 Unix 时间戳）
//!
//! 消费者任何时刻都不能看到“有标记但图片缺失或写了一半”的状态。
//!
//! ## 实现思路
//!
//! - 容器根目录由授权标识解析，目录不存在视为授权缺失，直接失败且不重试。
//!   生产者从不创建容器，容器由消费者开通（见 `inbox`）。
//! - 两个文件都采用“写临时文件 → fsync → rename 覆盖”的方式替换，
//!   旧文件的删除由 rename 原子完成，读者只会看到完整的旧文件或完整的新文件。
//! - 标记只能在图片写入成功之后写入，写入前再次确认图片存在。

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::marker::HandoffMarker;
use super::pipeline;
use super::source::ImagePayload;
use super::{HandoffConfig, HandoffError};

const PARTIAL_SUFFIX: &str = ".partial";
const CLAIMED_SUFFIX: &str = ".claimed";

/// 共享容器。
#[derive(Debug, Clone)]
pub struct SharedStore {
    root: PathBuf,
    artifact_path: PathBuf,
    marker_path: PathBuf,
}

impl SharedStore {
    /// 解析授权标识对应的容器根目录（不检查是否存在）。
    pub fn container_root(config: &HandoffConfig) -> Result<PathBuf, HandoffError> {
        let base = match &config.container_base {
            Some(base) => base.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join("shared-containers"))
                .ok_or_else(|| {
                    HandoffError::ContainerUnavailable("无法确定用户数据目录".to_string())
                })?,
        };
        Ok(base.join(&config.group_id))
    }

    /// 按配置打开共享容器。授权缺失时返回 `ContainerUnavailable`。
    pub fn resolve(config: &HandoffConfig) -> Result<Self, HandoffError> {
        let root = Self::container_root(config)?;
        Self::open(root, config)
    }

    /// 打开指定目录作为共享容器。
    pub fn open(root: PathBuf, config: &HandoffConfig) -> Result<Self, HandoffError> {
        if !root.is_dir() {
            return Err(HandoffError::ContainerUnavailable(format!(
                "共享容器 {} 未开通（授权标识：{}），请检查容器授权配置",
                root.display(),
                config.group_id
            )));
        }

        Ok(Self {
            artifact_path: root.join(&config.artifact_file_name),
            marker_path: root.join(&config.marker_file_name),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// 以固定质量编码图片并写入槽位，返回写入的字节数。
    pub fn put_image(&self, payload: &ImagePayload) -> Result<usize, HandoffError> {
        let jpeg = pipeline::encode_jpeg(payload)?;
        self.write_artifact(&jpeg)?;
        Ok(jpeg.len())
    }

    /// 原子替换图片槽位。
    pub fn write_artifact(&self, bytes: &[u8]) -> Result<(), HandoffError> {
        if bytes.is_empty() {
            return Err(HandoffError::Persist("拒绝写入空图片".to_string()));
        }

        let replaced = self.artifact_path.is_file();
        replace_atomically(&self.artifact_path, bytes)?;

        let written = fs::metadata(&self.artifact_path)
            .map(|meta| meta.len())
            .map_err(|e| HandoffError::Persist(format!("写入后无法读取图片信息：{}", e)))?;
        if written != bytes.len() as u64 {
            return Err(HandoffError::Persist(format!(
                "写入校验失败：期望 {} bytes，实际 {} bytes",
                bytes.len(),
                written
            )));
        }

        log::info!(
            "✅ 图片已写入共享容器 - {} ({} bytes{})",
            self.artifact_path.display(),
            bytes.len(),
            if replaced { "，已替换旧图片" } else { "" }
        );
        Ok(())
    }

    /// 写入指定时间戳的交接标记。图片槽位为空时拒绝写入。
    pub fn write_marker(&self, marker: HandoffMarker) -> Result<(), HandoffError> {
        if !self.artifact_path.is_file() {
            return Err(HandoffError::Persist(
                "图片槽位为空，拒绝写入交接标记".to_string(),
            ));
        }

        replace_atomically(&self.marker_path, marker.to_file_contents().as_bytes())?;

        log::info!(
            "✅ 交接标记已写入 - {} ({})",
            self.marker_path.display(),
            marker.to_file_contents()
        );
        Ok(())
    }

    /// 生成严格晚于当前标记的新标记并写入。
    pub fn stamp_marker(&self) -> Result<HandoffMarker, HandoffError> {
        let previous = match self.read_marker() {
            Ok(previous) => previous,
            Err(err) => {
                log::warn!("⚠️ 旧交接标记无法解析，将直接覆盖：{}", err);
                None
            }
        };
        let marker = HandoffMarker::after(previous);
        self.write_marker(marker)?;
        Ok(marker)
    }

    /// 读取当前交接标记；不存在时返回 `None`。
    pub fn read_marker(&self) -> Result<Option<HandoffMarker>, HandoffError> {
        match fs::read_to_string(&self.marker_path) {
            Ok(contents) => HandoffMarker::parse(&contents).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(HandoffError::Load(format!("读取交接标记失败：{}", err))),
        }
    }

    /// 读取图片槽位；不存在时返回 `None`。
    pub fn read_artifact(&self) -> Result<Option<Vec<u8>>, HandoffError> {
        match fs::read(&self.artifact_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(HandoffError::Load(format!("读取共享图片失败：{}", err))),
        }
    }

    /// 认领当前交接标记：把标记原子地改名为私有的认领文件后再解析。
    ///
    /// 认领之后生产者写入的新标记不受影响，仍处于待处理状态。
    /// 没有标记时返回 `None`；认领到的标记无法解析时丢弃并返回 `None`。
    pub fn claim_marker(&self) -> Result<Option<HandoffMarker>, HandoffError> {
        let claimed = self.claimed_marker_path();
        match fs::rename(&self.marker_path, &claimed) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(HandoffError::Load(format!("认领交接标记失败：{}", err)));
            }
        }

        let contents = fs::read_to_string(&claimed)
            .map_err(|e| HandoffError::Load(format!("读取已认领标记失败：{}", e)))?;
        match HandoffMarker::parse(&contents) {
            Ok(marker) => Ok(Some(marker)),
            Err(err) => {
                log::warn!("⚠️ 已认领的交接标记无法解析，丢弃：{}", err);
                self.release_claim()?;
                Ok(None)
            }
        }
    }

    /// 删除认领文件。
    pub fn release_claim(&self) -> Result<(), HandoffError> {
        remove_if_exists(&self.claimed_marker_path())
    }

    fn claimed_marker_path(&self) -> PathBuf {
        sibling_with_suffix(&self.marker_path, CLAIMED_SUFFIX)
    }

    /// 清空容器：先删标记再删图片，文件不存在不算错误。
    ///
    /// 会删除图片槽位，只应在没有生产者运行时调用。
    pub fn clear(&self) -> Result<(), HandoffError> {
        remove_if_exists(&self.marker_path)?;
        remove_if_exists(&self.artifact_path)?;
        log::info!("🗑️ 共享容器已清空 - {}", self.root.display());
        Ok(())
    }
}

/// 写入同目录临时文件并 fsync，再 rename 覆盖目标。失败时清理临时文件。
fn replace_atomically(target: &Path, bytes: &[u8]) -> Result<(), HandoffError> {
    let partial = partial_path(target);

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&partial)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial, target)
    })();

    if let Err(err) = result {
        if let Err(cleanup) = fs::remove_file(&partial) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                log::warn!("⚠️ 清理临时文件失败 {}：{}", partial.display(), cleanup);
            }
        }
        return Err(HandoffError::Persist(format!(
            "写入 {} 失败：{}",
            target.display(),
            err
        )));
    }

    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    sibling_with_suffix(target, PARTIAL_SUFFIX)
}

/// 同目录下以 `.` 开头的隐藏文件：`.{name}{suffix}`。
fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{}{}", name, suffix))
}

fn remove_if_exists(path: &Path) -> Result<(), HandoffError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(HandoffError::Persist(format!(
            "删除 {} 失败：{}",
            path.display(),
            err
        ))),
    }
}
