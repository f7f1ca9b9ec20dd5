//! 配置文件加载。
//!
//! 配置文件为 JSON，字段均可省略（缺省取生产默认值）；
//! 加载后再应用环境变量覆盖，最后统一校验。

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::handoff::HandoffConfig;

/// 覆盖共享容器父目录。
pub const ENV_CONTAINER_BASE: &str = "SHARE_HANDOFF_CONTAINER_BASE";
/// 覆盖共享容器授权标识。
pub const ENV_GROUP_ID: &str = "SHARE_HANDOFF_GROUP_ID";

/// 默认配置文件位置：`<config_dir>/share-handoff/settings.json`。
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("share-handoff").join("settings.json"))
}

/// 加载配置。
///
/// `path` 为空时使用默认位置；文件不存在时使用默认配置。
pub fn load_config(path: Option<&Path>) -> Result<HandoffConfig, AppError> {
    let settings_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_settings_path(),
    };

    let config = match settings_path {
        Some(settings_path) => read_settings_file(&settings_path)?,
        None => HandoffConfig::default(),
    };

    let config = apply_overrides(config, |key| std::env::var(key).ok());
    config
        .validate()
        .map_err(|e| AppError::Config(e.to_string()))?;
    Ok(config)
}

fn read_settings_file(settings_path: &Path) -> Result<HandoffConfig, AppError> {
    if !settings_path.exists() {
        log::debug!("配置文件不存在，使用默认配置: {}", settings_path.display());
        return Ok(HandoffConfig::default());
    }

    let content = fs::read_to_string(settings_path)?;
    let config = serde_json::from_str::<HandoffConfig>(&content).map_err(|e| {
        AppError::Config(format!("解析设置文件 {} 失败: {}", settings_path.display(), e))
    })?;

    log::debug!("已加载配置文件: {}", settings_path.display());
    Ok(config)
}

/// 应用环境变量覆盖；空值视为未设置。
pub fn apply_overrides<F>(mut config: HandoffConfig, lookup: F) -> HandoffConfig
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(base) = non_blank(ENV_CONTAINER_BASE) {
        config.container_base = Some(PathBuf::from(base));
    }
    if let Some(group_id) = non_blank(ENV_GROUP_ID) {
        config.group_id = group_id;
    }
    config
}

/// 将当前配置写回文件（`init` 子命令使用），父目录不存在时自动创建。
pub fn save_config(path: &Path, config: &HandoffConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("序列化设置失败: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
