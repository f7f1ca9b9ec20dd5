//! # 交接标记模块
//!
//! 标记文件的内容是 UTF-8 十进制 Unix 时间戳（秒，带 6 位小数），例如
//! `1712345678.123456`。消费者关心的是标记“存在”，时间戳只用于判断新旧。
//!
//! 同一槽位上新标记的时间戳严格大于被替换的旧标记，
//! 即使两次交接落在同一微秒或系统时钟小幅回拨。
//! 旧标记超前当前时间超过 [`MAX_FUTURE_SKEW_MICROS`] 时视为损坏，
//! 新标记回到当前时间，避免之后的标记永远停在“旧标记 + 1 微秒”。

use chrono::{DateTime, Utc};

use super::HandoffError;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// 旧标记允许超前当前时间的上限（5 分钟）。
const MAX_FUTURE_SKEW_MICROS: i64 = 5 * 60 * MICROS_PER_SECOND;

/// 交接标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandoffMarker {
    micros: i64,
}

impl HandoffMarker {
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn now() -> Self {
        Self::from_micros(Utc::now().timestamp_micros())
    }

    /// 生成严格晚于 `previous` 的新标记。
    pub fn after(previous: Option<HandoffMarker>) -> Self {
        let now = Self::now();
        match previous {
            Some(prev) if prev.micros > now.micros.saturating_add(MAX_FUTURE_SKEW_MICROS) => {
                log::warn!(
                    "⚠️ 旧交接标记 {} 远超当前时间，按当前时间重新计时",
                    prev.to_file_contents()
                );
                now
            }
            Some(prev) if now <= prev => Self::from_micros(prev.micros.saturating_add(1)),
            _ => now,
        }
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.micros)
    }

    /// 标记文件内容。
    pub fn to_file_contents(&self) -> String {
        let seconds = self.micros.div_euclid(MICROS_PER_SECOND);
        let fraction = self.micros.rem_euclid(MICROS_PER_SECOND);
        format!("{}.{:06}", seconds, fraction)
    }

    /// 解析标记文件内容。
    ///
    /// 接受纯整数秒或带小数的秒；小数超过 6 位时截断到微秒。
    pub fn parse(contents: &str) -> Result<Self, HandoffError> {
        let text = contents.trim();
        let invalid = || HandoffError::InvalidFormat(format!("无效的交接标记：{:?}", text));

        let (seconds_part, fraction_part) = match text.split_once('.') {
            Some((seconds, fraction)) => (seconds, fraction),
            None => (text, ""),
        };

        if seconds_part.is_empty() || !seconds_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !fraction_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let seconds: i64 = seconds_part.parse().map_err(|_| invalid())?;

        let mut fraction_digits: String = fraction_part.chars().take(6).collect();
        while fraction_digits.len() < 6 {
            fraction_digits.push('0');
        }
        let fraction: i64 = fraction_digits.parse().map_err(|_| invalid())?;

        seconds
            .checked_mul(MICROS_PER_SECOND)
            .and_then(|micros| micros.checked_add(fraction))
            .map(Self::from_micros)
            .ok_or_else(invalid)
    }
}
