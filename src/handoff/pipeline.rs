//! # 解码与编码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → JPEG”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做签名与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 通过文件签名（magic bytes）确认是图片
//! 2. 读取 header 尺寸并按像素/内存上限快速拒绝
//! 3. 完整解码
//! 4. 写入共享容器前统一编码为固定质量的 JPEG

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageReader};

use super::config::JPEG_QUALITY;
use super::source::ImagePayload;
use super::{HandoffConfig, HandoffError};

/// 将原始编码字节解码为 `ImagePayload`。
pub(crate) fn decode_bytes(
    bytes: &[u8],
    source_hint: &'static str,
    config: &HandoffConfig,
) -> Result<ImagePayload, HandoffError> {
    if bytes.len() as u64 > config.max_file_size {
        return Err(HandoffError::ResourceLimit(format!(
            "附件过大：{:.2} MB（限制：{:.2} MB）",
            bytes.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    validate_image_signature(bytes)?;

    let (header_width, header_height) = inspect_dimensions_from_memory(bytes)?;
    validate_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| HandoffError::Decode(format!("图片解码失败：{}", e)))?;

    let payload = accept_decoded(decoded, source_hint, config)?;

    log::info!(
        "✅ 图片解码成功 - 来源: {} 尺寸: {}x{} 输入: {} bytes",
        source_hint,
        payload.width,
        payload.height,
        bytes.len()
    );

    Ok(payload)
}

/// 接收一张已解码的图片，只做尺寸校验。
pub(crate) fn accept_decoded(
    image: DynamicImage,
    source_hint: &'static str,
    config: &HandoffConfig,
) -> Result<ImagePayload, HandoffError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(HandoffError::Decode("图片尺寸为 0".to_string()));
    }
    validate_limits(config, width, height)?;

    Ok(ImagePayload {
        image,
        width,
        height,
        source_hint,
    })
}

/// 以固定质量编码为 JPEG。
///
/// JPEG 不支持透明通道，统一转换为 RGB8 后编码。
/// 相同像素输入得到逐字节相同的输出。
pub fn encode_jpeg(payload: &ImagePayload) -> Result<Vec<u8>, HandoffError> {
    let rgb = payload.image.to_rgb8();
    let mut buffer = Vec::with_capacity(rgb.as_raw().len() / 8);

    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| HandoffError::Persist(format!("JPEG 编码失败：{}", e)))?;

    log::debug!(
        "🗜️ JPEG 编码完成 - {}x{} quality={} size={} bytes",
        payload.width,
        payload.height,
        JPEG_QUALITY,
        buffer.len()
    );

    Ok(buffer)
}

/// 通过文件签名（magic bytes）校验输入是否为图片。
pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), HandoffError> {
    if bytes.is_empty() {
        return Err(HandoffError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| HandoffError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(HandoffError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), HandoffError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| HandoffError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| HandoffError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_limits(config: &HandoffConfig, width: u32, height: u32) -> Result<(), HandoffError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| HandoffError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(HandoffError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| HandoffError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(HandoffError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::test_support::{jpeg_bytes, png_bytes};

    #[test]
    fn decodes_png_with_dimensions() {
        let png = png_bytes(320, 200);
        let payload = decode_bytes(&png, "test", &HandoffConfig::default())
            .expect("decode should succeed");

        assert_eq!((payload.width, payload.height), (320, 200));
        assert_eq!(payload.source_hint, "test");
    }

    #[test]
    fn rejects_non_image_payload() {
        let result = decode_bytes(b"<html>not an image</html>", "test", &HandoffConfig::default());
        assert!(matches!(result, Err(HandoffError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_truncated_image() {
        let mut jpeg = jpeg_bytes(64, 64);
        jpeg.truncate(20);

        let result = decode_bytes(&jpeg, "test", &HandoffConfig::default());
        assert!(result.is_err());
        assert!(result.err().map(|e| e.is_load_error()).unwrap_or(false));
    }

    #[test]
    fn rejects_too_many_pixels_before_decode() {
        let mut config = HandoffConfig::default();
        config.max_decoded_pixels = 10_000;

        let result = decode_bytes(&png_bytes(200, 200), "test", &config);
        assert!(matches!(result, Err(HandoffError::ResourceLimit(_))));
    }

    #[test]
    fn rejects_oversized_input() {
        let mut config = HandoffConfig::default();
        config.max_file_size = 16;

        let result = decode_bytes(&png_bytes(32, 32), "test", &config);
        assert!(matches!(result, Err(HandoffError::ResourceLimit(_))));
    }

    #[test]
    fn jpeg_encode_is_deterministic_and_decodable() {
        let payload = decode_bytes(&png_bytes(128, 96), "test", &HandoffConfig::default())
            .expect("decode should succeed");

        let first = encode_jpeg(&payload).expect("encode should succeed");
        let second = encode_jpeg(&payload).expect("encode should succeed");
        assert_eq!(first, second);

        assert_eq!(
            image::guess_format(&first).expect("guess format"),
            image::ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&first).expect("decode jpeg");
        assert_eq!(decoded.dimensions(), (128, 96));
    }

    #[test]
    fn accept_decoded_rejects_empty_image() {
        let empty = DynamicImage::new_rgb8(0, 0);
        let result = accept_decoded(empty, "decoded", &HandoffConfig::default());
        assert!(matches!(result, Err(HandoffError::Decode(_))));
    }
}
