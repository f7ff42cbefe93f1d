//! Client for the image-detection service.
//!
//! Images are downscaled to at most [`MAX_UPLOAD_WIDTH`] pixels wide and
//! re-encoded as JPEG before upload. The service is unauthenticated and lives
//! on its own host, so this client does not go through the backend
//! middleware chain.

use std::fmt;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use url::Url;

use crate::client::api::server_message;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Widest image sent to the service.
pub const MAX_UPLOAD_WIDTH: u32 = 800;

/// JPEG quality used for uploads.
pub const JPEG_QUALITY: u8 = 80;

/// Message used when the service answers 2xx with an empty body.
pub const EMPTY_RESULT_MESSAGE: &str = "Failed to process image. Please try again.";

/// Object class a detection model is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    /// Exposed pipes
    Pipes,
    /// Rebar
    Rebar,
    /// Brickwork
    Brick,
    /// Beams
    Beams,
}

impl DetectionKind {
    /// All kinds, in menu order.
    pub const ALL: [Self; 4] = [Self::Pipes, Self::Rebar, Self::Brick, Self::Beams];

    /// Path segment used by the service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipes => "pipes",
            Self::Rebar => "rebar",
            Self::Brick => "brick",
            Self::Beams => "beams",
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid_field("kind", format!("unknown detection kind '{s}'")))
    }
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    /// Class label.
    #[serde(rename = "class")]
    pub label: String,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
}

/// Coarse bucket for displaying a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    /// Above 0.85
    High,
    /// Above 0.7
    Medium,
    /// Everything else
    Low,
}

impl ConfidenceBand {
    /// Bucket a confidence value.
    pub fn of(confidence: f64) -> Self {
        if confidence > 0.85 {
            Self::High
        } else if confidence > 0.7 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Result returned by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionReport {
    /// Number of detected objects.
    #[serde(default)]
    pub total: u32,
    /// Individual detections.
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Annotated image rendered by the service.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Mean confidence across detections.
    #[serde(default)]
    pub average_confidence: Option<f64>,
}

impl DetectionReport {
    /// Detection with the highest confidence.
    pub fn top_detection(&self) -> Option<&Detection> {
        self.detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// Highest confidence, if anything was detected.
    pub fn max_confidence(&self) -> Option<f64> {
        self.top_detection().map(|d| d.confidence)
    }
}

/// Uploads images to the detection service.
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DetectionClient {
    /// Build a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.detection_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config(format!("failed to build detection client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.detection_base_url.clone(),
        })
    }

    /// Endpoint for `kind`.
    pub fn endpoint(&self, kind: DetectionKind) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/detect/{kind}/"))
            .map_err(|e| Error::config(format!("invalid detection endpoint: {e}")))
    }

    /// Re-encode `image` and run detection on it.
    pub async fn detect(&self, kind: DetectionKind, image: Vec<u8>) -> Result<DetectionReport> {
        let jpeg = tokio::task::spawn_blocking(move || prepare_upload(&image))
            .await
            .map_err(|e| Error::storage(format!("image encoding task failed: {e}")))??;

        let url = self.endpoint(kind)?;
        tracing::debug!(%kind, bytes = jpeg.len(), "Uploading image for detection");

        let part = Part::bytes(jpeg)
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::config(format!("invalid upload part: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%kind, "Detection upload failed: {}", e);
                Error::from_reqwest(&e)
            })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| Error::from_reqwest(&e))?;

        let report = parse_report(status, &body)?;
        tracing::info!(%kind, total = report.total, "Detection finished");
        Ok(report)
    }
}

/// Decode, downscale, and JPEG-encode an image.
pub fn prepare_upload(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::invalid_field("image", format!("unsupported image: {e}")))?;

    let resized = if decoded.width() > MAX_UPLOAD_WIDTH {
        let height = (u64::from(decoded.height()) * u64::from(MAX_UPLOAD_WIDTH)
            / u64::from(decoded.width()))
        .max(1);
        let height = u32::try_from(height).unwrap_or(u32::MAX);
        decoded.resize_exact(MAX_UPLOAD_WIDTH, height, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| Error::invalid_field("image", format!("failed to encode JPEG: {e}")))?;
    Ok(out)
}

fn parse_report(status: u16, body: &[u8]) -> Result<DetectionReport> {
    if !(200..300).contains(&status) {
        let message =
            server_message(body).unwrap_or_else(|| format!("Server error: {status}"));
        return Err(Error::server(status, message));
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::server(status, format!("malformed detection response: {e}")))?;
    if value.is_null() {
        return Err(Error::server(status, EMPTY_RESULT_MESSAGE));
    }
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(Error::server(status, message));
    }
    serde_json::from_value(value)
        .map_err(|e| Error::server(status, format!("malformed detection response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([120u8, 80, 40]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn wide_images_are_downscaled() {
        let jpeg = prepare_upload(&png(1600, 1200)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let jpeg = prepare_upload(&png(320, 240)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }

    #[test]
    fn garbage_is_a_validation_error() {
        let err = prepare_upload(b"not an image").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn report_helpers() {
        let report = parse_report(
            200,
            br#"{"total":2,"detections":[{"class":"pipe","confidence":0.72},{"class":"valve","confidence":0.91}],"image_url":"http://x/a.jpg"}"#,
        )
        .unwrap();
        assert_eq!(report.top_detection().map(|d| d.label.as_str()), Some("valve"));
        assert_eq!(report.max_confidence().map(ConfidenceBand::of), Some(ConfidenceBand::High));
        assert_eq!(ConfidenceBand::of(0.72), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::of(0.7), ConfidenceBand::Low);
    }

    #[test]
    fn error_bodies_surface_uniformly() {
        let err = parse_report(200, br#"{"error":"Model not loaded"}"#).unwrap_err();
        assert_eq!(err.user_message(), "Model not loaded");

        let err = parse_report(502, b"bad gateway").unwrap_err();
        assert_eq!(err.user_message(), "Server error: 502");

        let err = parse_report(200, b"null").unwrap_err();
        assert_eq!(err.user_message(), EMPTY_RESULT_MESSAGE);
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("Rebar".parse::<DetectionKind>().unwrap(), DetectionKind::Rebar);
        assert!("walls".parse::<DetectionKind>().is_err());
    }

    #[tokio::test]
    async fn detect_posts_multipart_to_kind_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/detect/pipes/")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data".into()),
            )
            .with_status(200)
            .with_body(r#"{"total":1,"detections":[{"class":"pipe","confidence":0.9}]}"#)
            .create_async()
            .await;

        let config = ClientConfig::new(
            Url::parse("http://127.0.0.1:9/api").unwrap(),
            Url::parse(&server.url()).unwrap(),
        );
        let client = DetectionClient::new(&config).unwrap();
        let report = client.detect(DetectionKind::Pipes, png(64, 64)).await.unwrap();
        assert_eq!(report.total, 1);
        mock.assert_async().await;
    }
}
