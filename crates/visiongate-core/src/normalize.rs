use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::StatusCode;
use serde::Deserialize;
use visiongate_protocol::{CanonicalRequest, DetailLevel, ImageRef, ProviderKind, ThinkingMode};

/// Raster types accepted for uploads and explicit inline media types.
pub const IMAGE_MEDIA_WHITELIST: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Assumed media type for inline base64 without a declared one.
const DEFAULT_INLINE_MEDIA_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("image too large: {size} bytes exceeds the {limit} byte limit")]
    ImageTooLarge { size: usize, limit: usize },
}

impl NormalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::MalformedInput(_) => "malformed_input",
            NormalizeError::UnsupportedMediaType(_) => "unsupported_media_type",
            NormalizeError::ImageTooLarge { .. } => "image_too_large",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NormalizeError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            NormalizeError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            NormalizeError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

fn malformed(message: impl Into<String>) -> NormalizeError {
    NormalizeError::MalformedInput(message.into())
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeLimits {
    pub max_image_bytes: usize,
}

/// Stream intent signals that live outside the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamHints {
    /// The request hit the `/stream` path variant.
    pub path_suffix: bool,
    /// Parsed `?stream=` query parameter.
    pub query: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    /// Text parts in arrival order; repeated names are kept.
    pub fields: Vec<(String, String)>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Clone)]
pub enum InboundPayload {
    Json(Bytes),
    Form(FormPayload),
}

/// Converts one inbound body into a canonical request. Performs no IO.
pub fn normalize(
    payload: InboundPayload,
    hints: StreamHints,
    limits: &NormalizeLimits,
) -> Result<CanonicalRequest, NormalizeError> {
    let raw = match payload {
        InboundPayload::Json(body) => RawFields::from_json(&body)?,
        InboundPayload::Form(form) => RawFields::from_form(form, limits)?,
    };
    raw.into_canonical(hints, limits)
}

/// `?stream=` query value; unrecognized values are ignored.
pub fn parse_stream_query(query: Option<&str>) -> Option<bool> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query?).ok()?;
    let (_, value) = pairs.into_iter().rev().find(|(key, _)| key == "stream")?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Form convention: the literal `"false"` is false, any other non-empty value
/// is true, empty means not given.
fn parse_stream_text(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value != "false")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagOrText {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct JsonBody {
    provider: Option<String>,
    model: Option<String>,
    #[serde(alias = "text")]
    prompt: Option<String>,
    images: Option<Vec<String>>,
    image_url: Option<String>,
    image_base64: Option<String>,
    image_media_type: Option<String>,
    detail: Option<String>,
    thinking: Option<FlagOrText>,
    stream: Option<FlagOrText>,
}

#[derive(Debug, Default)]
struct RawFields {
    provider: Option<String>,
    model: Option<String>,
    prompt: Option<String>,
    images: Vec<String>,
    image_url: Option<String>,
    image_base64: Option<String>,
    image_media_type: Option<String>,
    detail: Option<String>,
    thinking: Option<FlagOrText>,
    stream: Option<bool>,
    upload: Option<ImageRef>,
}

impl RawFields {
    fn from_json(body: &[u8]) -> Result<Self, NormalizeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(malformed("request body is empty"));
        }
        let body: JsonBody = serde_json::from_slice(body)
            .map_err(|err| malformed(format!("invalid JSON body: {err}")))?;
        let stream = match body.stream {
            Some(FlagOrText::Flag(flag)) => Some(flag),
            Some(FlagOrText::Text(text)) => parse_stream_text(&text),
            None => None,
        };
        Ok(Self {
            provider: body.provider,
            model: body.model,
            prompt: body.prompt,
            images: body.images.unwrap_or_default(),
            image_url: body.image_url,
            image_base64: body.image_base64,
            image_media_type: body.image_media_type,
            detail: body.detail,
            thinking: body.thinking,
            stream,
            upload: None,
        })
    }

    fn from_form(form: FormPayload, limits: &NormalizeLimits) -> Result<Self, NormalizeError> {
        let mut raw = RawFields::default();
        for (name, value) in form.fields {
            match name.as_str() {
                "provider" => raw.provider = Some(value),
                "model" => raw.model = Some(value),
                "prompt" | "text" => raw.prompt = Some(value),
                "images" | "images[]" => raw.images.push(value),
                "image_url" => raw.image_url = Some(value),
                "image_base64" => raw.image_base64 = Some(value),
                "image_media_type" => raw.image_media_type = Some(value),
                "detail" => raw.detail = Some(value),
                "thinking" => raw.thinking = Some(FlagOrText::Text(value)),
                "stream" => raw.stream = parse_stream_text(&value),
                _ => {}
            }
        }
        if let Some(file) = form.file {
            raw.upload = Some(upload_to_data_uri(file, limits)?);
        }
        Ok(raw)
    }

    fn into_canonical(
        self,
        hints: StreamHints,
        limits: &NormalizeLimits,
    ) -> Result<CanonicalRequest, NormalizeError> {
        let provider = match non_blank(self.provider) {
            Some(name) => Some(
                ProviderKind::parse(&name)
                    .ok_or_else(|| malformed(format!("unknown provider `{name}`")))?,
            ),
            None => None,
        };
        let detail = match non_blank(self.detail) {
            Some(level) => Some(DetailLevel::parse(&level).ok_or_else(|| {
                malformed(format!("detail must be low, high or auto, got `{level}`"))
            })?),
            None => None,
        };
        let thinking = match self.thinking {
            Some(FlagOrText::Flag(true)) => Some(ThinkingMode::Enabled),
            Some(FlagOrText::Flag(false)) => Some(ThinkingMode::Disabled),
            Some(FlagOrText::Text(text)) => match non_blank(Some(text)) {
                Some(text) => Some(ThinkingMode::parse(&text).ok_or_else(|| {
                    malformed(format!("thinking must be enabled or disabled, got `{text}`"))
                })?),
                None => None,
            },
            None => None,
        };

        // Fixed order: list entries, singular URL, singular base64, upload.
        let mut images = Vec::with_capacity(self.images.len() + 3);
        for (idx, entry) in self.images.iter().enumerate() {
            let image = ImageRef::parse(entry).ok_or_else(|| {
                if entry.trim().is_empty() {
                    malformed(format!("images[{idx}] is empty"))
                } else {
                    malformed(format!("images[{idx}] is not an http(s) URL or image data URI"))
                }
            })?;
            images.push(checked_image(image, &format!("images[{idx}]"), limits)?);
        }
        if let Some(url) = non_blank(self.image_url) {
            let image = ImageRef::parse(&url)
                .ok_or_else(|| malformed("image_url is not an http(s) URL or image data URI"))?;
            images.push(checked_image(image, "image_url", limits)?);
        }
        if let Some(encoded) = non_blank(self.image_base64) {
            images.push(inline_base64(
                &encoded,
                non_blank(self.image_media_type).as_deref(),
                limits,
            )?);
        }
        if let Some(upload) = self.upload {
            images.push(upload);
        }

        let wants_stream = if hints.path_suffix {
            true
        } else {
            self.stream.or(hints.query).unwrap_or(false)
        };

        Ok(CanonicalRequest {
            provider,
            model: non_blank(self.model),
            prompt_text: self.prompt.unwrap_or_default(),
            images,
            detail,
            thinking,
            wants_stream,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Lowercases, drops parameters and folds the `image/jpg` alias; returns
/// `None` outside the whitelist.
fn whitelisted_media_type(declared: &str) -> Option<&'static str> {
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let essence = if essence == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        essence
    };
    IMAGE_MEDIA_WHITELIST
        .iter()
        .copied()
        .find(|allowed| *allowed == essence)
}

fn inline_base64(
    encoded: &str,
    media_type: Option<&str>,
    limits: &NormalizeLimits,
) -> Result<ImageRef, NormalizeError> {
    if encoded.to_ascii_lowercase().starts_with("data:") {
        let image = ImageRef::parse(encoded)
            .ok_or_else(|| malformed("image_base64 data URI must carry an image media type"))?;
        return checked_image(image, "image_base64", limits);
    }
    let media_type = match media_type {
        Some(declared) => whitelisted_media_type(declared)
            .ok_or_else(|| NormalizeError::UnsupportedMediaType(declared.to_string()))?,
        None => DEFAULT_INLINE_MEDIA_TYPE,
    };
    checked_base64(media_type, encoded, "image_base64", limits)
}

/// URLs pass through. Data URIs must be base64 with a whitelisted media
/// type and fit the size limit; they are rebuilt in canonical form.
fn checked_image(
    image: ImageRef,
    field: &str,
    limits: &NormalizeLimits,
) -> Result<ImageRef, NormalizeError> {
    let uri = match image {
        ImageRef::Url(_) => return Ok(image),
        ImageRef::DataUri(uri) => uri,
    };
    let (header, data) = uri
        .get("data:".len()..)
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| malformed(format!("{field} data URI has no payload")))?;
    let mut params = header.split(';');
    let declared = params.next().unwrap_or_default();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return Err(malformed(format!("{field} data URI must be base64 encoded")));
    }
    let media_type = whitelisted_media_type(declared)
        .ok_or_else(|| NormalizeError::UnsupportedMediaType(declared.to_string()))?;
    checked_base64(media_type, data, field, limits)
}

fn checked_base64(
    media_type: &str,
    encoded: &str,
    field: &str,
    limits: &NormalizeLimits,
) -> Result<ImageRef, NormalizeError> {
    let compact: String = encoded.split_ascii_whitespace().collect();
    let size = compact.len() / 4 * 3;
    if size > limits.max_image_bytes {
        return Err(NormalizeError::ImageTooLarge {
            size,
            limit: limits.max_image_bytes,
        });
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| malformed(format!("{field} is not valid base64: {err}")))?;
    Ok(ImageRef::inline(media_type, &compact))
}

fn upload_to_data_uri(
    file: UploadedFile,
    limits: &NormalizeLimits,
) -> Result<ImageRef, NormalizeError> {
    let declared = file
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            NormalizeError::UnsupportedMediaType("uploaded file has no content type".to_string())
        })?;
    let media_type = whitelisted_media_type(declared)
        .ok_or_else(|| NormalizeError::UnsupportedMediaType(declared.to_string()))?;
    if file.bytes.is_empty() {
        return Err(malformed("uploaded file is empty"));
    }
    if file.bytes.len() > limits.max_image_bytes {
        return Err(NormalizeError::ImageTooLarge {
            size: file.bytes.len(),
            limit: limits.max_image_bytes,
        });
    }
    Ok(ImageRef::inline(media_type, &STANDARD.encode(&file.bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: NormalizeLimits = NormalizeLimits {
        max_image_bytes: 1024,
    };

    fn json(body: &str, hints: StreamHints) -> Result<CanonicalRequest, NormalizeError> {
        normalize(
            InboundPayload::Json(Bytes::from(body.to_string())),
            hints,
            &LIMITS,
        )
    }

    fn form(
        fields: &[(&str, &str)],
        file: Option<UploadedFile>,
    ) -> Result<CanonicalRequest, NormalizeError> {
        normalize(
            InboundPayload::Form(FormPayload {
                fields: fields
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                file,
            }),
            StreamHints::default(),
            &LIMITS,
        )
    }

    fn png(bytes: &'static [u8], content_type: &str) -> UploadedFile {
        UploadedFile {
            content_type: Some(content_type.to_string()),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn json_images_concatenate_in_fixed_order() {
        let req = json(
            r#"{
                "prompt": "compare",
                "image_base64": "AAAA",
                "image_url": "https://x/single.jpg",
                "images": ["https://x/1.jpg", "https://x/2.jpg"]
            }"#,
            StreamHints::default(),
        )
        .unwrap();
        let images: Vec<&str> = req.images.iter().map(ImageRef::as_str).collect();
        assert_eq!(
            images,
            vec![
                "https://x/1.jpg",
                "https://x/2.jpg",
                "https://x/single.jpg",
                "data:image/jpeg;base64,AAAA",
            ]
        );
        assert_eq!(req.prompt_text, "compare");
        assert!(!req.wants_stream);
    }

    #[test]
    fn inline_base64_uses_declared_media_type() {
        let req = json(
            r#"{"image_base64": "AAAA", "image_media_type": "image/PNG"}"#,
            StreamHints::default(),
        )
        .unwrap();
        assert_eq!(req.images[0].as_str(), "data:image/png;base64,AAAA");

        let err = json(
            r#"{"image_base64": "AAAA", "image_media_type": "image/tiff"}"#,
            StreamHints::default(),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedMediaType(_)));
    }

    #[test]
    fn image_only_and_empty_requests_are_valid() {
        let req = json(r#"{"images": ["https://x/a.jpg"]}"#, StreamHints::default()).unwrap();
        assert!(req.prompt_text.is_empty());
        let req = json("{}", StreamHints::default()).unwrap();
        assert!(req.images.is_empty());
        assert_eq!(req, CanonicalRequest::default());
    }

    #[test]
    fn blank_or_null_image_entries_are_rejected() {
        assert!(matches!(
            json(r#"{"images": ["https://x/a.jpg", " "]}"#, StreamHints::default()),
            Err(NormalizeError::MalformedInput(msg)) if msg.contains("images[1]")
        ));
        assert!(matches!(
            json(r#"{"images": [null]}"#, StreamHints::default()),
            Err(NormalizeError::MalformedInput(_))
        ));
        assert!(matches!(
            json(r#"{"images": ["file:///etc/passwd"]}"#, StreamHints::default()),
            Err(NormalizeError::MalformedInput(_))
        ));
    }

    #[test]
    fn malformed_json_and_unknown_enums_fail() {
        for body in [
            "",
            "not json",
            "[]",
            r#"{"provider": "anthropic"}"#,
            r#"{"detail": "ultra"}"#,
            r#"{"thinking": "maybe"}"#,
        ] {
            assert!(
                matches!(
                    json(body, StreamHints::default()),
                    Err(NormalizeError::MalformedInput(_))
                ),
                "body {body:?}"
            );
        }
    }

    #[test]
    fn json_fields_map_onto_canonical_model() {
        let req = json(
            r#"{
                "provider": "openrouter",
                "model": "qwen/qwen2.5-vl",
                "text": "what is this",
                "detail": "low",
                "thinking": true,
                "images": ["https://x/a.jpg"]
            }"#,
            StreamHints::default(),
        )
        .unwrap();
        assert_eq!(req.provider, Some(ProviderKind::OpenRouter));
        assert_eq!(req.model.as_deref(), Some("qwen/qwen2.5-vl"));
        assert_eq!(req.prompt_text, "what is this");
        assert_eq!(req.detail, Some(DetailLevel::Low));
        assert_eq!(req.thinking, Some(ThinkingMode::Enabled));

        let req = json(r#"{"thinking": "disabled"}"#, StreamHints::default()).unwrap();
        assert_eq!(req.thinking, Some(ThinkingMode::Disabled));
        let req = json(r#"{"thinking": ""}"#, StreamHints::default()).unwrap();
        assert_eq!(req.thinking, None);
    }

    #[test]
    fn stream_precedence_is_path_then_body_then_query() {
        let path = StreamHints {
            path_suffix: true,
            query: Some(false),
        };
        assert!(json(r#"{"stream": false}"#, path).unwrap().wants_stream);

        let query_true = StreamHints {
            path_suffix: false,
            query: Some(true),
        };
        assert!(!json(r#"{"stream": false}"#, query_true).unwrap().wants_stream);
        assert!(json("{}", query_true).unwrap().wants_stream);

        let query_false = StreamHints {
            path_suffix: false,
            query: Some(false),
        };
        assert!(json(r#"{"stream": true}"#, query_false).unwrap().wants_stream);
        assert!(!json("{}", StreamHints::default()).unwrap().wants_stream);
    }

    #[test]
    fn query_parser_accepts_common_spellings() {
        assert_eq!(parse_stream_query(Some("stream=true")), Some(true));
        assert_eq!(parse_stream_query(Some("a=b&stream=1")), Some(true));
        assert_eq!(parse_stream_query(Some("stream=no")), Some(false));
        assert_eq!(parse_stream_query(Some("stream=maybe")), None);
        assert_eq!(parse_stream_query(Some("other=1")), None);
        assert_eq!(parse_stream_query(None), None);
    }

    #[test]
    fn form_stream_field_uses_literal_false() {
        assert!(!form(&[("stream", "false")], None).unwrap().wants_stream);
        assert!(form(&[("stream", "0")], None).unwrap().wants_stream);
        assert!(form(&[("stream", "yes")], None).unwrap().wants_stream);
        assert!(!form(&[("stream", "")], None).unwrap().wants_stream);
    }

    #[test]
    fn form_upload_becomes_trailing_data_uri() {
        let req = form(
            &[
                ("prompt", "describe"),
                ("images", "https://x/1.jpg"),
                ("images", "https://x/2.jpg"),
            ],
            Some(png(b"\x89PNG", "image/png")),
        )
        .unwrap();
        let images: Vec<&str> = req.images.iter().map(ImageRef::as_str).collect();
        assert_eq!(
            images,
            vec!["https://x/1.jpg", "https://x/2.jpg", "data:image/png;base64,iVBORw=="]
        );
    }

    #[test]
    fn form_upload_outside_whitelist_is_unsupported() {
        let err = form(&[("prompt", "describe")], Some(png(b"BM", "image/bmp"))).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedMediaType(ref ty) if ty == "image/bmp"));
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let mut missing = png(b"\x89PNG", "image/png");
        missing.content_type = None;
        assert!(matches!(
            form(&[], Some(missing)),
            Err(NormalizeError::UnsupportedMediaType(_))
        ));

        let req = form(&[], Some(png(b"\xff\xd8", "image/jpg; name=x"))).unwrap();
        assert!(req.images[0].as_str().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn oversized_images_are_rejected() {
        static BIG: [u8; 2048] = [0u8; 2048];
        let err = form(&[], Some(png(&BIG, "image/png"))).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ImageTooLarge {
                size: 2048,
                limit: 1024
            }
        ));

        let encoded = "A".repeat(4096);
        let body = format!(r#"{{"image_base64": "{encoded}"}}"#);
        assert!(matches!(
            json(&body, StreamHints::default()),
            Err(NormalizeError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_data_uris_are_rejected_in_every_field() {
        let uri = format!("data:image/png;base64,{}", "A".repeat(4096));
        for body in [
            format!(r#"{{"image_base64": "{uri}"}}"#),
            format!(r#"{{"images": ["{uri}"]}}"#),
            format!(r#"{{"image_url": "{uri}"}}"#),
        ] {
            assert!(
                matches!(
                    json(&body, StreamHints::default()),
                    Err(NormalizeError::ImageTooLarge {
                        size: 3072,
                        limit: 1024
                    })
                ),
                "body {body}"
            );
        }
        assert!(matches!(
            form(&[("images", uri.as_str())], None),
            Err(NormalizeError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn data_uris_follow_the_media_whitelist() {
        for body in [
            r#"{"images": ["data:image/bmp;base64,AAAA"]}"#,
            r#"{"image_base64": "data:image/tiff;base64,AAAA"}"#,
        ] {
            assert!(
                matches!(
                    json(body, StreamHints::default()),
                    Err(NormalizeError::UnsupportedMediaType(_))
                ),
                "body {body}"
            );
        }

        let req = json(
            r#"{"images": ["data:image/JPG;base64,AAAA"], "image_base64": "data:image/webp;base64,AAAA"}"#,
            StreamHints::default(),
        )
        .unwrap();
        let images: Vec<&str> = req.images.iter().map(ImageRef::as_str).collect();
        assert_eq!(
            images,
            vec!["data:image/jpeg;base64,AAAA", "data:image/webp;base64,AAAA"]
        );
    }

    #[test]
    fn data_uris_must_carry_valid_base64() {
        for body in [
            r#"{"images": ["data:image/png,rawbytes"]}"#,
            r#"{"images": ["data:image/png;base64"]}"#,
            r#"{"image_base64": "data:image/png;base64,@@@@"}"#,
        ] {
            assert!(
                matches!(
                    json(body, StreamHints::default()),
                    Err(NormalizeError::MalformedInput(_))
                ),
                "body {body}"
            );
        }
    }
}
