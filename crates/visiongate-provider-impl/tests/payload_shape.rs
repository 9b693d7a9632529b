use serde_json::json;
use visiongate_common::ProviderSettings;
use visiongate_protocol::{
    CanonicalRequest, ContentPart, DetailLevel, ImageRef, ProviderKind, ThinkingMode,
};
use visiongate_provider_core::{VisionProvider, header_get};
use visiongate_provider_impl::{
    OPENROUTER_FALLBACK_MODEL, ZHIPU_FALLBACK_MODEL, build_registry,
};

fn request(images: &[&str]) -> CanonicalRequest {
    CanonicalRequest {
        prompt_text: "describe".to_string(),
        images: images
            .iter()
            .map(|image| ImageRef::parse(image).unwrap())
            .collect(),
        ..CanonicalRequest::default()
    }
}

#[test]
fn image_order_is_preserved_for_every_provider() {
    let registry = build_registry();
    let images = [
        "https://x/3.jpg",
        "data:image/png;base64,AAAA",
        "https://x/1.jpg",
        "https://x/2.jpg",
    ];
    let req = request(&images);
    for kind in ProviderKind::ALL {
        let provider = registry.get(kind).unwrap();
        let payload = provider.build_payload(&req, &ProviderSettings::default());
        assert_eq!(payload.image_urls(), images.to_vec(), "provider {kind}");
        assert_eq!(payload.messages.len(), 1);
        assert!(matches!(
            payload.messages[0].content[0],
            ContentPart::Text { ref text } if text == "describe"
        ));
    }
}

#[test]
fn detail_applies_to_every_image_part() {
    let registry = build_registry();
    let mut req = request(&["https://x/a.jpg", "https://x/b.jpg"]);
    req.detail = Some(DetailLevel::High);
    let payload = registry
        .get(ProviderKind::Zhipu)
        .unwrap()
        .build_payload(&req, &ProviderSettings::default());
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value["messages"][0]["content"],
        json!([
            {"type": "text", "text": "describe"},
            {"type": "image_url", "image_url": {"url": "https://x/a.jpg", "detail": "high"}},
            {"type": "image_url", "image_url": {"url": "https://x/b.jpg", "detail": "high"}},
        ])
    );
}

#[test]
fn empty_prompt_and_no_images_is_still_a_payload() {
    let registry = build_registry();
    let payload = registry
        .get(ProviderKind::OpenRouter)
        .unwrap()
        .build_payload(&CanonicalRequest::default(), &ProviderSettings::default());
    assert!(payload.messages[0].content.is_empty());
}

#[test]
fn model_falls_back_through_three_layers() {
    let registry = build_registry();
    let configured = ProviderSettings {
        default_model: Some("glm-configured".to_string()),
        ..ProviderSettings::default()
    };
    let zhipu = registry.get(ProviderKind::Zhipu).unwrap();
    let openrouter = registry.get(ProviderKind::OpenRouter).unwrap();

    let mut req = request(&["https://x/img.jpg"]);
    req.model = Some("glm-explicit".to_string());
    assert_eq!(zhipu.build_payload(&req, &configured).model, "glm-explicit");

    req.model = None;
    assert_eq!(zhipu.build_payload(&req, &configured).model, "glm-configured");

    let unset = ProviderSettings::default();
    assert_eq!(zhipu.build_payload(&req, &unset).model, ZHIPU_FALLBACK_MODEL);
    assert_eq!(
        openrouter.build_payload(&req, &unset).model,
        OPENROUTER_FALLBACK_MODEL
    );
    assert_ne!(ZHIPU_FALLBACK_MODEL, OPENROUTER_FALLBACK_MODEL);

    req.model = Some("  ".to_string());
    assert_eq!(zhipu.build_payload(&req, &configured).model, "glm-configured");
}

#[test]
fn zhipu_thinking_is_forwarded_only_when_set() {
    let registry = build_registry();
    let zhipu = registry.get(ProviderKind::Zhipu).unwrap();
    let mut req = request(&["https://x/img.jpg"]);

    req.thinking = Some(ThinkingMode::Enabled);
    let value = serde_json::to_value(zhipu.build_payload(&req, &ProviderSettings::default()))
        .unwrap();
    assert_eq!(value["thinking"], json!({"type": "enabled"}));

    req.thinking = Some(ThinkingMode::Disabled);
    let value = serde_json::to_value(zhipu.build_payload(&req, &ProviderSettings::default()))
        .unwrap();
    assert_eq!(value["thinking"], json!({"type": "disabled"}));

    req.thinking = None;
    let value = serde_json::to_value(zhipu.build_payload(&req, &ProviderSettings::default()))
        .unwrap();
    assert!(value.as_object().unwrap().get("thinking").is_none());
}

#[test]
fn openrouter_never_forwards_thinking() {
    let registry = build_registry();
    let mut req = request(&["https://x/img.jpg"]);
    req.thinking = Some(ThinkingMode::Enabled);
    let value = serde_json::to_value(
        registry
            .get(ProviderKind::OpenRouter)
            .unwrap()
            .build_payload(&req, &ProviderSettings::default()),
    )
    .unwrap();
    assert!(value.as_object().unwrap().get("thinking").is_none());
}

#[test]
fn stream_flag_mirrors_wants_stream() {
    let registry = build_registry();
    let zhipu = registry.get(ProviderKind::Zhipu).unwrap();
    let mut req = request(&["https://x/img.jpg"]);
    for wants_stream in [false, true] {
        req.wants_stream = wants_stream;
        let upstream = zhipu
            .build_request(&req, &ProviderSettings::default())
            .unwrap();
        assert_eq!(upstream.is_stream, wants_stream);
        let body: serde_json::Value = serde_json::from_slice(&upstream.body).unwrap();
        assert_eq!(body["stream"], json!(wants_stream));
    }
}

#[test]
fn openrouter_request_carries_attribution_from_config() {
    let registry = build_registry();
    let settings = ProviderSettings {
        base_url: Some("https://openrouter.example/api/v1/".to_string()),
        api_key: Some("sk-or".to_string()),
        referer: Some("https://app.example".to_string()),
        title: Some("Vision App".to_string()),
        ..ProviderSettings::default()
    };
    let upstream = registry
        .get(ProviderKind::OpenRouter)
        .unwrap()
        .build_request(&request(&["https://x/img.jpg"]), &settings)
        .unwrap();

    assert_eq!(upstream.url, "https://openrouter.example/api/v1/chat/completions");
    assert_eq!(header_get(&upstream.headers, "authorization"), Some("Bearer sk-or"));
    assert_eq!(
        header_get(&upstream.headers, "http-referer"),
        Some("https://app.example")
    );
    assert_eq!(header_get(&upstream.headers, "x-title"), Some("Vision App"));
}

#[test]
fn attribution_headers_are_individually_optional() {
    let registry = build_registry();
    let settings = ProviderSettings {
        title: Some("Vision App".to_string()),
        ..ProviderSettings::default()
    };
    let upstream = registry
        .get(ProviderKind::OpenRouter)
        .unwrap()
        .build_request(&request(&["https://x/img.jpg"]), &settings)
        .unwrap();
    assert_eq!(header_get(&upstream.headers, "http-referer"), None);
    assert_eq!(header_get(&upstream.headers, "x-title"), Some("Vision App"));
    assert_eq!(header_get(&upstream.headers, "authorization"), None);
}

#[test]
fn zhipu_request_targets_default_endpoint_without_attribution() {
    let registry = build_registry();
    let settings = ProviderSettings {
        api_key: Some("zk".to_string()),
        referer: Some("https://app.example".to_string()),
        ..ProviderSettings::default()
    };
    let upstream = registry
        .get(ProviderKind::Zhipu)
        .unwrap()
        .build_request(&request(&["https://x/img.jpg"]), &settings)
        .unwrap();
    assert_eq!(
        upstream.url,
        "https://open.bigmodel.cn/api/paas/v4/chat/completions"
    );
    assert_eq!(header_get(&upstream.headers, "authorization"), Some("Bearer zk"));
    assert_eq!(header_get(&upstream.headers, "http-referer"), None);
    assert_eq!(header_get(&upstream.headers, "accept"), Some("application/json"));
}

#[test]
fn thinking_support_is_declared_per_provider() {
    let registry = build_registry();
    assert!(registry.get(ProviderKind::Zhipu).unwrap().supports_thinking());
    assert!(!registry.get(ProviderKind::OpenRouter).unwrap().supports_thinking());
}
