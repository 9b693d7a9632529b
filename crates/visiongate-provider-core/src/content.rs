use visiongate_protocol::{CanonicalRequest, ChatMessage, ContentPart, ImageUrlPart, Role};

/// Builds the single user turn shared by every provider: the prompt text
/// first (when non-empty), then one image part per image in request order.
pub fn build_messages(req: &CanonicalRequest) -> Vec<ChatMessage> {
    let mut content = Vec::with_capacity(req.images.len() + 1);
    if !req.prompt_text.is_empty() {
        content.push(ContentPart::Text {
            text: req.prompt_text.clone(),
        });
    }
    for image in &req.images {
        content.push(ContentPart::ImageUrl {
            image_url: ImageUrlPart {
                url: image.as_str().to_string(),
                detail: req.detail,
            },
        });
    }
    vec![ChatMessage {
        role: Role::User,
        content,
    }]
}
