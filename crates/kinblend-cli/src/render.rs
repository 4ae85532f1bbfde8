use kinblend_contracts::image::EncodedImage;
use kinblend_contracts::view::{SlotView, View};

const EMPTY_SLOT_HINT: &str = "(empty)";

pub fn render_view(view: &View) -> String {
    let mut lines: Vec<String> = Vec::new();
    match view {
        View::CredentialPrompt { message } => {
            lines.push("== API key required ==".to_string());
            lines.push("A Gemini API key with image generation access is needed.".to_string());
            if let Some(message) = message {
                lines.push(format!("! {message}"));
            }
            lines.push("Use /key to select a key.".to_string());
        }
        View::UploadForm {
            adult,
            child,
            action,
            banner,
        } => {
            lines.push("== Upload portraits ==".to_string());
            lines.push(render_slot(adult));
            lines.push(render_slot(child));
            let state = if action.enabled { "ready" } else { "disabled" };
            lines.push(format!("[{}] {state}", action.label));
            if let Some(banner) = banner {
                lines.push(format!("! {banner}"));
            }
        }
        View::Result {
            image_url,
            explanation,
            download_name,
        } => {
            lines.push("== Blended portrait ==".to_string());
            lines.push(format!("image: {}", describe_image_url(image_url)));
            if let Some(explanation) = explanation {
                lines.push(explanation.clone());
            }
            lines.push(format!(
                "/download [dir] saves {download_name}; /reset starts over."
            ));
        }
    }
    lines.join("\n")
}

fn render_slot(slot: &SlotView) -> String {
    match &slot.preview {
        Some(preview) => format!("{:<6} {preview}", slot.slot.label()),
        None => format!(
            "{:<6} {EMPTY_SLOT_HINT} /{} <path>",
            slot.slot.label(),
            slot.slot.label()
        ),
    }
}

fn describe_image_url(image_url: &str) -> String {
    match EncodedImage::from_data_url(image_url) {
        Ok(image) => format!("{} ({} bytes)", image.media_type(), image.decoded_len()),
        Err(_) => image_url.to_string(),
    }
}
