//! Presentation model. A `View` is a pure function of the controller's state
//! and the two upload slots; renderers hold no state of their own.

use crate::image::{EncodedImage, Slot};
use crate::state::AppState;

pub const DOWNLOAD_FILE_NAME: &str = "blended-portrait.png";

const GENERATE_LABEL: &str = "Generate";
const GENERATING_LABEL: &str = "Generating...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    CredentialPrompt {
        message: Option<String>,
    },
    UploadForm {
        adult: SlotView,
        child: SlotView,
        action: GenerateAction,
        banner: Option<String>,
    },
    Result {
        image_url: String,
        explanation: Option<String>,
        download_name: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub slot: Slot,
    pub preview: Option<String>,
}

impl SlotView {
    fn new(slot: Slot, image: Option<&EncodedImage>) -> Self {
        Self {
            slot,
            preview: image.map(|image| {
                format!("{} ({} bytes)", image.media_type(), image.decoded_len())
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preview.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateAction {
    pub label: &'static str,
    pub enabled: bool,
}

impl View {
    pub fn build(
        state: &AppState,
        adult: Option<&EncodedImage>,
        child: Option<&EncodedImage>,
    ) -> Self {
        match state {
            AppState::KeySelection { message } => View::CredentialPrompt {
                message: message.clone(),
            },
            AppState::Success(result) => View::Result {
                image_url: result.image_url.clone(),
                explanation: result.explanation.clone(),
                download_name: DOWNLOAD_FILE_NAME,
            },
            AppState::Idle | AppState::Generating | AppState::Error { .. } => {
                let generating = state.is_generating();
                View::UploadForm {
                    adult: SlotView::new(Slot::Adult, adult),
                    child: SlotView::new(Slot::Child, child),
                    action: GenerateAction {
                        label: if generating {
                            GENERATING_LABEL
                        } else {
                            GENERATE_LABEL
                        },
                        enabled: !generating && adult.is_some() && child.is_some(),
                    },
                    banner: match state {
                        AppState::Error { message } => Some(message.clone()),
                        _ => None,
                    },
                }
            }
        }
    }
}
