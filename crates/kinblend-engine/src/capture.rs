use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use kinblend_contracts::image::{EncodedImage, Slot};

use crate::mime_for_path;

/// One upload slot: holds at most one `EncodedImage`.
#[derive(Debug, Clone)]
pub struct CaptureWidget {
    slot: Slot,
    image: Option<EncodedImage>,
}

impl CaptureWidget {
    pub fn new(slot: Slot) -> Self {
        Self { slot, image: None }
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        self.image.as_ref()
    }

    /// Reads the whole file and returns its encoded form. Only the media-type
    /// filter is applied; size and dimensions are not checked.
    pub fn read_file(path: &Path) -> Result<EncodedImage> {
        let Some(media_type) = mime_for_path(path) else {
            bail!("{} is not an image file", path.display());
        };
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let data_url = format!("data:{media_type};base64,{}", BASE64.encode(bytes));
        EncodedImage::from_data_url(&data_url)
    }

    /// Replaces whatever the slot held; the previous image is dropped.
    pub fn set(&mut self, image: EncodedImage) {
        log::debug!(
            "{} slot holds {} ({} bytes)",
            self.slot,
            image.media_type(),
            image.decoded_len()
        );
        self.image = Some(image);
    }

    pub fn clear(&mut self) -> Option<EncodedImage> {
        let previous = self.image.take();
        if previous.is_some() {
            log::debug!("{} slot cleared", self.slot);
        }
        previous
    }
}
