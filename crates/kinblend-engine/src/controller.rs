//! Application state controller.
//!
//! Owns the two upload slots and the lifecycle state, and is the only place
//! either is mutated. Everything runs on the caller's thread: one generation
//! attempt is a single blocking call, so no second attempt can start while
//! one is in flight.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use kinblend_contracts::image::{EncodedImage, Slot};
use kinblend_contracts::state::AppState;
use kinblend_contracts::view::{View, DOWNLOAD_FILE_NAME};

use crate::capture::CaptureWidget;
use crate::client::GenerationClient;
use crate::credentials::CredentialCapability;
use crate::error_chain_text;

/// Failure text the service returns when the selected key is unknown or
/// revoked.
pub const CREDENTIAL_INVALID_PATTERN: &str = "Requested entity was not found";
pub const INVALID_KEY_MESSAGE: &str =
    "The selected API key was not found or has expired. Please select a valid API key.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate image. Please try again.";

const ERROR_MESSAGE_MAX_CHARS: usize = 600;

pub type TransitionObserver = Box<dyn FnMut(&AppState)>;

pub struct BlendController<C, G> {
    credentials: C,
    client: G,
    adult: CaptureWidget,
    child: CaptureWidget,
    state: AppState,
    observers: Vec<TransitionObserver>,
}

impl<C: CredentialCapability, G: GenerationClient> BlendController<C, G> {
    pub fn new(credentials: C, client: G) -> Self {
        Self {
            credentials,
            client,
            adult: CaptureWidget::new(Slot::Adult),
            child: CaptureWidget::new(Slot::Child),
            state: AppState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn image(&self, slot: Slot) -> Option<&EncodedImage> {
        self.widget(slot).image()
    }

    pub fn view(&self) -> View {
        View::build(&self.state, self.adult.image(), self.child.image())
    }

    /// Called after every state change, in registration order.
    pub fn on_transition(&mut self, observer: TransitionObserver) {
        self.observers.push(observer);
    }

    /// Only the upload form (idle or error) offers the generate action.
    pub fn can_generate(&self) -> bool {
        matches!(self.state, AppState::Idle | AppState::Error { .. })
            && self.adult.image().is_some()
            && self.child.image().is_some()
    }

    /// Returns whether a key is present. A failed check counts as absent.
    pub fn check_credentials(&mut self) -> bool {
        if self.has_key() {
            return true;
        }
        self.transition(AppState::KeySelection { message: None });
        false
    }

    pub fn select_key(&mut self) {
        if matches!(self.state, AppState::Generating | AppState::Success(_)) {
            log::warn!("key selection ignored while {}", self.state.kind());
            return;
        }
        match self.credentials.open_select_key() {
            Ok(()) => self.transition(AppState::Idle),
            Err(err) => {
                let reason = error_chain_text(&err, ERROR_MESSAGE_MAX_CHARS);
                log::warn!("key selection failed: {reason}");
                self.transition(AppState::KeySelection {
                    message: Some(format!("Failed to select API key: {reason}")),
                });
            }
        }
    }

    pub fn select_file(&mut self, slot: Slot, path: &Path) -> Result<()> {
        let image = CaptureWidget::read_file(path)?;
        self.set_image(slot, image);
        Ok(())
    }

    pub fn set_image(&mut self, slot: Slot, image: EncodedImage) {
        if self.state.is_generating() {
            log::warn!("{slot} image change ignored while generating");
            return;
        }
        self.widget_mut(slot).set(image);
    }

    pub fn clear_image(&mut self, slot: Slot) {
        if self.state.is_generating() {
            log::warn!("{slot} image clear ignored while generating");
            return;
        }
        self.widget_mut(slot).clear();
    }

    pub fn generate(&mut self) {
        if !self.can_generate() {
            log::warn!(
                "generate ignored: state {}, adult {}, child {}",
                self.state.kind(),
                self.adult.image().is_some(),
                self.child.image().is_some()
            );
            return;
        }
        if !self.check_credentials() {
            return;
        }
        let (Some(adult), Some(child)) =
            (self.adult.image().cloned(), self.child.image().cloned())
        else {
            return;
        };

        self.transition(AppState::Generating);
        let next = match self.client.generate(&adult, &child) {
            Ok(result) => AppState::Success(result),
            Err(err) => Self::classify_failure(&err),
        };
        self.transition(next);
    }

    pub fn reset(&mut self) {
        if self.state.is_generating() {
            log::warn!("reset ignored while generating");
            return;
        }
        self.adult.clear();
        self.child.clear();
        self.transition(AppState::Idle);
    }

    /// Writes the result image to `dir` under the fixed download name.
    pub fn download(&self, dir: &Path) -> Result<PathBuf> {
        let Some(result) = self.state.result() else {
            bail!("no generated image to download (state: {})", self.state.kind());
        };
        let image = EncodedImage::from_data_url(&result.image_url)
            .context("result image is not an embedded data URL")?;
        let bytes = image.decode()?;
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(DOWNLOAD_FILE_NAME);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn has_key(&self) -> bool {
        match self.credentials.has_selected_key() {
            Ok(present) => present,
            Err(err) => {
                log::warn!(
                    "credential check failed: {}",
                    error_chain_text(&err, ERROR_MESSAGE_MAX_CHARS)
                );
                false
            }
        }
    }

    fn classify_failure(err: &anyhow::Error) -> AppState {
        let text = error_chain_text(err, ERROR_MESSAGE_MAX_CHARS);
        log::warn!("generation failed: {text}");
        if text.contains(CREDENTIAL_INVALID_PATTERN) {
            return AppState::KeySelection {
                message: Some(INVALID_KEY_MESSAGE.to_string()),
            };
        }
        let message = if text.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            text
        };
        AppState::Error { message }
    }

    fn transition(&mut self, next: AppState) {
        log::debug!("state {} -> {}", self.state.kind(), next.kind());
        self.state = next;
        for observer in self.observers.iter_mut() {
            observer(&self.state);
        }
    }

    fn widget(&self, slot: Slot) -> &CaptureWidget {
        match slot {
            Slot::Adult => &self.adult,
            Slot::Child => &self.child,
        }
    }

    fn widget_mut(&mut self, slot: Slot) -> &mut CaptureWidget {
        match slot {
            Slot::Adult => &mut self.adult,
            Slot::Child => &mut self.child,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::rc::Rc;

    use anyhow::{anyhow, Result};
    use kinblend_contracts::image::{EncodedImage, Slot};
    use kinblend_contracts::state::{AppState, GenerationResult};
    use kinblend_contracts::view::View;

    use super::{BlendController, GENERIC_FAILURE_MESSAGE, INVALID_KEY_MESSAGE};
    use crate::client::GenerationClient;
    use crate::credentials::CredentialCapability;

    #[derive(Default)]
    struct FakeCredentials {
        present: Rc<Cell<bool>>,
        check_fails: bool,
        select_fails: bool,
        checks: Rc<Cell<usize>>,
    }

    impl CredentialCapability for FakeCredentials {
        fn has_selected_key(&self) -> Result<bool> {
            self.checks.set(self.checks.get() + 1);
            if self.check_fails {
                return Err(anyhow!("host bridge unavailable"));
            }
            Ok(self.present.get())
        }

        fn open_select_key(&mut self) -> Result<()> {
            if self.select_fails {
                return Err(anyhow!("dialog dismissed"));
            }
            self.present.set(true);
            Ok(())
        }
    }

    struct FakeClient {
        outcome: RefCell<Option<Result<GenerationResult>>>,
        calls: Rc<Cell<usize>>,
        seen: Rc<RefCell<Vec<(EncodedImage, EncodedImage)>>>,
    }

    impl FakeClient {
        fn returning(outcome: Result<GenerationResult>) -> Self {
            Self {
                outcome: RefCell::new(Some(outcome)),
                calls: Rc::new(Cell::new(0)),
                seen: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl GenerationClient for FakeClient {
        fn generate(&self, adult: &EncodedImage, child: &EncodedImage) -> Result<GenerationResult> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push((adult.clone(), child.clone()));
            self.outcome
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Err(anyhow!("no scripted outcome")))
        }
    }

    fn success(url: &str, explanation: Option<&str>) -> Result<GenerationResult> {
        Ok(GenerationResult {
            image_url: url.to_string(),
            explanation: explanation.map(str::to_string),
        })
    }

    fn with_key() -> FakeCredentials {
        let credentials = FakeCredentials::default();
        credentials.present.set(true);
        credentials
    }

    fn image(tag: &[u8]) -> EncodedImage {
        EncodedImage::from_bytes(tag, "image/png")
    }

    fn loaded(
        credentials: FakeCredentials,
        client: FakeClient,
    ) -> BlendController<FakeCredentials, FakeClient> {
        let mut controller = BlendController::new(credentials, client);
        controller.set_image(Slot::Adult, image(b"adult"));
        controller.set_image(Slot::Child, image(b"child"));
        controller
    }

    #[test]
    fn generate_requires_both_slots() {
        let client = FakeClient::returning(success("X", None));
        let calls = client.calls.clone();
        let mut controller = BlendController::new(with_key(), client);
        assert!(!controller.can_generate());

        controller.set_image(Slot::Adult, image(b"adult"));
        assert!(!controller.can_generate());
        controller.generate();
        assert_eq!(controller.state(), &AppState::Idle);
        assert_eq!(calls.get(), 0);

        controller.set_image(Slot::Child, image(b"child"));
        assert!(controller.can_generate());
    }

    #[test]
    fn generate_ignored_outside_upload_form() {
        let client = FakeClient::returning(success("X", None));
        let calls = client.calls.clone();
        let credentials = FakeCredentials::default();
        let present = credentials.present.clone();
        let mut controller = loaded(credentials, client);

        controller.generate();
        assert_eq!(controller.state().kind(), "key-selection");
        present.set(true);
        assert!(!controller.can_generate());
        controller.generate();
        assert_eq!(controller.state(), &AppState::KeySelection { message: None });
        assert_eq!(calls.get(), 0);

        controller.select_key();
        assert!(controller.can_generate());
        controller.generate();
        assert_eq!(controller.state().kind(), "success");
        assert!(!controller.can_generate());
        controller.generate();
        assert_eq!(calls.get(), 1);
        assert_eq!(controller.state().kind(), "success");
    }

    #[test]
    fn missing_key_routes_to_key_selection_without_calling_client() {
        let client = FakeClient::returning(success("X", None));
        let calls = client.calls.clone();
        let mut controller = loaded(FakeCredentials::default(), client);

        controller.generate();
        assert_eq!(controller.state(), &AppState::KeySelection { message: None });
        assert_eq!(calls.get(), 0);
        assert!(matches!(controller.view(), View::CredentialPrompt { .. }));
    }

    #[test]
    fn failed_credential_check_counts_as_missing_key() {
        let credentials = FakeCredentials {
            check_fails: true,
            ..FakeCredentials::default()
        };
        let client = FakeClient::returning(success("X", None));
        let calls = client.calls.clone();
        let mut controller = loaded(credentials, client);

        controller.generate();
        assert_eq!(controller.state().kind(), "key-selection");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn credentials_are_checked_on_every_attempt() {
        let credentials = with_key();
        let checks = credentials.checks.clone();
        let client = FakeClient::returning(Err(anyhow!("busy")));
        let mut controller = loaded(credentials, client);

        controller.generate();
        controller.generate();
        assert_eq!(checks.get(), 2);
    }

    #[test]
    fn successful_generation_stores_result() {
        let client = FakeClient::returning(success("X", Some("Y")));
        let seen = client.seen.clone();
        let mut controller = loaded(with_key(), client);
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let sink = kinds.clone();
        controller.on_transition(Box::new(move |state: &AppState| {
            sink.borrow_mut().push(state.kind().to_string());
        }));

        controller.generate();

        assert_eq!(
            controller.state(),
            &AppState::Success(GenerationResult {
                image_url: "X".to_string(),
                explanation: Some("Y".to_string()),
            })
        );
        assert_eq!(*kinds.borrow(), vec!["generating", "success"]);
        assert_eq!(
            controller.view(),
            View::Result {
                image_url: "X".to_string(),
                explanation: Some("Y".to_string()),
                download_name: "blended-portrait.png",
            }
        );
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, image(b"adult"));
        assert_eq!(seen[0].1, image(b"child"));
    }

    #[test]
    fn entity_not_found_routes_back_to_key_selection() {
        let client = FakeClient::returning(Err(anyhow!(
            "Gemini request failed (404): {{\"error\": {{\"message\": \"Requested entity was not found.\"}}}}"
        )));
        let mut controller = loaded(with_key(), client);

        controller.generate();
        assert_eq!(
            controller.state(),
            &AppState::KeySelection {
                message: Some(INVALID_KEY_MESSAGE.to_string()),
            }
        );
        assert!(!controller.state().message().unwrap_or_default().is_empty());
    }

    #[test]
    fn other_failures_surface_their_message() {
        let client = FakeClient::returning(Err(anyhow!("Z")));
        let mut controller = loaded(with_key(), client);

        controller.generate();
        assert_eq!(
            controller.state(),
            &AppState::Error {
                message: "Z".to_string()
            }
        );
        match controller.view() {
            View::UploadForm { banner, action, .. } => {
                assert_eq!(banner.as_deref(), Some("Z"));
                assert!(action.enabled);
            }
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[test]
    fn blank_failure_falls_back_to_generic_message() {
        let client = FakeClient::returning(Err(anyhow!("")));
        let mut controller = loaded(with_key(), client);

        controller.generate();
        assert_eq!(controller.state().message(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn retry_after_error_clears_the_message() {
        let client = FakeClient::returning(Err(anyhow!("quota")));
        let mut controller = loaded(with_key(), client);
        controller.generate();
        assert_eq!(controller.state().kind(), "error");

        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = states.clone();
        controller.on_transition(Box::new(move |state: &AppState| {
            sink.borrow_mut().push(state.clone());
        }));
        controller.generate();
        assert_eq!(states.borrow()[0], AppState::Generating);
        assert_eq!(controller.state().kind(), "error");
    }

    #[test]
    fn key_selection_success_returns_to_idle() {
        let mut controller = loaded(
            FakeCredentials::default(),
            FakeClient::returning(success("X", None)),
        );
        assert!(!controller.check_credentials());
        assert_eq!(controller.state().kind(), "key-selection");

        controller.select_key();
        assert_eq!(controller.state(), &AppState::Idle);
        assert!(controller.check_credentials());
        assert_eq!(controller.state(), &AppState::Idle);
    }

    #[test]
    fn key_selection_failure_stays_with_message() {
        let credentials = FakeCredentials {
            select_fails: true,
            ..FakeCredentials::default()
        };
        let mut controller = loaded(credentials, FakeClient::returning(success("X", None)));
        controller.check_credentials();
        controller.select_key();
        assert_eq!(
            controller.state(),
            &AppState::KeySelection {
                message: Some("Failed to select API key: dialog dismissed".to_string()),
            }
        );
    }

    #[test]
    fn reset_from_success_clears_everything() {
        let mut controller = loaded(with_key(), FakeClient::returning(success("X", Some("Y"))));
        controller.generate();
        assert_eq!(controller.state().kind(), "success");

        controller.reset();
        assert_eq!(controller.state(), &AppState::Idle);
        assert!(controller.image(Slot::Adult).is_none());
        assert!(controller.image(Slot::Child).is_none());
        assert!(controller.state().result().is_none());
        assert!(controller.state().message().is_none());
    }

    #[test]
    fn reselecting_a_slot_replaces_its_image() {
        let mut controller =
            BlendController::new(with_key(), FakeClient::returning(success("X", None)));
        controller.set_image(Slot::Child, image(b"first"));
        controller.set_image(Slot::Child, image(b"second"));
        assert_eq!(controller.image(Slot::Child), Some(&image(b"second")));
        assert!(controller.image(Slot::Adult).is_none());

        controller.clear_image(Slot::Child);
        assert!(controller.image(Slot::Child).is_none());
    }

    #[test]
    fn select_file_reads_into_slot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("dad.webp");
        fs::write(&path, b"RIFF....WEBP")?;
        let mut controller =
            BlendController::new(with_key(), FakeClient::returning(success("X", None)));

        controller.select_file(Slot::Adult, &path)?;
        let stored = controller
            .image(Slot::Adult)
            .cloned()
            .unwrap_or_else(|| image(b""));
        assert_eq!(stored.media_type(), "image/webp");
        assert_eq!(stored.decode()?, b"RIFF....WEBP".to_vec());

        assert!(controller
            .select_file(Slot::Child, &temp.path().join("missing.png"))
            .is_err());
        assert!(controller.image(Slot::Child).is_none());
        Ok(())
    }

    #[test]
    fn download_writes_decoded_result() -> anyhow::Result<()> {
        let data_url = EncodedImage::from_bytes(b"\x89PNG blended", "image/png").to_data_url();
        let mut controller = loaded(with_key(), FakeClient::returning(success(&data_url, None)));
        let temp = tempfile::tempdir()?;
        assert!(controller.download(temp.path()).is_err());

        controller.generate();
        let path = controller.download(&temp.path().join("out"))?;
        assert_eq!(path, temp.path().join("out").join("blended-portrait.png"));
        assert_eq!(fs::read(&path)?, b"\x89PNG blended".to_vec());
        Ok(())
    }
}
