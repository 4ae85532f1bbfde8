use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::non_empty_env;

/// Key selection as offered by the hosting environment. The controller owns
/// one and asks it before every generation attempt.
pub trait CredentialCapability {
    fn has_selected_key(&self) -> Result<bool>;
    fn open_select_key(&mut self) -> Result<()>;
}

/// Shared holder for the selected API key. The generation client reads it at
/// call time, so a key selected mid-session is picked up without rebuilding
/// anything.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    key: Arc<Mutex<Option<String>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let store = Self::new();
        if let Some(key) =
            non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
        {
            store.set(key);
        }
        store
    }

    pub fn get(&self) -> Option<String> {
        self.key.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn set(&self, key: impl Into<String>) {
        if let Ok(mut guard) = self.key.lock() {
            *guard = Some(key.into());
        }
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// Source of a freshly entered key (a terminal prompt in the CLI).
pub trait KeyPrompt {
    fn prompt_for_key(&mut self) -> Result<Option<String>>;
}

impl<F> KeyPrompt for F
where
    F: FnMut() -> Result<Option<String>>,
{
    fn prompt_for_key(&mut self) -> Result<Option<String>> {
        self()
    }
}

pub struct EnvCredentials<P: KeyPrompt> {
    store: CredentialStore,
    prompt: P,
}

impl<P: KeyPrompt> EnvCredentials<P> {
    pub fn new(store: CredentialStore, prompt: P) -> Self {
        Self { store, prompt }
    }
}

impl<P: KeyPrompt> CredentialCapability for EnvCredentials<P> {
    fn has_selected_key(&self) -> Result<bool> {
        Ok(self.store.is_set())
    }

    fn open_select_key(&mut self) -> Result<()> {
        let entered = self
            .prompt
            .prompt_for_key()?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let Some(key) = entered else {
            bail!("no API key was entered");
        };
        self.store.set(key);
        Ok(())
    }
}
