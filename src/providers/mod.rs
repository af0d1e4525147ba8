use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::annotation::Annotation;
use crate::state::SourceImage;

mod gemini;
mod retry;

pub use gemini::Gemini;
pub use retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime: String,
}

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// External model that finds and translates text, or edits a whole image.
pub trait VisionProvider: Clone + Send + Sync {
    /// Ordered annotations; an empty list means no text was found.
    fn detect(&self, image: &SourceImage, target_lang: &str) -> ProviderFuture<Vec<Annotation>>;

    fn edit(&self, image: &SourceImage, instruction: &str) -> ProviderFuture<EditedImage>;
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GEMINI_API_KEY")
        .or_else(|| get_env("GOOGLE_API_KEY"))
        .ok_or_else(|| anyhow!("API key not found (checked GEMINI_API_KEY, GOOGLE_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_key_wins() {
        assert_eq!(resolve_key(Some("abc")).unwrap(), "abc");
    }
}
