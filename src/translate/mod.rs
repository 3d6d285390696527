use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OverlayError;
use crate::extract::ExtractedRegion;
use crate::geometry::Rect;

mod openai;
mod retry;

pub use openai::OpenAiTranslator;

/// An extracted region together with its translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedRegion {
    pub page: usize,
    pub region_name: String,
    pub rect: Rect,
    pub source_text: String,
    /// Empty means there is nothing to render.
    pub target_text: String,
}

impl TranslatedRegion {
    pub fn from_extracted(region: ExtractedRegion, target_text: String) -> Self {
        Self {
            page: region.page,
            region_name: region.region_name,
            rect: region.rect,
            source_text: region.text,
            target_text,
        }
    }
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, OverlayError>> + Send + 'a>>;

/// Turns source text into target text. Implementations own any retry policy.
pub trait TextTranslator: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a>;
}

impl<T: TextTranslator + ?Sized> TextTranslator for Arc<T> {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        (**self).translate(text)
    }
}

impl<T: TextTranslator + ?Sized> TextTranslator for Box<T> {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        (**self).translate(text)
    }
}

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__NUM_(\d+)__").expect("placeholder pattern"));

/// Shields digit runs from the inner translator so amounts come back intact.
#[derive(Debug, Clone)]
pub struct NumberGuard<T> {
    inner: T,
}

impl<T> NumberGuard<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: TextTranslator> TextTranslator for NumberGuard<T> {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            let protected = protect_numbers(text);
            let translated = self.inner.translate(&protected).await?;
            Ok(restore_numbers(&translated))
        })
    }
}

pub fn protect_numbers(text: &str) -> String {
    DIGITS.replace_all(text, "__NUM_${0}__").into_owned()
}

pub fn restore_numbers(text: &str) -> String {
    PLACEHOLDER.replace_all(text, "${1}").into_owned()
}

/// Translates every region, keeping input order.
///
/// Blank regions are not sent to the translator. Up to `concurrency` requests
/// run at once; each result stays attached to the region it was made for.
pub async fn translate_regions<T: TextTranslator + ?Sized>(
    extracted: Vec<ExtractedRegion>,
    translator: &T,
    concurrency: usize,
) -> Result<Vec<TranslatedRegion>, OverlayError> {
    stream::iter(extracted)
        .map(|region| async move {
            if region.text.trim().is_empty() {
                return Ok(TranslatedRegion::from_extracted(region, String::new()));
            }
            let target = translator.translate(&region.text).await?;
            debug!(page = region.page, region = %region.region_name, "translated region");
            Ok(TranslatedRegion::from_extracted(region, target))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Upper-cases its input; records what it was asked.
    #[derive(Default)]
    pub(crate) struct Shouting {
        pub(crate) seen: Mutex<Vec<String>>,
    }

    impl TextTranslator for Shouting {
        fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.push(text.to_string());
                }
                // Later regions finish first.
                let delay = 20u64.saturating_sub(text.len() as u64);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(text.to_uppercase())
            })
        }
    }

    struct Failing;

    impl TextTranslator for Failing {
        fn translate<'a>(&'a self, _text: &'a str) -> TranslateFuture<'a> {
            Box::pin(async { Err(OverlayError::Translation("service unavailable".to_string())) })
        }
    }

    fn extracted(page: usize, name: &str, text: &str) -> ExtractedRegion {
        ExtractedRegion {
            page,
            region_name: name.to_string(),
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn results_stay_with_their_regions() {
        let translator = Shouting::default();
        let input = vec![
            extracted(0, "a", "x"),
            extracted(0, "b", "a much longer text"),
            extracted(1, "a", "mid"),
        ];
        let output = translate_regions(input, &translator, 3).await.unwrap();
        let pairs: Vec<(usize, &str, &str)> = output
            .iter()
            .map(|item| (item.page, item.region_name.as_str(), item.target_text.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![(0, "a", "X"), (0, "b", "A MUCH LONGER TEXT"), (1, "a", "MID")]
        );
        assert_eq!(output[1].source_text, "a much longer text");
    }

    #[tokio::test]
    async fn blank_regions_are_not_sent() {
        let translator = Shouting::default();
        let input = vec![extracted(0, "a", "   "), extracted(0, "b", "total")];
        let output = translate_regions(input, &translator, 1).await.unwrap();
        assert_eq!(output[0].target_text, "");
        assert_eq!(output[1].target_text, "TOTAL");
        assert_eq!(*translator.seen.lock().unwrap(), vec!["total".to_string()]);
    }

    #[tokio::test]
    async fn translation_errors_abort_the_run() {
        let input = vec![extracted(0, "a", "total")];
        let err = translate_regions(input, &Failing, 2).await.unwrap_err();
        assert!(matches!(err, OverlayError::Translation(_)));
    }

    #[tokio::test]
    async fn number_guard_hides_digits_from_translator() {
        let translator = NumberGuard::new(Shouting::default());
        let output = translator.translate("total 245.00 due").await.unwrap();
        assert_eq!(output, "TOTAL 245.00 DUE");
        let seen = translator.inner.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["total __NUM_245__.__NUM_00__ due".to_string()]);
    }

    #[test]
    fn placeholders_restore_to_digits() {
        assert_eq!(protect_numbers("Invoice 42"), "Invoice __NUM_42__");
        assert_eq!(restore_numbers("चालान __NUM_42__"), "चालान 42");
        assert_eq!(restore_numbers("no numbers"), "no numbers");
    }
}
