//! PDF text extraction strategy chain.
//!
//! Extraction backends differ in which documents they can read: `pdf-extract`
//! handles most text-layer PDFs in one pass, while `lopdf` can often still
//! recover per-page text from files the primary backend rejects. The chain
//! tries each strategy in order and reports a single failure only when every
//! strategy has been exhausted.

use thiserror::Error;

/// Error produced when no strategy in the chain could extract text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Every configured strategy failed for this document.
    #[error("all {attempts} extraction strategies failed; last error: {last}")]
    Exhausted {
        /// Number of strategies that were tried.
        attempts: usize,
        /// Message from the final strategy's failure.
        last: String,
    },
}

/// A single extraction backend.
///
/// Strategies return one string per source page or segment; per-strategy
/// failures stay opaque (`anyhow::Error`) since the chain only needs a
/// message to log before moving on.
pub trait ExtractorStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract text segments from the raw document bytes.
    fn extract(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>>;
}

/// Ordered list of extraction strategies tried in sequence.
pub struct ExtractorChain {
    strategies: Vec<Box<dyn ExtractorStrategy>>,
}

impl ExtractorChain {
    /// Build a chain from an explicit strategy list.
    pub fn new(strategies: Vec<Box<dyn ExtractorStrategy>>) -> Self {
        Self { strategies }
    }

    /// The production chain: whole-document extraction first, per-page fallback second.
    pub fn default_chain() -> Self {
        Self::new(vec![
            Box::new(PdfExtractStrategy),
            Box::new(LopdfStrategy),
        ])
    }

    /// Run the chain, returning the first strategy's successful output.
    pub fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        let mut last = String::from("no strategies configured");
        for strategy in &self.strategies {
            match strategy.extract(bytes) {
                Ok(segments) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        segments = segments.len(),
                        "Extracted document text"
                    );
                    return Ok(segments);
                }
                Err(error) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %error,
                        "Extraction strategy failed; trying next"
                    );
                    last = error.to_string();
                }
            }
        }
        Err(ExtractError::Exhausted {
            attempts: self.strategies.len(),
            last,
        })
    }
}

/// Primary strategy: whole-document text via `pdf-extract`.
pub struct PdfExtractStrategy;

impl ExtractorStrategy for PdfExtractStrategy {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let text = pdf_extract::extract_text_from_mem(bytes)?;
        if text.trim().is_empty() {
            anyhow::bail!("document has no extractable text layer");
        }
        Ok(vec![text])
    }
}

/// Fallback strategy: per-page text via `lopdf`.
pub struct LopdfStrategy;

impl ExtractorStrategy for LopdfStrategy {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let document = lopdf::Document::load_mem(bytes)?;
        let mut pages = Vec::new();
        for (page_number, _) in document.get_pages() {
            match document.extract_text(&[page_number]) {
                Ok(text) if !text.trim().is_empty() => pages.push(text),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(page = page_number, error = %error, "Skipping unreadable page");
                }
            }
        }
        if pages.is_empty() {
            anyhow::bail!("no readable pages in document");
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy {
        name: &'static str,
        result: Result<Vec<String>, String>,
    }

    impl ExtractorStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extract(&self, _bytes: &[u8]) -> anyhow::Result<Vec<String>> {
            match &self.result {
                Ok(segments) => Ok(segments.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    #[test]
    fn chain_returns_first_success() {
        let chain = ExtractorChain::new(vec![
            Box::new(FixedStrategy {
                name: "first",
                result: Ok(vec!["page one".into()]),
            }),
            Box::new(FixedStrategy {
                name: "second",
                result: Ok(vec!["unused".into()]),
            }),
        ]);
        let segments = chain.extract(b"pdf").expect("extract");
        assert_eq!(segments, vec!["page one"]);
    }

    #[test]
    fn chain_falls_through_to_later_strategies() {
        let chain = ExtractorChain::new(vec![
            Box::new(FixedStrategy {
                name: "broken",
                result: Err("cannot parse".into()),
            }),
            Box::new(FixedStrategy {
                name: "fallback",
                result: Ok(vec!["recovered".into()]),
            }),
        ]);
        let segments = chain.extract(b"pdf").expect("extract");
        assert_eq!(segments, vec!["recovered"]);
    }

    #[test]
    fn chain_reports_exhaustion_with_last_error() {
        let chain = ExtractorChain::new(vec![
            Box::new(FixedStrategy {
                name: "a",
                result: Err("first failure".into()),
            }),
            Box::new(FixedStrategy {
                name: "b",
                result: Err("second failure".into()),
            }),
        ]);
        let error = chain.extract(b"pdf").unwrap_err();
        let ExtractError::Exhausted { attempts, last } = error;
        assert_eq!(attempts, 2);
        assert_eq!(last, "second failure");
    }

    #[test]
    fn pdf_extract_strategy_rejects_garbage_bytes() {
        assert!(PdfExtractStrategy.extract(b"not a pdf").is_err());
    }

    #[test]
    fn lopdf_strategy_rejects_garbage_bytes() {
        assert!(LopdfStrategy.extract(b"not a pdf").is_err());
    }
}
