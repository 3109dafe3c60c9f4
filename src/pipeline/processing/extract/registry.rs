use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{SourceInput, SourceProcessor};
use crate::domain::SourceType;

/// Maps source types to processors. Registration is explicit at construction
/// time; there is no ambient global registry, which keeps test doubles
/// substitutable.
pub struct ProcessorRegistry {
    by_type: HashMap<SourceType, Arc<dyn SourceProcessor>>,
    /// Registration order, used for deterministic fallback scans
    order: Vec<SourceType>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, processor: Arc<dyn SourceProcessor>) {
        let source_type = processor.source_type();
        if self.by_type.insert(source_type, processor).is_none() {
            self.order.push(source_type);
        }
        debug!("registered processor for source type {}", source_type.as_str());
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceProcessor>> {
        self.by_type.get(&source_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Resolve the processor for an input: an exact type hint wins, otherwise
    /// the first registered processor whose `can_handle` accepts the payload.
    pub fn find_best(&self, input: &SourceInput) -> Option<Arc<dyn SourceProcessor>> {
        if let Some(hint) = input.source_type {
            if let Some(processor) = self.by_type.get(&hint) {
                if processor.can_handle(input) {
                    return Some(processor.clone());
                }
            }
        }

        self.order
            .iter()
            .filter_map(|t| self.by_type.get(t))
            .find(|p| p.can_handle(input))
            .cloned()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventRecord;
    use crate::pipeline::processing::extract::{ProcessingResult, SourcePayload};
    use async_trait::async_trait;

    struct StubProcessor {
        source_type: SourceType,
        accepts_anything: bool,
    }

    #[async_trait]
    impl SourceProcessor for StubProcessor {
        fn source_type(&self) -> SourceType {
            self.source_type
        }

        fn can_handle(&self, input: &SourceInput) -> bool {
            if self.accepts_anything {
                return true;
            }
            matches!(
                (&input.payload, self.source_type),
                (SourcePayload::Text(_), SourceType::Text)
                    | (SourcePayload::Image { .. }, SourceType::Image)
                    | (SourcePayload::Url(_), SourceType::Url)
            )
        }

        async fn process(&self, _input: &SourceInput) -> ProcessingResult {
            ProcessingResult::ok(EventRecord::default(), Vec::new(), 0)
        }
    }

    #[test]
    fn test_exact_type_hint_wins() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            source_type: SourceType::Text,
            accepts_anything: true,
        }));
        registry.register(Arc::new(StubProcessor {
            source_type: SourceType::Url,
            accepts_anything: true,
        }));

        let input = SourceInput::url("https://example.com");
        let processor = registry.find_best(&input).unwrap();
        assert_eq!(processor.source_type(), SourceType::Url);
    }

    #[test]
    fn test_fallback_scan_in_registration_order() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            source_type: SourceType::Image,
            accepts_anything: false,
        }));
        registry.register(Arc::new(StubProcessor {
            source_type: SourceType::Text,
            accepts_anything: false,
        }));

        // Hint names a type with no registered processor, so the scan decides.
        let mut input = SourceInput::text("hello");
        input.source_type = Some(SourceType::Url);
        let processor = registry.find_best(&input).unwrap();
        assert_eq!(processor.source_type(), SourceType::Text);
    }

    #[test]
    fn test_no_match_returns_none() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            source_type: SourceType::Image,
            accepts_anything: false,
        }));

        let input = SourceInput::text("hello");
        assert!(registry.find_best(&input).is_none());
    }
}
