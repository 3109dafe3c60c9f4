use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{text, ProcessingResult, SourceInput, SourcePayload, SourceProcessor, TextProcessor};
use crate::app::ports::WebFetchPort;
use crate::domain::{EventRecord, FusableField, ParsedField, SourceType};

pub const PROCESSOR_NAME: &str = "url_processor";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Structured event fields pulled from page markup, with the markup layer
/// they came from.
#[derive(Debug, Default)]
struct StructuredData {
    title: Option<String>,
    date: Option<String>,
    location: Option<String>,
    description: Option<String>,
    organizer: Option<String>,
    ticket_info: Option<String>,
    website: Option<String>,
    layer: &'static str,
}

impl StructuredData {
    /// A structured source is only used when it yields a usable title or date.
    fn usable(&self) -> bool {
        self.title.is_some() || self.date.is_some()
    }
}

/// Fetches a web page and extracts an event record from it: structured
/// markup first (JSON-LD, then item markup, then meta tags), with the rule
/// based text processor over the page's plain text as the baseline.
pub struct UrlProcessor {
    fetcher: Arc<dyn WebFetchPort>,
    text_processor: TextProcessor,
    fetch_timeout: Duration,
}

impl UrlProcessor {
    pub fn new(fetcher: Arc<dyn WebFetchPort>) -> Self {
        Self {
            fetcher,
            text_processor: TextProcessor::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Synchronous page analysis; `Html` is not `Send`, so it must never be
    /// held across an await point.
    fn parse_page(&self, url: &str, body: &str) -> (EventRecord, Vec<String>) {
        let document = Html::parse_document(body);
        let plain = plain_text(&document);

        let mut record = self.text_processor.extract(&plain);
        record.source_type = Some(SourceType::Url);
        record.source_url = Some(url.to_string());
        for field in FusableField::ALL {
            if let Some(parsed) = record.field(field) {
                let mut parsed = parsed.clone();
                parsed.provenance = PROCESSOR_NAME.to_string();
                parsed.span = None;
                record.set_field(field, Some(parsed));
            }
        }

        let structured = extract_json_ld(&document)
            .filter(StructuredData::usable)
            .or_else(|| extract_item_markup(&document).filter(StructuredData::usable))
            .or_else(|| extract_meta_tags(&document).filter(StructuredData::usable));

        let mut warnings = Vec::new();
        match structured {
            Some(data) => {
                debug!(layer = data.layer, "structured event markup found");
                let provenance = format!("{}:{}", PROCESSOR_NAME, data.layer);
                let overrides: [(FusableField, &Option<String>, u8); 7] = [
                    (FusableField::Title, &data.title, 95),
                    (FusableField::Date, &data.date, 95),
                    (FusableField::Location, &data.location, 90),
                    (FusableField::Description, &data.description, 90),
                    (FusableField::Organizer, &data.organizer, 90),
                    (FusableField::TicketInfo, &data.ticket_info, 90),
                    (FusableField::Website, &data.website, 95),
                ];
                for (field, value, confidence) in overrides {
                    if let Some(value) = value {
                        record.set_field(
                            field,
                            Some(ParsedField::new(value.clone(), confidence, provenance.clone())),
                        );
                    }
                }
                let boosted = text::overall_confidence(&record) as u16 + 20;
                record.overall_confidence = boosted.min(100) as u8;
            }
            None => {
                record.overall_confidence = text::overall_confidence(&record);
                warnings.push("no structured event markup found; text heuristics only".to_string());
            }
        }

        (record, warnings)
    }
}

#[async_trait]
impl SourceProcessor for UrlProcessor {
    fn source_type(&self) -> SourceType {
        SourceType::Url
    }

    fn can_handle(&self, input: &SourceInput) -> bool {
        matches!(&input.payload, SourcePayload::Url(url) if is_well_formed_http_url(url))
    }

    async fn process(&self, input: &SourceInput) -> ProcessingResult {
        let start = Instant::now();
        let url = match &input.payload {
            SourcePayload::Url(url) if is_well_formed_http_url(url) => url,
            _ => {
                return ProcessingResult::failed(
                    "url processor received an invalid url payload",
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        let headers = [(
            "User-Agent".to_string(),
            "event-fusion/0.1 (+event extraction)".to_string(),
        )];
        let page = match self.fetcher.fetch(url, self.fetch_timeout, &headers).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url, "fetch failed: {}", e);
                return ProcessingResult::failed(
                    format!("fetch failed: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        if page.status >= 400 {
            return ProcessingResult::failed(
                format!("fetch returned status {}", page.status),
                start.elapsed().as_millis() as u64,
            );
        }

        let (record, warnings) = self.parse_page(url, &page.body);
        ProcessingResult::ok(record, warnings, start.elapsed().as_millis() as u64)
    }
}

fn is_well_formed_http_url(url: &str) -> bool {
    let rest = if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else {
        return false;
    };
    let host = rest.split('/').next().unwrap_or("");
    !host.is_empty() && !url.chars().any(char::is_whitespace)
}

/// All text content with script/style/noscript stripped, one fragment per line.
fn plain_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let skipped = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .map(|name| matches!(name, "script" | "style" | "noscript"))
                .unwrap_or(false);
            if skipped {
                continue;
            }
            let fragment = text.text.trim();
            if !fragment.is_empty() {
                out.push_str(fragment);
                out.push('\n');
            }
        }
    }
    out
}

/// Embedded JSON-LD event markup, the richest structured layer.
fn extract_json_ld(document: &Html) -> Option<StructuredData> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        if let Some(event) = find_event_object(&value) {
            let mut data = StructuredData {
                layer: "jsonld",
                ..StructuredData::default()
            };
            data.title = string_at(event, "name");
            data.date = string_at(event, "startDate");
            data.description = string_at(event, "description");
            data.website = string_at(event, "url");
            data.location = match event.get("location") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(obj) => {
                    let name = string_at(obj, "name");
                    let address = match obj.get("address") {
                        Some(serde_json::Value::String(s)) => Some(s.clone()),
                        Some(addr) => string_at(addr, "streetAddress"),
                        None => None,
                    };
                    match (name, address) {
                        (Some(n), Some(a)) => Some(format!("{}, {}", n, a)),
                        (n, a) => n.or(a),
                    }
                }
                None => None,
            };
            data.organizer = match event.get("organizer") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(obj) => string_at(obj, "name"),
                None => None,
            };
            data.ticket_info = event.get("offers").and_then(|offers| {
                let offer = if let Some(array) = offers.as_array() {
                    array.first()?
                } else {
                    offers
                };
                let price = string_at(offer, "price").or_else(|| {
                    offer.get("price").and_then(|p| p.as_f64()).map(|p| p.to_string())
                })?;
                let currency = string_at(offer, "priceCurrency");
                Some(match currency {
                    Some(c) => format!("{} {}", price, c),
                    None => price,
                })
            });
            return Some(data);
        }
    }
    None
}

/// Walk a JSON-LD document (including `@graph` containers and arrays) for the
/// first object typed as an event.
fn find_event_object(value: &serde_json::Value) -> Option<&serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.iter().find_map(find_event_object),
        serde_json::Value::Object(map) => {
            let is_event = map
                .get("@type")
                .and_then(|t| t.as_str())
                .map(|t| t.ends_with("Event"))
                .unwrap_or(false);
            if is_event {
                return Some(value);
            }
            map.get("@graph").and_then(find_event_object)
        }
        _ => None,
    }
}

fn string_at(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Simple item markup: elements annotated with `itemprop` attributes.
fn extract_item_markup(document: &Html) -> Option<StructuredData> {
    let selector = Selector::parse("[itemprop]").unwrap();
    let mut data = StructuredData {
        layer: "itemprop",
        ..StructuredData::default()
    };
    let mut found_any = false;

    for element in document.select(&selector) {
        let prop = element.value().attr("itemprop").unwrap_or("");
        let content = element
            .value()
            .attr("content")
            .or_else(|| element.value().attr("datetime"))
            .map(|s| s.to_string())
            .unwrap_or_else(|| element.text().collect::<String>());
        let content = content.trim().to_string();
        if content.is_empty() {
            continue;
        }

        let slot = match prop {
            "name" => &mut data.title,
            "startDate" => &mut data.date,
            "location" => &mut data.location,
            "description" => &mut data.description,
            "organizer" => &mut data.organizer,
            "offers" | "price" => &mut data.ticket_info,
            "url" => &mut data.website,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(content);
            found_any = true;
        }
    }

    found_any.then_some(data)
}

/// Open Graph and plain meta tags, the weakest structured layer.
fn extract_meta_tags(document: &Html) -> Option<StructuredData> {
    let mut data = StructuredData {
        layer: "meta",
        ..StructuredData::default()
    };
    let mut found_any = false;

    let pairs: [(&str, fn(&mut StructuredData) -> &mut Option<String>); 6] = [
        (r#"meta[property="og:title"]"#, |d| &mut d.title),
        (r#"meta[property="og:description"]"#, |d| &mut d.description),
        (r#"meta[property="og:url"]"#, |d| &mut d.website),
        (r#"meta[property="event:start_time"]"#, |d| &mut d.date),
        (r#"meta[name="date"]"#, |d| &mut d.date),
        (r#"meta[name="description"]"#, |d| &mut d.description),
    ];
    for (selector_str, slot) in pairs {
        let selector = Selector::parse(selector_str).unwrap();
        if let Some(element) = document.select(&selector).next() {
            if let Some(content) = element.value().attr("content") {
                let content = content.trim();
                let slot = slot(&mut data);
                if !content.is_empty() && slot.is_none() {
                    *slot = Some(content.to_string());
                    found_any = true;
                }
            }
        }
    }

    // Fall back to the <title> element for a page name
    if data.title.is_none() {
        let selector = Selector::parse("title").unwrap();
        if let Some(element) = document.select(&selector).next() {
            let content = element.text().collect::<String>().trim().to_string();
            if !content.is_empty() {
                data.title = Some(content);
                found_any = true;
            }
        }
    }

    found_any.then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FetchedPage;

    struct MockFetcher {
        body: String,
        status: u16,
    }

    #[async_trait]
    impl WebFetchPort for MockFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _timeout: Duration,
            _headers: &[(String, String)],
        ) -> Result<FetchedPage, String> {
            Ok(FetchedPage {
                body: self.body.clone(),
                content_type: "text/html".to_string(),
                status: self.status,
            })
        }
    }

    fn processor_with(body: &str) -> UrlProcessor {
        UrlProcessor::new(Arc::new(MockFetcher {
            body: body.to_string(),
            status: 200,
        }))
    }

    const JSON_LD_PAGE: &str = r#"<html><head>
<script type="application/ld+json">
{"@context":"https://schema.org","@type":"MusicEvent",
 "name":"Harbour Folk Session",
 "startDate":"2026-09-04T19:30",
 "location":{"@type":"Place","name":"The Old Boathouse","address":{"streetAddress":"2 Quay Lane"}},
 "organizer":{"@type":"Organization","name":"Harbour Folk Club"},
 "offers":{"price":"8.50","priceCurrency":"GBP"},
 "url":"https://example.org/folk-session"}
</script>
<style>body { color: red; }</style>
</head><body>
<h1>Harbour Folk Session</h1>
<p>Weekly acoustic session by the water.</p>
<script>var tracking = "ignore me";</script>
</body></html>"#;

    #[tokio::test]
    async fn test_json_ld_overrides_text_baseline() {
        let processor = processor_with(JSON_LD_PAGE);
        let result = processor
            .process(&SourceInput::url("https://example.org/folk-session"))
            .await;
        assert!(result.success);
        let record = result.data.unwrap();

        let title = record.title.unwrap();
        assert_eq!(title.value, "Harbour Folk Session");
        assert_eq!(title.confidence, 95);
        assert_eq!(title.provenance, "url_processor:jsonld");

        let location = record.location.unwrap();
        assert_eq!(location.value, "The Old Boathouse, 2 Quay Lane");
        assert_eq!(location.confidence, 90);

        let ticket = record.ticket_info.unwrap();
        assert_eq!(ticket.value, "8.50 GBP");

        assert_eq!(record.organizer.unwrap().value, "Harbour Folk Club");
        assert_eq!(record.date.unwrap().value, "2026-09-04T19:30");
    }

    #[tokio::test]
    async fn test_script_and_style_stripped_from_plain_text() {
        let processor = processor_with(JSON_LD_PAGE);
        let result = processor
            .process(&SourceInput::url("https://example.org/folk-session"))
            .await;
        let record = result.data.unwrap();
        let description = record.description.map(|d| d.value).unwrap_or_default();
        assert!(!description.contains("ignore me"));
        assert!(!description.contains("color: red"));
    }

    #[tokio::test]
    async fn test_meta_fallback_when_no_event_markup() {
        let page = r#"<html><head>
<meta property="og:title" content="Spring Plant Sale" />
<meta name="date" content="2026-04-18" />
</head><body><p>Seedlings and cuttings at the allotment gates.</p></body></html>"#;
        let processor = processor_with(page);
        let result = processor
            .process(&SourceInput::url("https://example.org/plants"))
            .await;
        let record = result.data.unwrap();
        assert_eq!(record.title.unwrap().value, "Spring Plant Sale");
        assert_eq!(record.date.unwrap().provenance, "url_processor:meta");
    }

    #[tokio::test]
    async fn test_no_structured_markup_warns_and_uses_text() {
        let page = "<html><body><p>Nothing here but prose about a quiet afternoon.</p></body></html>";
        let processor = processor_with(page);
        let result = processor
            .process(&SourceInput::url("https://example.org/prose"))
            .await;
        assert!(result.success);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("no structured event markup")));
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let processor = UrlProcessor::new(Arc::new(MockFetcher {
            body: String::new(),
            status: 404,
        }));
        let result = processor
            .process(&SourceInput::url("https://example.org/missing"))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("404"));
    }

    #[test]
    fn test_url_admissibility() {
        let processor = processor_with("");
        assert!(processor.can_handle(&SourceInput::url("https://example.org/a")));
        assert!(processor.can_handle(&SourceInput::url("http://example.org")));
        assert!(!processor.can_handle(&SourceInput::url("ftp://example.org")));
        assert!(!processor.can_handle(&SourceInput::url("https://")));
        assert!(!processor.can_handle(&SourceInput::url("https://bad url.org")));
        assert!(!processor.can_handle(&SourceInput::text("https://example.org")));
    }
}
