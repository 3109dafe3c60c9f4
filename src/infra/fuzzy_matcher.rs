use tracing::debug;

use crate::app::ports::{MatchType, VenueMatch, VenueMatcherPort};
use crate::domain::Venue;

const KEYWORD_MIN_LEN: usize = 3;

/// String-distance venue matcher. Tries the match tiers in order of
/// strength against each venue's name and address, keeps the best tier,
/// and returns the best venue overall if it clears the threshold.
pub struct StrsimVenueMatcher;

impl StrsimVenueMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Score one location string against one venue attribute.
    fn score_against(&self, location: &str, attribute: &str) -> (f64, MatchType) {
        let loc = normalize(location);
        let attr = normalize(attribute);
        if loc.is_empty() || attr.is_empty() {
            return (0.0, MatchType::None);
        }

        if loc == attr {
            return (100.0, MatchType::Exact);
        }

        if loc.contains(&attr) || attr.contains(&loc) {
            let shorter = loc.len().min(attr.len()) as f64;
            let longer = loc.len().max(attr.len()) as f64;
            // 75 for a sliver of overlap, approaching 90 as lengths converge
            return (75.0 + 15.0 * (shorter / longer), MatchType::Partial);
        }

        let fuzzy = strsim::normalized_levenshtein(&loc, &attr) * 100.0;
        if fuzzy >= 60.0 {
            return (fuzzy, MatchType::Fuzzy);
        }

        let loc_words: Vec<&str> = loc
            .split_whitespace()
            .filter(|w| w.len() >= KEYWORD_MIN_LEN)
            .collect();
        let shared = loc_words
            .iter()
            .filter(|w| attr.split_whitespace().any(|a| a == **w))
            .count();
        if shared > 0 {
            return (40.0 + (shared as f64 * 10.0).min(20.0), MatchType::Keyword);
        }

        (fuzzy, MatchType::Fuzzy)
    }
}

impl Default for StrsimVenueMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueMatcherPort for StrsimVenueMatcher {
    fn find_best_match(&self, location_text: &str, venues: &[Venue], threshold: f64) -> VenueMatch {
        let mut best = VenueMatch::none();

        for venue in venues {
            let mut candidates = vec![("name", self.score_against(location_text, &venue.name))];
            if let Some(address) = &venue.address {
                candidates.push(("address", self.score_against(location_text, address)));
            }

            for (field, (score, match_type)) in candidates {
                if score > best.score {
                    best = VenueMatch {
                        venue_id: Some(venue.id),
                        venue_name: Some(venue.name.clone()),
                        score,
                        match_type,
                        matched_field: Some(field.to_string()),
                    };
                }
            }
        }

        if best.score >= threshold && best.match_type != MatchType::None {
            debug!(
                score = best.score,
                venue = best.venue_name.as_deref().unwrap_or(""),
                "venue match found"
            );
            best
        } else {
            VenueMatch::none()
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn venue(name: &str, address: Option<&str>) -> Venue {
        Venue {
            id: Uuid::new_v4(),
            name: name.to_string(),
            latitude: None,
            longitude: None,
            address: address.map(|a| a.to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_match_scores_100() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![venue("The Corner House", None)];
        let result = matcher.find_best_match("the corner  house", &venues, 50.0);
        assert_eq!(result.score, 100.0);
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.matched_field.as_deref(), Some("name"));
    }

    #[test]
    fn test_partial_containment() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![venue("Corn Exchange", None)];
        let result = matcher.find_best_match("Cambridge Corn Exchange", &venues, 50.0);
        assert_eq!(result.match_type, MatchType::Partial);
        assert!(result.score >= 75.0 && result.score <= 90.0);
    }

    #[test]
    fn test_fuzzy_typo_match() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![venue("The Junction", None)];
        let result = matcher.find_best_match("The Junctoin", &venues, 50.0);
        assert_eq!(result.match_type, MatchType::Fuzzy);
        assert!(result.score > 80.0);
    }

    #[test]
    fn test_address_match_reports_field() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![venue("Hidden Rooms", Some("7 Jesus Lane"))];
        let result = matcher.find_best_match("7 Jesus Lane", &venues, 50.0);
        assert_eq!(result.matched_field.as_deref(), Some("address"));
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_below_threshold_is_none() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![venue("The Portland Arms", None)];
        let result = matcher.find_best_match("somewhere else entirely", &venues, 50.0);
        assert_eq!(result.match_type, MatchType::None);
        assert!(result.venue_id.is_none());
    }

    #[test]
    fn test_best_of_several_venues_wins() {
        let matcher = StrsimVenueMatcher::new();
        let venues = vec![
            venue("The Blue Moon", None),
            venue("Blue Moon Bar", None),
            venue("The Blue Moon Bar and Kitchen", None),
        ];
        let result = matcher.find_best_match("Blue Moon Bar", &venues, 50.0);
        assert_eq!(result.venue_name.as_deref(), Some("Blue Moon Bar"));
        assert_eq!(result.match_type, MatchType::Exact);
    }
}
