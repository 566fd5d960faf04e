use tracing::{debug, info};

use crate::config::ResolvedProduct;

use super::records::CatalogRecord;

/// Packaging synonym groups, applied bidirectionally: a keyword from one
/// member of a group also matches text containing any other member.
const SYNONYM_GROUPS: [&[&str]; 3] = [
    &["krat", "bak", "case", "crate"],
    &["fles", "flesje", "flesjes", "bottle"],
    &["blik", "blikje", "blikjes", "can"],
];

/// Generic beverage vocabulary for the category sanity check. A record with
/// no explicit required keyword must still look like the right category.
const CATEGORY_TERMS: [&str; 14] = [
    "bier", "beer", "pils", "pilsener", "lager", "tripel", "dubbel", "blond", "ale", "stout",
    "ipa", "witbier", "weizen", "bok",
];

/// Zero-alcohol markers rejected when the behavior config excludes
/// alcohol-free variants.
const ALCOHOL_FREE_MARKERS: [&str; 7] = [
    "0.0",
    "0,0",
    "alcoholvrij",
    "alcohol-vrij",
    "alcoholarm",
    "alcohol free",
    "non-alcoholic",
];

/// Non-beverage merchandise the stores list next to the beer itself.
const MERCHANDISE_TERMS: [&str; 12] = [
    "glas",
    "glazen",
    "bierglas",
    "t-shirt",
    "shirt",
    "hoodie",
    "trui",
    "pet",
    "opener",
    "flesopener",
    "onderzetter",
    "sleutelhanger",
];

/// Lowercases, strips diacritics and collapses separator runs to single
/// spaces. Digits and alphanumerics survive untouched so size tokens like
/// "6x33" keep their shape.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        let c = strip_diacritic(c);
        for c in c.to_lowercase() {
            if c.is_alphanumeric() || c == '%' {
                out.push(c);
                last_was_space = false;
            } else if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn strip_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Expands a keyword with its synonym group members, the keyword first.
fn expand_term(term: &str) -> Vec<String> {
    let lowered = term.to_lowercase();
    let mut variants = vec![lowered.clone()];
    for group in SYNONYM_GROUPS {
        if group.iter().any(|member| *member == lowered) {
            for member in group {
                if *member != lowered {
                    variants.push((*member).to_string());
                }
            }
        }
    }
    variants
}

/// Substring keyword test against both the raw lowercase text and the
/// normalized text, with synonym expansion.
fn term_matches(raw_lower: &str, normalized: &str, term: &str) -> bool {
    expand_term(term).iter().any(|variant| {
        raw_lower.contains(variant.as_str()) || normalized.contains(&normalize(variant))
    })
}

/// Whole-token test used for the fixed vocabularies, so "ale" does not fire
/// inside "sale" and "pet" does not fire inside "competitie".
fn contains_token(normalized: &str, term: &str) -> bool {
    let padded = format!(" {normalized} ");
    padded.contains(&format!(" {} ", normalize(term)))
}

/// The multi-tier accept/reject filter. Pure and order-independent across
/// records; every stage short-circuits to reject.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    exclude_alcohol_free: bool,
}

impl MatchEngine {
    pub fn new(exclude_alcohol_free: bool) -> Self {
        Self {
            exclude_alcohol_free,
        }
    }

    pub fn matches(&self, record: &CatalogRecord, rules: &ResolvedProduct) -> bool {
        let text = record.match_text();
        let raw_lower = text.to_lowercase();
        let normalized = normalize(&text);

        // Brand-identity gate: at least one required keyword, OR-matched.
        let required_passed = if rules.required_keywords.is_empty() {
            false
        } else {
            if !rules
                .required_keywords
                .iter()
                .any(|term| term_matches(&raw_lower, &normalized, term))
            {
                debug!(record = %record.name, target = %rules.name, "rejected: no required keyword");
                return false;
            }
            true
        };

        // Packaging/size gate.
        if !rules.must_contain.is_empty()
            && !rules
                .must_contain
                .iter()
                .any(|term| term_matches(&raw_lower, &normalized, term))
        {
            debug!(record = %record.name, target = %rules.name, "rejected: no must-contain term");
            return false;
        }

        // Category sanity: without an explicit brand hit the record must at
        // least carry a generic beverage term.
        if !required_passed
            && !CATEGORY_TERMS
                .iter()
                .any(|term| contains_token(&normalized, term))
        {
            debug!(record = %record.name, target = %rules.name, "rejected: no category term");
            return false;
        }

        if self.exclude_alcohol_free
            && ALCOHOL_FREE_MARKERS
                .iter()
                .any(|marker| raw_lower.contains(marker) || contains_token(&normalized, marker))
        {
            debug!(record = %record.name, target = %rules.name, "rejected: alcohol-free variant");
            return false;
        }

        if MERCHANDISE_TERMS
            .iter()
            .any(|term| contains_token(&normalized, term))
        {
            debug!(record = %record.name, target = %rules.name, "rejected: merchandise");
            return false;
        }

        // Soft signal only: logged, never enforced.
        if !rules.preferred_keywords.is_empty()
            && !rules
                .preferred_keywords
                .iter()
                .any(|term| term_matches(&raw_lower, &normalized, term))
        {
            info!(
                record = %record.name,
                target = %rules.name,
                "match accepted without preferred keywords"
            );
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, metadata: &str) -> CatalogRecord {
        CatalogRecord {
            name: name.to_string(),
            price_text: "€4,99".to_string(),
            price: Some(4.99),
            link: "https://example.test/p/1".to_string(),
            image_url: None,
            metadata: metadata.to_string(),
            available: true,
            promo: None,
        }
    }

    fn rules(required: &[&str], must: &[&str]) -> ResolvedProduct {
        ResolvedProduct {
            name: "test".to_string(),
            search_terms: vec![],
            required_keywords: required.iter().map(|s| s.to_string()).collect(),
            must_contain: must.iter().map(|s| s.to_string()).collect(),
            preferred_keywords: vec![],
        }
    }

    #[test]
    fn normalize_collapses_separators_and_diacritics() {
        assert_eq!(normalize("Grimbérgen  Blond - 6x33cl"), "grimbergen blond 6x33cl");
    }

    #[test]
    fn match_is_case_and_diacritic_invariant() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["grimbergen"], &["blond"]);
        assert!(engine.matches(&record("GRIMBERGEN Blond 6x33cl", ""), &rules));
        assert!(engine.matches(&record("Grimbérgen Blönd 6x33cl", ""), &rules));
    }

    #[test]
    fn synonym_bak_matches_krat_in_metadata() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["jupiler"], &["bak"]);
        let rec = record("Jupiler Pils", "krat 24 flesjes van 25cl");
        assert!(engine.matches(&rec, &rules));
    }

    #[test]
    fn jupiler_scenario_yields_single_match() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["jupiler"], &["6x33"]);
        let jupiler = record("Jupiler Pils 6x33cl", "");
        let stella = record("Stella Artois 6x33cl", "");
        assert!(engine.matches(&jupiler, &rules));
        assert!(!engine.matches(&stella, &rules));
    }

    #[test]
    fn alcohol_free_rejected_when_excluded() {
        let engine = MatchEngine::new(true);
        let rules = rules(&["jupiler"], &["6x33"]);
        let rec = record("Jupiler 0.0% 6x33cl", "");
        assert!(!engine.matches(&rec, &rules));
    }

    #[test]
    fn alcohol_free_kept_when_not_excluded() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["jupiler"], &["6x33"]);
        let rec = record("Jupiler 0.0% 6x33cl", "");
        assert!(engine.matches(&rec, &rules));
    }

    #[test]
    fn merchandise_rejected() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["duvel"], &[]);
        assert!(!engine.matches(&record("Duvel bierglas 33cl", ""), &rules));
        assert!(!engine.matches(&record("Duvel t-shirt maat L", ""), &rules));
    }

    #[test]
    fn category_sanity_rejects_without_required_or_category_term() {
        let engine = MatchEngine::new(false);
        let rules = rules(&[], &["6x33"]);
        // Matches the packaging gate but carries no beverage vocabulary.
        assert!(!engine.matches(&record("Cola 6x33cl", ""), &rules));
        // Same packaging, but an explicit category term is present.
        assert!(engine.matches(&record("Pils 6x33cl huismerk", ""), &rules));
    }

    #[test]
    fn token_vocabulary_does_not_fire_inside_words() {
        let engine = MatchEngine::new(false);
        let rules = rules(&["leffe"], &[]);
        // "competitie" contains "pet" as a substring, not a token.
        assert!(engine.matches(&record("Leffe Blond competitie-editie", ""), &rules));
    }
}
