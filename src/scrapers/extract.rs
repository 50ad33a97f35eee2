use crate::normalize::clean_text;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

#[derive(Debug, Clone)]
enum Probe {
    /// Text content of the first descendant matching the selector
    Text(Selector),
    /// Attribute of the first descendant matching the selector that has it
    Attr(Selector, &'static str),
    /// Attribute of the element itself
    OwnAttr(&'static str),
}

/// Ordered probes for one field; the first non-empty match wins
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    probes: Vec<Probe>,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, css: &str) -> Self {
        if let Some(selector) = parse_selector(css) {
            self.probes.push(Probe::Text(selector));
        }
        self
    }

    pub fn attr(mut self, css: &str, attr: &'static str) -> Self {
        if let Some(selector) = parse_selector(css) {
            self.probes.push(Probe::Attr(selector, attr));
        }
        self
    }

    pub fn own_attr(mut self, attr: &'static str) -> Self {
        self.probes.push(Probe::OwnAttr(attr));
        self
    }

    /// First non-empty value, whitespace-collapsed
    pub fn extract(&self, element: ElementRef<'_>) -> Option<String> {
        self.probes.iter().find_map(|probe| {
            let raw = match probe {
                Probe::Text(selector) => element
                    .select(selector)
                    .map(|el| el.text().collect::<String>())
                    .find(|t| !t.trim().is_empty()),
                Probe::Attr(selector, attr) => element
                    .select(selector)
                    .filter_map(|el| el.value().attr(attr))
                    .find(|v| !v.trim().is_empty())
                    .map(str::to_string),
                Probe::OwnAttr(attr) => element
                    .value()
                    .attr(attr)
                    .filter(|v| !v.trim().is_empty())
                    .map(str::to_string),
            }?;
            let cleaned = clean_text(&raw);
            (!cleaned.is_empty()).then_some(cleaned)
        })
    }

    /// Every non-empty value the first productive probe yields
    pub fn extract_all(&self, element: ElementRef<'_>) -> Vec<String> {
        for probe in &self.probes {
            let values: Vec<String> = match probe {
                Probe::Text(selector) => element
                    .select(selector)
                    .map(|el| clean_text(&el.text().collect::<String>()))
                    .collect(),
                Probe::Attr(selector, attr) => element
                    .select(selector)
                    .filter_map(|el| el.value().attr(attr))
                    .map(clean_text)
                    .collect(),
                Probe::OwnAttr(attr) => element.value().attr(attr).map(clean_text).into_iter().collect(),
            };
            let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
            if !values.is_empty() {
                return values;
            }
        }
        Vec::new()
    }
}

/// Ordered candidates for the listing-card container
#[derive(Debug, Clone, Default)]
pub struct CardSelector {
    candidates: Vec<Selector>,
}

impl CardSelector {
    pub fn new(css: &[&str]) -> Self {
        Self {
            candidates: css.iter().filter_map(|c| parse_selector(c)).collect(),
        }
    }

    /// Cards matched by the first candidate that matches anything
    pub fn select<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for selector in &self.candidates {
            let cards: Vec<_> = document.select(selector).collect();
            if !cards.is_empty() {
                return cards;
            }
        }
        Vec::new()
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Ignoring invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"
        <div class="card" data-id="42">
            <h2 class="title"> </h2>
            <h3 class="alt-title">Riad   à&nbsp;vendre</h3>
            <img data-src="" src="/img/1.jpg">
            <img src="/img/2.jpg">
        </div>"#;

    fn card_root(doc: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("div.card").unwrap();
        doc.select(&sel).next().unwrap()
    }

    #[test]
    fn first_non_empty_probe_wins() {
        let doc = Html::parse_fragment(CARD);
        let title = FieldExtractor::new().text("h2.title").text("h3.alt-title");
        assert_eq!(title.extract(card_root(&doc)).as_deref(), Some("Riad à vendre"));

        let image = FieldExtractor::new().attr("img", "data-src").attr("img", "src");
        assert_eq!(image.extract(card_root(&doc)).as_deref(), Some("/img/1.jpg"));

        let id = FieldExtractor::new().own_attr("data-id");
        assert_eq!(id.extract(card_root(&doc)).as_deref(), Some("42"));
    }

    #[test]
    fn extract_all_collects_every_match() {
        let doc = Html::parse_fragment(CARD);
        let images = FieldExtractor::new().attr("img", "src");
        assert_eq!(images.extract_all(card_root(&doc)), vec!["/img/1.jpg", "/img/2.jpg"]);
    }

    #[test]
    fn invalid_selectors_are_skipped() {
        let doc = Html::parse_fragment(CARD);
        let title = FieldExtractor::new().text("h2[[").text("h3");
        assert_eq!(title.extract(card_root(&doc)).as_deref(), Some("Riad à vendre"));
    }

    #[test]
    fn card_selector_falls_through_to_matching_pattern() {
        let doc = Html::parse_document("<ul><li class='item'>a</li><li class='item'>b</li></ul>");
        let cards = CardSelector::new(&["div.listingBox", "li.item"]);
        assert_eq!(cards.select(&doc).len(), 2);
        assert!(CardSelector::new(&["article"]).select(&doc).is_empty());
    }
}
