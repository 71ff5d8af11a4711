//! Belgian Official Gazette (ejustice) listing extractor.
//!
//! A listing page for one enterprise comes in one of two shapes, tried in
//! order of decreasing structure:
//!
//! 1. **Structured blocks**: one `.list-item` container per publication, with a
//!    `.list-item--subtitle` (entity name, then a short code) and a
//!    `.list-item--title` block whose text lines are address, secondary
//!    identifier, publication type and a `YYYY-MM-DD / <ref>` line. Links to
//!    the PDF and to the detail page sit anywhere inside the container.
//! 2. **Fallback lines**: no containers at all. The `<main>` region is cut
//!    on `<hr>` into blocks and each block on `<br>` into lines, which are
//!    bound to fields by position. Lossy on purpose.
//!
//! When a page has at least one container the fallback is not attempted.
//! A page without `<main>` (error, maintenance or captcha pages) matches
//! neither shape. Neither shape ever fails: such a page yields no records.

use crate::models::PublicationRecord;
use crate::utils::clean_text;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

static ITEM: Lazy<Selector> = Lazy::new(|| selector(".list-item"));
static SUBTITLE: Lazy<Selector> = Lazy::new(|| selector(".list-item--subtitle"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector(".list-item--title"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static MAIN: Lazy<Selector> = Lazy::new(|| selector("main"));

static HR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<hr\b[^>]*>").expect("static regex"));
static BR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\b[^>]*>").expect("static regex"));
static DATE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})\s*/\s*(\d+)").expect("static regex"));

/// Link labels that announce the next listing page (fr, en, nl).
const NEXT_LABELS: &[&str] = &["suivant", "next", "volgende", "page suivante", "next page", "volgende pagina"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Record field a positional line can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Address,
    PublicationNumber,
    PublicationType,
    Reference,
    SecondaryId,
}

impl Field {
    fn slot(self, record: &mut PublicationRecord) -> &mut Option<String> {
        match self {
            Field::Title => &mut record.title,
            Field::Address => &mut record.address,
            Field::PublicationNumber => &mut record.publication_number,
            Field::PublicationType => &mut record.publication_type,
            Field::Reference => &mut record.reference,
            Field::SecondaryId => &mut record.secondary_id,
        }
    }
}

/// Line positions inside a structured `.list-item--title` block.
pub const TITLE_BLOCK_BINDINGS: &[(Field, usize)] = &[
    (Field::Address, 0),
    (Field::SecondaryId, 1),
    (Field::PublicationType, 2),
];

/// Line positions inside one fallback block.
pub const FALLBACK_BINDINGS: &[(Field, usize)] = &[
    (Field::Title, 0),
    (Field::Address, 1),
    (Field::PublicationNumber, 2),
    (Field::PublicationType, 3),
    (Field::Reference, 4),
];

/// Copy `lines[index]` into each bound field. Missing lines leave the field untouched.
pub fn apply_bindings(record: &mut PublicationRecord, lines: &[String], bindings: &[(Field, usize)]) {
    for &(field, index) in bindings {
        if let Some(line) = lines.get(index) {
            *field.slot(record) = Some(line.clone());
        }
    }
}

/// Which shape produced a page's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Structured,
    Fallback,
}

/// Everything the walker needs from one listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Publications in document order.
    pub records: Vec<PublicationRecord>,
    /// Absolute URL of the next listing page, when one is advertised.
    pub next_url: Option<Url>,
}

/// Extract the publications of one parsed listing page.
///
/// # Arguments
///
/// * `document` - The parsed listing page
/// * `entity_id` - Enterprise number copied onto every record
/// * `page_index` - Stored as each record's `source_page`
/// * `page_url` - Base for resolving relative links
///
/// # Returns
///
/// The records and the shape that produced them. The vector is empty when
/// the page carries no recognisable publication.
pub fn extract(
    document: &Html,
    entity_id: &str,
    page_index: u32,
    page_url: &Url,
) -> (Vec<PublicationRecord>, Shape) {
    let containers: Vec<ElementRef> = document.select(&ITEM).collect();
    if containers.is_empty() {
        return (extract_fallback(document, entity_id, page_index), Shape::Fallback);
    }
    let records = containers
        .into_iter()
        .map(|item| extract_structured(item, entity_id, page_index, page_url))
        .collect();
    (records, Shape::Structured)
}

/// Parse a listing page once: records plus the next-page link.
pub fn parse_listing(markup: &str, entity_id: &str, page_index: u32, page_url: &Url) -> ListingPage {
    let document = Html::parse_document(markup);
    let (records, shape) = extract(&document, entity_id, page_index, page_url);
    let next_url = find_next_link(&document, page_url);
    debug!(
        entity_id,
        page_index,
        ?shape,
        count = records.len(),
        next = next_url.as_ref().map(Url::as_str),
        "Parsed listing page"
    );

    ListingPage { records, next_url }
}

/// Whitespace-normalized, non-empty text nodes of an element, in document order.
fn text_lines(element: ElementRef) -> Vec<String> {
    element.text().filter_map(clean_text).collect()
}

fn extract_structured(item: ElementRef, entity_id: &str, page_index: u32, page_url: &Url) -> PublicationRecord {
    let mut record = PublicationRecord::new(entity_id, page_index);

    let subtitle = item.select(&SUBTITLE).next().map(text_lines).unwrap_or_default();
    record.title = subtitle.first().cloned();
    if subtitle.len() > 1 {
        record.code = subtitle.last().cloned();
    }

    let title_lines = item.select(&TITLE).next().map(text_lines).unwrap_or_default();
    apply_bindings(&mut record, &title_lines, TITLE_BLOCK_BINDINGS);
    if let Some((date, reference)) = date_and_reference(&title_lines.join(" ")) {
        record.publication_date = Some(date);
        record.reference = Some(reference);
    }

    for link in item.select(&LINK) {
        let Some(url) = link.value().attr("href").and_then(|href| resolve(page_url, href)) else {
            continue;
        };
        if is_document(&url) {
            if record.document_url.is_none() {
                record.publication_number = number_from_document(&url);
                record.document_url = Some(url.to_string());
            }
        } else if record.detail_url.is_none() {
            record.detail_url = Some(url.to_string());
        }
    }

    trace!(?record, "Structured record");
    record
}

fn extract_fallback(document: &Html, entity_id: &str, page_index: u32) -> Vec<PublicationRecord> {
    let Some(region) = document.select(&MAIN).next() else {
        debug!(entity_id, page_index, "No <main> region; page matches neither shape");
        return Vec::new();
    };
    let html = region.inner_html();

    let mut records = Vec::new();
    for block in HR_SPLIT.split(&html) {
        let lines: Vec<String> = BR_SPLIT
            .split(block)
            .filter_map(|piece| clean_text(&strip_markup(piece)))
            .collect();
        if lines.is_empty() {
            continue;
        }

        let mut record = PublicationRecord::new(entity_id, page_index);
        apply_bindings(&mut record, &lines, FALLBACK_BINDINGS);
        records.push(record);
    }
    records
}

/// Text content of a markup fragment, tags removed and entities decoded.
fn strip_markup(fragment: &str) -> String {
    Html::parse_fragment(fragment).root_element().text().collect()
}

/// Find `YYYY-MM-DD / <digits>` and split it into date and reference.
pub fn date_and_reference(text: &str) -> Option<(String, String)> {
    let caps = DATE_REF.captures(text)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    base.join(href).ok()
}

fn is_document(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

/// Publication number from a PDF file name such as `/tsv_pdf/2024/01/15/24012345.pdf`.
fn number_from_document(url: &Url) -> Option<String> {
    let file = url.path_segments()?.next_back()?;
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    (!stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit())).then(|| stem.to_string())
}

/// Link text reduced to lowercase words, arrows and punctuation dropped.
fn pager_label(link: ElementRef) -> String {
    let text: String = link
        .text()
        .collect::<String>()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    clean_text(&text).unwrap_or_default().to_lowercase()
}

fn inside_item(link: ElementRef) -> bool {
    link.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().classes().any(|c| c == "list-item"))
}

fn find_next_link(document: &Html, page_url: &Url) -> Option<Url> {
    document.select(&LINK).find_map(|link| {
        if inside_item(link) {
            return None;
        }
        let el = link.value();
        let label = pager_label(link);
        let by_label = NEXT_LABELS.contains(&label.as_str());
        let by_rel = el.attr("rel").is_some_and(|rel| rel.split_whitespace().any(|r| r == "next"));
        let by_class = el.classes().any(|c| c == "pagination-next");

        if by_label || by_rel || by_class {
            el.attr("href").and_then(|href| resolve(page_url, href))
        } else {
            None
        }
    })
}

/// Page index carried by `param` in the URL's query string.
pub fn page_index(url: &Url, param: &str) -> Option<u32> {
    url.query_pairs()
        .find(|(k, _)| k == param)
        .and_then(|(_, v)| v.trim().parse().ok())
}
