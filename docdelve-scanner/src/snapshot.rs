//! Page snapshots: the canonical, immutable view of one interactive state.
//!
//! A snapshot is built from the serialized DOM of the live page. Its
//! fingerprint is a SHA-256 digest over a normalized rendering of the DOM
//! skeleton and visible text, with volatile content (element ids, `data-*`
//! attributes, scripts, session tokens in links, clock times and epoch
//! timestamps) stripped so that re-rendering the same state yields the same
//! fingerprint. Inline styles only count through whether they hide an
//! element, so opening a dialog by toggling `display` is a new state.

use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use url::Url;

/// Domain prefix for page state fingerprints.
const DOMAIN_PAGE_STATE: &[u8] = b"DOCDELVE::PAGE_STATE::V1\0";

const MAX_LABEL_CHARS: usize = 100;

const INTERACTIVE_SELECTOR: &str = concat!(
    "button, [role=\"button\"], [role=\"tab\"], a[href], tr, ",
    "[class*=\"info\"], [class*=\"detail\"], [class*=\"dokument\"], ",
    "[title*=\"info\"], [title*=\"detail\"], ",
    "[aria-label*=\"info\"], [aria-label*=\"detail\"], ",
    "i.fa-info, .info-icon"
);

const INTERESTING_MARKERS: &[&str] = &["info", "detail", "dokument"];

/// Subtrees that never contribute to a fingerprint.
const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Attributes that describe what the user sees. Everything else is treated as volatile.
const STABLE_ATTRIBUTES: &[&str] = &[
    "aria-checked",
    "aria-expanded",
    "aria-hidden",
    "aria-label",
    "aria-selected",
    "class",
    "colspan",
    "disabled",
    "hidden",
    "href",
    "name",
    "open",
    "role",
    "rowspan",
    "title",
    "type",
];

const VOLATILE_QUERY_KEYS: &[&str] = &["_", "cb", "nocache", "rand", "rnd", "sid", "t", "ts"];
const VOLATILE_QUERY_FRAGMENTS: &[&str] = &["csrf", "nonce", "session", "timestamp", "token"];

/// Deterministic digest identifying a distinct interactive state of the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Hash a canonical page rendering.
    pub fn of_content(canonical: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_PAGE_STATE);
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(12).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an element, unique within its owning snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque locator the navigator uses to find an element again in the live page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Button,
    Row,
    Link,
    /// Info/detail controls matched by class, title or aria-label.
    Detail,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Button => "button",
            ElementKind::Row => "row",
            ElementKind::Link => "link",
            ElementKind::Detail => "detail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub id: ElementId,
    /// Human-readable text shown to the ranker.
    pub label: String,
    pub kind: ElementKind,
    pub handle: ElementHandle,
}

impl InteractiveElement {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: ElementKind,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            id: ElementId::new(id),
            label: label.into(),
            kind,
            handle: ElementHandle::new(handle),
        }
    }
}

/// Immutable view of one page state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    fingerprint: Fingerprint,
    depth: usize,
    url: String,
    elements: Vec<InteractiveElement>,
    document_links: Vec<String>,
    captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    /// Duplicate document links are dropped, keeping first-seen order.
    pub fn new(
        fingerprint: Fingerprint,
        depth: usize,
        url: impl Into<String>,
        elements: Vec<InteractiveElement>,
        document_links: Vec<String>,
    ) -> Self {
        let mut seen = HashSet::new();
        let document_links = document_links
            .into_iter()
            .filter(|link| seen.insert(link.clone()))
            .collect();

        Self {
            fingerprint,
            depth,
            url: url.into(),
            elements,
            document_links,
            captured_at: Utc::now(),
        }
    }

    /// Build a snapshot with the default extractor (PDF documents only).
    pub fn from_html(html: &str, page_url: &str, depth: usize) -> Result<Self> {
        SnapshotExtractor::default().extract(html, page_url, depth)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn elements(&self) -> &[InteractiveElement] {
        &self.elements
    }

    pub fn element(&self, id: &ElementId) -> Option<&InteractiveElement> {
        self.elements.iter().find(|element| &element.id == id)
    }

    pub fn document_links(&self) -> &[String] {
        &self.document_links
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Turns serialized page HTML into a [`PageSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotExtractor {
    document_extensions: Vec<String>,
}

impl Default for SnapshotExtractor {
    fn default() -> Self {
        Self {
            document_extensions: vec!["pdf".to_string()],
        }
    }
}

impl SnapshotExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// File extensions (without the dot) that mark a link as a downloadable document.
    pub fn with_document_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.document_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn extract(&self, html: &str, page_url: &str, depth: usize) -> Result<PageSnapshot> {
        let base = Url::parse(page_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", page_url, e)))?;
        let document = Html::parse_document(html);

        let fingerprint = fingerprint_document(&document);
        let document_links = self.document_links(&document, &base)?;
        let elements = self.interactive_elements(&document, &base)?;

        debug!(
            "Snapshot {} at depth {}: {} elements, {} documents",
            fingerprint.short(),
            depth,
            elements.len(),
            document_links.len()
        );

        Ok(PageSnapshot::new(
            fingerprint,
            depth,
            page_url,
            elements,
            document_links,
        ))
    }

    pub fn is_document_url(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        if self.has_document_extension(&path) {
            return true;
        }
        url.query_pairs()
            .any(|(_, value)| self.has_document_extension(&value.to_ascii_lowercase()))
    }

    fn has_document_extension(&self, candidate: &str) -> bool {
        self.document_extensions.iter().any(|ext| {
            candidate
                .strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }

    fn document_links(&self, document: &Html, base: &Url) -> Result<Vec<String>> {
        let selector = parse_selector("a[href]")?;
        let mut links = Vec::new();

        for anchor in document.select(&selector) {
            if let Some(href) = anchor.value().attr("href")
                && let Some(url) = resolve_url(base, href)
                && self.is_document_url(&url)
            {
                links.push(url.to_string());
            }
        }

        Ok(links)
    }

    fn interactive_elements(
        &self,
        document: &Html,
        base: &Url,
    ) -> Result<Vec<InteractiveElement>> {
        let selector = parse_selector(INTERACTIVE_SELECTOR)?;
        let mut elements: Vec<InteractiveElement> = Vec::new();

        for candidate in document.select(&selector) {
            if is_inert(candidate) {
                continue;
            }
            let Some(kind) = self.classify(candidate, base) else {
                continue;
            };

            elements.push(InteractiveElement {
                id: ElementId::new(format!("e{}", elements.len())),
                label: element_label(candidate),
                kind,
                handle: ElementHandle::new(css_path(candidate)),
            });
        }

        Ok(elements)
    }

    fn classify(&self, candidate: ElementRef<'_>, base: &Url) -> Option<ElementKind> {
        let value = candidate.value();
        match value.name() {
            "button" => Some(ElementKind::Button),
            "a" => {
                let href = value.attr("href").unwrap_or_default().trim();
                if href.is_empty()
                    || href.starts_with('#')
                    || href.starts_with("javascript:")
                {
                    return Some(ElementKind::Link);
                }
                // Documents are collected, not clicked; other hosts are out of scope.
                let url = resolve_url(base, href)?;
                if self.is_document_url(&url) || !is_same_host(&url, base) {
                    return None;
                }
                Some(ElementKind::Link)
            }
            "tr" => {
                let clickable = value.attr("onclick").is_some()
                    || value.attr("tabindex").is_some()
                    || value.attr("data-href").is_some()
                    || has_interesting_marker(candidate);
                clickable.then_some(ElementKind::Row)
            }
            _ if matches!(value.attr("role"), Some("button" | "tab")) => Some(ElementKind::Button),
            _ => Some(ElementKind::Detail),
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("selector {}: {:?}", css, e)))
}

/// Resolve `href` against the page URL, dropping the fragment. Non-navigable
/// schemes yield `None`.
fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

fn is_same_host(url: &Url, base: &Url) -> bool {
    match (url.host_str(), base.host_str()) {
        (Some(host), Some(base_host)) => {
            host == base_host || host.ends_with(&format!(".{}", base_host))
        }
        _ => false,
    }
}

fn has_interesting_marker(candidate: ElementRef<'_>) -> bool {
    ["class", "title", "aria-label"].iter().any(|attr| {
        candidate.value().attr(attr).is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            INTERESTING_MARKERS.iter().any(|marker| value.contains(marker))
        })
    })
}

/// Disabled elements and anything inside a hidden subtree cannot be clicked.
fn is_inert(candidate: ElementRef<'_>) -> bool {
    candidate.value().attr("disabled").is_some()
        || is_hidden(candidate.value())
        || candidate
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_hidden(ancestor.value()))
}

fn is_hidden(value: &scraper::node::Element) -> bool {
    value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
        || value.attr("style").is_some_and(style_hides)
}

/// True when inline `display` or `visibility` declarations hide the element.
/// The last declaration of each property wins, as in the cascade.
fn style_hides(style: &str) -> bool {
    let mut display_none = false;
    let mut invisible = false;

    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let value = value
            .trim()
            .trim_end_matches("!important")
            .trim()
            .to_ascii_lowercase();
        match property.trim().to_ascii_lowercase().as_str() {
            "display" => display_none = value == "none",
            "visibility" => invisible = value == "hidden" || value == "collapse",
            _ => {}
        }
    }

    display_none || invisible
}

fn element_label(candidate: ElementRef<'_>) -> String {
    let text = collapse_whitespace(&candidate.text().collect::<Vec<_>>().join(" "));
    let label = if text.is_empty() {
        ["aria-label", "title", "value", "alt"]
            .iter()
            .filter_map(|attr| candidate.value().attr(attr))
            .map(collapse_whitespace)
            .find(|value| !value.is_empty())
            .unwrap_or_else(|| format!("<{}>", candidate.value().name()))
    } else {
        text
    };
    truncate_chars(&label, MAX_LABEL_CHARS)
}

/// `tag:nth-of-type(n)` chain from the document root, resolvable with
/// `document.querySelector` in the live page.
fn css_path(element: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(node) = current {
        let name = node.value().name();
        let position = node
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|sibling| sibling.value().name() == name)
            .count()
            + 1;
        segments.push(format!("{}:nth-of-type({})", name, position));
        current = node.parent().and_then(ElementRef::wrap);
    }

    segments.reverse();
    segments.join(" > ")
}

fn fingerprint_document(document: &Html) -> Fingerprint {
    let mut canonical = String::new();
    canonicalize(document.root_element(), &mut canonical);
    Fingerprint::of_content(&canonical)
}

fn canonicalize(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    // Hidden inputs carry CSRF tokens and view state.
    if name == "input" && value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return;
    }

    let mut attributes: Vec<(&str, String)> = value
        .attrs()
        .filter(|(key, _)| STABLE_ATTRIBUTES.contains(key))
        .map(|(key, raw)| (key, normalize_attribute(key, raw)))
        .collect();
    // Inline styles are volatile except for whether they hide the element.
    if value.attr("style").is_some_and(style_hides) {
        attributes.push(("style", "hidden".to_string()));
    }
    attributes.sort();

    out.push('<');
    out.push_str(name);
    for (key, normalized) in attributes {
        out.push_str(&format!(" {}=\"{}\"", key, normalized));
    }
    out.push('>');

    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    canonicalize(child_element, out);
                }
            }
            Node::Text(text) => {
                let normalized = normalize_text(text);
                if !normalized.is_empty() {
                    out.push_str(&normalized);
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn normalize_attribute(key: &str, raw: &str) -> String {
    match key {
        "class" => {
            let mut classes: Vec<&str> = raw.split_whitespace().collect();
            classes.sort_unstable();
            classes.dedup();
            classes.join(" ")
        }
        "href" => strip_volatile_query(raw.trim()),
        _ => collapse_whitespace(raw),
    }
}

/// Drop the fragment, `;jsessionid=` path parameters and session-like query
/// parameters from a (possibly relative) link.
fn strip_volatile_query(href: &str) -> String {
    let without_fragment = href.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let path = match path.to_ascii_lowercase().find(";jsessionid=") {
        Some(idx) => &path[..idx],
        None => path,
    };

    let kept: Vec<&str> = query
        .map(|query| {
            query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .filter(|pair| {
                    let key = pair.split('=').next().unwrap_or_default();
                    !is_volatile_query_key(key)
                })
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, kept.join("&"))
    }
}

fn is_volatile_query_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    VOLATILE_QUERY_KEYS.contains(&key.as_str())
        || VOLATILE_QUERY_FRAGMENTS.iter().any(|fragment| key.contains(fragment))
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|token| if is_volatile_token(token) { "#" } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Clock times (`9:41`, `12:03:55`) and epoch-like digit runs.
fn is_volatile_token(token: &str) -> bool {
    let core = token.trim_matches(|c: char| c.is_ascii_punctuation() && c != ':');
    if core.len() >= 10 && core.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    let parts: Vec<&str> = core.split(':').collect();
    (2..=3).contains(&parts.len())
        && parts.iter().all(|part| {
            (1..=2).contains(&part.len()) && part.chars().all(|c| c.is_ascii_digit())
        })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
