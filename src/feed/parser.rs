use feed_rs::model::{Entry, FeedType};
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors produced while turning feed bytes into entries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not RSS or Atom.
    #[error("{0}")]
    Feed(#[from] parser::ParseFeedError),
    /// The document parsed but contains no entries.
    #[error("feed contains no entries")]
    NoEntries,
}

/// A media attachment of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub href: String,
    /// Media type, e.g. `audio/mpeg`.
    pub kind: Option<String>,
}

/// iTunes elements that are also exposed under their plain name.
const ITUNES_ALIASES: [(&str, &str); 3] = [
    ("subtitle", "itunes_subtitle"),
    ("summary", "itunes_summary"),
    ("author", "itunes_author"),
];

/// One feed entry with its fields flattened to name/value pairs.
///
/// Standard fields use feedparser-style names (`title`, `id`, `link`,
/// `summary`, `author`, `published`, ...). Namespaced extension elements
/// are exposed with the colon replaced by an underscore, so `<itunes:author>`
/// becomes `itunes_author`.
///
/// Enclosures are ordered RSS `<enclosure>` elements first, then Atom
/// `rel="enclosure"` links, then `media:content` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    fields: BTreeMap<String, String>,
    enclosures: Vec<Enclosure>,
}

impl RawEntry {
    pub fn new(fields: BTreeMap<String, String>, enclosures: Vec<Enclosure>) -> Self {
        Self { fields, enclosures }
    }

    /// Value of the named field, `None` when the entry lacks it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn enclosures(&self) -> &[Enclosure] {
        &self.enclosures
    }

    /// Set a field unless the entry already has a value for it.
    fn fill(&mut self, name: String, value: String) {
        self.fields.entry(name).or_insert(value);
    }

    fn merge(&mut self, scanned: ScannedEntry) {
        for (name, value) in scanned.fields {
            self.fill(name, value);
        }
        if scanned.enclosures.is_empty() {
            return;
        }

        let rest = std::mem::replace(&mut self.enclosures, scanned.enclosures);
        for enclosure in rest {
            if !self.enclosures.iter().any(|e| e.href == enclosure.href) {
                self.enclosures.push(enclosure);
            }
        }
    }

    fn fill_aliases(&mut self) {
        for (plain, itunes) in ITUNES_ALIASES {
            if let Some(value) = self.fields.get(itunes).cloned() {
                self.fill(plain.to_string(), value);
            }
        }
    }
}

/// Parse an RSS or Atom document into its entries, in document order.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>, ParseError> {
    let feed = parser::parse(bytes)?;
    if feed.entries.is_empty() {
        return Err(ParseError::NoEntries);
    }

    // JSON Feed has no XML extension elements to recover.
    let is_xml = !matches!(feed.feed_type, FeedType::JSON);
    let mut entries: Vec<RawEntry> = feed.entries.into_iter().map(entry_into_raw).collect();

    if is_xml {
        match scan_entries(bytes) {
            Ok(scanned) => {
                merge_scanned(&mut entries, scanned);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Extension scan failed, extension fields skipped");
            }
        }
    }

    for entry in &mut entries {
        entry.fill_aliases();
    }
    Ok(entries)
}

/// Union of field names across `entries`.
pub fn collect_keys(entries: &[RawEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.keys().map(str::to_string))
        .collect()
}

/// Merge scan results into the parsed entries, pairing them by position.
///
/// Returns `false` and leaves `entries` untouched when the counts differ.
fn merge_scanned(entries: &mut [RawEntry], scanned: Vec<ScannedEntry>) -> bool {
    if scanned.len() != entries.len() {
        tracing::warn!(
            entries = entries.len(),
            scanned = scanned.len(),
            "Entry count mismatch, extension fields skipped"
        );
        return false;
    }
    for (entry, scanned) in entries.iter_mut().zip(scanned) {
        entry.merge(scanned);
    }
    true
}

fn entry_into_raw(entry: Entry) -> RawEntry {
    let mut fields = BTreeMap::new();

    if !entry.id.trim().is_empty() {
        fields.insert("id".to_string(), entry.id.trim().to_string());
    }
    if let Some(title) = entry.title {
        fields.insert("title".to_string(), title.content);
    }
    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .map(|l| l.href.clone());
    if let Some(link) = link {
        fields.insert("link".to_string(), link);
    }
    if let Some(summary) = entry.summary {
        fields.insert("summary".to_string(), summary.content);
    }
    if let Some(body) = entry.content.and_then(|c| c.body) {
        fields.insert("content".to_string(), body);
    }
    if let Some(author) = entry.authors.first() {
        if !author.name.trim().is_empty() {
            fields.insert("author".to_string(), author.name.clone());
        }
    }
    if let Some(published) = entry.published {
        fields.insert("published".to_string(), published.to_rfc3339());
    }
    if let Some(updated) = entry.updated {
        fields.insert("updated".to_string(), updated.to_rfc3339());
    }
    if let Some(category) = entry.categories.first() {
        fields.insert("category".to_string(), category.term.clone());
    }
    if let Some(rights) = entry.rights {
        fields.insert("rights".to_string(), rights.content);
    }
    if let Some(language) = entry.language {
        fields.insert("language".to_string(), language);
    }

    let mut enclosures: Vec<Enclosure> = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| Enclosure {
            href: l.href.clone(),
            kind: l.media_type.clone(),
        })
        .collect();
    // feed-rs reports RSS <enclosure> and media:content alike as media
    // objects. They stay behind the true enclosures; the scan puts RSS
    // enclosures in front.
    for content in entry.media.iter().flat_map(|media| media.content.iter()) {
        if let Some(url) = content.url.as_ref() {
            let href = url.to_string();
            if !enclosures.iter().any(|e| e.href == href) {
                enclosures.push(Enclosure {
                    href,
                    kind: content.content_type.as_ref().map(|m| m.to_string()),
                });
            }
        }
    }

    RawEntry::new(fields, enclosures)
}

// ============================================================================
// Extension Scan
// ============================================================================

/// What the raw XML scan finds in one `<item>`/`<entry>`.
#[derive(Debug, Default)]
struct ScannedEntry {
    fields: BTreeMap<String, String>,
    enclosures: Vec<Enclosure>,
}

impl ScannedEntry {
    /// Record `element` if it is an RSS `<enclosure>` with a `url`.
    fn record_enclosure(&mut self, element: &BytesStart<'_>) {
        if element.name().as_ref() != b"enclosure" {
            return;
        }
        if let Some(href) = attribute(element, "url") {
            self.enclosures.push(Enclosure {
                href,
                kind: attribute(element, "type"),
            });
        }
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    let attr = element.try_get_attribute(name).ok()??;
    let value = attr.unescape_value().ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_entry_element(local_name: &[u8]) -> bool {
    local_name == b"item" || local_name == b"entry"
}

fn extension_key(qualified_name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(qualified_name).ok()?;
    name.contains(':').then(|| name.replace(':', "_"))
}

/// Collect namespaced child elements and RSS enclosures of every
/// `<item>`/`<entry>`, one result per entry in document order.
///
/// feed-rs drops elements outside the vocabularies it models; this pass
/// recovers them so mappings can reference fields such as `frn:radio`.
/// Self-closing entries yield an empty result so positions stay aligned
/// with the parsed entries.
fn scan_entries(bytes: &[u8]) -> Result<Vec<ScannedEntry>, quick_xml::Error> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; unknown
    // entities fail unescaping and the raw text is kept instead.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut scanned = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut entry: Option<(usize, ScannedEntry)> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        let entry_depth = entry.as_ref().map(|(d, _)| *d);
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                match entry_depth {
                    None if is_entry_element(e.local_name().as_ref()) => {
                        entry = Some((depth, ScannedEntry::default()));
                    }
                    Some(d) if depth == d + 1 => {
                        if let Some((_, current)) = entry.as_mut() {
                            current.record_enclosure(&e);
                        }
                        field = extension_key(e.name().as_ref()).map(|key| (key, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match entry_depth {
                None if is_entry_element(e.local_name().as_ref()) => {
                    scanned.push(ScannedEntry::default());
                }
                // Empty elements do not change depth.
                Some(d) if depth == d => {
                    if let Some((_, current)) = entry.as_mut() {
                        current.record_enclosure(&e);
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(d), Some((_, text))) = (entry_depth, field.as_mut()) {
                    if depth == d + 1 {
                        match t.unescape() {
                            Ok(s) => text.push_str(&s),
                            Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                        }
                    }
                }
            }
            Event::CData(t) => {
                if let (Some(d), Some((_, text))) = (entry_depth, field.as_mut()) {
                    if depth == d + 1 {
                        text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                    }
                }
            }
            Event::End(_) => {
                match entry_depth {
                    Some(d) if depth == d + 1 => {
                        if let (Some((key, text)), Some((_, current))) = (field.take(), entry.as_mut())
                        {
                            let text = text.trim();
                            if !text.is_empty() {
                                current.fields.entry(key).or_insert_with(|| text.to_string());
                            }
                        }
                    }
                    Some(d) if depth == d => {
                        if let Some((_, current)) = entry.take() {
                            scanned.push(current);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(scanned)
}
