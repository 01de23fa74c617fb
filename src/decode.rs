//! Body decoding.
//!
//! Every endpoint has a fixed response shape. JSON replies are decoded into
//! typed structs; XML replies are wrapped so that callers can either keep the
//! raw document or pull out the handful of Atom elements the services emit.
//! There is no schema validation: lookups are by element local name and are as
//! coupled to the live services as the services' own documentation.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

pub(crate) fn json<T: DeserializeOwned>(url: &str, text: &str) -> Result<T> {
    serde_json::from_str::<T>(text).map_err(|e| Error::malformed(url, e.to_string()))
}

/// Looks up a required top-level key of a JSON object.
pub(crate) fn field<'a>(url: &str, value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| Error::malformed(url, format!("missing '{}' in JSON reply", key)))
}

/// An XML document returned verbatim by a metadata endpoint (ISO-19115, GCMD,
/// datacasting).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    url: String,
    body: String,
}

impl XmlDocument {
    pub(crate) fn new(url: &str, body: String) -> Self {
        Self {
            url: url.to_string(),
            body,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn into_string(self) -> String {
        self.body
    }

    /// Trimmed text of the first element named `local_name`, ignoring namespace prefixes.
    pub fn first_text(&self, local_name: &str) -> Result<Option<String>> {
        let mut found = None;
        walk(&self.url, &self.body, |ev| {
            if let Walk::Close { name, text, .. } = ev {
                if name == local_name {
                    found = Some(text.to_string());
                    return false;
                }
            }
            true
        })?;
        Ok(found)
    }

    /// Value of `attr` on the first element named `local_name`.
    pub fn first_attribute(&self, local_name: &str, attr: &str) -> Result<Option<String>> {
        let mut found = None;
        walk(&self.url, &self.body, |ev| {
            if let Walk::Open { name, attrs, .. } = ev {
                if name == local_name {
                    found = attrs
                        .iter()
                        .find(|(k, _)| k == attr)
                        .map(|(_, v)| v.clone());
                    return found.is_none();
                }
            }
            true
        })?;
        Ok(found)
    }
}

/// An OpenSearch Atom feed returned by the dataset and granule search endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomFeed {
    url: String,
    body: String,
}

/// The parts of an Atom feed this crate understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: Option<String>,
    pub total_results: Option<u64>,
    pub entries: Vec<AtomEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomEntry {
    /// For granule searches this is the granule name.
    pub title: String,
    pub id: Option<String>,
    pub updated: Option<String>,
    pub dataset_id: Option<String>,
    pub short_name: Option<String>,
    pub links: Vec<AtomLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomLink {
    pub href: String,
    pub rel: Option<String>,
    pub title: Option<String>,
    pub link_type: Option<String>,
}

impl AtomEntry {
    /// First link with the given `title` attribute, e.g. `"Preview Image"` or `"OPeNDAP URL"`.
    pub fn link_titled(&self, title: &str) -> Option<&AtomLink> {
        self.links
            .iter()
            .find(|l| l.title.as_deref() == Some(title))
    }
}

impl AtomFeed {
    pub(crate) fn new(url: &str, body: String) -> Self {
        Self {
            url: url.to_string(),
            body,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn into_string(self) -> String {
        self.body
    }

    pub fn entries(&self) -> Result<Vec<AtomEntry>> {
        Ok(self.parse()?.entries)
    }

    pub fn parse(&self) -> Result<Feed> {
        let mut feed = Feed::default();
        let mut entry: Option<AtomEntry> = None;

        walk(&self.url, &self.body, |ev| {
            match ev {
                Walk::Open { name, attrs, .. } => {
                    if name == "entry" {
                        entry = Some(AtomEntry::default());
                    } else if name == "link" {
                        if let Some(e) = entry.as_mut() {
                            e.links.push(link_from(attrs));
                        }
                    }
                }
                Walk::Close { name, parent, text } => match (parent, name) {
                    (_, "entry") => {
                        if let Some(e) = entry.take() {
                            feed.entries.push(e);
                        }
                    }
                    (Some("entry"), field) => {
                        if let Some(e) = entry.as_mut() {
                            let text = text.to_string();
                            match field {
                                "title" => e.title = text,
                                "id" => e.id = Some(text),
                                "updated" => e.updated = Some(text),
                                "datasetId" => e.dataset_id = Some(text),
                                "shortName" => e.short_name = Some(text),
                                _ => {}
                            }
                        }
                    }
                    (Some("feed"), "title") => feed.title = Some(text.to_string()),
                    (Some("feed"), "totalResults") => feed.total_results = text.parse().ok(),
                    _ => {}
                },
            }
            true
        })?;

        Ok(feed)
    }
}

fn link_from(attrs: &[(String, String)]) -> AtomLink {
    let get = |key: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    AtomLink {
        href: get("href").unwrap_or_default(),
        rel: get("rel"),
        title: get("title"),
        link_type: get("type"),
    }
}

enum Walk<'a> {
    Open {
        name: &'a str,
        attrs: &'a [(String, String)],
    },
    Close {
        name: &'a str,
        parent: Option<&'a str>,
        text: &'a str,
    },
}

/// Drives `visit` over every element of `xml`. Element names are local names
/// (namespace prefix dropped); text is whitespace-trimmed. Returning `false`
/// from `visit` stops the walk.
fn walk<F>(url: &str, xml: &str, mut visit: F) -> Result<()>
where
    F: FnMut(Walk<'_>) -> bool,
{
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let xml_err = |e: quick_xml::Error, pos: usize| {
        Error::malformed(url, format!("XML parsing error at position {}: {}", pos, e))
    };

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_err(e, reader.buffer_position()))?
        {
            Event::Start(e) => {
                let (name, attrs) = open_tag(url, &e)?;
                text.clear();
                let keep_going = visit(Walk::Open {
                    name: &name,
                    attrs: &attrs,
                });
                stack.push(name);
                if !keep_going {
                    break;
                }
            }
            Event::Empty(e) => {
                let (name, attrs) = open_tag(url, &e)?;
                let parent = stack.last().map(String::as_str);
                if !visit(Walk::Open {
                    name: &name,
                    attrs: &attrs,
                }) {
                    break;
                }
                if !visit(Walk::Close {
                    name: &name,
                    parent,
                    text: "",
                }) {
                    break;
                }
            }
            Event::Text(t) => {
                let t = t
                    .unescape()
                    .map_err(|e| xml_err(e, reader.buffer_position()))?;
                text.push_str(&t);
            }
            Event::CData(c) => {
                text.push_str(&String::from_utf8_lossy(&c));
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    return Err(Error::malformed(url, "unbalanced XML end tag"));
                };
                let parent = stack.last().map(String::as_str);
                let keep_going = visit(Walk::Close {
                    name: &name,
                    parent,
                    text: text.trim(),
                });
                text.clear();
                if !keep_going {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn open_tag(url: &str, e: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>)> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::malformed(url, format!("bad XML attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::malformed(url, err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok((name, attrs))
}
