use chrono::{DateTime, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::escape::{resolve_html5_entity, resolve_xml_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::util::unescape_html;

/// Layout of `<pubDate>`: `Mon, 02 Jan 2006 15:04:05 -0700`
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Errors that fail a whole fetch cycle.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(String),
    /// Well-formed XML without a `<channel>` under the root element
    #[error("Document has no <channel> element")]
    MissingChannel,
}

/// One fetched feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    /// Taken from the `href` attribute of `<link>`, not its text
    pub link: String,
    pub description: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    /// Text content of `<link>`
    pub link: String,
    pub description: String,
    /// Raw `<pubDate>` text, see [`parse_pub_date`]
    pub pub_date: String,
}

/// Decodes an RSS 2.0 shaped document into a [`Channel`].
///
/// The root element's name is not checked; it must contain a `channel`
/// element. Elements are matched by local name, so `<atom:link>` counts as a
/// `link`. The channel link comes from the `href` attribute of its `link`
/// element(s) while each item link is the element text. When an element
/// repeats, the last one wins. Captured text is trimmed of surrounding ASCII
/// whitespace; a leading or trailing `&nbsp;` is kept.
///
/// After decoding, titles and descriptions are HTML-unescaped once to undo
/// publisher-side double encoding.
///
/// # Errors
///
/// - [`ParseError::Xml`] for malformed or truncated XML
/// - [`ParseError::MissingChannel`] when there is no `channel` element
pub fn parse_channel(bytes: &[u8]) -> Result<Channel, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let decoder = reader.decoder();
    let mut builder = ChannelBuilder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => builder.open(&e, decoder)?,
            Ok(Event::Empty(e)) => {
                builder.open(&e, decoder)?;
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(e)) => {
                // HTML named entities (`&nbsp;`) resolve here too; a reference
                // neither table knows keeps the node raw for the HTML pass
                let text = match e.unescape_with(resolve_entity) {
                    Ok(text) => text.into_owned(),
                    Err(_) => decode(decoder, &e)?,
                };
                builder.text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = decode(decoder, &e)?;
                builder.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    builder.finish()
}

/// Parses an item's publication date, `None` when it does not match
/// [`PUB_DATE_FORMAT`].
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    resolve_xml_entity(entity).or_else(|| resolve_html5_entity(entity))
}

fn decode(decoder: Decoder, bytes: &[u8]) -> Result<String, ParseError> {
    decoder
        .decode(bytes)
        .map(|text| text.into_owned())
        .map_err(|e| ParseError::Xml(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// What the element at the end of the current path means to us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Channel,
    ChannelLink,
    Item,
    Text(Field),
    Ignored,
}

/// Depth 1 is the root, 2 is `channel`, 3 is a channel field or `item`,
/// 4 is an item field. Anything else is ignored.
fn classify(path: &[Vec<u8>]) -> Slot {
    match path {
        [_, channel] if channel.as_slice() == b"channel" => Slot::Channel,
        [_, channel, name] if channel.as_slice() == b"channel" => match name.as_slice() {
            b"title" => Slot::Text(Field::ChannelTitle),
            b"description" => Slot::Text(Field::ChannelDescription),
            b"link" => Slot::ChannelLink,
            b"item" => Slot::Item,
            _ => Slot::Ignored,
        },
        [_, channel, item, name]
            if channel.as_slice() == b"channel" && item.as_slice() == b"item" =>
        {
            match name.as_slice() {
                b"title" => Slot::Text(Field::ItemTitle),
                b"link" => Slot::Text(Field::ItemLink),
                b"description" => Slot::Text(Field::ItemDescription),
                b"pubDate" => Slot::Text(Field::ItemPubDate),
                _ => Slot::Ignored,
            }
        }
        _ => Slot::Ignored,
    }
}

/// Text collected for the element currently open at `depth`
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

/// Tracks the element path while streaming events. Text nested deeper than
/// a field element (`<title>a<b>b</b></title>`) is not collected.
#[derive(Default)]
struct ChannelBuilder {
    path: Vec<Vec<u8>>,
    channel: Option<Channel>,
    item: Option<Item>,
    capture: Option<Capture>,
}

impl ChannelBuilder {
    fn open(&mut self, e: &BytesStart<'_>, decoder: Decoder) -> Result<(), ParseError> {
        self.path.push(e.local_name().as_ref().to_vec());

        match classify(&self.path) {
            Slot::Channel => {
                self.channel.get_or_insert_with(Channel::default);
            }
            Slot::ChannelLink => {
                if let Some(href) = href_attribute(e, decoder)? {
                    if let Some(channel) = self.channel.as_mut() {
                        channel.link = href;
                    }
                }
            }
            Slot::Item => self.item = Some(Item::default()),
            Slot::Text(field) => {
                self.capture = Some(Capture {
                    field,
                    depth: self.path.len(),
                    text: String::new(),
                });
            }
            Slot::Ignored => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            if capture.depth == self.path.len() {
                capture.text.push_str(text);
            }
        }
    }

    fn close(&mut self) {
        match classify(&self.path) {
            Slot::Text(_) => {
                if let Some(capture) = self.capture.take() {
                    let text = capture.text.trim_matches(|c: char| c.is_ascii_whitespace());
                    self.assign(capture.field, text.to_string());
                }
            }
            Slot::Item => {
                if let (Some(channel), Some(item)) = (self.channel.as_mut(), self.item.take()) {
                    channel.items.push(item);
                }
            }
            _ => {}
        }
        self.path.pop();
    }

    fn assign(&mut self, field: Field, value: String) {
        match field {
            Field::ChannelTitle => {
                if let Some(channel) = self.channel.as_mut() {
                    channel.title = value;
                }
            }
            Field::ChannelDescription => {
                if let Some(channel) = self.channel.as_mut() {
                    channel.description = value;
                }
            }
            _ => {
                let Some(item) = self.item.as_mut() else {
                    return;
                };
                match field {
                    Field::ItemTitle => item.title = value,
                    Field::ItemLink => item.link = value,
                    Field::ItemDescription => item.description = value,
                    _ => item.pub_date = value,
                }
            }
        }
    }

    fn finish(self) -> Result<Channel, ParseError> {
        if !self.path.is_empty() {
            return Err(ParseError::Xml("unexpected end of document".to_string()));
        }

        let mut channel = self.channel.ok_or(ParseError::MissingChannel)?;
        channel.title = unescape_html(&channel.title).into_owned();
        channel.description = unescape_html(&channel.description).into_owned();
        for item in &mut channel.items {
            item.title = unescape_html(&item.title).into_owned();
            item.description = unescape_html(&item.description).into_owned();
        }
        Ok(channel)
    }
}

fn href_attribute(e: &BytesStart<'_>, decoder: Decoder) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed link attribute");
                continue;
            }
        };
        if attr.key.local_name().as_ref() == b"href" {
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|e| ParseError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
