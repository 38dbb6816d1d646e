//! Text-run substitution inside a slide part

use super::{Marker, MarkerSet};
use crate::{Error, Result};
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Compiled patterns for locating text runs in DrawingML
pub(crate) struct RunScanner {
    text_body: Regex,
    run: Regex,
    run_text: Regex,
}

/// Values written into matched runs
pub(crate) struct Substitutions<'a> {
    pub name: &'a str,
    pub identifier: &'a str,
    pub date_stamp: &'a str,
}

/// Slide XML after substitution, with the markers that were replaced
pub(crate) struct FilledSlide {
    pub xml: String,
    pub found: Vec<Marker>,
}

impl RunScanner {
    pub(crate) fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Other(format!("invalid run pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            text_body: compile(r"(?s)<p:txBody(?:\s[^>]*)?>.*?</p:txBody>")?,
            run: compile(r"(?s)<a:r(?:\s[^>]*)?>.*?</a:r>")?,
            run_text: compile(r"(<a:t(?:\s[^>]*)?>)([^<]*)(</a:t>)")?,
        })
    }

    /// Replace every run whose whole text is a marker
    ///
    /// Runs outside shape text bodies and runs that match nothing are left as they were.
    pub(crate) fn fill(
        &self,
        xml: &str,
        markers: &MarkerSet,
        values: &Substitutions<'_>,
    ) -> FilledSlide {
        let mut found = Vec::new();

        let xml = self
            .text_body
            .replace_all(xml, |body: &Captures<'_>| {
                self.run
                    .replace_all(&body[0], |run: &Captures<'_>| {
                        self.run_text
                            .replace(&run[0], |text: &Captures<'_>| {
                                let current = unescape(&text[2]);
                                match markers.classify(&current) {
                                    Some(marker) => {
                                        found.push(marker);
                                        let value = match marker {
                                            Marker::Name => values.name,
                                            Marker::Identifier => values.identifier,
                                            Marker::Date => values.date_stamp,
                                        };
                                        format!("{}{}{}", &text[1], escape(value), &text[3])
                                    }
                                    None => text[0].to_string(),
                                }
                            })
                            .into_owned()
                    })
                    .into_owned()
            })
            .into_owned();

        FilledSlide { xml, found }
    }
}

/// Escape text for an XML character-data position
pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    let needs_escape = |c: char| matches!(c, '&' | '<' | '>' | '"' | '\'') || is_xml_illegal(c);
    if !text.contains(needs_escape) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // XML 1.0 has no representation for these, not even as references
            c if is_xml_illegal(c) => {}
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

fn is_xml_illegal(c: char) -> bool {
    c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r')
}

/// Decode the predefined entities and numeric references
pub(crate) fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
