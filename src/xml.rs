//! Minimal element tree over quick-xml events.
//!
//! WCS answers mix several namespaces (`wcs`, `ows`, `gml`, `gmlcov`); lookups
//! here match on local names only, which is unambiguous for the documents the
//! service returns.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) text: String,
    pub(crate) children: Vec<Element>,
}

impl Element {
    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            ..Self::default()
        })
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follows a chain of child names from this element.
    pub(crate) fn path(&self, names: &[&str]) -> Option<&Element> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    pub(crate) fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }
}

pub(crate) fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let el = Element::from_start(&e)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Xml(format!(
            "document ended inside <{}>",
            stack.last().map(|e| e.name.as_str()).unwrap_or("?")
        )));
    }
    root.ok_or_else(|| Error::Xml("empty document".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

/// Returns `(exceptionCode, ExceptionText)` when the body is an OWS exception report.
pub(crate) fn parse_exception_report(body: &str) -> Option<(String, String)> {
    let doc = parse_document(body).ok()?;
    if doc.name != "ExceptionReport" {
        return None;
    }
    let exception = doc.child("Exception")?;
    let code = exception.attr("exceptionCode").unwrap_or("unknown").to_string();
    let text = exception
        .child_text("ExceptionText")
        .unwrap_or_default()
        .to_string();
    Some((code, text))
}

/// Fails with [`Error::ServiceException`] if `doc` is an exception report.
pub(crate) fn ensure_not_exception(doc: &Element) -> Result<()> {
    if doc.name != "ExceptionReport" {
        return Ok(());
    }
    let exception = doc.child("Exception");
    Err(Error::ServiceException {
        code: exception
            .and_then(|e| e.attr("exceptionCode"))
            .unwrap_or("unknown")
            .to_string(),
        text: exception
            .and_then(|e| e.child_text("ExceptionText"))
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_local_names() {
        let xml = r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b">
            <b:item b:id="1">first</b:item>
            <b:item id="2"/>
            <b:group><b:leaf>deep</b:leaf></b:group>
        </a:root>"#;
        let doc = parse_document(xml).unwrap();
        assert_eq!(doc.name, "root");
        let items: Vec<_> = doc.children_named("item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attr("id"), Some("1"));
        assert_eq!(items[0].text, "first");
        assert_eq!(items[1].attr("id"), Some("2"));
        assert_eq!(doc.path(&["group", "leaf"]).unwrap().text, "deep");
    }

    #[test]
    fn truncated_document_is_an_error() {
        assert!(matches!(parse_document("<a><b>"), Err(Error::Xml(_))));
        assert!(matches!(parse_document(""), Err(Error::Xml(_))));
    }

    #[test]
    fn detects_exception_report() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/2.0">
            <ows:Exception exceptionCode="InvalidParameterValue">
                <ows:ExceptionText>bad subset</ows:ExceptionText>
            </ows:Exception>
        </ows:ExceptionReport>"#;
        let doc = parse_document(xml).unwrap();
        match ensure_not_exception(&doc) {
            Err(Error::ServiceException { code, text }) => {
                assert_eq!(code, "InvalidParameterValue");
                assert_eq!(text, "bad subset");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
