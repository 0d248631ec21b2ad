//! Text helpers over `scraper` elements

use scraper::{ElementRef, Node, Selector};

/// Concatenated text of every descendant text node
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Like [`element_text`] but `<br>` contributes a newline
pub(crate) fn block_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

pub(crate) fn first_match<'a>(
    scope: ElementRef<'a>,
    selector: &Selector,
) -> Option<ElementRef<'a>> {
    scope.select(selector).next()
}

/// Trimmed text of the first match, `None` when nothing matches
pub(crate) fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    first_match(scope, selector).map(|el| element_text(el).trim().to_string())
}
