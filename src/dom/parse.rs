//! Lenient HTML tokenizer feeding the arena tree.
//!
//! Handles what real pages throw at a link harvester: unquoted and
//! duplicate attributes, void elements, raw-text `script`/`style`, stray end
//! tags and unterminated markup. It does not implement the full HTML5 tree
//! construction algorithm.

use super::{NodeId, Tree};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

enum Markup {
    Comment,
    Declaration,
    EndTag,
    StartTag,
    Text,
}

/// Parse a full page. A `body` element is synthesized when the markup has
/// none so observers always have a subtree to attach to.
pub fn parse_document(html: &str) -> Tree {
    let mut tree = Tree::new();
    let root = tree.root();
    for node in build(&mut tree, html) {
        let _ = tree.append_child(root, node);
    }
    ensure_body(&mut tree);
    tree
}

/// Parse `html` into detached nodes owned by `tree`; returns the top-level
/// nodes in source order.
pub fn parse_fragment(tree: &mut Tree, html: &str) -> Vec<NodeId> {
    build(tree, html)
}

fn build(tree: &mut Tree, html: &str) -> Vec<NodeId> {
    let bytes = html.as_bytes();
    let mut roots = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut pos = 0usize;
    let mut text_start = 0usize;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let kind = classify(&bytes[pos..]);
        if matches!(kind, Markup::Text) {
            pos += 1;
            continue;
        }
        push_text(tree, &stack, &mut roots, &html[text_start..pos]);

        match kind {
            Markup::Comment => {
                let body_start = pos + 4;
                let (body, next) = match html[body_start..].find("-->") {
                    Some(idx) => (&html[body_start..body_start + idx], body_start + idx + 3),
                    None => (&html[body_start..], html.len()),
                };
                let node = tree.create_comment(body);
                attach(tree, &stack, &mut roots, node);
                pos = next;
            }
            Markup::Declaration => {
                pos = after_gt(html, pos);
            }
            Markup::EndTag => {
                let next = after_gt(html, pos);
                let inner = html[pos + 2..next].trim_end_matches('>');
                let name = inner
                    .split(|c: char| c.is_ascii_whitespace())
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if let Some(depth) = stack
                    .iter()
                    .rposition(|&n| tree.element(n).is_some_and(|el| el.tag == name))
                {
                    stack.truncate(depth);
                }
                pos = next;
            }
            Markup::StartTag => {
                let tag = parse_start_tag(html, pos);
                let node = tree.create_element(&tag.name);
                for (name, value) in &tag.attrs {
                    let _ = tree.set_attribute(node, name, value);
                }
                attach(tree, &stack, &mut roots, node);
                pos = tag.end;

                if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) && !tag.self_closing {
                    // ASCII lowercasing keeps byte offsets aligned with `html`.
                    let lower = html[pos..].to_ascii_lowercase();
                    let needle = format!("</{}", tag.name);
                    let end = lower.find(&needle).map_or(html.len(), |idx| pos + idx);
                    if end > pos {
                        let text = tree.create_text(&html[pos..end]);
                        let _ = tree.append_child(node, text);
                    }
                    pos = if end < html.len() { after_gt(html, end) } else { end };
                } else if !VOID_ELEMENTS.contains(&tag.name.as_str()) && !tag.self_closing {
                    stack.push(node);
                }
            }
            Markup::Text => unreachable!("text markup is skipped above"),
        }
        text_start = pos;
    }
    push_text(tree, &stack, &mut roots, &html[text_start..]);
    roots
}

fn classify(rest: &[u8]) -> Markup {
    if rest.starts_with(b"<!--") {
        return Markup::Comment;
    }
    match rest.get(1) {
        Some(b'!') | Some(b'?') => Markup::Declaration,
        Some(b'/') if rest.get(2).is_some_and(u8::is_ascii_alphabetic) => Markup::EndTag,
        Some(c) if c.is_ascii_alphabetic() => Markup::StartTag,
        _ => Markup::Text,
    }
}

fn after_gt(html: &str, from: usize) -> usize {
    html[from..].find('>').map_or(html.len(), |idx| from + idx + 1)
}

fn attach(tree: &mut Tree, stack: &[NodeId], roots: &mut Vec<NodeId>, node: NodeId) {
    match stack.last() {
        Some(&parent) => {
            let _ = tree.append_child(parent, node);
        }
        None => roots.push(node),
    }
}

fn push_text(tree: &mut Tree, stack: &[NodeId], roots: &mut Vec<NodeId>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let node = tree.create_text(&decode_entities(raw));
    attach(tree, stack, roots, node);
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    end: usize,
}

fn parse_start_tag(html: &str, pos: usize) -> StartTag {
    let bytes = html.as_bytes();
    let len = bytes.len();
    let mut i = pos + 1;
    let name_start = i;
    while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }
    let name = html[name_start..i].to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                self_closing = true;
                i += 1;
                continue;
            }
            _ => self_closing = false,
        }

        let attr_start = i;
        while i < len && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'>' | b'/' | b'=') {
            i += 1;
        }
        let attr_name = html[attr_start..i].to_ascii_lowercase();
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < len && bytes[i] == b'=' {
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                while i < len && bytes[i] != quote {
                    i += 1;
                }
                value = decode_entities(&html[value_start..i]);
                if i < len {
                    i += 1;
                }
            } else {
                let value_start = i;
                while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                value = decode_entities(&html[value_start..i]);
            }
        }
        // First occurrence of a duplicated attribute wins.
        if !attr_name.is_empty() && !attrs.iter().any(|(k, _)| *k == attr_name) {
            attrs.push((attr_name, value));
        }
    }

    StartTag {
        name,
        attrs,
        self_closing,
        end: i,
    }
}

fn ensure_body(tree: &mut Tree) {
    if tree.body().is_some() {
        return;
    }
    let root = tree.root();
    let existing = tree.elements_by_tag("html").next();
    let html = match existing {
        Some(html) => html,
        None => {
            let html = tree.create_element("html");
            let _ = tree.append_child(root, html);
            html
        }
    };
    let mut movable = Vec::new();
    for host in [root, html] {
        for &child in tree.children(host) {
            if child == html || tree.element(child).is_some_and(|el| el.is("head")) {
                continue;
            }
            movable.push(child);
        }
    }
    let body = tree.create_element("body");
    let _ = tree.append_child(html, body);
    for child in movable {
        let _ = tree.append_child(body, child);
    }
}

pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .and_then(|(semi, _)| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_anchors_and_attributes() {
        let tree = parse_document(
            "<html><body><div class=x><a href='/one' data-ajax>One &amp; two</a></div></body></html>",
        );
        let anchors: Vec<_> = tree.elements_by_tag("a").collect();
        assert_eq!(anchors.len(), 1);
        let el = tree.element(anchors[0]).expect("anchor");
        assert_eq!(el.attr("href"), Some("/one"));
        assert!(el.has_attr("data-ajax"));
        assert_eq!(tree.text_content(anchors[0]), "One & two");
    }

    #[test]
    fn synthesizes_body_for_bare_markup() {
        let tree = parse_document("<a href=\"https://a.test/\">A</a>");
        let body = tree.body().expect("body");
        assert!(tree.contains_tag(body, "a"));
    }

    #[test]
    fn script_contents_are_not_markup() {
        let tree = parse_document("<body><script>var s = '<a href=\"/no\">';</script></body>");
        assert_eq!(tree.elements_by_tag("a").count(), 0);
    }

    #[test]
    fn tolerates_unterminated_and_stray_markup() {
        let tree = parse_document("<body></span><p>text <a href=/x>x</a><!-- open");
        assert_eq!(tree.elements_by_tag("a").count(), 1);
        assert_eq!(tree.elements_by_tag("p").count(), 1);
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let tree = parse_document("<body><img src=a.png><a href=/x>x</a></body>");
        let img = tree.elements_by_tag("img").next().expect("img");
        assert!(tree.children(img).is_empty());
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;&"), "AB&unknown;&");
    }
}
