use once_cell::sync::Lazy;
use pulldown_cmark::{html, Event, Options, Parser};
use regex::{Captures, Regex};
use serde::Serialize;

// Alternatives are tried left to right, so markdown links and autolinks are
// consumed whole before the bare URL, t.me and mention forms get a chance.
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(?P<label>[^\]\n]+)\]\((?P<target>https?://[^\s)]+)\)|<(?P<angle>https?://[^\s<>]+)>|(?P<url>https?://[^\s<>()\[\]]+)|(?P<tme>\bt\.me/[\w/+-]+)|(?:^|[^\w@./])(?P<mention>@\w{3,})",
    )
    .unwrap()
});

const TRAILING_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Renders message text as display HTML.
///
/// Raw HTML in the post is shown as text. Bare URLs, `t.me/` paths and
/// mentions are rewritten to markdown links first, so emphasis markers inside
/// a URL stay part of it.
pub fn content_to_html(text: &str) -> String {
    let linked = LINK_RE.replace_all(text.trim(), |caps: &Captures| as_markdown_link(caps));
    let events = Parser::new_ext(&linked, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut output = String::new();
    html::push_html(&mut output, events);
    output.trim_end().to_string()
}

/// Collects promotional links in order of appearance, without duplicates.
pub fn extract_links(text: &str) -> Vec<Link> {
    let mut links: Vec<Link> = Vec::new();
    for caps in LINK_RE.captures_iter(text) {
        if let Some(link) = link_from(&caps) {
            if !links.iter().any(|existing| existing.url == link.url) {
                links.push(link);
            }
        }
    }
    links
}

fn as_markdown_link(caps: &Captures) -> String {
    let whole = &caps[0];
    if let Some(url) = caps.name("url") {
        let (url, tail) = split_trailing(url.as_str());
        return format!("<{url}>{tail}");
    }
    if let Some(tme) = caps.name("tme") {
        let (path, tail) = split_trailing(tme.as_str());
        return format!("<https://{path}>{tail}");
    }
    if let Some(mention) = caps.name("mention") {
        let prefix = &whole[..mention.start() - caps.get(0).map_or(0, |m| m.start())];
        let name = mention.as_str().trim_start_matches('@');
        return format!(
            "{prefix}[@{}](https://t.me/{name})",
            name.replace('_', "\\_")
        );
    }
    whole.to_string()
}

fn link_from(caps: &Captures) -> Option<Link> {
    if let (Some(label), Some(target)) = (caps.name("label"), caps.name("target")) {
        return Some(Link {
            label: label.as_str().to_string(),
            url: target.as_str().to_string(),
        });
    }
    if let Some(url) = caps.name("angle").or_else(|| caps.name("url")) {
        let (url, _) = split_trailing(url.as_str());
        return Some(Link {
            label: url.to_string(),
            url: url.to_string(),
        });
    }
    if let Some(tme) = caps.name("tme") {
        let (path, _) = split_trailing(tme.as_str());
        return Some(Link {
            label: path.to_string(),
            url: format!("https://{path}"),
        });
    }
    caps.name("mention").map(|mention| Link {
        label: mention.as_str().to_string(),
        url: format!("https://t.me/{}", mention.as_str().trim_start_matches('@')),
    })
}

fn split_trailing(link: &str) -> (&str, &str) {
    let trimmed = link.trim_end_matches(TRAILING_PUNCTUATION);
    (trimmed, &link[trimmed.len()..])
}
