//! Extraction of clock readings from loosely formatted channel posts.
//!
//! Parsing never fails loudly: anything without a recognizable time comes
//! back as [`ParseOutcome::Unparsed`] with a reason attached.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_DESCRIPTION: &str = "Время до заключения эпохального соглашения";
pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

pub const CLOCK_KEYWORDS: &[&str] = &[
    "час",
    "время",
    "минут",
    "секунд",
    "договор",
    "соглашение",
    "сделка",
    "судного",
    "до",
    "остается",
    "осталось",
];

const PROMO_PHRASES: &[&str] = &["подпис", "subscribe", "наш канал", "реклама"];

struct TimePattern {
    name: &'static str,
    regex: Regex,
}

// Order matters: the first pattern that matches wins. Only ASCII digits count.
static TIME_PATTERNS: Lazy<Vec<TimePattern>> = Lazy::new(|| {
    [
        ("hh:mm:ss", r"(?:^|[^0-9])([0-9]{1,2}:[0-9]{2}:[0-9]{2})"),
        ("hh:mm", r"(?:^|[^0-9])([0-9]{1,2}:[0-9]{2})"),
        ("hh.mm.ss", r"(?:^|[^0-9])([0-9]{1,2}\.[0-9]{2}\.[0-9]{2})"),
        ("hh.mm", r"(?:^|[^0-9])([0-9]{1,2}\.[0-9]{2})"),
    ]
    .into_iter()
    .map(|(name, pattern)| TimePattern {
        name,
        regex: Regex::new(pattern).unwrap(),
    })
    .collect()
});

static NUMERIC_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{1,2}[./][0-9]{1,2}[./][0-9]{4})").unwrap());

static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^0-9])([0-9]{1,2}[ \t]+(?:января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря)(?:[ \t]+[0-9]{4})?)",
    )
    .unwrap()
});

static DELTA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*([+\-−–]\s*[0-9]+)\s*\)").unwrap());

static ANY_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,2}[:.][0-9]{2}(?:[:.][0-9]{2})?").unwrap());

static EMOJI_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{1F550}-\x{1F567}\x{1F570}\x{23F0}-\x{23F3}\x{231B}\x{1F514}\x{1F3AF}\x{26A1}\x{FE0F}]")
        .unwrap()
});

static EMPHASIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__|~~|`|\*").unwrap());

static UNDERSCORE_EMPHASIS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?P<pre>^|[\s(])_(?P<body>[^_\n]+?)_(?P<post>[\s).,!?:;]|$)").unwrap()
});

static ZERO_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{200B}-\x{200D}\x{FEFF}]").unwrap());

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-—–_=]{3,}\s*$").unwrap());

static BARE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:https?://\S+|@\w+|t\.me/\S+)$").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    /// Time label exactly as written in the post.
    pub time: String,
    pub date: Option<String>,
    /// Time label plus the signed delta that follows it, e.g. `23:56:05 (−5)`.
    pub current: Option<String>,
    pub description: String,
}

impl ClockReading {
    pub fn normalized_time(&self) -> String {
        normalize_time(&self.time).unwrap_or_else(|| self.time.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed(ClockReading),
    Unparsed { text: String, reason: String },
}

impl ParseOutcome {
    pub fn reading(&self) -> Option<&ClockReading> {
        match self {
            ParseOutcome::Parsed(reading) => Some(reading),
            ParseOutcome::Unparsed { .. } => None,
        }
    }

    pub fn into_reading(self) -> Option<ClockReading> {
        match self {
            ParseOutcome::Parsed(reading) => Some(reading),
            ParseOutcome::Unparsed { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ParseOutcome::Parsed(_) => None,
            ParseOutcome::Unparsed { reason, .. } => Some(reason.as_str()),
        }
    }

    fn unparsed(text: &str, reason: &str) -> Self {
        ParseOutcome::Unparsed {
            text: text.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeMatch {
    pub pattern: &'static str,
    pub matched: String,
    pub normalized: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseAnalysis {
    pub original_text: String,
    pub has_keywords: bool,
    pub found_times: Vec<TimeMatch>,
    pub outcome: ParseOutcome,
}

pub fn parse(text: &str) -> ParseOutcome {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParseOutcome::unparsed(text, "empty message");
    }

    let cleaned = strip_markup(trimmed);
    let (masked, date) = mask_dates(&cleaned);

    let Some(hit) = first_time(&masked) else {
        return ParseOutcome::unparsed(text, "no time pattern found");
    };

    let line_start = masked[..hit.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = masked[hit.end..]
        .find('\n')
        .map(|i| i + hit.end)
        .unwrap_or(masked.len());

    let time = masked[hit.clone()].to_string();
    let current = DELTA_RE
        .captures(&masked[hit.end..line_end])
        .and_then(|caps| caps.get(1))
        .map(|delta| format!("{time} ({})", delta.as_str().replace(char::is_whitespace, "")))
        .or_else(|| Some(time.clone()));

    let mut description = clean_body(&cleaned[line_end..]);
    if description.is_empty() {
        description = headline_remainder(&masked[line_start..line_end]);
    }

    ParseOutcome::Parsed(ClockReading {
        time,
        date,
        current,
        description: finish_description(description),
    })
}

pub fn analyze(text: &str) -> ParseAnalysis {
    let cleaned = strip_markup(text);
    let (masked, _) = mask_dates(&cleaned);
    let mut found_times = Vec::new();
    for pattern in TIME_PATTERNS.iter() {
        for range in bounded_matches(&pattern.regex, &masked) {
            let matched = masked[range].to_string();
            found_times.push(TimeMatch {
                pattern: pattern.name,
                normalized: normalize_time(&matched),
                matched,
            });
        }
    }

    ParseAnalysis {
        original_text: text.to_string(),
        has_keywords: has_keywords(text),
        found_times,
        outcome: parse(text),
    }
}

pub fn has_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLOCK_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Zero-pads a `H:MM[:SS]` or `H.MM[.SS]` label into `HH:MM:SS`.
pub fn normalize_time(label: &str) -> Option<String> {
    let parts: Vec<u32> = label
        .split([':', '.'])
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [h, m] => Some(format!("{h:02}:{m:02}:00")),
        [h, m, s] => Some(format!("{h:02}:{m:02}:{s:02}")),
        _ => None,
    }
}

pub fn is_promotional(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if BARE_LINK_RE.is_match(trimmed) || trimmed.contains("t.me/") {
        return true;
    }
    let lower = trimmed.to_lowercase();
    PROMO_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn strip_markup(text: &str) -> String {
    let text = ZERO_WIDTH_RE.replace_all(text, "");
    let text = EMPHASIS_RE.replace_all(&text, "");
    UNDERSCORE_EMPHASIS_RE
        .replace_all(&text, "${pre}${body}${post}")
        .into_owned()
}

/// Blanks out date spans so their digits are not read as times. Byte offsets
/// are preserved.
fn mask_dates(text: &str) -> (String, Option<String>) {
    let mut masked = text.to_string();
    let mut spans: Vec<Range<usize>> = bounded_matches(&NUMERIC_DATE_RE, text);
    spans.extend(bounded_matches(&MONTH_DATE_RE, text));
    spans.sort_by_key(|range| range.start);

    let date = spans.first().map(|range| text[range.clone()].to_string());
    for range in spans {
        let blank = " ".repeat(range.len());
        masked.replace_range(range, &blank);
    }
    (masked, date)
}

fn first_time(text: &str) -> Option<Range<usize>> {
    TIME_PATTERNS
        .iter()
        .find_map(|pattern| bounded_matches(&pattern.regex, text).into_iter().next())
}

/// Matches of capture group 1 that are not immediately followed by a digit.
fn bounded_matches(regex: &Regex, text: &str) -> Vec<Range<usize>> {
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter(|m| {
            !text[m.end()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
        .map(|m| m.range())
        .collect()
}

fn clean_body(block: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in block.lines() {
        if SEPARATOR_RE.is_match(line) {
            break;
        }
        let line = EMOJI_MARKER_RE.replace_all(line, "");
        lines.push(collapse_whitespace(&line));
    }

    while lines
        .last()
        .is_some_and(|line| line.is_empty() || is_promotional(line))
    {
        lines.pop();
    }

    let mut out: Vec<&str> = Vec::new();
    for line in lines.iter().skip_while(|line| line.is_empty()) {
        if line.is_empty() && out.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

fn headline_remainder(headline: &str) -> String {
    let text = ANY_TIME_RE.replace_all(headline, "");
    let text = DELTA_RE.replace_all(&text, "");
    let text = EMOJI_MARKER_RE.replace_all(&text, "");
    collapse_whitespace(&text)
}

fn finish_description(description: String) -> String {
    let count = description.chars().count();
    if count < MIN_DESCRIPTION_CHARS {
        return DEFAULT_DESCRIPTION.to_string();
    }
    if count > MAX_DESCRIPTION_CHARS {
        let truncated: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        return truncated.trim_end().to_string();
    }
    description
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}
