//! Markdown subset to Telegram HTML.
//!
//! Two passes over the input:
//!
//! 1. **Fence pass** splits the text into fenced code blocks and ordinary text.
//!    A block runs from a ```` ``` ```` to the *first* following ```` ``` ````
//!    (possibly across lines); an unmatched fence stays ordinary text.
//! 2. **Inline pass** escapes each ordinary segment and then layers formatting
//!    back on, one stage at a time and always in this order:
//!    `**bold**`, `__bold__`, `_italic_`, `` `code` ``, then `- `/`* ` bullets.
//!
//! Everything the caller wrote is escaped before any tag is produced, so the
//! only markup in the output is markup generated here.

const FENCE: &str = "```";

/// Longest first line of a code block that may be a language tag.
const MAX_LANGUAGE_TAG_LEN: usize = 20;

const BULLET: &str = "• ";

/// Escape special HTML characters for Telegram's HTML parse mode.
///
/// Covers `&`, `<`, `>` and both quote characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert agent-written markdown to Telegram HTML.
///
/// Handles:
/// - ```` ```lang\ncode``` ```` → `<pre>code</pre>`
/// - `**bold**` / `__bold__` → `<b>bold</b>`
/// - `_italic_` → `<i>italic</i>`
/// - `` `inline code` `` → `<code>inline code</code>`
/// - `- item` / `* item` at line start → `• item`
///
/// Nested emphasis is not supported; where spans overlap the later stage wins.
pub fn markdown_to_telegram_html(md: &str) -> String {
    let mut out = String::with_capacity(md.len() + md.len() / 4);
    for segment in split_fences(md) {
        match segment {
            Segment::Code(body) => render_code_block(body, &mut out),
            Segment::Text(text) => out.push_str(&render_inline(text)),
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    /// Body of a fenced block, fences excluded.
    Code(&'a str),
    Text(&'a str),
}

/// Fence pass. Only fully matched fence pairs become code segments.
fn split_fences(input: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        segments.push(Segment::Code(&after_open[..close]));
        rest = &after_open[close + FENCE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

fn render_code_block(body: &str, out: &mut String) {
    let content = strip_language_tag(body.trim());
    out.push_str("<pre>");
    out.push_str(&escape_html(content));
    out.push_str("</pre>");
}

/// Drop a leading ```` ```rust ````-style tag line if the block has one.
fn strip_language_tag(content: &str) -> &str {
    let Some(newline) = content.find('\n') else {
        return content;
    };
    if newline >= MAX_LANGUAGE_TAG_LEN {
        return content;
    }
    let tag = content[..newline].trim();
    let looks_like_tag = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '#');
    if looks_like_tag {
        &content[newline + 1..]
    } else {
        content
    }
}

/// Inline pass over one ordinary segment.
fn render_inline(text: &str) -> String {
    let escaped = escape_html(text);
    let bold = wrap_delimited(&escaped, "**", "b");
    let bold = wrap_delimited(&bold, "__", "b");
    let italic = wrap_delimited(&bold, "_", "i");
    let code = wrap_delimited(&italic, "`", "code");
    convert_bullets(&code)
}

/// Replace every `{delim}x{delim}` span on a single line with `<tag>x</tag>`.
///
/// Scans left to right and closes each span at the nearest following delimiter,
/// so `**a** and **b**` yields two spans. A span never crosses a newline.
fn wrap_delimited(input: &str, delim: &str, tag: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];
        if rest.starts_with(delim)
            && let Some(len) = find_closing(&rest[delim.len()..], delim)
        {
            let inner = &rest[delim.len()..delim.len() + len];
            out.push('<');
            out.push_str(tag);
            out.push('>');
            out.push_str(inner);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            i += 2 * delim.len() + len;
            continue;
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        out.push(c);
        i += c.len_utf8();
    }

    out
}

/// Byte offset of the closing delimiter on the current line, if any.
fn find_closing(haystack: &str, delim: &str) -> Option<usize> {
    let line_end = haystack.find('\n').unwrap_or(haystack.len());
    haystack[..line_end].find(delim)
}

/// Turn `- ` / `* ` at the start of a line into a bullet glyph.
///
/// All whitespace after the marker is consumed, including newlines.
fn convert_bullets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut line_start = true;

    while let Some((idx, c)) = chars.next() {
        if line_start && (c == '*' || c == '-') {
            let followed_by_space = input[idx + c.len_utf8()..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace);
            if followed_by_space {
                while chars.next_if(|(_, next)| next.is_whitespace()).is_some() {}
                out.push_str(BULLET);
                line_start = false;
                continue;
            }
        }
        out.push(c);
        line_start = c == '\n';
    }

    out
}
