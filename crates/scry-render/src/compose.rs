//! Viewer composition: wraps a board artifact in a titled frame.
//!
//! ```text
//! ┌──────────────────────────────┐  ← MARGIN
//! │ board name                   │  ← title band
//! │ ┌──────────────────────────┐ │
//! │ │ artifact (width×height)  │ │
//! │ └──────────────────────────┘ │
//! │ scry · 800×600               │  ← footer band
//! └──────────────────────────────┘
//! ```

const MARGIN: u32 = 16;
const TITLE_BAND: u32 = 40;
const TITLE_FONT_SIZE: u32 = 20;
const FOOTER_BAND: u32 = 24;
const FOOTER_FONT_SIZE: u32 = 12;
/// Rough advance of one title glyph, in pixels, for sans-serif at 20px.
const TITLE_GLYPH_WIDTH: u32 = 12;

/// Escape the five XML-sensitive characters.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Remove a leading byte-order mark, XML declaration and DOCTYPE so the
/// artifact can be nested.
pub fn strip_prolog(artifact: &str) -> &str {
    let mut rest = artifact.trim_start_matches('\u{FEFF}').trim_start();
    loop {
        if rest.starts_with("<?xml") {
            match rest.find("?>") {
                Some(end) => rest = rest[end + 2..].trim_start(),
                None => return "",
            }
        } else if rest.starts_with("<!DOCTYPE") {
            let close = match (rest.find('['), rest.find('>')) {
                // Internal subset: the declaration ends at "]>"
                (Some(open), Some(gt)) if open < gt => rest.find("]>").map(|i| i + 2),
                (_, Some(gt)) => Some(gt + 1),
                _ => None,
            };
            match close {
                Some(end) => rest = rest[end..].trim_start(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}

/// Width of the title band needed to fit `name` at the title font size.
fn title_width(name: &str) -> u32 {
    let glyphs = u32::try_from(name.chars().count()).unwrap_or(u32::MAX);
    glyphs.saturating_mul(TITLE_GLYPH_WIDTH)
}

/// Compose the framed viewer document for a board.
pub fn viewer_compose(name: &str, artifact: &str, width: u32, height: u32, alt: Option<&str>) -> String {
    let inner_width = width.max(title_width(name));
    let total_width = inner_width + 2 * MARGIN;
    let total_height = MARGIN + TITLE_BAND + height + FOOTER_BAND + MARGIN;

    let name_xml = xml_escape(name);
    let body = strip_prolog(artifact);

    let desc = match alt.filter(|a| !a.is_empty()) {
        Some(alt) => format!("<desc>{}</desc>", xml_escape(alt)),
        None => String::new(),
    };
    let title_y = MARGIN + TITLE_BAND - 12;
    let frame_y = MARGIN + TITLE_BAND;
    let footer_y = MARGIN + TITLE_BAND + height + FOOTER_BAND - 8;

    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{tw}" height="{th}" viewBox="0 0 {tw} {th}" role="img" aria-labelledby="scry-title">"#,
            r#"<title id="scry-title">{name}</title>{desc}"#,
            r##"<rect width="{tw}" height="{th}" fill="#f7f7f8"/>"##,
            r##"<text x="{m}" y="{title_y}" font-family="sans-serif" font-size="{tfs}" font-weight="bold" fill="#1a1a2e">{name}</text>"##,
            r#"<svg x="{m}" y="{frame_y}" width="{w}" height="{h}" overflow="hidden">{body}</svg>"#,
            r##"<text x="{m}" y="{footer_y}" font-family="sans-serif" font-size="{ffs}" fill="#888888">scry · {w}×{h}</text>"##,
            "</svg>"
        ),
        tw = total_width,
        th = total_height,
        name = name_xml,
        desc = desc,
        m = MARGIN,
        title_y = title_y,
        tfs = TITLE_FONT_SIZE,
        frame_y = frame_y,
        w = width,
        h = height,
        body = body,
        footer_y = footer_y,
        ffs = FOOTER_FONT_SIZE,
    )
}
