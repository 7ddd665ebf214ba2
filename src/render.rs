//! HTML-safe rendering of chat text with inline emote images.
//!
//! Pure functions only: everything outside a replaced emote range is
//! entity-escaped, emote ranges become `<img>` tags pointing at a CDN URL
//! derived from the emote id, and a secondary pass swaps remaining tokens
//! that match an extra-emote catalog (BetterTTV/7TV/static). No I/O.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Emote placement inside a raw message, as char indices (`start..end`,
/// end-exclusive). Twitch reports inclusive char ranges; adapters convert at
/// the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteSpan {
    pub id: String,
    pub range: Range<usize>,
}

/// Literal emote token -> image URL.
pub type ExtraEmoteMap = HashMap<String, String>;

const TWITCH_EMOTE_CDN: &str = "https://static-cdn.jtvnw.net/emoticons/v2";

/// Entity-escape the characters that matter inside markup.
pub fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Inline image tag used for every rendered emote.
pub fn emote_img(url: &str) -> String {
    format!("<img src=\"{url}\" class=\"inline w-5 h-5 align-text-bottom\" />")
}

fn twitch_emote_url(id: &str) -> String {
    format!("{TWITCH_EMOTE_CDN}/{id}/default/dark/1.0")
}

/// Render `raw` with the given emote spans replaced by image tags.
///
/// Returns the markup and the set of replaced tokens, which the secondary
/// pass uses to avoid substituting the same word twice. Spans are sorted by
/// start position; when spans overlap, the leftmost wins and later spans
/// covering already-consumed text are skipped. Spans reaching past the end of
/// the text are dropped as malformed.
pub fn render_emotes(raw: &str, spans: &[EmoteSpan]) -> (String, HashSet<String>) {
    let mut consumed = HashSet::new();
    if spans.is_empty() {
        return (escape(raw), consumed);
    }

    let chars: Vec<char> = raw.chars().collect();
    let mut sorted: Vec<&EmoteSpan> = spans.iter().collect();
    sorted.sort_by_key(|s| s.range.start);

    let mut html = String::with_capacity(raw.len());
    let mut cursor = 0usize;
    for span in sorted {
        if span.range.start < cursor || span.range.start >= span.range.end {
            continue;
        }
        if span.range.end > chars.len() {
            continue;
        }
        let text_before: String = chars[cursor..span.range.start].iter().collect();
        html.push_str(&escape(&text_before));

        let token: String = chars[span.range.clone()].iter().collect();
        html.push_str(&emote_img(&twitch_emote_url(&span.id)));
        consumed.insert(token);
        cursor = span.range.end;
    }
    let rest: String = chars[cursor..].iter().collect();
    html.push_str(&escape(&rest));

    (html, consumed)
}

/// Secondary pass: replace whitespace-delimited tokens of `markup` that
/// appear in `extra` with image tags, skipping tokens the primary emote pass
/// already consumed and anything inside a tag.
pub fn inject_extra(markup: &str, extra: &ExtraEmoteMap, consumed: &HashSet<String>) -> String {
    if extra.is_empty() {
        return markup.to_string();
    }

    let mut out = String::with_capacity(markup.len());
    let mut token = String::new();
    let mut in_tag = false;

    let flush = |token: &mut String, out: &mut String, in_tag: bool| {
        if token.is_empty() {
            return;
        }
        if !in_tag && !consumed.contains(token.as_str()) {
            if let Some(url) = extra.get(token.as_str()) {
                out.push_str(&emote_img(url));
                token.clear();
                return;
            }
        }
        out.push_str(token);
        token.clear();
    };

    for ch in markup.chars() {
        match ch {
            '<' => {
                flush(&mut token, &mut out, in_tag);
                in_tag = true;
                out.push(ch);
            }
            '>' => {
                flush(&mut token, &mut out, in_tag);
                in_tag = false;
                out.push(ch);
            }
            c if c.is_whitespace() => {
                flush(&mut token, &mut out, in_tag);
                out.push(c);
            }
            c => token.push(c),
        }
    }
    flush(&mut token, &mut out, in_tag);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, range: Range<usize>) -> EmoteSpan {
        EmoteSpan {
            id: id.to_string(),
            range,
        }
    }

    #[test]
    fn no_spans_is_pure_escaping() {
        let (html, consumed) = render_emotes("a<b", &[]);
        assert_eq!(html, "a&lt;b");
        assert!(consumed.is_empty());
    }

    #[test]
    fn escapes_all_entities() {
        assert_eq!(escape("a & <b> & c"), "a &amp; &lt;b&gt; &amp; c");
    }

    #[test]
    fn single_span_replaces_token() {
        let (html, consumed) = render_emotes("LUL hi", &[span("425618", 0..3)]);
        assert!(html.starts_with("<img src=\"https://static-cdn.jtvnw.net/emoticons/v2/425618/default/dark/1.0\""));
        assert!(html.ends_with(" hi"));
        assert!(consumed.contains("LUL"));
    }

    #[test]
    fn one_image_per_span() {
        let raw = "Kappa mid Kappa";
        let spans = [span("25", 0..5), span("25", 10..15)];
        let (html, _) = render_emotes(raw, &spans);
        assert_eq!(html.matches("<img ").count(), 2);
        assert!(html.contains(" mid "));
    }

    #[test]
    fn unsorted_spans_are_sorted_before_rendering() {
        let raw = "Kappa mid Kappa";
        let spans = [span("25", 10..15), span("25", 0..5)];
        let (html, _) = render_emotes(raw, &spans);
        assert_eq!(html.matches("<img ").count(), 2);
    }

    #[test]
    fn overlapping_spans_leftmost_wins() {
        let raw = "ABCDEF";
        let spans = [span("x", 0..4), span("y", 2..6)];
        let (html, consumed) = render_emotes(raw, &spans);
        assert_eq!(html.matches("<img ").count(), 1);
        assert!(html.contains("/x/"));
        assert!(!html.contains("/y/"));
        assert!(consumed.contains("ABCD"));
        assert!(html.ends_with("EF"));
    }

    #[test]
    fn span_past_end_is_dropped() {
        let (html, consumed) = render_emotes("hi", &[span("x", 0..10)]);
        assert_eq!(html, "hi");
        assert!(consumed.is_empty());
    }

    #[test]
    fn spans_use_char_indices_not_bytes() {
        // "héllo Kappa" - the accent is two bytes but one char.
        let raw = "héllo Kappa";
        let (html, consumed) = render_emotes(raw, &[span("25", 6..11)]);
        assert!(html.starts_with("héllo "));
        assert!(consumed.contains("Kappa"));
    }

    #[test]
    fn inject_replaces_known_token() {
        let extra: ExtraEmoteMap =
            [("catJAM".to_string(), "https://cdn.betterttv.net/emote/1/1x".to_string())]
                .into_iter()
                .collect();
        let out = inject_extra("hello catJAM world", &extra, &HashSet::new());
        assert!(out.contains("<img src=\"https://cdn.betterttv.net/emote/1/1x\""));
        assert!(out.starts_with("hello "));
        assert!(out.ends_with(" world"));
    }

    #[test]
    fn inject_skips_consumed_tokens() {
        let extra: ExtraEmoteMap =
            [("Kappa".to_string(), "https://example.com/k".to_string())]
                .into_iter()
                .collect();
        let consumed: HashSet<String> = ["Kappa".to_string()].into_iter().collect();
        let out = inject_extra("Kappa", &extra, &consumed);
        assert_eq!(out, "Kappa");
    }

    #[test]
    fn inject_never_touches_tag_internals() {
        let extra: ExtraEmoteMap =
            [("inline".to_string(), "https://example.com/i".to_string())]
                .into_iter()
                .collect();
        let markup = "<img src=\"u\" class=\"inline w-5 h-5 align-text-bottom\" /> inline";
        let out = inject_extra(markup, &extra, &HashSet::new());
        assert!(out.starts_with("<img src=\"u\" class=\"inline"));
        assert!(out.ends_with("<img src=\"https://example.com/i\" class=\"inline w-5 h-5 align-text-bottom\" />"));
    }

    #[test]
    fn full_pipeline_is_deterministic() {
        let raw = "LUL a<b catJAM";
        let spans = [span("425618", 0..3)];
        let extra: ExtraEmoteMap =
            [("catJAM".to_string(), "https://cdn.7tv.app/emote/x/1x".to_string())]
                .into_iter()
                .collect();
        let run = || {
            let (html, consumed) = render_emotes(raw, &spans);
            inject_extra(&html, &extra, &consumed)
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.contains("a&lt;b"));
        assert_eq!(first.matches("<img ").count(), 2);
    }
}
