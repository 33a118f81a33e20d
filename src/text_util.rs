use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Fixed-width, lexicographically sortable UTC timestamp layout used for
/// every date term written to an index.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Normalize a timestamp to UTC and format it with [`DATE_FORMAT`].
pub fn format_utc<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value.with_timezone(&Utc).format(DATE_FORMAT).to_string()
}

/// Parse a string previously produced by [`format_utc`].
pub fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Strip markup from `text`.
///
/// Tags, comments and the contents of `<script>`/`<style>` elements are
/// removed, a handful of common entities are decoded, and runs of
/// whitespace collapse to a single space. Tags are replaced by a space so
/// that `a<br>b` does not glue words together.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        if let Some(body) = tail.strip_prefix("<!--") {
            rest = match body.find("-->") {
                Some(end) => &body[end + 3..],
                None => "",
            };
            out.push(' ');
            continue;
        }

        let Some(close) = tail.find('>') else {
            // A lone '<' is text, not a tag.
            out.push('<');
            rest = &tail[1..];
            continue;
        };

        let tag = tail[1..close].trim().to_ascii_lowercase();
        rest = &tail[close + 1..];
        out.push(' ');

        for raw in ["script", "style"] {
            if tag == raw || tag.starts_with(&format!("{raw} ")) {
                let end_tag = format!("</{raw}");
                rest = match rest.to_ascii_lowercase().find(&end_tag) {
                    Some(end) => {
                        let after = &rest[end..];
                        after.find('>').map_or("", |gt| &after[gt + 1..])
                    }
                    None => "",
                };
            }
        }
    }
    out.push_str(rest);

    collapse_whitespace(&decode_entities(&out))
}

fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 6] = [
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        // Must stay last so "&amp;lt;" decodes to "&lt;" and not "<".
        ("&amp;", "&"),
    ];

    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
