//! Single-reply PDF rendering.
//!
//! Layout:
//! - A4 pages, Helvetica (`WinAnsi` encoding).
//! - Indigo 16pt title on the first page, then the reply in 12pt black,
//!   word-wrapped to a fixed column count and continued on new pages.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::chat::core::config::ExportConfig;
use crate::export::ExportError;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 40;
const TITLE_SIZE: i64 = 16;
const BODY_SIZE: i64 = 12;
const LINE_HEIGHT: i64 = 15;
/// Space between the title baseline and the first body line.
const TITLE_GAP: i64 = 30;
const INDIGO: [f32; 3] = [79.0 / 255.0, 70.0 / 255.0, 229.0 / 255.0];

/// Render `text` with the default export settings.
///
/// # Errors
/// Returns [`ExportError::Empty`] for blank text, or an error if the document cannot be built.
pub fn export_text(text: &str) -> Result<Vec<u8>, ExportError> {
    export_text_with(&ExportConfig::default(), text)
}

/// Render `text` under `config.title` and return the PDF bytes.
///
/// # Errors
/// Returns [`ExportError::Empty`] for blank text, or an error if the document cannot be built.
pub fn export_text_with(config: &ExportConfig, text: &str) -> Result<Vec<u8>, ExportError> {
    if text.trim().is_empty() {
        return Err(ExportError::Empty);
    }
    let lines = wrap_text(text, config.wrap_columns);
    let pages = paginate(&lines);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (index, page_lines) in pages.iter().enumerate() {
        let title = (index == 0).then_some(config.title.as_str());
        let content = page_content(title, page_lines);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    tracing::debug!(pages = pages.len(), bytes = bytes.len(), "reply exported");
    Ok(bytes)
}

fn lines_per_page(first: bool) -> usize {
    let top = PAGE_HEIGHT - MARGIN - if first { TITLE_GAP } else { 0 };
    usize::try_from((top - MARGIN) / LINE_HEIGHT).unwrap_or(1).max(1)
}

fn paginate(lines: &[String]) -> Vec<&[String]> {
    let mut pages = Vec::new();
    let mut rest = lines;
    let mut first = true;
    loop {
        let take = lines_per_page(first).min(rest.len());
        let (page, tail) = rest.split_at(take);
        pages.push(page);
        rest = tail;
        first = false;
        if rest.is_empty() {
            return pages;
        }
    }
}

fn page_content(title: Option<&str>, lines: &[String]) -> Content {
    let mut operations = Vec::with_capacity(lines.len() * 2 + 10);
    let mut top = PAGE_HEIGHT - MARGIN;

    if let Some(title) = title {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("rg", INDIGO.iter().map(|&c| c.into()).collect()),
            Operation::new("Tf", vec!["F1".into(), TITLE_SIZE.into()]),
            Operation::new("Td", vec![MARGIN.into(), top.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(title))]),
            Operation::new("ET", vec![]),
        ]);
        top -= TITLE_GAP;
    }

    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("Tf", vec!["F1".into(), BODY_SIZE.into()]),
        Operation::new("TL", vec![LINE_HEIGHT.into()]),
        Operation::new("Td", vec![MARGIN.into(), top.into()]),
    ]);
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(line))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    Content { operations }
}

/// Map text to `WinAnsi` bytes; characters outside the encoding become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '•' => 0x95,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            '\t' => b' ',
            c => match u8::try_from(u32::from(c)) {
                Ok(byte) if (0x20..0x7f).contains(&byte) || byte >= 0xa0 => byte,
                _ => b'?',
            },
        })
        .collect()
}

/// Word-wrap `text` to at most `columns` characters per line.
///
/// Line breaks in the input are kept; words longer than a line are split.
#[must_use]
pub fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
            if needed <= columns {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chars.iter());
                current_len += chars.len();
                continue;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
            }
            while chars.len() > columns {
                let tail = chars.split_off(columns);
                lines.push(chars.iter().collect());
                chars = tail;
            }
            current.extend(chars.iter());
            current_len = chars.len();
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_breaks_on_word_boundaries() {
        let lines = wrap_text("Use biodegradable packaging for every order", 20);
        assert_eq!(lines, ["Use biodegradable", "packaging for every", "order"]);
        assert!(lines.iter().all(|line| line.chars().count() <= 20));
    }

    #[test]
    fn test_wrap_keeps_blank_lines_and_splits_long_words() {
        let lines = wrap_text("intro\n\nabcdefghij klm", 4);
        assert_eq!(lines, ["intr", "o", "", "abcd", "efgh", "ij", "klm"]);
    }

    #[test]
    fn test_wrap_flushes_short_line_before_long_word() {
        assert_eq!(wrap_text("ab cdefghij", 4), ["ab", "cdef", "ghij"]);
        assert_eq!(wrap_text("abcdefg hi", 4), ["abcd", "efg", "hi"]);
    }

    #[test]
    fn test_win_ansi_maps_typography_and_replaces_unknown() {
        assert_eq!(win_ansi("café…"), [b'c', b'a', b'f', 0xe9, 0x85]);
        assert_eq!(win_ansi("💡"), [b'?']);
    }

    #[test]
    fn test_export_produces_pdf_with_title() {
        let bytes = export_text("Try reusable containers for shipping.").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let needle = b"(PitchCraft AI Reply)";
        assert!(bytes.windows(needle.len()).any(|window| window == needle));
    }

    #[test]
    fn test_long_replies_continue_on_new_pages() {
        let text = "line\n".repeat(120);
        let bytes = export_text(&text).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_blank_text_is_rejected() {
        assert!(matches!(export_text("  \n"), Err(ExportError::Empty)));
    }
}
