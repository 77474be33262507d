//! Markdown to block model conversion for document rendering.
//!
//! # Responsibility
//! - Parse GFM-flavoured markdown (tables enabled) into layout blocks.
//! - Keep inline styling (strong, emphasis, strikethrough, code, links) as
//!   styled spans.
//!
//! # Invariants
//! - Source text is consumed read-only; nothing is re-escaped.
//! - Raw HTML is kept as literal text, never interpreted.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::mem;

/// Inline style flags for one span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub strike: bool,
    pub code: bool,
    /// Link target when the span is part of a link label.
    pub link: Option<String>,
}

/// Styled inline text. `\n` inside `text` is a hard line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

pub type Cell = Vec<Span>;

/// Block-level layout unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph(Vec<Span>),
    /// `marker` is empty for continuation paragraphs of the same item.
    ListItem {
        depth: usize,
        marker: String,
        spans: Vec<Span>,
    },
    Quote(Vec<Span>),
    Code {
        language: Option<String>,
        lines: Vec<String>,
    },
    Table { header: Vec<Cell>, rows: Vec<Vec<Cell>> },
    Rule,
}

#[derive(Default)]
struct TableBuilder {
    header: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
    current_row: Vec<Cell>,
}

struct ListFrame {
    next_number: Option<u64>,
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    inline: Vec<Span>,
    bold: usize,
    italic: usize,
    strike: usize,
    link: Option<String>,
    heading: Option<u8>,
    code: Option<(Option<String>, String)>,
    table: Option<TableBuilder>,
    lists: Vec<ListFrame>,
    item_marker: Option<String>,
    quote_ends: Vec<TagEnd>,
}

/// Parses markdown into layout blocks.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut collector = BlockCollector::default();
    for event in Parser::new_ext(markdown, options) {
        collector.handle(event);
    }
    collector.finish()
}

impl BlockCollector {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(end) => self.end(end),
            Event::Text(text) => {
                if let Some((_, buffer)) = self.code.as_mut() {
                    buffer.push_str(&text);
                } else {
                    self.push_text(&text, false);
                }
            }
            Event::Code(text) => self.push_text(&text, true),
            Event::Html(text) | Event::InlineHtml(text) => self.push_text(&text, false),
            Event::SoftBreak => self.push_text(" ", false),
            Event::HardBreak => self.push_text("\n", false),
            Event::Rule => {
                self.flush_inline();
                self.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " }, false)
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let end = tag.to_end();
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_inline();
                self.heading = Some(level as u8);
            }
            Tag::CodeBlock(kind) => {
                self.flush_inline();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::Table(_) => {
                self.flush_inline();
                self.table = Some(TableBuilder::default());
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.current_row = Vec::new();
                }
            }
            Tag::List(start) => {
                self.flush_inline();
                self.lists.push(ListFrame { next_number: start });
            }
            Tag::Item => {
                self.flush_inline();
                let marker = match self.lists.last_mut() {
                    Some(ListFrame {
                        next_number: Some(number),
                    }) => {
                        let marker = format!("{number}.");
                        *number += 1;
                        marker
                    }
                    _ => "\u{2022}".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::BlockQuote(_) => {
                self.flush_inline();
                self.quote_ends.push(end);
            }
            Tag::Emphasis | Tag::Image { .. } => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, end: TagEnd) {
        match end {
            TagEnd::Paragraph | TagEnd::Item => self.flush_inline(),
            TagEnd::Heading(_) => {
                let spans = mem::take(&mut self.inline);
                let level = self.heading.take().unwrap_or(1);
                self.blocks.push(Block::Heading { level, spans });
            }
            TagEnd::CodeBlock => {
                if let Some((language, buffer)) = self.code.take() {
                    let lines = buffer
                        .trim_end_matches('\n')
                        .lines()
                        .map(|line| line.replace('\t', "    "))
                        .collect();
                    self.blocks.push(Block::Code { language, lines });
                }
            }
            TagEnd::TableCell => {
                let cell = mem::take(&mut self.inline);
                if let Some(table) = self.table.as_mut() {
                    table.current_row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = mem::take(&mut table.current_row);
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = mem::take(&mut table.current_row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(Block::Table {
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            TagEnd::List(_) => {
                self.flush_inline();
                self.lists.pop();
            }
            TagEnd::Emphasis | TagEnd::Image => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => self.link = None,
            other => {
                if self.quote_ends.last() == Some(&other) {
                    self.flush_inline();
                    self.quote_ends.pop();
                }
            }
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        let style = SpanStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strike: self.strike > 0,
            code,
            link: self.link.clone(),
        };
        if let Some(last) = self.inline.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.inline.push(Span {
            text: text.to_string(),
            style,
        });
    }

    fn flush_inline(&mut self) {
        if self.table.is_some() || self.heading.is_some() {
            return;
        }
        let has_text = self.inline.iter().any(|span| !span.text.trim().is_empty());
        let spans = mem::take(&mut self.inline);
        if !has_text {
            return;
        }
        let block = if !self.lists.is_empty() {
            Block::ListItem {
                depth: self.lists.len() - 1,
                marker: self.item_marker.take().unwrap_or_default(),
                spans,
            }
        } else if !self.quote_ends.is_empty() {
            Block::Quote(spans)
        } else {
            Block::Paragraph(spans)
        };
        self.blocks.push(block);
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_inline();
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_blocks, Block, Span, SpanStyle};

    fn plain(text: &str) -> Span {
        Span {
            text: text.to_string(),
            style: SpanStyle::default(),
        }
    }

    #[test]
    fn parses_gfm_table_with_header_and_rows() {
        let blocks = parse_blocks("| Item | Qty |\n|------|-----|\n| Milk | 2 |\n| Eggs | 12 |\n");
        assert_eq!(
            blocks,
            vec![Block::Table {
                header: vec![vec![plain("Item")], vec![plain("Qty")]],
                rows: vec![
                    vec![vec![plain("Milk")], vec![plain("2")]],
                    vec![vec![plain("Eggs")], vec![plain("12")]],
                ],
            }]
        );
    }

    #[test]
    fn link_spans_carry_target() {
        let blocks = parse_blocks("see [docs](https://example.com/a_b) now");
        let Block::Paragraph(spans) = &blocks[0] else {
            panic!("expected paragraph, got {blocks:?}");
        };
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].text, "docs");
        assert_eq!(spans[1].style.link.as_deref(), Some("https://example.com/a_b"));
        assert_eq!(spans[2].style.link, None);
    }

    #[test]
    fn ordered_list_markers_count_from_start() {
        let blocks = parse_blocks("3. first\n4. second\n");
        let markers: Vec<_> = blocks
            .iter()
            .filter_map(|block| match block {
                Block::ListItem { marker, .. } => Some(marker.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec!["3.".to_string(), "4.".to_string()]);
    }

    #[test]
    fn fenced_code_keeps_lines_and_language() {
        let blocks = parse_blocks("```rust\nfn main() {\n\tprintln!(\"|a|\");\n}\n```\n");
        assert_eq!(
            blocks,
            vec![Block::Code {
                language: Some("rust".to_string()),
                lines: vec![
                    "fn main() {".to_string(),
                    "    println!(\"|a|\");".to_string(),
                    "}".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn heading_and_quote_are_separate_blocks() {
        let blocks = parse_blocks("# Title\n\n> quoted *words*\n\nafter");
        assert!(matches!(blocks[0], Block::Heading { level: 1, .. }));
        assert!(matches!(blocks[1], Block::Quote(_)));
        assert_eq!(blocks[2], Block::Paragraph(vec![plain("after")]));
    }

    #[test]
    fn strikethrough_is_kept_as_span_style() {
        let blocks = parse_blocks("keep ~~drop this~~ keep");
        let Block::Paragraph(spans) = &blocks[0] else {
            panic!("expected paragraph, got {blocks:?}");
        };
        let struck: Vec<_> = spans.iter().filter(|span| span.style.strike).collect();
        assert_eq!(struck.len(), 1);
        assert_eq!(struck[0].text, "drop this");
    }
}
