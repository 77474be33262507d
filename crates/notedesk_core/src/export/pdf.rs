//! Built-in PDF rendering backend.
//!
//! # Responsibility
//! - Lay out markdown blocks on A4 pages with automatic pagination.
//! - Hand the laid-out pages to `lopdf` as content streams using the
//!   standard Type1 fonts (no font files are embedded).
//!
//! # Invariants
//! - Output always contains at least one page.
//! - No text baseline is placed below the bottom margin; table rows taller
//!   than the space left continue on the next page.
//! - Tables get full cell borders and a shaded header row; the header row is
//!   repeated when a table continues on a new page.
//! - Link labels are underlined and carry a URI link annotation.
//! - Text is WinAnsi encoded; unmappable characters become `?`.

use super::markdown::{parse_blocks, Block, Cell, Span, SpanStyle};
use super::{DocumentRenderer, RenderError, RenderOptions, Theme};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 56.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const BODY_SIZE: f32 = 11.0;
const CODE_SIZE: f32 = 9.5;
const LINE_GAP: f32 = 1.35;
const CELL_PADDING: f32 = 4.0;
const LIST_INDENT: f32 = 16.0;
const QUOTE_INDENT: f32 = 14.0;
const MAX_PAGES: usize = 2000;

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em (AFM).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em (AFM).
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // 'a'..'m'
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'n'..'z'
    389, 280, 389, 584, // '{'..'~'
];

/// Renders markdown bodies to PDF bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
    fn render(&self, title: &str, body: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        let palette = Palette::for_theme(options.theme);
        let blocks = parse_blocks(body);
        let mut layout = Layout::new(&palette);
        for block in &blocks {
            layout.block(block);
        }
        let pages = layout.finish();
        if pages.len() > MAX_PAGES {
            return Err(RenderError::Backend(format!(
                "document needs {} pages; limit is {MAX_PAGES}",
                pages.len()
            )));
        }
        write_pdf(title, pages)
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

const ALL_FONTS: [Font; 5] = [
    Font::Regular,
    Font::Bold,
    Font::Italic,
    Font::BoldItalic,
    Font::Mono,
];

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
            Self::Italic => "F3",
            Self::BoldItalic => "F4",
            Self::Mono => "F5",
        }
    }

    fn base_name(self) -> &'static str {
        match self {
            Self::Regular => "Helvetica",
            Self::Bold => "Helvetica-Bold",
            Self::Italic => "Helvetica-Oblique",
            Self::BoldItalic => "Helvetica-BoldOblique",
            Self::Mono => "Courier",
        }
    }

    fn for_span(style: &SpanStyle, base_bold: bool, base_italic: bool) -> Self {
        if style.code {
            return Self::Mono;
        }
        match (style.bold || base_bold, style.italic || base_italic) {
            (true, true) => Self::BoldItalic,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (false, false) => Self::Regular,
        }
    }

    // Oblique faces share the upright metrics.
    fn char_width(self, ch: char) -> f32 {
        let table = match self {
            Self::Mono => return 600.0,
            Self::Bold | Self::BoldItalic => &HELVETICA_BOLD_WIDTHS,
            Self::Regular | Self::Italic => &HELVETICA_WIDTHS,
        };
        match ch {
            ' '..='~' => f32::from(table[ch as usize - 32]),
            _ => 556.0,
        }
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().map(|ch| font.char_width(ch)).sum::<f32>() * size / 1000.0
}

#[derive(Debug, Clone, Copy)]
struct Rgb(f32, f32, f32);

impl Rgb {
    fn operands(self) -> Vec<Object> {
        vec![Object::Real(self.0), Object::Real(self.1), Object::Real(self.2)]
    }
}

struct Palette {
    background: Option<Rgb>,
    text: Rgb,
    muted: Rgb,
    link: Rgb,
    border: Rgb,
    header_fill: Rgb,
    code_fill: Rgb,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                background: None,
                text: Rgb(0.10, 0.10, 0.12),
                muted: Rgb(0.38, 0.38, 0.42),
                link: Rgb(0.05, 0.30, 0.75),
                border: Rgb(0.45, 0.45, 0.48),
                header_fill: Rgb(0.87, 0.88, 0.90),
                code_fill: Rgb(0.95, 0.95, 0.96),
            },
            Theme::Dark => Self {
                background: Some(Rgb(0.11, 0.12, 0.14)),
                text: Rgb(0.91, 0.92, 0.94),
                muted: Rgb(0.66, 0.68, 0.72),
                link: Rgb(0.45, 0.70, 1.00),
                border: Rgb(0.55, 0.57, 0.60),
                header_fill: Rgb(0.24, 0.26, 0.30),
                code_fill: Rgb(0.17, 0.18, 0.21),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Run {
    text: String,
    font: Font,
    link: Option<String>,
    strike: bool,
}

type Line = Vec<Run>;

struct LineBreaker {
    size: f32,
    max_width: f32,
    lines: Vec<Line>,
    current: Line,
    width: f32,
    pending_space: bool,
}

impl LineBreaker {
    fn new(size: f32, max_width: f32) -> Self {
        Self {
            size,
            max_width,
            lines: Vec::new(),
            current: Vec::new(),
            width: 0.0,
            pending_space: false,
        }
    }

    fn push_word(&mut self, word: &str, font: Font, style: &SpanStyle) {
        let mut space_width = if self.pending_space && !self.current.is_empty() {
            text_width(" ", font, self.size)
        } else {
            0.0
        };
        self.pending_space = false;
        let word_width = text_width(word, font, self.size);

        if !self.current.is_empty() && self.width + space_width + word_width > self.max_width {
            self.break_line();
            space_width = 0.0;
        }
        if space_width > 0.0 {
            if let Some(last) = self.current.last_mut() {
                last.text.push(' ');
            }
            self.width += space_width;
        }

        if word_width <= self.max_width {
            self.append(word, font, style);
            self.width += word_width;
            return;
        }
        for ch in word.chars() {
            let char_width = font.char_width(ch) * self.size / 1000.0;
            if !self.current.is_empty() && self.width + char_width > self.max_width {
                self.break_line();
            }
            let mut buffer = [0_u8; 4];
            self.append(ch.encode_utf8(&mut buffer), font, style);
            self.width += char_width;
        }
    }

    fn append(&mut self, text: &str, font: Font, style: &SpanStyle) {
        if let Some(last) = self.current.last_mut() {
            if last.font == font && last.link == style.link && last.strike == style.strike {
                last.text.push_str(text);
                return;
            }
        }
        self.current.push(Run {
            text: text.to_string(),
            font,
            link: style.link.clone(),
            strike: style.strike,
        });
    }

    fn break_line(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
        self.width = 0.0;
        self.pending_space = false;
    }

    fn finish(mut self) -> Vec<Line> {
        if !self.current.is_empty() {
            self.lines.push(self.current);
        }
        self.lines
    }
}

/// Greedy word wrap of styled spans. `\n` forces a break.
fn wrap_spans(spans: &[Span], bold: bool, italic: bool, size: f32, max_width: f32) -> Vec<Line> {
    let mut breaker = LineBreaker::new(size, max_width);
    for span in spans {
        let font = Font::for_span(&span.style, bold, italic);
        for (index, segment) in span.text.split('\n').enumerate() {
            if index > 0 {
                breaker.break_line();
            }
            if segment.starts_with(char::is_whitespace) {
                breaker.pending_space = true;
            }
            for (word_index, word) in segment.split_whitespace().enumerate() {
                if word_index > 0 {
                    breaker.pending_space = true;
                }
                breaker.push_word(word, font, &span.style);
            }
            if segment.ends_with(char::is_whitespace) {
                breaker.pending_space = true;
            }
        }
    }
    breaker.finish()
}

/// Hard-wraps one preformatted line by character count.
fn wrap_code_line(line: &str, max_width: f32) -> Vec<String> {
    let per_line = ((max_width * 1000.0) / (600.0 * CODE_SIZE)).floor().max(1.0) as usize;
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(per_line)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

struct LinkAnnotation {
    rect: [f32; 4],
    uri: String,
}

#[derive(Default)]
struct Page {
    operations: Vec<Operation>,
    links: Vec<LinkAnnotation>,
}

struct Layout<'p> {
    palette: &'p Palette,
    pages: Vec<Page>,
    current: Page,
    y: f32,
}

impl<'p> Layout<'p> {
    fn new(palette: &'p Palette) -> Self {
        let mut layout = Self {
            palette,
            pages: Vec::new(),
            current: Page::default(),
            y: PAGE_HEIGHT - MARGIN,
        };
        layout.paint_background();
        layout
    }

    fn paint_background(&mut self) {
        if let Some(color) = self.palette.background {
            self.fill_rect(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT, color);
        }
    }

    fn new_page(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);
        self.y = PAGE_HEIGHT - MARGIN;
        self.paint_background();
    }

    fn page_is_empty(&self) -> bool {
        self.y >= PAGE_HEIGHT - MARGIN
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN && !self.page_is_empty() {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        if !self.page_is_empty() {
            self.y -= height;
        }
    }

    fn finish(mut self) -> Vec<Page> {
        let last = std::mem::take(&mut self.current);
        self.pages.push(last);
        self.pages
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, spans } => {
                let size = match level {
                    1 => 20.0,
                    2 => 16.0,
                    3 => 14.0,
                    _ => 12.0,
                };
                self.gap(size * 0.6);
                let lines = wrap_spans(spans, true, false, size, CONTENT_WIDTH);
                self.lines(&lines, MARGIN, size, self.palette.text);
                self.y -= 4.0;
            }
            Block::Paragraph(spans) => {
                let lines = wrap_spans(spans, false, false, BODY_SIZE, CONTENT_WIDTH);
                self.lines(&lines, MARGIN, BODY_SIZE, self.palette.text);
                self.y -= 6.0;
            }
            Block::ListItem {
                depth,
                marker,
                spans,
            } => {
                let indent = MARGIN + LIST_INDENT * *depth as f32;
                let text_x = indent + LIST_INDENT;
                let lines = wrap_spans(spans, false, false, BODY_SIZE, PAGE_WIDTH - MARGIN - text_x);
                self.ensure(BODY_SIZE * LINE_GAP);
                if !marker.is_empty() {
                    let baseline = self.y - BODY_SIZE;
                    self.text(indent, baseline, Font::Regular, BODY_SIZE, self.palette.text, marker);
                }
                self.lines(&lines, text_x, BODY_SIZE, self.palette.text);
                self.y -= 2.0;
            }
            Block::Quote(spans) => {
                let x = MARGIN + QUOTE_INDENT;
                let lines = wrap_spans(spans, false, true, BODY_SIZE, CONTENT_WIDTH - QUOTE_INDENT);
                let line_height = BODY_SIZE * LINE_GAP;
                for line in &lines {
                    self.ensure(line_height);
                    let top = self.y;
                    self.stroke_line(MARGIN + 3.0, top, MARGIN + 3.0, top - line_height, 2.0, self.palette.border);
                    let baseline = self.y - BODY_SIZE;
                    self.draw_line(line, x, baseline, BODY_SIZE, self.palette.muted);
                    self.y -= line_height;
                }
                self.y -= 6.0;
            }
            Block::Code { lines, .. } => {
                let line_height = CODE_SIZE * LINE_GAP;
                self.gap(2.0);
                for source_line in lines {
                    for chunk in wrap_code_line(source_line, CONTENT_WIDTH - 8.0) {
                        self.ensure(line_height);
                        self.fill_rect(MARGIN, self.y - line_height, CONTENT_WIDTH, line_height, self.palette.code_fill);
                        let baseline = self.y - CODE_SIZE;
                        self.text(MARGIN + 4.0, baseline, Font::Mono, CODE_SIZE, self.palette.text, &chunk);
                        self.y -= line_height;
                    }
                }
                self.y -= 8.0;
            }
            Block::Table { header, rows } => self.table(header, rows),
            Block::Rule => {
                self.ensure(14.0);
                let y = self.y - 7.0;
                self.stroke_line(MARGIN, y, PAGE_WIDTH - MARGIN, y, 0.8, self.palette.border);
                self.y -= 14.0;
            }
        }
    }

    fn table(&mut self, header: &[Cell], rows: &[Vec<Cell>]) {
        let columns = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        if columns == 0 {
            return;
        }
        let column_width = CONTENT_WIDTH / columns as f32;
        let inner_width = (column_width - 2.0 * CELL_PADDING).max(1.0);
        let wrap_row = |cells: &[Cell], bold: bool| -> Vec<Vec<Line>> {
            (0..columns)
                .map(|index| match cells.get(index) {
                    Some(cell) => wrap_spans(cell, bold, false, BODY_SIZE, inner_width),
                    None => Vec::new(),
                })
                .collect()
        };

        let header_lines = wrap_row(header, true);
        let header_height = row_height(&cell_slices(&header_lines, 0));
        // Headers taller than a third of the page are drawn once only.
        let repeated_header = (header_height <= (PAGE_HEIGHT - 2.0 * MARGIN) / 3.0)
            .then_some(header_lines.as_slice());

        self.gap(4.0);
        self.ensure(header_height + BODY_SIZE * LINE_GAP + 2.0 * CELL_PADDING);
        self.flowing_row(&header_lines, column_width, true, None);
        for row in rows {
            let lines = wrap_row(row, false);
            self.flowing_row(&lines, column_width, false, repeated_header);
        }
        self.y -= 10.0;
    }

    /// Draws one table row, continuing it on following pages when it is
    /// taller than a page. A row that would fit on a fresh page moves there
    /// whole instead of splitting.
    fn flowing_row(
        &mut self,
        cells: &[Vec<Line>],
        column_width: f32,
        shaded: bool,
        header: Option<&[Vec<Line>]>,
    ) {
        let line_height = BODY_SIZE * LINE_GAP;
        let header_height = header.map_or(0.0, |header| row_height(&cell_slices(header, 0)));
        let capacity = PAGE_HEIGHT - 2.0 * MARGIN - header_height;
        let mut offset = 0;
        loop {
            let rest = cell_slices(cells, offset);
            let height = row_height(&rest);
            if self.y - height >= MARGIN {
                self.table_row(&rest, column_width, height, shaded);
                return;
            }

            let fit = ((self.y - MARGIN - 2.0 * CELL_PADDING) / line_height)
                .floor()
                .max(0.0) as usize;
            if fit > 0 && height > capacity {
                let chunk: Vec<&[Line]> = rest
                    .iter()
                    .map(|lines| &lines[..fit.min(lines.len())])
                    .collect();
                let chunk_height = row_height(&chunk);
                self.table_row(&chunk, column_width, chunk_height, shaded);
                offset += fit;
            }

            self.new_page();
            if let Some(header) = header {
                let header_cells = cell_slices(header, 0);
                self.table_row(&header_cells, column_width, header_height, true);
            }
        }
    }

    fn table_row(&mut self, cells: &[&[Line]], column_width: f32, height: f32, shaded: bool) {
        let top = self.y;
        let bottom = top - height;
        if shaded {
            for index in 0..cells.len() {
                let x = MARGIN + column_width * index as f32;
                self.fill_rect(x, bottom, column_width, height, self.palette.header_fill);
            }
        }
        for (index, lines) in cells.iter().enumerate() {
            let x = MARGIN + column_width * index as f32;
            self.stroke_rect(x, bottom, column_width, height, self.palette.border);
            for (line_index, line) in lines.iter().enumerate() {
                let baseline =
                    top - CELL_PADDING - BODY_SIZE - BODY_SIZE * LINE_GAP * line_index as f32;
                self.draw_line(line, x + CELL_PADDING, baseline, BODY_SIZE, self.palette.text);
            }
        }
        self.y = bottom;
    }

    fn lines(&mut self, lines: &[Line], x: f32, size: f32, color: Rgb) {
        let line_height = size * LINE_GAP;
        for line in lines {
            self.ensure(line_height);
            let baseline = self.y - size;
            self.draw_line(line, x, baseline, size, color);
            self.y -= line_height;
        }
    }

    fn draw_line(&mut self, line: &Line, x: f32, baseline: f32, size: f32, color: Rgb) {
        let mut cursor = x;
        for run in line {
            let width = text_width(&run.text, run.font, size);
            let inked = width - text_width(" ", run.font, size) * trailing_spaces(&run.text);
            let run_color = if run.link.is_some() {
                self.palette.link
            } else {
                color
            };
            self.text(cursor, baseline, run.font, size, run_color, &run.text);
            if run.strike {
                let strike_y = baseline + size * 0.3;
                self.stroke_line(cursor, strike_y, cursor + inked, strike_y, 0.6, run_color);
            }
            if let Some(uri) = run.link.as_ref() {
                let underline_y = baseline - size * 0.15;
                self.stroke_line(cursor, underline_y, cursor + inked, underline_y, 0.6, run_color);
                self.current.links.push(LinkAnnotation {
                    rect: [cursor, underline_y - 1.0, cursor + inked, baseline + size * 0.8],
                    uri: uri.clone(),
                });
            }
            cursor += width;
        }
    }

    fn text(&mut self, x: f32, y: f32, font: Font, size: f32, color: Rgb, text: &str) {
        let font_name = Object::Name(font.resource().as_bytes().to_vec());
        self.push_all([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font_name, Object::Real(size)]),
            Operation::new("rg", color.operands()),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.push_all([
            Operation::new("rg", color.operands()),
            Operation::new("re", rect_operands(x, y, width, height)),
            Operation::new("f", vec![]),
        ]);
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.push_all([
            Operation::new("RG", color.operands()),
            Operation::new("w", vec![Object::Real(0.8)]),
            Operation::new("re", rect_operands(x, y, width, height)),
            Operation::new("S", vec![]),
        ]);
    }

    fn stroke_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32, color: Rgb) {
        self.push_all([
            Operation::new("RG", color.operands()),
            Operation::new("w", vec![Object::Real(width)]),
            Operation::new("m", vec![Object::Real(x1), Object::Real(y1)]),
            Operation::new("l", vec![Object::Real(x2), Object::Real(y2)]),
            Operation::new("S", vec![]),
        ]);
    }

    fn push_all<const N: usize>(&mut self, operations: [Operation; N]) {
        self.current.operations.extend(operations);
    }
}

fn cell_slices(cells: &[Vec<Line>], offset: usize) -> Vec<&[Line]> {
    cells
        .iter()
        .map(|lines| lines.get(offset..).unwrap_or(&[]))
        .collect()
}

fn row_height(cells: &[&[Line]]) -> f32 {
    let max_lines = cells.iter().map(|lines| lines.len()).max().unwrap_or(0).max(1);
    max_lines as f32 * BODY_SIZE * LINE_GAP + 2.0 * CELL_PADDING
}

fn rect_operands(x: f32, y: f32, width: f32, height: f32) -> Vec<Object> {
    vec![
        Object::Real(x),
        Object::Real(y),
        Object::Real(width),
        Object::Real(height),
    ]
}

fn trailing_spaces(text: &str) -> f32 {
    (text.len() - text.trim_end_matches(' ').len()) as f32
}

fn win_ansi(ch: char) -> u8 {
    match ch {
        ' '..='~' | '\u{a0}'..='\u{ff}' => ch as u32 as u8,
        '\u{20ac}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2122}' => 0x99,
        '\t' | '\r' | '\n' => b' ',
        _ => b'?',
    }
}

fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi).collect()
}

fn backend_error(stage: &str, err: impl std::fmt::Display) -> RenderError {
    RenderError::Backend(format!("pdf {stage} failed: {err}"))
}

fn write_pdf(title: &str, pages: Vec<Page>) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in ALL_FONTS {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content {
            operations: page.operations,
        };
        let bytes = content
            .encode()
            .map_err(|err| backend_error("content encoding", err))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), bytes));

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect_operands(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT),
            "Resources" => resources_id,
            "Contents" => content_id,
        };
        if !page.links.is_empty() {
            let annotations: Vec<Object> = page
                .links
                .into_iter()
                .map(|link| {
                    let rect = link.rect.iter().map(|value| Object::Real(*value)).collect::<Vec<_>>();
                    let annotation_id = doc.add_object(dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => rect,
                        "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
                        "A" => dictionary! {
                            "Type" => "Action",
                            "S" => "URI",
                            "URI" => Object::String(link.uri.into_bytes(), StringFormat::Literal),
                        },
                    });
                    Object::Reference(annotation_id)
                })
                .collect();
            page_dict.set("Annots", annotations);
        }
        kids.push(Object::Reference(doc.add_object(page_dict)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(win_ansi_bytes(title), StringFormat::Literal),
        "Producer" => Object::string_literal(format!("notedesk {}", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| backend_error("serialization", err))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{
        win_ansi_bytes, wrap_code_line, wrap_spans, Font, PdfRenderer, CODE_SIZE, MARGIN,
        PAGE_HEIGHT, PAGE_WIDTH,
    };
    use crate::export::markdown::{Span, SpanStyle};
    use crate::export::{DocumentRenderer, RenderOptions, Theme};
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object};

    fn render(body: &str, theme: Theme) -> Document {
        let bytes = PdfRenderer
            .render("Doc", body, &RenderOptions { theme })
            .expect("render should succeed");
        assert!(bytes.starts_with(b"%PDF-1.4"));
        Document::load_mem(&bytes).expect("output should parse as pdf")
    }

    fn page_operations(doc: &Document) -> Vec<Vec<Operation>> {
        doc.get_pages()
            .values()
            .map(|page_id| {
                let bytes = doc.get_page_content(*page_id).expect("page content");
                Content::decode(&bytes).expect("content decodes").operations
            })
            .collect()
    }

    fn float(object: &Object) -> f32 {
        object.as_float().expect("numeric operand")
    }

    fn count_sequence(operations: &[Operation], sequence: &[&str]) -> usize {
        operations
            .windows(sequence.len())
            .filter(|window| {
                window
                    .iter()
                    .zip(sequence)
                    .all(|(operation, operator)| operation.operator == *operator)
            })
            .count()
    }

    fn shows_text(operations: &[Operation], text: &str) -> bool {
        operations.iter().any(|operation| {
            operation.operator == "Tj"
                && matches!(operation.operands.first(), Some(Object::String(bytes, _)) if bytes == text.as_bytes())
        })
    }

    #[test]
    fn empty_body_still_produces_one_page() {
        let doc = render("", Theme::Light);
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_content_paginates() {
        let body = (0..200)
            .map(|index| format!("Paragraph number {index} with a little text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        assert!(render(&body, Theme::Light).get_pages().len() > 1);
    }

    #[test]
    fn table_header_is_shaded_and_cells_bordered() {
        let doc = render("| A | B |\n|---|---|\n| 1 | 2 |\n", Theme::Light);
        let pages = page_operations(&doc);
        assert_eq!(count_sequence(&pages[0], &["re", "f"]), 2);
        assert_eq!(count_sequence(&pages[0], &["re", "S"]), 4);
    }

    #[test]
    fn oversized_table_row_continues_on_next_pages() {
        let words = vec!["word"; 900].join(" ");
        let body = format!("| Item | Notes |\n|---|---|\n| first | {words} |\n| last | done |\n");
        let doc = render(&body, Theme::Light);
        let pages = page_operations(&doc);
        assert!(pages.len() >= 2);

        for operations in &pages {
            for operation in operations.iter().filter(|operation| operation.operator == "Td") {
                let baseline = float(&operation.operands[1]);
                assert!(baseline >= MARGIN, "baseline {baseline} below bottom margin");
            }
            assert!(shows_text(operations, "Item"), "header repeated on every page");
        }
        let last = pages.last().expect("at least one page");
        assert!(shows_text(last, "done"));
    }

    #[test]
    fn links_are_underlined_and_annotated() {
        let doc = render("read [the guide](https://example.com/guide)", Theme::Light);
        let uris: Vec<Vec<u8>> = doc
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Link"))
            .filter_map(|dict| match dict.get(b"A").and_then(Object::as_dict) {
                Ok(action) => match action.get(b"URI") {
                    Ok(Object::String(bytes, _)) => Some(bytes.clone()),
                    _ => None,
                },
                Err(_) => None,
            })
            .collect();
        assert_eq!(uris, vec![b"https://example.com/guide".to_vec()]);
        assert_eq!(count_sequence(&page_operations(&doc)[0], &["m", "l", "S"]), 1);
    }

    #[test]
    fn strikethrough_draws_a_line_through_text() {
        let plain = page_operations(&render("gone", Theme::Light));
        let struck = page_operations(&render("~~gone~~", Theme::Light));
        assert_eq!(count_sequence(&plain[0], &["m", "l", "S"]), 0);
        assert_eq!(count_sequence(&struck[0], &["m", "l", "S"]), 1);
    }

    #[test]
    fn dark_theme_paints_page_background() {
        let pages = page_operations(&render("hello", Theme::Dark));
        let background = &pages[0][1];
        assert_eq!(background.operator, "re");
        let operands: Vec<f32> = background.operands.iter().map(float).collect();
        assert_eq!(operands, vec![0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT]);

        let light = page_operations(&render("hello", Theme::Light));
        assert_eq!(count_sequence(&light[0], &["re", "f"]), 0);
    }

    #[test]
    fn win_ansi_maps_latin_and_replaces_the_rest() {
        assert_eq!(win_ansi_bytes("caf\u{e9} \u{2014}"), b"caf\xe9 \x97".to_vec());
        assert_eq!(win_ansi_bytes("\u{4e2d}"), b"?".to_vec());
    }

    #[test]
    fn bold_metrics_differ_from_regular() {
        assert_eq!(Font::Regular.char_width('i'), 222.0);
        assert_eq!(Font::Bold.char_width('i'), 278.0);
        assert_eq!(Font::BoldItalic.char_width('m'), 889.0);
        assert_eq!(Font::Mono.char_width('m'), 600.0);
    }

    #[test]
    fn wrap_breaks_on_width_and_hard_breaks() {
        let spans = vec![Span {
            text: "alpha beta gamma\ndelta".to_string(),
            style: SpanStyle::default(),
        }];
        let lines = wrap_spans(&spans, false, false, 10.0, 60.0);
        let texts: Vec<String> = lines
            .iter()
            .map(|line| line.iter().map(|run| run.text.as_str()).collect())
            .collect();
        assert_eq!(texts, vec!["alpha beta", "gamma", "delta"]);
    }

    #[test]
    fn code_lines_wrap_by_character_budget() {
        let per_line = ((200.0 * 1000.0) / (600.0 * CODE_SIZE)) as usize;
        let source = "x".repeat(per_line * 2 + 3);
        let chunks = wrap_code_line(&source, 200.0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 3);
    }
}
