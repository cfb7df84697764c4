use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use tracing::{debug, trace, warn};

use crate::fonts::{object_as_f64, resolve, sanitize_font_name, FontWidths};
use crate::logging::{PDF_PARSING, PDF_TEXT_OBJECT};
use crate::model::{PageDimensions, TextRecord};

/// US Letter, used when a page has no readable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Fraction of the font size above the baseline treated as the glyph top.
const ASCENT: f64 = 0.8;
/// Fraction of the font size below the baseline treated as the glyph bottom.
const DESCENT: f64 = 0.2;
/// A `TJ` adjustment moving right by more than this many 1/1000 em ends
/// the current word.
const TJ_WORD_BREAK: f64 = 200.0;
const MAX_PARENT_DEPTH: usize = 32;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

pub fn load_pdf<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    Document::load(path).with_context(|| format!("Failed to load PDF {}", path.display()))
}

pub fn load_pdf_mem(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).context("Failed to parse PDF bytes")
}

/// Collapse whitespace runs into single spaces and drop non-printable
/// characters.
pub fn clean_text(text: &str) -> String {
    let printable: String = text
        .chars()
        .filter(|&c| c.is_whitespace() || is_printable(c))
        .collect();
    printable.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Control characters, invisible format characters (soft hyphen,
/// zero-width and bidi marks, BOM) and private-use code points are not
/// printable.
fn is_printable(c: char) -> bool {
    !c.is_control()
        && !matches!(
            c,
            '\u{00AD}'
                | '\u{200B}'..='\u{200F}'
                | '\u{2028}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{FEFF}'
                | '\u{E000}'..='\u{F8FF}'
                | '\u{F0000}'..='\u{10FFFF}'
        )
}

/// Page number -> MediaBox (width, height). MediaBox is looked up through
/// the page tree when the page itself does not carry one.
pub fn get_page_dimensions(doc: &Document) -> PageDimensions {
    doc.get_pages()
        .into_iter()
        .map(|(page_num, page_id)| {
            let media_box = media_box(doc, page_id);
            let size = (
                (media_box[2] - media_box[0]).abs(),
                (media_box[3] - media_box[1]).abs(),
            );
            (page_num, size)
        })
        .collect()
}

/// Word-level records for every page of the document.
///
/// A page whose content stream cannot be decoded is logged and contributes
/// no records; the remaining pages are still extracted.
pub fn get_pdf_text(doc: &Document) -> Vec<TextRecord> {
    let mut records = Vec::new();

    for (page_num, page_id) in doc.get_pages() {
        match get_page_text_records(doc, page_num, page_id) {
            Ok(page_records) => {
                debug!(
                    target: PDF_PARSING,
                    page_num,
                    count = page_records.len(),
                    "Extracted text records"
                );
                records.extend(page_records);
            }
            Err(e) => {
                warn!(
                    target: PDF_PARSING,
                    "Failed to extract text from page {page_num} id={page_id:?}: {e}"
                );
            }
        }
    }

    records
}

/// A JPEG image XObject embedded in a page, still DCT-encoded.
#[derive(Debug, Clone)]
pub struct EmbeddedJpeg {
    pub width: f64,
    pub height: f64,
    pub data: Vec<u8>,
}

/// JPEG images reachable from a page's `/Resources /XObject`. Scanned
/// documents usually carry one full-page image per page.
pub fn page_jpeg_images(doc: &Document, page_num: u32) -> Vec<EmbeddedJpeg> {
    let Some(&page_id) = doc.get_pages().get(&page_num) else {
        return Vec::new();
    };
    let Some(xobjects) = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| {
            let stream = resolve(doc, obj).as_stream().ok()?;
            let dict = &stream.dict;
            if dict.get(b"Subtype").and_then(Object::as_name).ok()? != b"Image" {
                return None;
            }
            let is_jpeg = match dict.get(b"Filter").ok().map(|f| resolve(doc, f)) {
                Some(Object::Name(name)) => name.as_slice() == b"DCTDecode",
                Some(Object::Array(filters)) => {
                    filters.len() == 1 && matches!(&filters[0], Object::Name(name) if name.as_slice() == b"DCTDecode")
                }
                _ => false,
            };
            if !is_jpeg {
                return None;
            }
            Some(EmbeddedJpeg {
                width: object_as_f64(resolve(doc, dict.get(b"Width").ok()?)),
                height: object_as_f64(resolve(doc, dict.get(b"Height").ok()?)),
                data: stream.content.clone(),
            })
        })
        .filter(|img| img.width > 0.0 && img.height > 0.0)
        .collect()
}

#[derive(Clone, Debug)]
struct GraphicsState {
    ctm: [f64; 6],
    text_state: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            text_state: TextState::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct TextState {
    text_matrix: [f64; 6],      // Tm
    text_line_matrix: [f64; 6], // Tlm
    font_key: Option<Vec<u8>>,
    font_size: f64,
    character_spacing: f64,  // Tc
    word_spacing: f64,       // Tw
    horizontal_scaling: f64, // Tz (expressed as fraction, e.g. 1.0=100%)
    leading: f64,            // TL
    rise: f64,               // Ts
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            font_key: None,
            font_size: 0.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl TextState {
    fn begin_text(&mut self) {
        self.text_matrix = IDENTITY;
        self.text_line_matrix = IDENTITY;
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.text_line_matrix = multiply_matrices(&translate_matrix(tx, ty), &self.text_line_matrix);
        self.text_matrix = self.text_line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, tx: f64) {
        self.text_matrix = multiply_matrices(&translate_matrix(tx, 0.0), &self.text_matrix);
    }
}

/// Per-font data resolved once per page.
struct PageFont<'a> {
    base_font: String,
    encoding: Option<Encoding<'a>>,
    widths: FontWidths,
}

/// A single positioned glyph in user space.
#[derive(Clone, Debug)]
struct PositionedGlyph {
    ch: char,
    x_min: f64,
    x_max: f64,
    baseline: f64,
    size: f64,
}

/// Collects glyphs into words and turns finished words into records.
struct WordCollector {
    page_num: u32,
    media_box: [f64; 4],
    glyphs: Vec<PositionedGlyph>,
    font_name: Option<String>,
    records: Vec<TextRecord>,
}

impl WordCollector {
    fn new(page_num: u32, media_box: [f64; 4]) -> Self {
        WordCollector {
            page_num,
            media_box,
            glyphs: Vec::new(),
            font_name: None,
            records: Vec::new(),
        }
    }

    fn push(&mut self, glyph: PositionedGlyph, font_name: &str) {
        if glyph.ch.is_whitespace() {
            self.flush();
            return;
        }
        if self.font_name.as_deref() != Some(font_name) {
            self.flush();
            self.font_name = Some(font_name.to_string());
        }
        self.glyphs.push(glyph);
    }

    fn flush(&mut self) {
        if self.glyphs.is_empty() {
            return;
        }
        let glyphs = std::mem::take(&mut self.glyphs);

        let text = clean_text(&glyphs.iter().map(|g| g.ch).collect::<String>());
        let x_min = glyphs.iter().map(|g| g.x_min).fold(f64::MAX, f64::min);
        let x_max = glyphs.iter().map(|g| g.x_max).fold(f64::MIN, f64::max);
        let size = glyphs.iter().map(|g| g.size).fold(0.0, f64::max);
        let baseline = glyphs[0].baseline;

        let [llx, _, _, ury] = self.media_box;
        let record = TextRecord::new(
            text,
            (
                x_min - llx,
                ury - (baseline + ASCENT * size),
                x_max - llx,
                ury - (baseline - DESCENT * size),
            ),
            self.page_num,
        )
        .with_font(
            Some(size).filter(|s| *s > 0.0),
            self.font_name.clone().filter(|n| !n.is_empty()),
        );

        if record.is_well_formed() {
            trace!(target: PDF_TEXT_OBJECT, %record, "Finished word");
            self.records.push(record);
        } else {
            trace!(target: PDF_TEXT_OBJECT, %record, "Dropped malformed word");
        }
    }

    fn finish(mut self) -> Vec<TextRecord> {
        self.flush();
        self.records
    }
}

fn get_page_text_records(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
) -> Result<Vec<TextRecord>> {
    let content = doc
        .get_and_decode_page_content(page_id)
        .with_context(|| format!("Failed to decode content for page {page_number}"))?;
    let media_box = media_box(doc, page_id);

    let fonts = doc
        .get_page_fonts(page_id)
        .with_context(|| format!("Failed to get fonts for page {page_number}"))?;
    let page_fonts = load_page_fonts(doc, &fonts);

    let mut gs_stack = vec![GraphicsState::default()];
    let mut collector = WordCollector::new(page_number, media_box);

    for op in &content.operations {
        handle_operator(&mut gs_stack, op, &page_fonts, &mut collector);
    }

    Ok(collector.finish())
}

fn load_page_fonts<'a>(
    doc: &'a Document,
    fonts: &BTreeMap<Vec<u8>, &'a Dictionary>,
) -> BTreeMap<Vec<u8>, PageFont<'a>> {
    fonts
        .iter()
        .map(|(key, &dict)| {
            let base_font = dict
                .get(b"BaseFont")
                .and_then(Object::as_name)
                .map(|name| sanitize_font_name(&String::from_utf8_lossy(name)))
                .unwrap_or_default();
            let encoding = match dict.get_font_encoding(doc) {
                Ok(encoding) => Some(encoding),
                Err(e) => {
                    warn!(target: PDF_PARSING, font = %base_font, "Unsupported font encoding: {e}");
                    None
                }
            };
            let widths = FontWidths::from_font_dict(doc, dict, &base_font);
            (
                key.clone(),
                PageFont {
                    base_font,
                    encoding,
                    widths,
                },
            )
        })
        .collect()
}

fn handle_operator(
    gs_stack: &mut Vec<GraphicsState>,
    op: &Operation,
    fonts: &BTreeMap<Vec<u8>, PageFont<'_>>,
    collector: &mut WordCollector,
) {
    trace!(target: PDF_TEXT_OBJECT, operator = %op.operator, operands = op.operands.len());

    match op.operator.as_ref() {
        "q" => push_graphics_state(gs_stack),
        "Q" => pop_graphics_state(gs_stack),
        _ => {}
    }

    let Some(current_gs) = gs_stack.last_mut() else {
        return;
    };
    let ts = &mut current_gs.text_state;

    match op.operator.as_ref() {
        "cm" => {
            let matrix = matrix_from_operands(op);
            current_gs.ctm = multiply_matrices(&matrix, &current_gs.ctm);
        }
        "BT" => ts.begin_text(),
        "ET" => collector.flush(),
        "Tf" => {
            if let (Some(Object::Name(font_key)), Some(size)) = (op.operands.first(), op.operands.get(1)) {
                ts.font_key = Some(font_key.clone());
                ts.font_size = operand_as_float(size);
            }
        }
        "Tc" => {
            if let Some(spacing) = op.operands.first() {
                ts.character_spacing = operand_as_float(spacing)
            }
        }
        "Tw" => {
            if let Some(spacing) = op.operands.first() {
                ts.word_spacing = operand_as_float(spacing)
            }
        }
        "Tz" => {
            if let Some(scale_percent) = op.operands.first() {
                ts.horizontal_scaling = operand_as_float(scale_percent) / 100.0
            }
        }
        "TL" => {
            if let Some(leading) = op.operands.first() {
                ts.leading = operand_as_float(leading)
            }
        }
        "Ts" => {
            if let Some(rise) = op.operands.first() {
                ts.rise = operand_as_float(rise)
            }
        }
        "Tm" => {
            let m = matrix_from_operands(op);
            ts.text_matrix = m;
            ts.text_line_matrix = m;
        }
        "Td" => {
            if let (Some(tx), Some(ty)) = (op.operands.first(), op.operands.get(1)) {
                ts.move_line(operand_as_float(tx), operand_as_float(ty));
            }
        }
        "TD" => {
            // Move text pos and set leading
            if let (Some(tx), Some(ty)) = (op.operands.first(), op.operands.get(1)) {
                let ty = operand_as_float(ty);
                ts.leading = -ty;
                ts.move_line(operand_as_float(tx), ty);
            }
        }
        "T*" => ts.next_line(),
        "Tj" | "TJ" => {
            show_text(current_gs, &op.operands, fonts, collector);
            collector.flush();
        }
        "'" => {
            current_gs.text_state.next_line();
            show_text(current_gs, &op.operands, fonts, collector);
            collector.flush();
        }
        "\"" => {
            if let (Some(aw), Some(ac)) = (op.operands.first(), op.operands.get(1)) {
                current_gs.text_state.word_spacing = operand_as_float(aw);
                current_gs.text_state.character_spacing = operand_as_float(ac);
            }
            current_gs.text_state.next_line();
            show_text(current_gs, op.operands.get(2..).unwrap_or_default(), fonts, collector);
            collector.flush();
        }
        _ => {}
    }
}

fn show_text(
    gs: &mut GraphicsState,
    operands: &[Object],
    fonts: &BTreeMap<Vec<u8>, PageFont<'_>>,
    collector: &mut WordCollector,
) {
    let Some(font) = gs.text_state.font_key.as_ref().and_then(|key| fonts.get(key)) else {
        trace!(target: PDF_TEXT_OBJECT, "Text shown without a selected font");
        return;
    };
    let Some(encoding) = font.encoding.as_ref() else {
        return;
    };

    for operand in operands {
        match operand {
            Object::String(bytes, _) => show_string(gs, bytes, font, encoding, collector),
            Object::Integer(_) | Object::Real(_) => {
                let adjustment = object_as_f64(operand);
                if -adjustment > TJ_WORD_BREAK {
                    collector.flush();
                }
                let ts = &mut gs.text_state;
                let tx = -adjustment / 1000.0 * ts.font_size * ts.horizontal_scaling;
                ts.advance(tx);
            }
            Object::Array(items) => show_text(gs, items, fonts, collector),
            _ => {}
        }
    }
}

fn show_string(
    gs: &mut GraphicsState,
    bytes: &[u8],
    font: &PageFont<'_>,
    encoding: &Encoding<'_>,
    collector: &mut WordCollector,
) {
    let decoded = match Document::decode_text(encoding, bytes) {
        Ok(text) => text,
        Err(e) => {
            trace!(target: PDF_TEXT_OBJECT, "Failed to decode string: {e}");
            return;
        }
    };

    // Byte codes only line up with characters for single-byte encodings.
    let codes: Option<Vec<u32>> = (decoded.chars().count() == bytes.len())
        .then(|| bytes.iter().map(|b| u32::from(*b)).collect());

    for (i, ch) in decoded.chars().enumerate() {
        let ts = &gs.text_state;
        let width = match &codes {
            Some(codes) => font.widths.glyph_width(codes[i]),
            None => font.widths.missing_width,
        };
        let mut tx = width / 1000.0 * ts.font_size + ts.character_spacing;
        if ch == ' ' {
            tx += ts.word_spacing;
        }
        tx *= ts.horizontal_scaling;

        let trm = multiply_matrices(&ts.text_matrix, &gs.ctm);
        let (start_x, baseline) = transform_point(&trm, 0.0, ts.rise);
        let (end_x, _) = transform_point(&trm, tx, ts.rise);
        let size = ts.font_size * trm[2].hypot(trm[3]);

        collector.push(
            PositionedGlyph {
                ch,
                x_min: start_x.min(end_x),
                x_max: start_x.max(end_x),
                baseline,
                size,
            },
            &font.base_font,
        );

        gs.text_state.advance(tx);
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .filter(|arr| arr.len() >= 4)
        .map(|arr| {
            let mut media_box = [0.0; 4];
            for (slot, obj) in media_box.iter_mut().zip(arr.iter()) {
                *slot = object_as_f64(resolve(doc, obj));
            }
            media_box
        })
        .filter(|mb| mb[2] != mb[0] && mb[3] != mb[1])
        .unwrap_or([0.0, 0.0, DEFAULT_PAGE_SIZE.0, DEFAULT_PAGE_SIZE.1])
}

/// Walk from a page up through `/Parent` links until `key` is found.
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(obj) = dict.get(key) {
            return Some(obj);
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn push_graphics_state(gs_stack: &mut Vec<GraphicsState>) {
    if let Some(current) = gs_stack.last() {
        gs_stack.push(current.clone());
    }
}

fn pop_graphics_state(gs_stack: &mut Vec<GraphicsState>) {
    if gs_stack.len() > 1 {
        gs_stack.pop();
    }
}

fn matrix_from_operands(op: &Operation) -> [f64; 6] {
    op.operands
        .iter()
        .map(operand_as_float)
        .collect::<Vec<f64>>()
        .try_into()
        .unwrap_or(IDENTITY)
}

fn operand_as_float(obj: &Object) -> f64 {
    object_as_f64(obj)
}

fn transform_point(m: &[f64; 6], x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// `a` applied first, then `b` (PDF row-vector convention).
pub fn multiply_matrices(a: &[f64; 6], b: &[f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

pub fn translate_matrix(x: f64, y: f64) -> [f64; 6] {
    [1.0, 0.0, 0.0, 1.0, x, y]
}
