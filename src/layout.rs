use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::logging::LAYOUT;
use crate::model::TextRecord;

/// Y tolerance used for line detection inside [`group_into_blocks`]. Kept
/// fixed so lines stay fine grained however loose the block merge is.
pub const BLOCK_LINE_Y_TOLERANCE: f64 = 5.0;

/// Records on one page sharing an approximate top edge, ordered by `x0`.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub id: Uuid,
    pub page_num: u32,
    pub records: Vec<TextRecord>,
    /// A bounding box for the entire line (x_min, y_min, x_max, y_max).
    pub bbox: (f64, f64, f64, f64),
}

impl TextLine {
    /// Builds a line, sorting the records left to right. The sort is stable
    /// so records sharing an `x0` keep their incoming order.
    pub fn from_records(page_num: u32, mut records: Vec<TextRecord>) -> Self {
        records.sort_by_key(|r| OrderedFloat(r.x0));
        let bbox = enclosing_bbox(records.iter());

        let line = TextLine {
            id: Uuid::new_v4(),
            page_num,
            records,
            bbox,
        };

        tracing::debug!(
            target: LAYOUT,
            line_id = %line.id,
            page = line.page_num,
            "Created text line with {} records",
            line.records.len()
        );

        line
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Left-most record of the line.
    pub fn first(&self) -> Option<&TextRecord> {
        self.records.first()
    }

    pub fn min_x0(&self) -> f64 {
        self.bbox.0
    }

    /// Record texts joined with single spaces.
    pub fn text(&self) -> String {
        join_text(self.records.iter())
    }

    pub fn into_records(self) -> Vec<TextRecord> {
        self.records
    }
}

/// Consecutive lines judged to belong to one paragraph or region.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub id: Uuid,
    pub page_num: u32,
    pub lines: Vec<TextLine>,
    /// A bounding box for the entire block (x_min, y_min, x_max, y_max).
    pub bbox: (f64, f64, f64, f64),
}

impl TextBlock {
    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        let page_num = lines.first().map_or(0, |l| l.page_num);
        let bbox = enclosing_bbox(lines.iter().flat_map(|l| l.records.iter()));

        let block = TextBlock {
            id: Uuid::new_v4(),
            page_num,
            lines,
            bbox,
        };

        tracing::debug!(
            target: LAYOUT,
            block_id = %block.id,
            page = block.page_num,
            "Created text block with {} lines",
            block.lines.len()
        );

        block
    }

    /// The block's records in line order, each line left to right.
    pub fn records(&self) -> impl Iterator<Item = &TextRecord> {
        self.lines.iter().flat_map(|line| line.records.iter())
    }

    pub fn into_records(self) -> Vec<TextRecord> {
        self.lines
            .into_iter()
            .flat_map(TextLine::into_records)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.iter().map(TextLine::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text(&self) -> String {
        join_text(self.records())
    }
}

/// Group records into lines.
///
/// Pages are emitted in order of first appearance. Within a page records
/// are sorted by `(y0, x0)` and walked once: a record joins the open line
/// when its `y0` is within `y_tolerance` of the `y0` of the line's first
/// record (the anchor, not a running mean), otherwise it opens a new line.
pub fn group_into_lines(records: &[TextRecord], y_tolerance: f64) -> Vec<TextLine> {
    let mut pages: IndexMap<u32, Vec<&TextRecord>> = IndexMap::new();
    for record in records {
        pages.entry(record.page_num).or_default().push(record);
    }

    let lines: Vec<TextLine> = pages
        .into_iter()
        .flat_map(|(page_num, mut page_records)| {
            page_records.sort_by_key(|r| (OrderedFloat(r.y0), OrderedFloat(r.x0)));
            split_lines(page_records, y_tolerance)
                .into_iter()
                .map(move |line| TextLine::from_records(page_num, line))
        })
        .collect();

    tracing::debug!(
        target: LAYOUT,
        records = records.len(),
        lines = lines.len(),
        y_tolerance,
        "Grouped records into lines"
    );

    lines
}

fn split_lines(sorted: Vec<&TextRecord>, y_tolerance: f64) -> Vec<Vec<TextRecord>> {
    sorted
        .into_iter()
        .fold(Vec::<(f64, Vec<TextRecord>)>::new(), |mut lines, record| {
            match lines.last_mut() {
                Some((anchor_y, line)) if (record.y0 - *anchor_y).abs() <= y_tolerance => {
                    line.push(record.clone())
                }
                _ => lines.push((record.y0, vec![record.clone()])),
            }
            lines
        })
        .into_iter()
        .map(|(_, line)| line)
        .collect()
}

/// Group records into blocks of vertically adjacent, left-aligned lines.
///
/// Lines come from [`group_into_lines`] with [`BLOCK_LINE_Y_TOLERANCE`]. A
/// line joins the previous one's block when the gap between the previous
/// line's bottom and this line's top is at most `y_tolerance` and their
/// left edges differ by at most `x_tolerance`. Top and bottom are taken
/// from each line's left-most record. Page numbers are not compared, so a
/// page's last line can continue into the next page's first line; the
/// block keeps the page of its first line.
pub fn group_into_blocks(records: &[TextRecord], x_tolerance: f64, y_tolerance: f64) -> Vec<TextBlock> {
    let lines = group_into_lines(records, BLOCK_LINE_Y_TOLERANCE);

    let blocks: Vec<TextBlock> = lines
        .into_iter()
        .fold(Vec::<Vec<TextLine>>::new(), |mut blocks, line| {
            let joins = blocks
                .last()
                .and_then(|block| block.last())
                .is_some_and(|prev| continues_block(prev, &line, x_tolerance, y_tolerance));
            match blocks.last_mut() {
                Some(block) if joins => block.push(line),
                _ => blocks.push(vec![line]),
            }
            blocks
        })
        .into_iter()
        .map(TextBlock::from_lines)
        .collect();

    tracing::debug!(
        target: LAYOUT,
        records = records.len(),
        blocks = blocks.len(),
        x_tolerance,
        y_tolerance,
        "Grouped records into blocks"
    );

    blocks
}

fn continues_block(prev: &TextLine, line: &TextLine, x_tolerance: f64, y_tolerance: f64) -> bool {
    let (Some(prev_first), Some(first)) = (prev.first(), line.first()) else {
        return false;
    };
    let y_gap = first.y0 - prev_first.y1;
    let x_aligned = (line.min_x0() - prev.min_x0()).abs() <= x_tolerance;
    y_gap <= y_tolerance && x_aligned
}

/// Records bucketed by page, pages ascending, records in input order.
pub fn group_into_pages(records: &[TextRecord]) -> BTreeMap<u32, Vec<&TextRecord>> {
    let mut pages: BTreeMap<u32, Vec<&TextRecord>> = BTreeMap::new();
    for record in records {
        pages.entry(record.page_num).or_default().push(record);
    }
    pages
}

fn join_text<'a>(records: impl Iterator<Item = &'a TextRecord>) -> String {
    records
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn enclosing_bbox<'a>(records: impl Iterator<Item = &'a TextRecord>) -> (f64, f64, f64, f64) {
    records.fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(xmin, ymin, xmax, ymax), r| {
            (
                xmin.min(r.x0),
                ymin.min(r.y0),
                xmax.max(r.x1),
                ymax.max(r.y1),
            )
        },
    )
}
