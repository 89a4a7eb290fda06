/// Block and table layout for captured report regions

use crate::rendering::images::ImageStore;
use crate::rendering::Region;
use crate::Result;
use image::{GenericImageView, RgbaImage};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::sync::Arc;

/// Advance of a narrow glyph at text size 1
pub const GLYPH_ADVANCE: u32 = 8;
/// Glyph box height at text size 1
pub const GLYPH_HEIGHT: u32 = 8;
pub const LINE_HEIGHT: u32 = 12;

const PARAGRAPH_MARGIN: u32 = 6;
const HEADING_MARGIN: u32 = 8;
const IMAGE_MARGIN: u32 = 8;
const IMAGE_MAX_HEIGHT: u32 = 300;
const CELL_PADDING: u32 = 8;
const BORDER: u32 = 2;
/// Largest honoured `colspan`, as in browsers
const MAX_COLSPAN: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutKind {
    /// Pre-wrapped text, one entry per line; `size` multiplies glyph metrics
    Text { lines: Vec<String>, size: u32 },
    /// Box outline of the given thickness
    Border { thickness: u32 },
    Image { image: Arc<RgbaImage> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub rect: Rect,
    pub kind: LayoutKind,
}

/// Laid-out region in CSS pixels
#[derive(Debug, Clone)]
pub struct LayoutTree {
    pub width: u32,
    pub height: u32,
    pub nodes: Vec<LayoutNode>,
}

/// Compute the layout of a region.
///
/// The region height is the content height or the region's minimum height,
/// whichever is larger.
pub fn layout_region(region: &Region) -> Result<LayoutTree> {
    let fragment = Html::parse_fragment(region.html());
    let mut flow = Flow {
        images: region.images(),
        nodes: Vec::new(),
    };

    let pad = region.padding();
    let inner_width = region.width().saturating_sub(pad * 2);
    let content = flow.block(fragment.root_element(), pad as i32, pad as i32, inner_width)?;

    Ok(LayoutTree {
        width: region.width(),
        height: (content + pad * 2).max(region.min_height()).max(1),
        nodes: flow.nodes,
    })
}

/// Advance of one character at text size 1
pub fn char_advance(c: char) -> u32 {
    if is_wide(c) {
        GLYPH_ADVANCE * 2
    } else {
        GLYPH_ADVANCE
    }
}

// CJK, Hangul, fullwidth forms
fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6)
}

pub fn text_width(text: &str, size: u32) -> u32 {
    text.chars().map(char_advance).sum::<u32>() * size
}

/// Greedy wrap on whitespace. Words wider than the line are split per char.
pub fn wrap_text(text: &str, max_width: u32, size: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();

    for word in text.split_whitespace() {
        let candidate = if cur.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", cur, word)
        };
        if text_width(&candidate, size) <= max_width {
            cur = candidate;
            continue;
        }
        if !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        for c in word.chars() {
            if !cur.is_empty() && text_width(&cur, size) + char_advance(c) * size > max_width {
                lines.push(std::mem::take(&mut cur));
            }
            cur.push(c);
        }
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

fn is_inline(tag: &str) -> bool {
    matches!(
        tag,
        "span" | "b" | "strong" | "i" | "em" | "u" | "a" | "small" | "label" | "code" | "sub" | "sup"
    )
}

fn is_skipped(tag: &str) -> bool {
    matches!(tag, "head" | "style" | "script" | "title" | "meta" | "link" | "template")
}

struct Flow<'a> {
    images: &'a ImageStore,
    nodes: Vec<LayoutNode>,
}

impl<'a> Flow<'a> {
    /// Lay out the children of `el` stacked vertically. Returns the consumed
    /// height.
    fn block(&mut self, el: ElementRef, x: i32, y: i32, width: u32) -> Result<u32> {
        let mut cursor = 0u32;
        let mut run = String::new();

        for child in el.children() {
            match child.value() {
                Node::Text(t) => {
                    run.push_str(&t.text);
                    run.push(' ');
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else { continue };
                    let tag = child_el.value().name();
                    if is_skipped(tag) {
                        continue;
                    }
                    if is_inline(tag) && !has_block_content(child_el) {
                        run.push_str(&child_el.text().collect::<String>());
                        run.push(' ');
                        continue;
                    }
                    cursor += self.text_run(&run, x, y + cursor as i32, width, 1, 0);
                    run.clear();
                    cursor += self.element(child_el, x, y + cursor as i32, width)?;
                }
                _ => {}
            }
        }
        cursor += self.text_run(&run, x, y + cursor as i32, width, 1, 0);
        Ok(cursor)
    }

    fn element(&mut self, el: ElementRef, x: i32, y: i32, width: u32) -> Result<u32> {
        match el.value().name() {
            "br" => Ok(LINE_HEIGHT),
            "img" => self.image(el, x, y, width),
            "table" => self.table(el, x, y, width),
            "h1" | "h2" | "h3" => {
                let text = el.text().collect::<String>();
                Ok(self.text_run(&text, x, y, width, 2, HEADING_MARGIN))
            }
            "p" => {
                let h = self.block(el, x, y, width)?;
                Ok(if h > 0 { h + PARAGRAPH_MARGIN } else { 0 })
            }
            _ => self.block(el, x, y, width),
        }
    }

    fn text_run(&mut self, text: &str, x: i32, y: i32, width: u32, size: u32, margin: u32) -> u32 {
        let lines = wrap_text(text, width, size);
        if lines.is_empty() {
            return 0;
        }
        let height = lines.len() as u32 * LINE_HEIGHT * size;
        self.nodes.push(LayoutNode {
            rect: Rect { x, y, width, height },
            kind: LayoutKind::Text { lines, size },
        });
        height + margin
    }

    /// Full container width, aspect preserved, capped height with contain fit
    fn image(&mut self, el: ElementRef, x: i32, y: i32, width: u32) -> Result<u32> {
        let Some(src) = el.value().attr("src").filter(|s| !s.trim().is_empty()) else {
            return Ok(0);
        };
        let decoded = self.images.resolve(src.trim())?;
        let (iw, ih) = decoded.dimensions();
        if iw == 0 || ih == 0 || width == 0 {
            return Ok(0);
        }

        let natural_h = (u64::from(width) * u64::from(ih) / u64::from(iw)) as u32;
        let (draw_w, box_h) = if natural_h > IMAGE_MAX_HEIGHT {
            let w = (u64::from(IMAGE_MAX_HEIGHT) * u64::from(iw) / u64::from(ih)) as u32;
            (w.min(width), IMAGE_MAX_HEIGHT)
        } else {
            (width, natural_h)
        };
        let offset_x = (width - draw_w) / 2;

        self.nodes.push(LayoutNode {
            rect: Rect {
                x: x + offset_x as i32,
                y,
                width: draw_w.max(1),
                height: box_h.max(1),
            },
            kind: LayoutKind::Image {
                image: Arc::new(decoded.to_rgba8()),
            },
        });
        Ok(box_h + IMAGE_MARGIN)
    }

    fn table(&mut self, el: ElementRef, x: i32, y: i32, width: u32) -> Result<u32> {
        let rows = table_rows(el);
        let columns = rows
            .iter()
            .map(|cells| cells.iter().fold(0u32, |acc, (_, span)| acc.saturating_add(*span)))
            .max()
            .unwrap_or(0)
            .max(1);

        let inset = BORDER + CELL_PADDING;
        let mut cursor = 0u32;

        for cells in rows {
            let row_y = y + cursor as i32;
            let mut boxes = Vec::with_capacity(cells.len());
            let mut content_h = 0u32;
            let mut col = 0u32;

            for (cell, span) in cells {
                let span = span.min(columns - col.min(columns)).max(1);
                let left = (u64::from(width) * u64::from(col) / u64::from(columns)) as u32;
                let right = (u64::from(width) * u64::from(col.saturating_add(span).min(columns)) / u64::from(columns)) as u32;
                let cell_x = x + left as i32;
                let cell_w = right.saturating_sub(left);

                let inner_w = cell_w.saturating_sub(inset * 2);
                let h = self.block(cell, cell_x + inset as i32, row_y + inset as i32, inner_w)?;
                content_h = content_h.max(h);
                boxes.push((cell_x, cell_w));
                col = col.saturating_add(span);
            }

            let row_h = content_h + inset * 2;
            for (cell_x, cell_w) in boxes {
                self.nodes.push(LayoutNode {
                    rect: Rect {
                        x: cell_x,
                        y: row_y,
                        width: cell_w,
                        height: row_h,
                    },
                    kind: LayoutKind::Border { thickness: BORDER },
                });
            }
            cursor += row_h;
        }

        if cursor > 0 {
            self.nodes.push(LayoutNode {
                rect: Rect {
                    x,
                    y,
                    width,
                    height: cursor,
                },
                kind: LayoutKind::Border { thickness: BORDER },
            });
        }
        Ok(cursor)
    }
}

fn has_block_content(el: ElementRef) -> bool {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| !is_inline(d.value().name()))
}

/// Rows of `(cell, colspan)` in document order, looking through row groups
fn table_rows(table: ElementRef) -> Vec<Vec<(ElementRef, u32)>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(row_cells(child)),
            "thead" | "tbody" | "tfoot" => {
                for tr in child.children().filter_map(ElementRef::wrap) {
                    if tr.value().name() == "tr" {
                        rows.push(row_cells(tr));
                    }
                }
            }
            _ => {}
        }
    }
    rows
}

fn row_cells(tr: ElementRef) -> Vec<(ElementRef, u32)> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .map(|c| {
            let span = c
                .value()
                .attr("colspan")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(1)
                .clamp(1, MAX_COLSPAN);
            (c, span)
        })
        .collect()
}
