//! Pagination planner – keeps short blocks from being cut by a page break.
//!
//! The planner walks the top-level blocks of a render surface once, in
//! order, with a running cursor. A block that straddles a page boundary but
//! would fit on a single page gets a pushdown margin that moves its top to
//! the start of the next page. Blocks at least a page tall are left alone;
//! there is no policy for splitting them.
//!
//! Boundary test: a block starting on page `p` crosses only if its end lies
//! strictly past `(p + 1) * page_height`. A block ending exactly on a
//! boundary stays where it is.

use serde::{Deserialize, Serialize};

/// Default page height threshold in logical px (A4 at 96 dpi is ~1123px).
pub const DEFAULT_PAGE_HEIGHT_PX: f32 = 1050.0;

/// One measured top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub height_px: f32,
    /// Cumulative position before adjustment.
    pub offset_top_px: f32,
    /// Pushdown set by the planner, initially 0.
    pub extra_top_margin_px: f32,
}

impl RenderedBlock {
    /// Build blocks from heights, stacking them from 0.
    pub fn stack(heights: &[f32]) -> Vec<RenderedBlock> {
        let mut offset = 0.0;
        heights
            .iter()
            .map(|&height_px| {
                let block = RenderedBlock {
                    height_px,
                    offset_top_px: offset,
                    extra_top_margin_px: 0.0,
                };
                offset += height_px;
                block
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationPlanner {
    page_height_px: f32,
}

impl Default for PaginationPlanner {
    fn default() -> Self {
        Self {
            page_height_px: DEFAULT_PAGE_HEIGHT_PX,
        }
    }
}

impl PaginationPlanner {
    /// # Panics
    /// If `page_height_px` is not a positive finite number.
    pub fn new(page_height_px: f32) -> Self {
        assert!(
            page_height_px.is_finite() && page_height_px > 0.0,
            "page height must be positive, got {page_height_px}"
        );
        Self { page_height_px }
    }

    pub fn page_height_px(&self) -> f32 {
        self.page_height_px
    }

    /// Compute the pushdown margin for each block of a fresh layout.
    pub fn plan(&self, heights: &[f32]) -> Vec<f32> {
        let mut blocks = RenderedBlock::stack(heights);
        self.plan_in_place(&mut blocks);
        blocks.iter().map(|b| b.extra_top_margin_px).collect()
    }

    /// Adjust `extra_top_margin_px` in place.
    ///
    /// Margins already present are counted into the cursor, so running the
    /// planner on an adjusted layout changes nothing. Returns the number of
    /// blocks that were pushed in this pass.
    pub fn plan_in_place(&self, blocks: &mut [RenderedBlock]) -> usize {
        let page = self.page_height_px;
        let mut current_height = 0.0f32;
        let mut pushed = 0;

        for (index, block) in blocks.iter_mut().enumerate() {
            let height = block.height_px;
            if height <= 0.0 {
                continue;
            }
            current_height += block.extra_top_margin_px;

            let start_y = current_height;
            let end_y = start_y + height;
            let start_page = (start_y / page).floor();
            let next_boundary = (start_page + 1.0) * page;

            if end_y > next_boundary && height < page {
                let push_down = next_boundary - start_y;
                block.extra_top_margin_px += push_down;
                current_height += push_down;
                pushed += 1;
                log::debug!(
                    "block {index} ({height}px at {start_y}px) pushed down {push_down}px to page {}",
                    start_page as usize + 1
                );
            }

            current_height += height;
        }
        pushed
    }
}

/// Convenience wrapper around [`PaginationPlanner::plan`].
pub fn plan_page_breaks(heights: &[f32], page_height_px: f32) -> Vec<f32> {
    PaginationPlanner::new(page_height_px).plan(heights)
}
