use crate::types::Rect;

/// A sheet filled row by row: parts go left to right along the current
/// shelf, and a new shelf starts below the tallest part of the previous one.
#[derive(Debug, Clone)]
pub struct ShelfSheet {
    stock: Rect,
    kerf: u32,
    shelf_y: u32,
    shelf_h: u32,
    cursor_x: u32,
}

impl ShelfSheet {
    pub fn new(stock: Rect, kerf: u32) -> Self {
        Self {
            stock,
            kerf,
            shelf_y: 0,
            shelf_h: 0,
            cursor_x: 0,
        }
    }

    /// Where `piece` would go on the current shelf. The shelf may grow taller
    /// while the sheet has room below it.
    pub fn fit_current(&self, piece: Rect) -> Option<(u32, u32)> {
        let fits = self.cursor_x.saturating_add(piece.w) <= self.stock.w
            && self.shelf_y.saturating_add(piece.h) <= self.stock.h;
        fits.then_some((self.cursor_x, self.shelf_y))
    }

    /// Where `piece` would go on a fresh shelf below the current one.
    pub fn fit_new_shelf(&self, piece: Rect) -> Option<(u32, u32)> {
        if self.shelf_h == 0 {
            return None;
        }
        let y = self.shelf_y + self.shelf_h + self.kerf;
        let fits = piece.w <= self.stock.w && y.saturating_add(piece.h) <= self.stock.h;
        fits.then_some((0, y))
    }

    /// Commits a position returned by one of the `fit_*` methods.
    pub fn place(&mut self, x: u32, y: u32, piece: Rect) {
        if y != self.shelf_y {
            self.shelf_y = y;
            self.shelf_h = 0;
        }
        self.cursor_x = x + piece.w + self.kerf;
        self.shelf_h = self.shelf_h.max(piece.h);
    }
}
