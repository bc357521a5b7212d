use crate::types::Rect;

/// A sheet filled bottom-left first: every piece goes to the lowest, then
/// leftmost, corner position where it clears the sheet edge and keeps a
/// kerf gap to everything already cut.
#[derive(Debug, Clone)]
pub struct BottomLeftSheet {
    stock: Rect,
    kerf: u32,
    placed: Vec<(u32, u32, Rect)>,
}

impl BottomLeftSheet {
    pub fn new(stock: Rect, kerf: u32) -> Self {
        Self {
            stock,
            kerf,
            placed: Vec::new(),
        }
    }

    /// Lowest, then leftmost, free position for `piece`, if any.
    pub fn find_position(&self, piece: Rect) -> Option<(u32, u32)> {
        if !piece.fits_in(&self.stock) {
            return None;
        }
        self.candidates()
            .into_iter()
            .find(|&(x, y)| self.is_free(x, y, piece))
    }

    pub fn place(&mut self, x: u32, y: u32, piece: Rect) {
        self.placed.push((x, y, piece));
    }

    /// The origin plus the right, lower and diagonal corners of each placed
    /// piece, pushed out by the kerf. Sorted by y, then x.
    fn candidates(&self) -> Vec<(u32, u32)> {
        let mut out = vec![(0, 0)];
        for &(x, y, r) in &self.placed {
            let right = x + r.w + self.kerf;
            let below = y + r.h + self.kerf;
            out.extend([(right, y), (x, below), (right, below)]);
        }
        out.retain(|&(x, y)| x < self.stock.w && y < self.stock.h);
        out.sort_by_key(|&(x, y)| (y, x));
        out.dedup();
        out
    }

    fn is_free(&self, x: u32, y: u32, piece: Rect) -> bool {
        if x + piece.w > self.stock.w || y + piece.h > self.stock.h {
            return false;
        }
        let k = self.kerf;
        self.placed.iter().all(|&(px, py, r)| {
            x >= px + r.w + k || px >= x + piece.w + k || y >= py + r.h + k || py >= y + piece.h + k
        })
    }
}
