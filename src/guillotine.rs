use serde::{Deserialize, Serialize};

use crate::types::Rect;

#[derive(Debug, Clone, Copy)]
pub struct FreeRect {
    pub x: u32,
    pub y: u32,
    pub rect: Rect,
}

/// A sheet tracked as a set of free rectangles, split with straight
/// edge-to-edge cuts after every placement.
#[derive(Debug, Clone)]
pub struct GuillotineBin {
    kerf: u32,
    pub free_rects: Vec<FreeRect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
pub enum ScoreStrategy {
    #[default]
    BestAreaFit,
    BestShortSideFit,
    BestLongSideFit,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredPlacement {
    pub free_idx: usize,
    pub score: (u64, u64),
}

impl GuillotineBin {
    pub fn new(stock: Rect, kerf: u32) -> Self {
        Self {
            kerf,
            free_rects: vec![FreeRect {
                x: 0,
                y: 0,
                rect: stock,
            }],
        }
    }

    /// Best free rectangle for `piece` as given; lowest score wins and the
    /// earliest free rectangle wins ties.
    pub fn find_best(&self, piece: Rect, score_strategy: ScoreStrategy) -> Option<ScoredPlacement> {
        let mut best: Option<ScoredPlacement> = None;

        for (idx, free) in self.free_rects.iter().enumerate() {
            if !piece.fits_in(&free.rect) {
                continue;
            }
            let score = Self::score(piece, free.rect, score_strategy);
            if best.is_none_or(|b| score < b.score) {
                best = Some(ScoredPlacement {
                    free_idx: idx,
                    score,
                });
            }
        }

        best
    }

    fn score(piece: Rect, free: Rect, strategy: ScoreStrategy) -> (u64, u64) {
        let short = std::cmp::min(free.w - piece.w, free.h - piece.h) as u64;
        let long = std::cmp::max(free.w - piece.w, free.h - piece.h) as u64;
        match strategy {
            ScoreStrategy::BestAreaFit => (free.area() - piece.area(), short),
            ScoreStrategy::BestShortSideFit => (short, long),
            ScoreStrategy::BestLongSideFit => (long, short),
        }
    }

    /// Cuts `piece` from the chosen free rectangle and returns its origin.
    pub fn place(&mut self, scored: ScoredPlacement, piece: Rect) -> (u32, u32) {
        let free = self.free_rects.remove(scored.free_idx);
        self.split(free, piece);
        self.merge_free_rects();
        (free.x, free.y)
    }

    fn split(&mut self, free: FreeRect, placed: Rect) {
        let right_w = free.rect.w.saturating_sub(placed.w + self.kerf);
        let bottom_h = free.rect.h.saturating_sub(placed.h + self.kerf);

        if right_w > 0 && bottom_h > 0 {
            // cut along the shorter leftover axis first
            if free.rect.w - placed.w < free.rect.h - placed.h {
                self.free_rects.push(FreeRect {
                    x: free.x + placed.w + self.kerf,
                    y: free.y,
                    rect: Rect::new(right_w, placed.h),
                });
                self.free_rects.push(FreeRect {
                    x: free.x,
                    y: free.y + placed.h + self.kerf,
                    rect: Rect::new(free.rect.w, bottom_h),
                });
            } else {
                self.free_rects.push(FreeRect {
                    x: free.x + placed.w + self.kerf,
                    y: free.y,
                    rect: Rect::new(right_w, free.rect.h),
                });
                self.free_rects.push(FreeRect {
                    x: free.x,
                    y: free.y + placed.h + self.kerf,
                    rect: Rect::new(placed.w, bottom_h),
                });
            }
        } else if right_w > 0 {
            self.free_rects.push(FreeRect {
                x: free.x + placed.w + self.kerf,
                y: free.y,
                rect: Rect::new(right_w, free.rect.h),
            });
        } else if bottom_h > 0 {
            self.free_rects.push(FreeRect {
                x: free.x,
                y: free.y + placed.h + self.kerf,
                rect: Rect::new(free.rect.w, bottom_h),
            });
        }
    }

    fn merge_free_rects(&mut self) {
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..self.free_rects.len() {
                for j in (i + 1)..self.free_rects.len() {
                    if let Some(m) = Self::try_merge(self.free_rects[i], self.free_rects[j]) {
                        self.free_rects[i] = m;
                        self.free_rects.remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    fn try_merge(a: FreeRect, b: FreeRect) -> Option<FreeRect> {
        // side by side, same row
        if a.y == b.y && a.rect.h == b.rect.h {
            if a.x + a.rect.w == b.x {
                return Some(FreeRect {
                    x: a.x,
                    y: a.y,
                    rect: Rect::new(a.rect.w + b.rect.w, a.rect.h),
                });
            }
            if b.x + b.rect.w == a.x {
                return Some(FreeRect {
                    x: b.x,
                    y: b.y,
                    rect: Rect::new(a.rect.w + b.rect.w, a.rect.h),
                });
            }
        }
        // stacked, same column
        if a.x == b.x && a.rect.w == b.rect.w {
            if a.y + a.rect.h == b.y {
                return Some(FreeRect {
                    x: a.x,
                    y: a.y,
                    rect: Rect::new(a.rect.w, a.rect.h + b.rect.h),
                });
            }
            if b.y + b.rect.h == a.y {
                return Some(FreeRect {
                    x: b.x,
                    y: b.y,
                    rect: Rect::new(a.rect.w, a.rect.h + b.rect.h),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_single_piece() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 0);
        let piece = Rect::new(50, 30);
        let scored = bin.find_best(piece, ScoreStrategy::BestAreaFit).unwrap();
        assert_eq!(bin.place(scored, piece), (0, 0));
        assert!(!bin.free_rects.is_empty());
    }

    #[test]
    fn test_piece_too_large() {
        let bin = GuillotineBin::new(Rect::new(100, 100), 0);
        assert!(
            bin.find_best(Rect::new(200, 50), ScoreStrategy::BestAreaFit)
                .is_none()
        );
    }

    #[test]
    fn test_kerf() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 5);
        let piece = Rect::new(50, 100);
        let scored = bin.find_best(piece, ScoreStrategy::BestAreaFit).unwrap();
        bin.place(scored, piece);
        // 100 - 50 - 5 = 45
        assert!(bin.free_rects.iter().any(|f| f.rect.w == 45 && f.x == 55));
    }

    #[test]
    fn test_fill_exact() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 0);
        let piece = Rect::new(100, 100);
        let scored = bin.find_best(piece, ScoreStrategy::BestAreaFit).unwrap();
        bin.place(scored, piece);
        assert!(bin.free_rects.is_empty());
    }

    #[test]
    fn test_four_quarters() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 0);
        let piece = Rect::new(50, 50);
        let mut origins = Vec::new();
        for strategy in [
            ScoreStrategy::BestShortSideFit,
            ScoreStrategy::BestLongSideFit,
            ScoreStrategy::BestAreaFit,
            ScoreStrategy::BestAreaFit,
        ] {
            let scored = bin.find_best(piece, strategy).unwrap();
            origins.push(bin.place(scored, piece));
        }
        origins.sort();
        assert_eq!(origins, vec![(0, 0), (0, 50), (50, 0), (50, 50)]);
        assert!(bin.free_rects.is_empty());
    }
}
