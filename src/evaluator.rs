//! Scoring of decoded layouts.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::catalog::StockCatalog;
use crate::types::{Layout, SheetType};

/// Lower is better. Compared field by field: sheet cost, sheet count, waste
/// area, then cut length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fitness {
    pub cost: OrderedFloat<f64>,
    pub sheets: usize,
    /// Sheet area not covered by parts, in mm².
    pub waste: u64,
    /// Length of part edges that need a saw cut, in mm.
    pub cut_length: u64,
}

impl std::fmt::Display for Fitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cost {:.2}, {} sheet{}, waste {} mm², cuts {} mm",
            self.cost.0,
            self.sheets,
            if self.sheets == 1 { "" } else { "s" },
            self.waste,
            self.cut_length
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetCount {
    pub sheet_type: String,
    pub count: usize,
}

/// Figures handed to quoting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub sheet_count: usize,
    pub sheets_by_type: Vec<SheetCount>,
    pub cost: f64,
    pub sheet_area: u64,
    pub part_area: u64,
    pub waste_area: u64,
    pub waste_percent: f64,
    /// Share of each opened sheet covered by parts, in percent, in the
    /// order the sheets were opened.
    pub sheet_utilisation: Vec<f64>,
}

/// Scores layouts against a stock catalog. Placements or sheets that refer
/// to entries outside the catalog are ignored rather than trusted.
pub struct Evaluator<'a> {
    stock: &'a StockCatalog,
}

impl<'a> Evaluator<'a> {
    pub fn new(stock: &'a StockCatalog) -> Self {
        Self { stock }
    }

    pub fn score(&self, layout: &Layout) -> Fitness {
        let cut_length = layout
            .placements
            .iter()
            .filter_map(|p| {
                let sheet = self.sheet_of(layout, p.sheet)?;
                let mut len = 0;
                if p.right() < sheet.width {
                    len += p.rect.h as u64;
                }
                if p.bottom() < sheet.height {
                    len += p.rect.w as u64;
                }
                Some(len)
            })
            .sum();

        Fitness {
            cost: OrderedFloat(self.cost(layout)),
            sheets: layout.sheet_count(),
            waste: self.sheet_area(layout).saturating_sub(Self::part_area(layout)),
            cut_length,
        }
    }

    pub fn summary(&self, layout: &Layout) -> Summary {
        let mut counts = vec![0usize; self.stock.sheet_types().len()];
        for &t in &layout.sheets {
            if let Some(count) = counts.get_mut(t) {
                *count += 1;
            }
        }
        let sheets_by_type = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(t, &count)| SheetCount {
                sheet_type: self.stock.sheet(t).id.clone(),
                count,
            })
            .collect();

        let mut covered = vec![0u64; layout.sheet_count()];
        for p in &layout.placements {
            if let Some(area) = covered.get_mut(p.sheet) {
                *area += p.rect.area();
            }
        }
        let sheet_utilisation = covered
            .iter()
            .enumerate()
            .map(|(s, &area)| {
                let total = self.sheet_of(layout, s).map_or(0, |t| t.rect().area());
                percent(area, total)
            })
            .collect();

        let sheet_area = self.sheet_area(layout);
        let part_area = Self::part_area(layout);
        let waste_area = sheet_area.saturating_sub(part_area);

        Summary {
            sheet_count: layout.sheet_count(),
            sheets_by_type,
            cost: self.cost(layout),
            sheet_area,
            part_area,
            waste_area,
            waste_percent: percent(waste_area, sheet_area),
            sheet_utilisation,
        }
    }

    fn sheet_of(&self, layout: &Layout, sheet: usize) -> Option<&SheetType> {
        let &t = layout.sheets.get(sheet)?;
        self.stock.sheet_types().get(t)
    }

    fn cost(&self, layout: &Layout) -> f64 {
        (0..layout.sheet_count())
            .filter_map(|s| self.sheet_of(layout, s))
            .map(|t| t.cost)
            .sum()
    }

    fn sheet_area(&self, layout: &Layout) -> u64 {
        (0..layout.sheet_count())
            .filter_map(|s| self.sheet_of(layout, s))
            .map(|t| t.rect().area())
            .sum()
    }

    fn part_area(layout: &Layout) -> u64 {
        layout.placements.iter().map(|p| p.rect.area()).sum()
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Placement, Rect};

    fn stock() -> StockCatalog {
        StockCatalog::new(vec![
            SheetType::new("small", 100, 100, 10.0),
            SheetType::new("large", 200, 100, 15.0),
        ])
        .unwrap()
    }

    fn placed(unit: usize, sheet: usize, x: u32, y: u32, w: u32, h: u32) -> Placement {
        Placement {
            part: 0,
            unit,
            sheet,
            x,
            y,
            rect: Rect::new(w, h),
            rotated: false,
        }
    }

    #[test]
    fn test_empty_layout_scores_zero() {
        let stock = stock();
        let evaluator = Evaluator::new(&stock);
        let fitness = evaluator.score(&Layout::default());
        assert_eq!(fitness.sheets, 0);
        assert_eq!(fitness.waste, 0);
        assert_eq!(fitness.cost, OrderedFloat(0.0));
        let summary = evaluator.summary(&Layout::default());
        assert_eq!(summary.waste_percent, 0.0);
        assert!(summary.sheets_by_type.is_empty());
    }

    #[test]
    fn test_score_and_summary() {
        let stock = stock();
        let evaluator = Evaluator::new(&stock);
        let layout = Layout {
            placements: vec![
                placed(0, 0, 0, 0, 100, 50),
                placed(1, 1, 0, 0, 50, 100),
                placed(2, 1, 50, 0, 60, 40),
            ],
            sheets: vec![0, 1],
        };
        let fitness = evaluator.score(&layout);
        assert_eq!(fitness.cost, OrderedFloat(25.0));
        assert_eq!(fitness.sheets, 2);
        assert_eq!(fitness.waste, 10_000 + 20_000 - 5_000 - 5_000 - 2_400);
        // 100x50 touches the right edge: only its bottom edge is cut;
        // 50x100 touches the bottom: only its right edge; 60x40 needs both
        assert_eq!(fitness.cut_length, 100 + 100 + 40 + 60);

        let summary = evaluator.summary(&layout);
        assert_eq!(summary.sheet_count, 2);
        assert_eq!(summary.cost, 25.0);
        assert_eq!(summary.part_area, 12_400);
        assert_eq!(
            summary.sheets_by_type,
            vec![
                SheetCount { sheet_type: "small".into(), count: 1 },
                SheetCount { sheet_type: "large".into(), count: 1 },
            ]
        );
        assert!((summary.waste_percent - 17_600.0 / 30_000.0 * 100.0).abs() < 1e-9);
        assert_eq!(summary.sheet_utilisation, vec![50.0, 37.0]);
    }

    #[test]
    fn test_foreign_layout_does_not_panic() {
        let stock = stock();
        let evaluator = Evaluator::new(&stock);
        // sheet 1 was never opened and sheet type 7 does not exist; parts
        // cover more than the only known sheet
        let layout = Layout {
            placements: vec![
                placed(0, 0, 0, 0, 100, 100),
                placed(1, 0, 0, 0, 100, 100),
                placed(2, 1, 0, 0, 10, 10),
            ],
            sheets: vec![0, 7],
        };
        let fitness = evaluator.score(&layout);
        assert_eq!(fitness.cost, OrderedFloat(10.0));
        assert_eq!(fitness.waste, 0);
        assert_eq!(fitness.cut_length, 0);

        let summary = evaluator.summary(&layout);
        assert_eq!(summary.waste_area, 0);
        assert_eq!(summary.sheet_utilisation, vec![200.0, 0.0]);
        assert_eq!(
            summary.sheets_by_type,
            vec![SheetCount { sheet_type: "small".into(), count: 1 }]
        );
    }

    #[test]
    fn test_ordering_prefers_cost_then_sheets_then_waste() {
        let cheap = Fitness {
            cost: OrderedFloat(40.0),
            sheets: 2,
            waste: 900,
            cut_length: 50,
        };
        let pricey = Fitness {
            cost: OrderedFloat(55.0),
            sheets: 1,
            waste: 0,
            cut_length: 0,
        };
        assert!(cheap < pricey);

        let fewer = Fitness { sheets: 1, ..cheap };
        assert!(fewer < cheap);

        let tidier = Fitness { waste: 100, ..cheap };
        assert!(tidier < cheap);

        let shorter = Fitness { cut_length: 10, ..cheap };
        assert!(shorter < cheap);
    }
}
