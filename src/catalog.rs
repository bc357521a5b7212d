//! Validated part and stock catalogs.
//!
//! Parts are expanded into units, one per requested copy, which is what the
//! genome orders and the packer places.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{Grain, Part, Rect, SheetType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartUnit {
    /// Index into [`PartCatalog::parts`].
    pub part: usize,
    pub size: Rect,
    pub grain: Grain,
}

#[derive(Debug, Clone)]
pub struct PartCatalog {
    parts: Vec<Part>,
    units: Vec<PartUnit>,
}

impl PartCatalog {
    pub fn new(parts: Vec<Part>) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &parts {
            if p.width == 0 || p.height == 0 {
                return Err(Error::InvalidPart {
                    id: p.id.clone(),
                    reason: format!("dimensions must be non-zero, got {}", p.rect()),
                });
            }
            if !seen.insert(p.id.as_str()) {
                return Err(Error::InvalidPart {
                    id: p.id.clone(),
                    reason: "duplicate part id".to_string(),
                });
            }
        }

        let units = parts
            .iter()
            .enumerate()
            .flat_map(|(idx, p)| {
                (0..p.quantity).map(move |_| PartUnit {
                    part: idx,
                    size: p.rect(),
                    grain: p.grain,
                })
            })
            .collect();

        Ok(Self { parts, units })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, idx: usize) -> &Part {
        &self.parts[idx]
    }

    pub fn units(&self) -> &[PartUnit] {
        &self.units
    }

    pub fn unit(&self, idx: usize) -> &PartUnit {
        &self.units[idx]
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether the genome's rotation bit has any say for this unit.
    pub fn is_rotatable(&self, unit: usize) -> bool {
        !self.units[unit].grain.is_constrained()
    }
}

#[derive(Debug, Clone)]
pub struct StockCatalog {
    sheets: Vec<SheetType>,
    /// Sheet type indices, cheapest first; ties broken by area, then index.
    by_price: Vec<usize>,
}

impl StockCatalog {
    pub fn new(sheets: Vec<SheetType>) -> Result<Self> {
        for s in &sheets {
            let invalid = |reason: String| Error::InvalidSheetType {
                id: s.id.clone(),
                reason,
            };
            if s.width == 0 || s.height == 0 {
                return Err(invalid(format!(
                    "dimensions must be non-zero, got {}",
                    s.rect()
                )));
            }
            if !s.cost.is_finite() || s.cost < 0.0 {
                return Err(invalid(format!(
                    "cost must be a finite non-negative number, got {}",
                    s.cost
                )));
            }
            if s.kerf >= s.width || s.kerf >= s.height {
                return Err(invalid(format!(
                    "kerf {} must be smaller than the sheet {}",
                    s.kerf,
                    s.rect()
                )));
            }
        }

        let mut by_price: Vec<usize> = (0..sheets.len()).collect();
        by_price.sort_by(|&a, &b| {
            sheets[a]
                .cost
                .total_cmp(&sheets[b].cost)
                .then(sheets[a].rect().area().cmp(&sheets[b].rect().area()))
                .then(a.cmp(&b))
        });

        Ok(Self { sheets, by_price })
    }

    pub fn sheet_types(&self) -> &[SheetType] {
        &self.sheets
    }

    pub fn sheet(&self, idx: usize) -> &SheetType {
        &self.sheets[idx]
    }

    pub fn by_price(&self) -> &[usize] {
        &self.by_price
    }

    pub fn accepts_material(&self, sheet: usize, material: Option<&str>) -> bool {
        materials_match(self.sheets[sheet].material.as_deref(), material)
    }

    /// Legal orientations of a unit on a sheet type, preferred one first.
    pub fn orientations(&self, sheet: usize, grain: Grain, prefer_rotated: bool) -> Orientations {
        let sheet_grain = self.sheets[sheet].grain;
        let mut out = Orientations::default();
        for rotated in [prefer_rotated, !prefer_rotated] {
            if grain.allows(sheet_grain, rotated) {
                out.push(rotated);
            }
        }
        out
    }

    /// First legal orientation of `unit` that fits an empty sheet of this type.
    pub fn fitting_orientation(
        &self,
        sheet: usize,
        part: &Part,
        unit: &PartUnit,
        prefer_rotated: bool,
    ) -> Option<bool> {
        if !self.accepts_material(sheet, part.material.as_deref()) {
            return None;
        }
        let stock = self.sheets[sheet].rect();
        self.orientations(sheet, unit.grain, prefer_rotated)
            .into_iter()
            .find(|&r| unit.size.oriented(r).fits_in(&stock))
    }

    /// Cheapest sheet type that can hold `unit` on its own.
    pub fn cheapest_for(&self, part: &Part, unit: &PartUnit) -> Option<usize> {
        self.by_price
            .iter()
            .copied()
            .find(|&s| self.fitting_orientation(s, part, unit, false).is_some())
    }
}

/// At most two orientations, stored inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orientations {
    items: [bool; 2],
    len: usize,
}

impl Orientations {
    fn push(&mut self, rotated: bool) {
        self.items[self.len] = rotated;
        self.len += 1;
    }
}

impl IntoIterator for Orientations {
    type Item = bool;
    type IntoIter = std::iter::Take<std::array::IntoIter<bool, 2>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter().take(self.len)
    }
}

/// An unset material on either side matches anything.
pub fn materials_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_expanded_per_quantity() {
        let catalog = PartCatalog::new(vec![
            Part::new("side", 720, 560, 2),
            Part::new("shelf", 560, 300, 0),
            Part::new("back", 720, 600, 1).with_grain(Grain::AlongHeight),
        ])
        .unwrap();
        assert_eq!(catalog.unit_count(), 3);
        assert_eq!(catalog.unit(0).part, 0);
        assert_eq!(catalog.unit(1).part, 0);
        assert_eq!(catalog.unit(2).part, 2);
        assert!(catalog.is_rotatable(0));
        assert!(!catalog.is_rotatable(2));
    }

    #[test]
    fn test_rejects_bad_parts() {
        let zero = PartCatalog::new(vec![Part::new("a", 0, 10, 1)]);
        assert!(matches!(zero, Err(Error::InvalidPart { .. })));

        let dup = PartCatalog::new(vec![Part::new("a", 10, 10, 1), Part::new("a", 20, 20, 1)]);
        assert!(matches!(dup, Err(Error::InvalidPart { id, .. }) if id == "a"));
    }

    #[test]
    fn test_rejects_bad_sheets() {
        let cost = StockCatalog::new(vec![SheetType::new("s", 100, 100, -1.0)]);
        assert!(matches!(cost, Err(Error::InvalidSheetType { .. })));

        let kerf = StockCatalog::new(vec![SheetType::new("s", 100, 5, 1.0).with_kerf(5)]);
        assert!(matches!(kerf, Err(Error::InvalidSheetType { .. })));
    }

    #[test]
    fn test_cheapest_for_respects_fit_and_material() {
        let stock = StockCatalog::new(vec![
            SheetType::new("big", 3050, 1220, 55.0),
            SheetType::new("small", 2440, 1220, 40.0),
            SheetType::new("oak", 2440, 1220, 30.0).with_material("oak"),
        ])
        .unwrap();
        assert_eq!(stock.by_price(), &[2, 1, 0]);

        let parts = PartCatalog::new(vec![
            Part::new("plain", 600, 400, 1).with_material("mdf"),
            Part::new("long", 2800, 600, 1),
        ])
        .unwrap();
        let plain = parts.unit(0);
        assert_eq!(stock.cheapest_for(parts.part(0), plain), Some(1));
        let long = parts.unit(1);
        assert_eq!(stock.cheapest_for(parts.part(1), long), Some(0));
    }

    #[test]
    fn test_grain_limits_orientations() {
        let stock =
            StockCatalog::new(vec![SheetType::new("s", 2440, 1220, 1.0).with_grain(Grain::AlongWidth)])
                .unwrap();
        let both: Vec<bool> = stock.orientations(0, Grain::None, true).into_iter().collect();
        assert_eq!(both, vec![true, false]);
        let forced: Vec<bool> = stock
            .orientations(0, Grain::AlongHeight, false)
            .into_iter()
            .collect();
        assert_eq!(forced, vec![true]);

        // 2000 tall with grain along its height must lie rotated; 2000 wide fits.
        let parts = PartCatalog::new(vec![
            Part::new("tall", 600, 2000, 1).with_grain(Grain::AlongHeight),
            Part::new("stuck", 600, 2000, 1).with_grain(Grain::AlongWidth),
        ])
        .unwrap();
        assert_eq!(stock.fitting_orientation(0, parts.part(0), parts.unit(0), false), Some(true));
        assert_eq!(stock.fitting_orientation(0, parts.part(1), parts.unit(1), true), None);
    }
}
