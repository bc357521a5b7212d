//! Deterministic genome decoding.
//!
//! The same genome against the same catalogs always produces the same
//! layout; the optimizer relies on that for reproducible fitness.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bottom_left::BottomLeftSheet;
use crate::catalog::{PartCatalog, PartUnit, StockCatalog};
use crate::error::{Error, Result};
use crate::genome::Genome;
use crate::guillotine::{GuillotineBin, ScoreStrategy};
use crate::shelf::ShelfSheet;
use crate::types::{Layout, Placement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decoder {
    /// Next-fit shelves on the most recently opened sheet.
    #[default]
    Shelf,
    /// First-fit over all open sheets, tracking free rectangles.
    Guillotine(ScoreStrategy),
    /// First-fit over all open sheets, lowest then leftmost position.
    BottomLeft,
}

pub struct Packer<'a> {
    parts: &'a PartCatalog,
    stock: &'a StockCatalog,
    decoder: Decoder,
}

impl<'a> Packer<'a> {
    /// Fails with [`Error::Unpackable`] if some part fits no sheet type even
    /// on an empty sheet.
    pub fn new(parts: &'a PartCatalog, stock: &'a StockCatalog, decoder: Decoder) -> Result<Self> {
        let packer = Self {
            parts,
            stock,
            decoder,
        };
        let mut checked = vec![false; parts.parts().len()];
        for unit in parts.units() {
            if !checked[unit.part] {
                checked[unit.part] = true;
                packer.cheapest_sheet(unit)?;
            }
        }
        Ok(packer)
    }

    pub fn pack(&self, genome: &Genome) -> Result<Layout> {
        if !genome.is_valid(self.parts) {
            let mut repaired = genome.clone();
            repaired.repair(self.parts);
            debug!(units = self.parts.unit_count(), "repaired invalid genome before packing");
            return self.pack(&repaired);
        }

        let mut layout = match self.decoder {
            Decoder::Shelf => self.decode_shelves(genome)?,
            Decoder::Guillotine(score) => self.decode_guillotine(genome, score)?,
            Decoder::BottomLeft => self.decode_bottom_left(genome)?,
        };
        self.right_size(&mut layout);
        Ok(layout)
    }

    fn decode_shelves(&self, genome: &Genome) -> Result<Layout> {
        let mut open: Vec<(usize, ShelfSheet)> = Vec::new();
        let mut layout = Layout::default();

        for &u in &genome.order {
            let unit = self.parts.unit(u);
            let part = self.parts.part(unit.part);
            let prefer = genome.rotated[u];

            let current = open.iter().rposition(|(t, _)| {
                self.stock
                    .fitting_orientation(*t, part, unit, prefer)
                    .is_some()
            });

            let spot = current.and_then(|s| {
                let (t, sheet) = &open[s];
                let orientations = self.stock.orientations(*t, unit.grain, prefer);
                orientations
                    .into_iter()
                    .find_map(|r| sheet.fit_current(unit.size.oriented(r)).map(|(x, y)| (x, y, r)))
                    .or_else(|| {
                        orientations.into_iter().find_map(|r| {
                            sheet
                                .fit_new_shelf(unit.size.oriented(r))
                                .map(|(x, y)| (x, y, r))
                        })
                    })
                    .map(|(x, y, r)| (s, x, y, r))
            });

            let (s, x, y, rotated) = match spot {
                Some(spot) => spot,
                None => {
                    let t = self.cheapest_sheet(unit)?;
                    let rotated = self
                        .stock
                        .fitting_orientation(t, part, unit, prefer)
                        .ok_or_else(|| self.unpackable(unit))?;
                    let sheet_type = self.stock.sheet(t);
                    open.push((t, ShelfSheet::new(sheet_type.rect(), sheet_type.kerf)));
                    layout.sheets.push(t);
                    (open.len() - 1, 0, 0, rotated)
                }
            };

            let rect = unit.size.oriented(rotated);
            open[s].1.place(x, y, rect);
            layout.placements.push(Placement {
                part: unit.part,
                unit: u,
                sheet: s,
                x,
                y,
                rect,
                rotated,
            });
        }

        Ok(layout)
    }

    fn decode_guillotine(&self, genome: &Genome, score: ScoreStrategy) -> Result<Layout> {
        let mut bins: Vec<(usize, GuillotineBin)> = Vec::new();
        let mut layout = Layout::default();

        for &u in &genome.order {
            let unit = self.parts.unit(u);
            let part = self.parts.part(unit.part);
            let prefer = genome.rotated[u];

            let spot = bins.iter().enumerate().find_map(|(s, (t, bin))| {
                if !self.stock.accepts_material(*t, part.material.as_deref()) {
                    return None;
                }
                self.stock
                    .orientations(*t, unit.grain, prefer)
                    .into_iter()
                    .find_map(|r| {
                        bin.find_best(unit.size.oriented(r), score)
                            .map(|scored| (s, scored, r))
                    })
            });

            let (s, scored, rotated) = match spot {
                Some(spot) => spot,
                None => {
                    let t = self.cheapest_sheet(unit)?;
                    let rotated = self
                        .stock
                        .fitting_orientation(t, part, unit, prefer)
                        .ok_or_else(|| self.unpackable(unit))?;
                    let sheet_type = self.stock.sheet(t);
                    let bin = GuillotineBin::new(sheet_type.rect(), sheet_type.kerf);
                    let scored = bin
                        .find_best(unit.size.oriented(rotated), score)
                        .ok_or_else(|| self.unpackable(unit))?;
                    bins.push((t, bin));
                    layout.sheets.push(t);
                    (bins.len() - 1, scored, rotated)
                }
            };

            let rect = unit.size.oriented(rotated);
            let (x, y) = bins[s].1.place(scored, rect);
            layout.placements.push(Placement {
                part: unit.part,
                unit: u,
                sheet: s,
                x,
                y,
                rect,
                rotated,
            });
        }

        Ok(layout)
    }

    fn decode_bottom_left(&self, genome: &Genome) -> Result<Layout> {
        let mut open: Vec<(usize, BottomLeftSheet)> = Vec::new();
        let mut layout = Layout::default();

        for &u in &genome.order {
            let unit = self.parts.unit(u);
            let part = self.parts.part(unit.part);
            let prefer = genome.rotated[u];

            let spot = open.iter().enumerate().find_map(|(s, (t, sheet))| {
                if !self.stock.accepts_material(*t, part.material.as_deref()) {
                    return None;
                }
                self.stock
                    .orientations(*t, unit.grain, prefer)
                    .into_iter()
                    .find_map(|r| {
                        sheet
                            .find_position(unit.size.oriented(r))
                            .map(|(x, y)| (s, x, y, r))
                    })
            });

            let (s, x, y, rotated) = match spot {
                Some(spot) => spot,
                None => {
                    let t = self.cheapest_sheet(unit)?;
                    let rotated = self
                        .stock
                        .fitting_orientation(t, part, unit, prefer)
                        .ok_or_else(|| self.unpackable(unit))?;
                    let sheet_type = self.stock.sheet(t);
                    open.push((t, BottomLeftSheet::new(sheet_type.rect(), sheet_type.kerf)));
                    layout.sheets.push(t);
                    (open.len() - 1, 0, 0, rotated)
                }
            };

            let rect = unit.size.oriented(rotated);
            open[s].1.place(x, y, rect);
            layout.placements.push(Placement {
                part: unit.part,
                unit: u,
                sheet: s,
                x,
                y,
                rect,
                rotated,
            });
        }

        Ok(layout)
    }

    /// Moves each sheet onto the cheapest strictly cheaper type that still
    /// holds everything cut from it with the same grain and no wider kerf.
    fn right_size(&self, layout: &mut Layout) {
        for sheet in 0..layout.sheet_count() {
            let current = self.stock.sheet(layout.sheets[sheet]);
            let extent = layout.used_extent(sheet);

            let replacement = self.stock.by_price().iter().copied().find(|&t| {
                let candidate = self.stock.sheet(t);
                candidate.cost < current.cost
                    && candidate.grain == current.grain
                    && candidate.kerf <= current.kerf
                    && extent.fits_in(&candidate.rect())
                    && layout.placements_on(sheet).all(|p| {
                        self.stock
                            .accepts_material(t, self.parts.part(p.part).material.as_deref())
                    })
            });

            if let Some(t) = replacement {
                layout.sheets[sheet] = t;
            }
        }
    }

    /// Everything wrong with `layout`, as readable messages. Empty when the
    /// layout places every unit once, inside its sheet, without overlaps,
    /// and in a grain- and material-legal way.
    pub fn violations(&self, layout: &Layout) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = vec![0usize; self.parts.unit_count()];
        for p in &layout.placements {
            match seen.get_mut(p.unit) {
                Some(count) => *count += 1,
                None => errors.push(format!("placement of unknown unit {}", p.unit)),
            }
        }
        for (u, &count) in seen.iter().enumerate() {
            if count != 1 {
                errors.push(format!("unit {u} placed {count} times"));
            }
        }

        for (i, p) in layout.placements.iter().enumerate() {
            let Some(&t) = layout.sheets.get(p.sheet) else {
                errors.push(format!("placement {i} on unopened sheet {}", p.sheet));
                continue;
            };
            let sheet = self.stock.sheet(t);
            let part = self.parts.part(p.part);
            if p.right() > sheet.width || p.bottom() > sheet.height {
                errors.push(format!(
                    "sheet {}: part '{}' at ({}, {}) exceeds {}",
                    p.sheet,
                    part.id,
                    p.x,
                    p.y,
                    sheet.rect()
                ));
            }
            if p.rect != part.rect().oriented(p.rotated) {
                errors.push(format!("part '{}' placed as {}", part.id, p.rect));
            }
            if !part.grain.allows(sheet.grain, p.rotated) {
                errors.push(format!(
                    "sheet {}: part '{}' violates grain direction",
                    p.sheet, part.id
                ));
            }
            if !self.stock.accepts_material(t, part.material.as_deref()) {
                errors.push(format!(
                    "sheet {}: part '{}' cut from wrong material",
                    p.sheet, part.id
                ));
            }
        }

        for (i, a) in layout.placements.iter().enumerate() {
            for b in &layout.placements[i + 1..] {
                if a.overlaps(b) {
                    errors.push(format!(
                        "sheet {}: unit {} overlaps unit {}",
                        a.sheet, a.unit, b.unit
                    ));
                }
            }
        }

        errors
    }

    fn cheapest_sheet(&self, unit: &PartUnit) -> Result<usize> {
        self.stock
            .cheapest_for(self.parts.part(unit.part), unit)
            .ok_or_else(|| self.unpackable(unit))
    }

    fn unpackable(&self, unit: &PartUnit) -> Error {
        let part = self.parts.part(unit.part);
        Error::Unpackable {
            id: part.id.clone(),
            width: part.width,
            height: part.height,
        }
    }
}
