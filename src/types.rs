use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rect {
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub w: u32,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub h: u32,
}

impl Rect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn rotated(&self) -> Self {
        Self {
            w: self.h,
            h: self.w,
        }
    }

    pub fn oriented(&self, rotated: bool) -> Self {
        if rotated { self.rotated() } else { *self }
    }

    pub fn fits_in(&self, other: &Rect) -> bool {
        self.w <= other.w && self.h <= other.h
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Accepts JSON numbers written as floats (`600.0`) as long as they are whole.
pub fn deserialize_u32_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value > u32::MAX as f64 || value.fract() != 0.0 {
        return Err(D::Error::custom(format!(
            "expected a non-negative whole number, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Wood grain direction.
///
/// On a part it names the part axis the grain has to follow; on a sheet it
/// names the sheet axis the grain runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    #[default]
    None,
    AlongWidth,
    AlongHeight,
}

impl Grain {
    /// Whether a part with this grain may be placed in the given orientation
    /// on a sheet whose grain is `sheet`.
    pub fn allows(self, sheet: Grain, rotated: bool) -> bool {
        match (self, sheet) {
            (Grain::None, _) | (_, Grain::None) => true,
            (part, sheet) => (part == sheet) != rotated,
        }
    }

    pub fn is_constrained(self) -> bool {
        self != Grain::None
    }
}

impl std::str::FromStr for Grain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "-" => Ok(Grain::None),
            "w" | "width" | "along-width" => Ok(Grain::AlongWidth),
            "h" | "height" | "along-height" => Ok(Grain::AlongHeight),
            _ => Err(format!(
                "invalid grain '{}', expected: none, width or height",
                s
            )),
        }
    }
}

/// A rectangular part to cut, `quantity` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub width: u32,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub height: u32,
    #[serde(default = "default_quantity", deserialize_with = "deserialize_u32_from_number")]
    pub quantity: u32,
    #[serde(default)]
    pub grain: Grain,
    #[serde(default)]
    pub material: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl Part {
    pub fn new(id: impl Into<String>, width: u32, height: u32, quantity: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            quantity,
            grain: Grain::None,
            material: None,
        }
    }

    pub fn with_grain(mut self, grain: Grain) -> Self {
        self.grain = grain;
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.width, self.height)
    }
}

/// A stock sheet size that can be bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetType {
    pub id: String,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub width: u32,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub height: u32,
    pub cost: f64,
    /// Blade width removed between neighbouring parts.
    #[serde(default, deserialize_with = "deserialize_u32_from_number")]
    pub kerf: u32,
    #[serde(default)]
    pub grain: Grain,
    #[serde(default)]
    pub material: Option<String>,
}

impl SheetType {
    pub fn new(id: impl Into<String>, width: u32, height: u32, cost: f64) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            cost,
            kerf: 0,
            grain: Grain::None,
            material: None,
        }
    }

    pub fn with_kerf(mut self, kerf: u32) -> Self {
        self.kerf = kerf;
        self
    }

    pub fn with_grain(mut self, grain: Grain) -> Self {
        self.grain = grain;
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Index of the part in the submitted part list.
    pub part: usize,
    /// Index of the expanded unit this placement cuts.
    pub unit: usize,
    pub sheet: usize,
    pub x: u32,
    pub y: u32,
    /// Footprint on the sheet, after rotation.
    pub rect: Rect,
    pub rotated: bool,
}

impl Placement {
    pub fn right(&self) -> u32 {
        self.x + self.rect.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.rect.h
    }

    pub fn overlaps(&self, other: &Placement) -> bool {
        self.sheet == other.sheet
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// The cut plan: every unit placed once, plus the type of each opened sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub placements: Vec<Placement>,
    /// Sheet type index of sheet `i`.
    pub sheets: Vec<usize>,
}

impl Layout {
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn placements_on(&self, sheet: usize) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(move |p| p.sheet == sheet)
    }

    /// Bounding box of everything cut from `sheet`, measured from the origin.
    pub fn used_extent(&self, sheet: usize) -> Rect {
        self.placements_on(sheet).fold(Rect::new(0, 0), |acc, p| {
            Rect::new(acc.w.max(p.right()), acc.h.max(p.bottom()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grain_rules() {
        assert!(Grain::None.allows(Grain::AlongWidth, true));
        assert!(Grain::AlongWidth.allows(Grain::None, true));
        assert!(Grain::AlongWidth.allows(Grain::AlongWidth, false));
        assert!(!Grain::AlongWidth.allows(Grain::AlongWidth, true));
        assert!(Grain::AlongHeight.allows(Grain::AlongWidth, true));
        assert!(!Grain::AlongHeight.allows(Grain::AlongWidth, false));
    }

    #[test]
    fn test_overlap_requires_same_sheet() {
        let a = Placement {
            part: 0,
            unit: 0,
            sheet: 0,
            x: 0,
            y: 0,
            rect: Rect::new(100, 100),
            rotated: false,
        };
        let touching = Placement { unit: 1, x: 100, ..a };
        let crossing = Placement { unit: 2, x: 50, y: 50, ..a };
        let elsewhere = Placement { unit: 3, sheet: 1, ..a };
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&crossing));
        assert!(!a.overlaps(&elsewhere));
    }

    #[test]
    fn test_part_from_json_accepts_float_dimensions() {
        let part: Part =
            serde_json::from_str(r#"{"id":"door","width":600.0,"height":400,"grain":"along_height"}"#)
                .unwrap();
        assert_eq!(part.rect(), Rect::new(600, 400));
        assert_eq!(part.quantity, 1);
        assert_eq!(part.grain, Grain::AlongHeight);

        let bad = serde_json::from_str::<Part>(r#"{"id":"x","width":600.5,"height":400}"#);
        assert!(bad.is_err());
    }
}
