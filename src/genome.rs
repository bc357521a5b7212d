//! Search representation: a unit ordering plus one rotation bit per unit.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::catalog::PartCatalog;

/// Orders lexicographically by `order`, then `rotated`; the optimizer uses
/// that as the final tie-break between equally fit genomes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Genome {
    /// Permutation of unit indices, in packing order.
    pub order: Vec<usize>,
    /// Rotation preference, indexed by unit (not by position).
    pub rotated: Vec<bool>,
}

/// Deterministic orderings used to seed the initial population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    Area,
    LongestSide,
    Width,
    Perimeter,
}

impl Heuristic {
    pub const ALL: [Heuristic; 4] = [
        Heuristic::Area,
        Heuristic::LongestSide,
        Heuristic::Width,
        Heuristic::Perimeter,
    ];
}

impl Genome {
    pub fn identity(units: usize) -> Self {
        Self {
            order: (0..units).collect(),
            rotated: vec![false; units],
        }
    }

    /// Random permutation with random bits on the units free to rotate.
    pub fn random<R: Rng>(catalog: &PartCatalog, rng: &mut R) -> Self {
        let n = catalog.unit_count();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let rotated = (0..n)
            .map(|u| catalog.is_rotatable(u) && rng.random_bool(0.5))
            .collect();
        Self { order, rotated }
    }

    /// Largest-first ordering by `heuristic`. Free units are turned so their
    /// long side runs along the sheet's long side.
    pub fn sorted_by(catalog: &PartCatalog, heuristic: Heuristic, landscape: bool) -> Self {
        let units = catalog.units();
        let mut order: Vec<usize> = (0..units.len()).collect();
        // stable sort keeps catalog order among equal keys
        order.sort_by_key(|&u| {
            let s = units[u].size;
            let key = match heuristic {
                Heuristic::Area => s.area(),
                Heuristic::LongestSide => s.w.max(s.h) as u64,
                Heuristic::Width => s.w as u64,
                Heuristic::Perimeter => s.w as u64 + s.h as u64,
            };
            std::cmp::Reverse(key)
        });
        let rotated = units
            .iter()
            .enumerate()
            .map(|(u, unit)| {
                catalog.is_rotatable(u)
                    && if landscape {
                        unit.size.h > unit.size.w
                    } else {
                        unit.size.w > unit.size.h
                    }
            })
            .collect();
        Self { order, rotated }
    }

    pub fn is_valid(&self, catalog: &PartCatalog) -> bool {
        let n = catalog.unit_count();
        if self.order.len() != n || self.rotated.len() != n {
            return false;
        }
        let mut seen = vec![false; n];
        for &u in &self.order {
            if u >= n || seen[u] {
                return false;
            }
            seen[u] = true;
        }
        (0..n).all(|u| catalog.is_rotatable(u) || !self.rotated[u])
    }

    /// Turns any genome into a valid one for `catalog`: drops duplicates and
    /// unknown units, appends missing units in ascending order, and clears
    /// bits on grain-constrained units. Returns whether anything changed.
    pub fn repair(&mut self, catalog: &PartCatalog) -> bool {
        let n = catalog.unit_count();
        let mut seen = vec![false; n];
        let mut order = Vec::with_capacity(n);
        for &u in &self.order {
            if u < n && !seen[u] {
                seen[u] = true;
                order.push(u);
            }
        }
        order.extend((0..n).filter(|&u| !seen[u]));

        let mut rotated = self.rotated.clone();
        rotated.resize(n, false);
        for (u, bit) in rotated.iter_mut().enumerate() {
            if !catalog.is_rotatable(u) {
                *bit = false;
            }
        }

        let changed = order != self.order || rotated != self.rotated;
        self.order = order;
        self.rotated = rotated;
        changed
    }

    /// Ordered crossover (OX). Both children share the cut points: each keeps
    /// its own parent's segment and takes the remaining units in the other
    /// parent's order. A unit's rotation bit travels with it.
    pub fn ordered_crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> (Self, Self) {
        let n = self.order.len();
        if n < 2 {
            return (self.clone(), other.clone());
        }

        let (mut p1, mut p2) = (rng.random_range(0..n), rng.random_range(0..n));
        if p1 > p2 {
            std::mem::swap(&mut p1, &mut p2);
        }

        (
            Self::ox_child(self, other, p1, p2),
            Self::ox_child(other, self, p1, p2),
        )
    }

    fn ox_child(keeper: &Self, filler: &Self, p1: usize, p2: usize) -> Self {
        let n = keeper.order.len();
        let mut in_segment = vec![false; n];
        for &u in &keeper.order[p1..=p2] {
            in_segment[u] = true;
        }

        let mut rest = filler.order.iter().copied().filter(|&u| !in_segment[u]);
        let order: Vec<usize> = (0..n)
            .map(|i| {
                if (p1..=p2).contains(&i) {
                    keeper.order[i]
                } else {
                    // filler holds exactly the n - segment units not yet used
                    rest.next().unwrap_or(usize::MAX)
                }
            })
            .collect();

        let rotated = (0..n)
            .map(|u| {
                if in_segment[u] {
                    keeper.rotated[u]
                } else {
                    filler.rotated[u]
                }
            })
            .collect();

        Self { order, rotated }
    }

    /// Swap two positions, flip one free rotation bit, or both.
    pub fn mutate<R: Rng>(&mut self, catalog: &PartCatalog, rng: &mut R) {
        match rng.random_range(0..3) {
            0 => self.swap_mutate(rng),
            1 => self.flip_mutate(catalog, rng),
            _ => {
                self.swap_mutate(rng);
                self.flip_mutate(catalog, rng);
            }
        }
    }

    pub fn swap_mutate<R: Rng>(&mut self, rng: &mut R) {
        let n = self.order.len();
        if n < 2 {
            return;
        }
        let i = rng.random_range(0..n);
        let mut j = rng.random_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        self.order.swap(i, j);
    }

    pub fn flip_mutate<R: Rng>(&mut self, catalog: &PartCatalog, rng: &mut R) {
        let free: Vec<usize> = (0..self.rotated.len())
            .filter(|&u| catalog.is_rotatable(u))
            .collect();
        if free.is_empty() {
            return;
        }
        let u = free[rng.random_range(0..free.len())];
        self.rotated[u] = !self.rotated[u];
    }
}
