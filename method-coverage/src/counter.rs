// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Pair of missed and covered item counts.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Counter {
    pub missed: u32,
    pub covered: u32,
}

impl Counter {
    pub const EMPTY: Counter = Counter::new(0, 0);

    /// One item, not executed.
    pub const MISSED: Counter = Counter::new(1, 0);

    /// One item, executed.
    pub const COVERED: Counter = Counter::new(0, 1);

    pub const fn new(missed: u32, covered: u32) -> Self {
        Self { missed, covered }
    }

    pub fn total(&self) -> u32 {
        self.missed.saturating_add(self.covered)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn status(&self) -> CoverageStatus {
        match (self.missed, self.covered) {
            (0, 0) => CoverageStatus::Empty,
            (_, 0) => CoverageStatus::NotCovered,
            (0, _) => CoverageStatus::FullyCovered,
            _ => CoverageStatus::PartlyCovered,
        }
    }
}

impl Add for Counter {
    type Output = Counter;

    fn add(self, rhs: Counter) -> Counter {
        Counter::new(
            self.missed.saturating_add(rhs.missed),
            self.covered.saturating_add(rhs.covered),
        )
    }
}

impl AddAssign for Counter {
    fn add_assign(&mut self, rhs: Counter) {
        *self = *self + rhs;
    }
}

impl Sum for Counter {
    fn sum<I: Iterator<Item = Counter>>(iter: I) -> Counter {
        iter.fold(Counter::EMPTY, Add::add)
    }
}

/// Coverage state of a line or counter.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// Nothing to cover.
    #[default]
    Empty,
    NotCovered,
    FullyCovered,
    PartlyCovered,
}

impl CoverageStatus {
    fn bits(self) -> u8 {
        match self {
            Self::Empty => 0b00,
            Self::NotCovered => 0b01,
            Self::FullyCovered => 0b10,
            Self::PartlyCovered => 0b11,
        }
    }

    /// Status of the union of two sets of items.
    pub fn combine(self, other: Self) -> Self {
        match self.bits() | other.bits() {
            0b00 => Self::Empty,
            0b01 => Self::NotCovered,
            0b10 => Self::FullyCovered,
            _ => Self::PartlyCovered,
        }
    }
}
