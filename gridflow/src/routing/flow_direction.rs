/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The downstream neighbour of a cell, encoded with the digits of a
/// numeric keypad: the centre key (5) is a sink, every other key points
/// in its direction on the pad. North is towards the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlowDirection {
    SouthWest = 1,
    South = 2,
    SouthEast = 3,
    West = 4,
    Sink = 5,
    East = 6,
    NorthWest = 7,
    North = 8,
    NorthEast = 9,
}

impl FlowDirection {
    /// All directions, by code.
    pub const ALL: [FlowDirection; 9] = [
        FlowDirection::SouthWest,
        FlowDirection::South,
        FlowDirection::SouthEast,
        FlowDirection::West,
        FlowDirection::Sink,
        FlowDirection::East,
        FlowDirection::NorthWest,
        FlowDirection::North,
        FlowDirection::NorthEast,
    ];

    /// The order in which neighbours are considered when looking for
    /// the steepest descent. The first of equally steep neighbours wins.
    pub const STEEPEST_DESCENT_ORDER: [FlowDirection; 8] = [
        FlowDirection::North,
        FlowDirection::West,
        FlowDirection::East,
        FlowDirection::South,
        FlowDirection::NorthWest,
        FlowDirection::NorthEast,
        FlowDirection::SouthWest,
        FlowDirection::SouthEast,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1..=9 => Some(Self::ALL[usize::from(code) - 1]),
            _ => None,
        }
    }

    /// The `(row, column)` offset of the downstream neighbour.
    pub fn offset(self) -> (isize, isize) {
        let code = self.code() as isize - 1;
        (1 - code / 3, code % 3 - 1)
    }

    /// The direction whose offset is `(drow, dcol)`.
    pub fn from_offset(drow: isize, dcol: isize) -> Option<Self> {
        if !(-1..=1).contains(&drow) || !(-1..=1).contains(&dcol) {
            return None;
        }
        Self::from_code(((1 - drow) * 3 + dcol + 2) as u8)
    }

    pub fn is_sink(self) -> bool {
        self == FlowDirection::Sink
    }

    /// The direction pointing back at a cell from its downstream
    /// neighbour.
    pub fn reverse(self) -> Self {
        Self::ALL[9 - usize::from(self.code())]
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowDirection::SouthWest => "south_west",
            FlowDirection::South => "south",
            FlowDirection::SouthEast => "south_east",
            FlowDirection::West => "west",
            FlowDirection::Sink => "sink",
            FlowDirection::East => "east",
            FlowDirection::NorthWest => "north_west",
            FlowDirection::North => "north",
            FlowDirection::NorthEast => "north_east",
        };
        f.write_str(name)
    }
}

impl From<FlowDirection> for u8 {
    fn from(direction: FlowDirection) -> u8 {
        direction.code()
    }
}
