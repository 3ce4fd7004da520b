/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust

===============================================================================
*/

//! Adaptive probability models driven by the arithmetic coder.
//!
//! Both models count the symbols they see and periodically turn those
//! counts into the scaled probabilities the coder works with.
//! Rescaling happens less and less often as the model settles.

/// Precision of the cumulative distribution of an [`ArithmeticModel`].
pub(crate) const SYMBOL_LENGTH_SHIFT: u32 = 15;
/// Precision of the probability of an [`ArithmeticBitModel`].
pub(crate) const BIT_LENGTH_SHIFT: u32 = 13;

const SYMBOL_MAX_TOTAL: u32 = 1 << SYMBOL_LENGTH_SHIFT;
const BIT_MAX_TOTAL: u32 = 1 << BIT_LENGTH_SHIFT;
const BIT_MAX_CYCLE: u32 = 64;

const MAX_SYMBOLS: u32 = 1 << 11;
// models with fewer symbols are searched by bisection alone
const LOOKUP_THRESHOLD: u32 = 16;

fn grown_cycle(cycle: u32, limit: u32) -> u32 {
    ((5 * cycle) >> 2).min(limit)
}

/// Adaptive model over a fixed alphabet of symbols.
///
/// A model built for decoding an alphabet of more than 16 symbols also keeps
/// a lookup table that narrows the search for the decoded symbol.
#[derive(Debug, Clone)]
pub struct ArithmeticModel {
    counts: Vec<u32>,
    cumulative: Vec<u32>,
    lookup: Vec<u32>,
    lookup_shift: u32,

    total: u32,
    cycle: u32,
    until_rescale: u32,
}

impl ArithmeticModel {
    /// # Panics
    ///
    /// When `symbols` is not within `2..=2048`.
    pub fn new(symbols: u32, compress: bool) -> Self {
        assert!(
            (2..=MAX_SYMBOLS).contains(&symbols),
            "invalid number of symbols: {}",
            symbols
        );

        let mut lookup_shift = 0;
        let mut lookup = Vec::new();
        if !compress && symbols > LOOKUP_THRESHOLD {
            let lookup_bits = (3u32..)
                .find(|bits| symbols <= 1u32 << (bits + 2))
                .unwrap_or(3);
            lookup_shift = SYMBOL_LENGTH_SHIFT - lookup_bits;
            lookup = vec![0u32; (1 << lookup_bits) + 2];
        }

        let mut model = Self {
            counts: vec![1; symbols as usize],
            cumulative: vec![0; symbols as usize],
            lookup,
            lookup_shift,
            total: 0,
            cycle: symbols,
            until_rescale: 0,
        };
        model.rescale();
        model.cycle = (symbols + 6) >> 1;
        model.until_rescale = model.cycle;
        model
    }

    pub fn num_symbols(&self) -> u32 {
        self.counts.len() as u32
    }

    pub(crate) fn last_symbol(&self) -> u32 {
        self.num_symbols() - 1
    }

    /// Lower bound of the interval of `symbol`.
    #[inline]
    pub(crate) fn low(&self, symbol: u32) -> u32 {
        self.cumulative[symbol as usize]
    }

    /// Symbols that may hold `scaled_value`, as a `first..end` pair,
    /// when the model has a lookup table.
    pub(crate) fn candidates(&self, scaled_value: u32) -> Option<(u32, u32)> {
        if self.lookup.is_empty() {
            return None;
        }
        // corrupted input may point past the table
        let last_slot = self.lookup.len() - 2;
        let slot = ((scaled_value >> self.lookup_shift) as usize).min(last_slot);
        Some((self.lookup[slot], self.lookup[slot + 1] + 1))
    }

    /// Records that `symbol` was coded.
    #[inline]
    pub(crate) fn observe(&mut self, symbol: u32) {
        self.counts[symbol as usize] += 1;
        self.until_rescale -= 1;
        if self.until_rescale == 0 {
            self.rescale();
        }
    }

    fn rescale(&mut self) {
        self.total += self.cycle;
        if self.total > SYMBOL_MAX_TOTAL {
            for count in self.counts.iter_mut() {
                *count = (*count + 1) >> 1;
            }
            self.total = self.counts.iter().sum();
        }

        let scale = 0x8000_0000u32 / self.total;
        let mut running = 0u32;
        let mut filled = 0usize;
        for (symbol, &count) in self.counts.iter().enumerate() {
            let low = (scale * running) >> (31 - SYMBOL_LENGTH_SHIFT);
            self.cumulative[symbol] = low;
            running += count;
            if !self.lookup.is_empty() {
                let slot = (low >> self.lookup_shift) as usize;
                while filled < slot {
                    filled += 1;
                    self.lookup[filled] = symbol as u32 - 1;
                }
            }
        }
        if !self.lookup.is_empty() {
            let last_symbol = self.last_symbol();
            self.lookup[0] = 0;
            for entry in &mut self.lookup[filled + 1..] {
                *entry = last_symbol;
            }
        }

        self.cycle = grown_cycle(self.cycle, (self.num_symbols() + 6) << 3);
        self.until_rescale = self.cycle;
    }
}

/// Adaptive model for a single bit.
#[derive(Debug, Clone)]
pub struct ArithmeticBitModel {
    zeros: u32,
    total: u32,
    zero_probability: u32,
    cycle: u32,
    until_rescale: u32,
}

impl ArithmeticBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scaled probability of a 0.
    #[inline]
    pub(crate) fn zero_probability(&self) -> u32 {
        self.zero_probability
    }

    /// Records that `bit` was coded.
    #[inline]
    pub(crate) fn observe(&mut self, bit: u32) {
        if bit == 0 {
            self.zeros += 1;
        }
        self.until_rescale -= 1;
        if self.until_rescale == 0 {
            self.rescale();
        }
    }

    fn rescale(&mut self) {
        self.total += self.cycle;
        if self.total > BIT_MAX_TOTAL {
            self.total = (self.total + 1) >> 1;
            self.zeros = (self.zeros + 1) >> 1;
            if self.zeros == self.total {
                self.total += 1;
            }
        }

        let scale = 0x8000_0000u32 / self.total;
        self.zero_probability = (self.zeros * scale) >> (31 - BIT_LENGTH_SHIFT);

        self.cycle = grown_cycle(self.cycle, BIT_MAX_CYCLE);
        self.until_rescale = self.cycle;
    }
}

impl Default for ArithmeticBitModel {
    /// Both bits equally likely, with frequent updates at first.
    fn default() -> Self {
        Self {
            zeros: 1,
            total: 2,
            zero_probability: 1 << (BIT_LENGTH_SHIFT - 1),
            cycle: 4,
            until_rescale: 4,
        }
    }
}
