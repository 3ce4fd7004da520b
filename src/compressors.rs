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

//! Integer compressor: codes the difference between a predicted and a real
//! integer value, adapting to the magnitude of the past corrections.

use std::io::Write;

use crate::encoders::ArithmeticEncoder;
use crate::models::{ArithmeticBitModel, ArithmeticModel};

pub const DEFAULT_BITS: u32 = 16;
pub const DEFAULT_CONTEXTS: u32 = 1;
pub const DEFAULT_BITS_HIGH: u32 = 8;
pub const DEFAULT_RANGE: u32 = 0;

/// Interval in which the corrector of a `bits` wide integer is folded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct CorrectorRange {
    pub(crate) bits: u32,
    pub(crate) range: u32,
    pub(crate) min: i32,
    pub(crate) max: i32,
}

impl CorrectorRange {
    fn centered(bits: u32, range: u32) -> Self {
        let min = -((range / 2) as i32);
        Self {
            bits,
            range,
            min,
            max: min + (range - 1) as i32,
        }
    }

    pub(crate) fn new(bits: u32, range: u32) -> Self {
        if range != 0 {
            // a power of two needs one bit less than its bit length
            let significant = 32 - range.leading_zeros();
            let bits = if range.is_power_of_two() {
                significant - 1
            } else {
                significant
            };
            Self::centered(bits, range)
        } else if (1..32).contains(&bits) {
            Self::centered(bits, 1u32 << bits)
        } else {
            Self {
                bits: 32,
                range: 0,
                min: i32::MIN,
                max: i32::MAX,
            }
        }
    }

    /// Models coding `k`, the number of significant bits of a corrector, one per context.
    pub(crate) fn k_models(&self, contexts: u32, compress: bool) -> Vec<ArithmeticModel> {
        (0..contexts)
            .map(|_| ArithmeticModel::new(self.bits + 1, compress))
            .collect()
    }

    /// Models coding the corrector once `k` is known.
    pub(crate) fn corrector_models(&self, bits_high: u32, compress: bool) -> Vec<ArithmeticModel> {
        (1..=self.bits)
            .map(|i| ArithmeticModel::new(1 << i.min(bits_high), compress))
            .collect()
    }
}

#[derive(Debug)]
pub struct IntegerCompressor {
    k: u32,
    bits_high: u32,
    corrector_range: CorrectorRange,

    k_coders: Vec<ArithmeticModel>,
    zero_or_one: ArithmeticBitModel,
    correctors: Vec<ArithmeticModel>,
}

impl IntegerCompressor {
    pub fn new(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        let corrector_range = CorrectorRange::new(bits, range);
        Self {
            k: 0,
            bits_high,
            k_coders: corrector_range.k_models(contexts, true),
            zero_or_one: ArithmeticBitModel::new(),
            correctors: corrector_range.corrector_models(bits_high, true),
            corrector_range,
        }
    }

    /// Number of significant bits of the last coded corrector
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn compress<T: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<T>,
        pred: i32,
        real: i32,
        context: u32,
    ) -> std::io::Result<()> {
        let range = &self.corrector_range;
        let mut c = real.wrapping_sub(pred);
        if c < range.min {
            c = c.wrapping_add(range.range as i32);
        } else if c > range.max {
            c = c.wrapping_sub(range.range as i32);
        }

        // k is the smallest number of bits such that -(2^k - 1) <= c <= 2^k
        let magnitude = if c <= 0 { c.wrapping_neg() as u32 } else { (c - 1) as u32 };
        self.k = 32 - magnitude.leading_zeros();

        encoder.encode_symbol(&mut self.k_coders[context as usize], self.k)?;

        if self.k == 0 {
            debug_assert!(c == 0 || c == 1);
            return encoder.encode_bit(&mut self.zero_or_one, c as u32);
        }
        if self.k == 32 {
            // only i32::MIN lands here, the decoder knows it from k alone
            return Ok(());
        }

        // shifted so that it fits in k bits
        let c = if c >= 0 {
            (c - 1) as u32
        } else {
            (c + ((1u32 << self.k) - 1) as i32) as u32
        };

        let model = &mut self.correctors[(self.k - 1) as usize];
        if self.k <= self.bits_high {
            encoder.encode_symbol(model, c)
        } else {
            // only the bits_high top bits are modelled
            let k1 = self.k - self.bits_high;
            let low = c & ((1u32 << k1) - 1);
            encoder.encode_symbol(model, c >> k1)?;
            encoder.write_bits(k1, low)
        }
    }
}

pub struct IntegerCompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerCompressorBuilder {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_BITS,
            contexts: DEFAULT_CONTEXTS,
            bits_high: DEFAULT_BITS_HIGH,
            range: DEFAULT_RANGE,
        }
    }

    pub fn bits(&mut self, bits: u32) -> &mut Self {
        self.bits = bits;
        self
    }

    pub fn contexts(&mut self, contexts: u32) -> &mut Self {
        self.contexts = contexts;
        self
    }

    pub fn build(&self) -> IntegerCompressor {
        IntegerCompressor::new(self.bits, self.contexts, self.bits_high, self.range)
    }
}

impl Default for IntegerCompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
