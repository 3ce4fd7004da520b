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

use std::io::Read;

use crate::compressors::{
    CorrectorRange, DEFAULT_BITS, DEFAULT_BITS_HIGH, DEFAULT_CONTEXTS, DEFAULT_RANGE,
};
use crate::decoders::ArithmeticDecoder;
use crate::models::{ArithmeticBitModel, ArithmeticModel};

#[derive(Debug, Clone)]
pub struct IntegerDecompressor {
    k: u32,
    bits_high: u32,
    corrector_range: CorrectorRange,

    k_coders: Vec<ArithmeticModel>,
    zero_or_one: ArithmeticBitModel,
    correctors: Vec<ArithmeticModel>,
}

impl IntegerDecompressor {
    pub fn new(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        let corrector_range = CorrectorRange::new(bits, range);
        Self {
            k: 0,
            bits_high,
            k_coders: corrector_range.k_models(contexts, false),
            zero_or_one: ArithmeticBitModel::new(),
            correctors: corrector_range.corrector_models(bits_high, false),
            corrector_range,
        }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn decompress<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        pred: i32,
        context: u32,
    ) -> std::io::Result<i32> {
        let corr = self.read_corrector(decoder, context)?;

        let range = self.corrector_range.range as i32;
        let mut real = pred.wrapping_add(corr);
        if real < 0 {
            real = real.wrapping_add(range);
        } else if range != 0 && real >= range {
            real -= range;
        }
        Ok(real)
    }

    fn read_corrector<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        context: u32,
    ) -> std::io::Result<i32> {
        self.k = decoder.decode_symbol(&mut self.k_coders[context as usize])?;

        if self.k == 0 {
            return Ok(decoder.decode_bit(&mut self.zero_or_one)? as i32);
        }
        if self.k >= 32 {
            return Ok(self.corrector_range.min);
        }

        let model = &mut self.correctors[(self.k - 1) as usize];
        let c: u32 = if self.k <= self.bits_high {
            decoder.decode_symbol(model)?
        } else {
            let k1 = self.k - self.bits_high;
            let high = decoder.decode_symbol(model)?;
            let low = decoder.read_bits(k1)?;
            high << k1 | low
        };
        let c = c as i32;

        // the upper half of the k-bit codes holds the positive correctors
        if c >= (1i32 << (self.k - 1)) {
            Ok(c.wrapping_add(1))
        } else {
            Ok(c.wrapping_sub(((1u32 << self.k) - 1) as i32))
        }
    }
}

pub struct IntegerDecompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerDecompressorBuilder {
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

    pub fn build(&self) -> IntegerDecompressor {
        IntegerDecompressor::new(self.bits, self.contexts, self.bits_high, self.range)
    }
}

impl Default for IntegerDecompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
