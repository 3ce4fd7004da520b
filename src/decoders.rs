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

//! Arithmetic decoder, the counterpart of [`ArithmeticEncoder`](crate::encoders::ArithmeticEncoder).

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::encoders::{FULL_INTERVAL, RENORM_THRESHOLD};
use crate::models::{ArithmeticBitModel, ArithmeticModel, BIT_LENGTH_SHIFT, SYMBOL_LENGTH_SHIFT};

pub struct ArithmeticDecoder<T: Read> {
    src: T,
    // distance from the bottom of the interval to the coded value
    value: u32,
    length: u32,
}

impl<T: Read> ArithmeticDecoder<T> {
    pub fn new(src: T) -> Self {
        Self {
            src,
            value: 0,
            length: FULL_INTERVAL,
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.length = FULL_INTERVAL;
    }

    /// Reads the 4 bytes that prime the decoder.
    ///
    /// Must be called once before decoding the first symbol of a stream
    /// (and after each [`reset`](Self::reset)).
    pub fn read_init_bytes(&mut self) -> std::io::Result<()> {
        self.value = self.src.read_u32::<BigEndian>()?;
        Ok(())
    }

    pub fn decode_bit(&mut self, model: &mut ArithmeticBitModel) -> std::io::Result<u32> {
        let zero_length = model.zero_probability() * (self.length >> BIT_LENGTH_SHIFT);
        let bit = if self.value < zero_length {
            self.length = zero_length;
            0
        } else {
            self.value -= zero_length;
            self.length -= zero_length;
            1
        };
        model.observe(bit);
        self.renormalize()?;
        Ok(bit)
    }

    pub fn decode_symbol(&mut self, model: &mut ArithmeticModel) -> std::io::Result<u32> {
        let unit = self.length >> SYMBOL_LENGTH_SHIFT;
        let (symbol, low, high) = match model.candidates(self.value / unit) {
            Some(candidates) => self.search_candidates(model, unit, candidates),
            None => self.bisect(model, unit),
        };

        self.value -= low;
        self.length = high - low;
        model.observe(symbol);
        self.renormalize()?;
        Ok(symbol)
    }

    /// Finds the symbol among `first..end` and returns it with its interval.
    fn search_candidates(
        &self,
        model: &ArithmeticModel,
        unit: u32,
        (mut first, mut end): (u32, u32),
    ) -> (u32, u32, u32) {
        let scaled_value = self.value / unit;
        while end > first + 1 {
            let middle = (first + end) >> 1;
            if model.low(middle) > scaled_value {
                end = middle;
            } else {
                first = middle;
            }
        }

        let high = if first == model.last_symbol() {
            self.length
        } else {
            model.low(first + 1) * unit
        };
        (first, model.low(first) * unit, high)
    }

    /// Bisects the whole distribution, keeping track of the interval bounds.
    fn bisect(&self, model: &ArithmeticModel, unit: u32) -> (u32, u32, u32) {
        let (mut symbol, mut low) = (0, 0);
        let (mut end, mut high) = (model.num_symbols(), self.length);
        let mut middle = end >> 1;
        while middle != symbol {
            let bound = model.low(middle) * unit;
            if bound > self.value {
                end = middle;
                high = bound;
            } else {
                symbol = middle;
                low = bound;
            }
            middle = (symbol + end) >> 1;
        }
        (symbol, low, high)
    }

    /// Reads `bits` raw bits (no modelling).
    pub fn read_bits(&mut self, bits: u32) -> std::io::Result<u32> {
        debug_assert!(bits > 0 && bits <= 32);
        if bits > 19 {
            let low = self.read_raw(16)?;
            let high = self.read_raw(bits - 16)?;
            Ok(high << 16 | low)
        } else {
            self.read_raw(bits)
        }
    }

    fn read_raw(&mut self, bits: u32) -> std::io::Result<u32> {
        self.length >>= bits;
        let quotient = self.value / self.length;
        self.value -= self.length * quotient;
        self.renormalize()?;
        // corrupted input can make the quotient overflow `bits`
        Ok(quotient & (u32::MAX >> (32 - bits)))
    }

    #[inline]
    fn renormalize(&mut self) -> std::io::Result<()> {
        while self.length < RENORM_THRESHOLD {
            self.value = (self.value << 8) | u32::from(self.src.read_u8()?);
            self.length <<= 8;
        }
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.src
    }

    pub fn get_ref(&self) -> &T {
        &self.src
    }

    pub fn into_inner(self) -> T {
        self.src
    }
}
