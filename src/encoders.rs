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

//! Arithmetic encoder working on a 32-bit interval.
//!
//! The interval is kept as a `base` and a `length`. Whenever the length drops
//! below 2^24 its top byte is settled and shifted out.
//!
//! Settled bytes are staged in a ring made of two halves. A half reaches the
//! destination only once the other half starts being filled, a carry out of
//! `base` may still have to ripple back into the bytes of the current half.

use std::io::Write;

use crate::models::{ArithmeticBitModel, ArithmeticModel, BIT_LENGTH_SHIFT, SYMBOL_LENGTH_SHIFT};

/// Length of the interval of a fresh coder.
pub(crate) const FULL_INTERVAL: u32 = u32::MAX;
/// The interval is renormalized once its length falls below this.
pub(crate) const RENORM_THRESHOLD: u32 = 1 << 24;

const HALF_SIZE: usize = 1024;
const RING_SIZE: usize = 2 * HALF_SIZE;

pub struct ArithmeticEncoder<T: Write> {
    ring: Box<[u8; RING_SIZE]>,
    // next byte of the ring to settle
    cursor: usize,
    // when the cursor reaches this, a half is written out
    flush_at: usize,

    base: u32,
    length: u32,

    dst: T,
}

impl<T: Write> ArithmeticEncoder<T> {
    pub fn new(dst: T) -> Self {
        Self {
            ring: Box::new([0u8; RING_SIZE]),
            cursor: 0,
            flush_at: RING_SIZE,
            base: 0,
            length: FULL_INTERVAL,
            dst,
        }
    }

    /// Puts the encoder back in its initial state,
    /// bytes not yet flushed by [`done`](Self::done) are discarded.
    pub fn reset(&mut self) {
        self.ring.fill(0);
        self.cursor = 0;
        self.flush_at = RING_SIZE;
        self.base = 0;
        self.length = FULL_INTERVAL;
    }

    /// Terminates the code and writes every pending byte to the destination.
    ///
    /// The decoder always consumes exactly the bytes produced here,
    /// so after decoding the same symbols its source is positioned right
    /// after the encoded data.
    pub fn done(&mut self) -> std::io::Result<()> {
        // a final value inside the interval that needs as few bytes as possible
        let wide = self.length > 2 * RENORM_THRESHOLD;
        if wide {
            self.advance(RENORM_THRESHOLD);
            self.length = RENORM_THRESHOLD >> 1;
        } else {
            self.advance(RENORM_THRESHOLD >> 1);
            self.length = RENORM_THRESHOLD >> 9;
        }
        self.settle_bytes()?;

        if self.flush_at != RING_SIZE {
            // the upper half was filled before the wrap and is still pending
            self.dst.write_all(&self.ring[HALF_SIZE..])?;
        }
        self.dst.write_all(&self.ring[..self.cursor])?;

        // the decoder reads ahead of the last settled byte
        let padding: &[u8] = if wide { &[0, 0, 0] } else { &[0, 0] };
        self.dst.write_all(padding)
    }

    pub fn encode_bit(&mut self, model: &mut ArithmeticBitModel, bit: u32) -> std::io::Result<()> {
        debug_assert!(bit <= 1);
        let zero_length = model.zero_probability() * (self.length >> BIT_LENGTH_SHIFT);
        if bit == 0 {
            self.length = zero_length;
        } else {
            self.advance(zero_length);
            self.length -= zero_length;
        }
        model.observe(bit);
        self.renormalize()
    }

    pub fn encode_symbol(
        &mut self,
        model: &mut ArithmeticModel,
        symbol: u32,
    ) -> std::io::Result<()> {
        debug_assert!(symbol <= model.last_symbol());
        let low;
        if symbol == model.last_symbol() {
            // the interval of the last symbol extends to the end
            low = model.low(symbol) * (self.length >> SYMBOL_LENGTH_SHIFT);
            self.length -= low;
        } else {
            let unit = self.length >> SYMBOL_LENGTH_SHIFT;
            low = model.low(symbol) * unit;
            self.length = model.low(symbol + 1) * unit - low;
        }
        self.advance(low);
        model.observe(symbol);
        self.renormalize()
    }

    /// Writes the `bits` low bits of `value` as they are.
    pub fn write_bits(&mut self, bits: u32, value: u32) -> std::io::Result<()> {
        debug_assert!(bits > 0 && bits <= 32);
        debug_assert!(bits == 32 || value < (1u32 << bits));
        if bits > 19 {
            self.write_raw(16, value & 0xFFFF)?;
            self.write_raw(bits - 16, value >> 16)
        } else {
            self.write_raw(bits, value)
        }
    }

    fn write_raw(&mut self, bits: u32, value: u32) -> std::io::Result<()> {
        self.length >>= bits;
        self.advance(value * self.length);
        self.renormalize()
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.dst
    }

    pub fn get_ref(&self) -> &T {
        &self.dst
    }

    pub fn into_inner(self) -> T {
        self.dst
    }

    fn advance(&mut self, offset: u32) {
        let (base, carry) = self.base.overflowing_add(offset);
        self.base = base;
        if carry {
            self.propagate_carry();
        }
    }

    fn propagate_carry(&mut self) {
        let mut index = self.cursor;
        loop {
            index = index.checked_sub(1).unwrap_or(RING_SIZE - 1);
            let (byte, overflowed) = self.ring[index].overflowing_add(1);
            self.ring[index] = byte;
            if !overflowed {
                break;
            }
        }
    }

    #[inline]
    fn renormalize(&mut self) -> std::io::Result<()> {
        if self.length < RENORM_THRESHOLD {
            self.settle_bytes()?;
        }
        Ok(())
    }

    fn settle_bytes(&mut self) -> std::io::Result<()> {
        loop {
            self.ring[self.cursor] = (self.base >> 24) as u8;
            self.cursor += 1;
            if self.cursor == self.flush_at {
                self.flush_half()?;
            }
            self.base <<= 8;
            self.length <<= 8;
            if self.length >= RENORM_THRESHOLD {
                return Ok(());
            }
        }
    }

    fn flush_half(&mut self) -> std::io::Result<()> {
        if self.cursor == RING_SIZE {
            self.cursor = 0;
        }
        // the half about to be overwritten can no longer receive a carry
        let start = self.cursor;
        self.dst.write_all(&self.ring[start..start + HALF_SIZE])?;
        self.flush_at = start + HALF_SIZE;
        Ok(())
    }
}
