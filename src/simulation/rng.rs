//! Seed-threading pseudo-random stream.
//!
//! Every consumer of randomness takes a `&mut RandomStream` and advances it in
//! place. The stream is `Copy`, so forking a seed is just copying the value: the
//! copy replays exactly the draws the source stream would have produced.

use ndarray_rand::rand;

const MULTIPLIER: u32 = 747_796_405;
const INCREMENT: u32 = 2_891_336_453;

/// 32-bit PCG-style generator (LCG state, RXS-M-XS output permutation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomStream {
    state: u32,
}

impl RandomStream {
    /// Creates a stream from a seed. Equal seeds yield equal sequences.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Current raw state. Feeding it back into [`RandomStream::new`] resumes the
    /// sequence from this point.
    pub fn state(self) -> u32 {
        self.state
    }

    /// Returns an independent copy that will replay the upcoming draws.
    pub fn fork(self) -> Self {
        self
    }

    /// Next raw 32-bit output.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        let s = self.state;
        let word = ((s >> ((s >> 28) + 4)) ^ s).wrapping_mul(277_803_737);
        (word >> 22) ^ word
    }

    /// Uniform float in `[0, 1)` with 24 bits of precision.
    #[inline]
    pub fn next_uniform(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    /// Uniform integer in `[0, n)`.
    ///
    /// Draws are masked to the next power of two and rejected when out of range,
    /// so small `n` is not biased the way a plain modulo would be.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    #[inline]
    pub fn next_int(&mut self, n: usize) -> usize {
        assert!(n > 0, "next_int called with an empty range");
        let n = u32::try_from(n).expect("next_int range exceeds 32 bits");
        let mask = n.checked_next_power_of_two().map_or(u32::MAX, |p| p - 1);
        loop {
            let candidate = self.next_u32() & mask;
            if candidate < n {
                return candidate as usize;
            }
        }
    }

    /// Normal deviate via Box–Muller over two uniform draws.
    pub fn next_normal(&mut self, mean: f32, std: f32) -> f32 {
        // 1 - u lies in (0, 1], keeping ln() finite
        let u1 = 1.0 - f64::from(self.next_uniform());
        let u2 = f64::from(self.next_uniform());
        let radius = (-2.0 * u1.ln()).sqrt();
        let z = radius * (std::f64::consts::TAU * u2).cos();
        mean + std * z as f32
    }
}

impl rand::RngCore for RandomStream {
    fn next_u32(&mut self) -> u32 {
        RandomStream::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(RandomStream::next_u32(self));
        let lo = u64::from(RandomStream::next_u32(self));
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = RandomStream::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
