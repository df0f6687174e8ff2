//! Gathers variable-sized audio blocks into fixed-size analysis frames.
//!
//! The buffer is sized once. Frames are taken oldest-first and only the
//! consumed samples are dropped, so audio that arrived after the frame
//! boundary is carried into the next cycle instead of being discarded.

#[derive(Debug, Clone, Default)]
pub struct SampleAccumulator {
    buffer: Vec<f32>,
    filled: usize,
    frame_len: usize,
}

impl SampleAccumulator {
    /// Creates an accumulator producing frames of `frame_len` samples.
    ///
    /// `headroom` extra samples of capacity let a whole host block land in
    /// one copy even when the buffer is almost full.
    pub fn new(frame_len: usize, headroom: usize) -> Self {
        Self {
            buffer: vec![0.0; frame_len + headroom],
            filled: 0,
            frame_len,
        }
    }

    /// Samples currently waiting.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_ready(&self) -> bool {
        self.frame_len > 0 && self.filled >= self.frame_len
    }

    /// Copies as much of `samples` as fits. Returns how many were taken.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let free = self.buffer.len() - self.filled;
        let taken = free.min(samples.len());
        self.buffer[self.filled..self.filled + taken].copy_from_slice(&samples[..taken]);
        self.filled += taken;
        taken
    }

    /// Moves the oldest frame into `out` and shifts the remainder forward.
    ///
    /// Returns `false` without touching anything when no full frame is
    /// available or `out` has the wrong length.
    pub fn pop_frame(&mut self, out: &mut [f32]) -> bool {
        if !self.is_ready() || out.len() != self.frame_len {
            return false;
        }
        out.copy_from_slice(&self.buffer[..self.frame_len]);
        self.buffer.copy_within(self.frame_len..self.filled, 0);
        self.filled -= self.frame_len;
        true
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}
