/// Centered, overlapping analysis frames over a mono signal.
///
/// The signal is zero-padded by half a frame on each side so frame `i` is
/// centered on sample `i * hop`, and its time is `i * hop / sample_rate`.
pub struct Frames {
    padded: Vec<f32>,
    frame_length: usize,
    hop: usize,
    count: usize,
}

impl Frames {
    pub fn new(samples: &[f32], frame_length: usize, hop: usize) -> Self {
        let pad = frame_length / 2;
        let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
        padded.resize(pad, 0.0);
        padded.extend_from_slice(samples);
        padded.resize(padded.len() + pad, 0.0);

        let count = if samples.is_empty() || hop == 0 || padded.len() < frame_length {
            0
        } else {
            1 + (padded.len() - frame_length) / hop
        };

        Self {
            padded,
            frame_length,
            hop,
            count,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn frame(&self, i: usize) -> &[f32] {
        let start = i * self.hop;
        &self.padded[start..start + self.frame_length]
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }
}
