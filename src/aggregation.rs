use std::collections::VecDeque;

/// Running count per class index, remembered in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct EmotionTally {
    counts: Vec<(usize, u64)>,
    total: u64,
}

impl EmotionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, index: usize) {
        self.total += 1;
        match self.counts.iter_mut().find(|(seen, _)| *seen == index) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((index, 1)),
        }
    }

    pub fn count(&self, index: usize) -> u64 {
        self.counts
            .iter()
            .find(|(seen, _)| *seen == index)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Most frequent index; on a tie the one seen first wins.
    pub fn mode(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for &(index, count) in &self.counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((index, count)),
            }
        }
        best.map(|(index, _)| index)
    }
}

impl FromIterator<usize> for EmotionTally {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut tally = Self::new();
        for index in iter {
            tally.record(index);
        }
        tally
    }
}

pub fn most_common(indices: &[usize]) -> Option<usize> {
    indices.iter().copied().collect::<EmotionTally>().mode()
}

/// Per-connection history: an unbounded tally plus the most recent raw indices.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    tally: EmotionTally,
    recent: VecDeque<usize>,
    capacity: usize,
    frames: u64,
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            tally: EmotionTally::new(),
            recent: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            frames: 0,
        }
    }

    /// Appends every index of one frame, in detection order.
    pub fn record_frame(&mut self, indices: &[usize]) {
        self.frames += 1;
        for &index in indices {
            self.tally.record(index);
            if self.capacity == 0 {
                continue;
            }
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(index);
        }
    }

    pub fn recent(&self) -> Vec<usize> {
        self.recent.iter().copied().collect()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn detections(&self) -> u64 {
        self.tally.total()
    }

    pub fn mode(&self) -> Option<usize> {
        self.tally.mode()
    }
}
