// Linear probe sequence over a table of `capacity` slots.
//
// Starts at the hashed index and walks forward one slot at a time, wrapping
// at the end of the array. The sequence ends after visiting every slot once;
// running off the end means the table had no empty slot left.
#[derive(Clone, Debug)]
pub(crate) struct Probe {
    // The current index in the probe sequence.
    i: usize,
    // Number of slots visited so far.
    len: usize,
    capacity: usize,
}

impl Probe {
    #[inline]
    pub(crate) fn start(index: usize, capacity: usize) -> Probe {
        debug_assert!(index < capacity || capacity == 0);
        Probe {
            i: index,
            len: 0,
            capacity,
        }
    }
}

impl Iterator for Probe {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.len == self.capacity {
            return None;
        }

        let current = self.i;
        self.len += 1;
        self.i += 1;
        if self.i == self.capacity {
            self.i = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.capacity - self.len;
        (remaining, Some(remaining))
    }
}
