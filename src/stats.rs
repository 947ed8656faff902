/// Occupancy statistics for hash table analysis.
///
/// Available with the `stats` feature.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Number of live entries
    pub populated: usize,
    /// Number of buckets or slots (prime)
    pub capacity: usize,
    /// Buckets holding at least one entry, or slots in the Valid state
    pub occupied: usize,
    /// Slots in the Deleted state; always 0 for chaining
    pub tombstones: usize,
    /// Longest chain, or longest run of consecutive non-empty slots
    pub longest_run: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
}

impl TableStats {
    /// Pretty-print the statistics.
    pub fn print(&self) {
        println!("=== Hash Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Occupied: {} buckets, {} tombstones",
            self.occupied, self.tombstones
        );
        println!("Longest run: {}", self.longest_run);
    }
}

/// Longest run of `true` in `occupied`, counting runs that wrap around the
/// end of the array.
pub(crate) fn longest_wrapping_run(occupied: impl Iterator<Item = bool> + Clone) -> usize {
    let total = occupied.clone().count();
    let mut longest = 0;
    let mut current = 0;
    let mut leading = None;
    for is_set in occupied {
        if is_set {
            current += 1;
        } else {
            if leading.is_none() {
                leading = Some(current);
            }
            longest = longest.max(current);
            current = 0;
        }
    }

    match leading {
        None => total,
        Some(leading) => longest.max(current + leading),
    }
}
