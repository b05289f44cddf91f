//! Fixed-capacity ring buffer backing the statistics window

/// FIFO ring buffer holding at most `N` items.
///
/// Slots are allocated once; pushing past capacity overwrites the oldest slot in
/// place and hands the evicted item back.
#[derive(Debug, Clone)]
pub struct SampleWindow<T, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    len: usize,
}

impl<T, const N: usize> Default for SampleWindow<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> SampleWindow<T, N> {
    pub fn new() -> Self {
        assert!(N > 0, "sample window capacity must be non-zero");
        Self { slots: std::array::from_fn(|_| None), head: 0, len: 0 }
    }

    /// Append an item, returning the evicted oldest item once full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.len < N {
            let index = (self.head + self.len) % N;
            self.slots[index] = Some(item);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % N;
            evicted
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|last| self.get(last))
    }

    pub fn newest_mut(&mut self) -> Option<&mut T> {
        let last = self.len.checked_sub(1)?;
        self.slots[(self.head + last) % N].as_mut()
    }

    /// Item at `position`, counted from the oldest.
    pub fn get(&self, position: usize) -> Option<&T> {
        if position >= self.len {
            return None;
        }
        self.slots[(self.head + position) % N].as_ref()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |position| self.get(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_then_evicts_oldest_first() {
        let mut window: SampleWindow<u32, 3> = SampleWindow::new();
        assert!(window.is_empty());
        assert_eq!(window.newest(), None);

        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);
        assert_eq!(window.len(), 3);

        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.push(5), Some(2));
        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(window.oldest(), Some(&3));
        assert_eq!(window.newest(), Some(&5));
    }

    #[test]
    fn newest_mut_updates_latest_slot() {
        let mut window: SampleWindow<u32, 2> = SampleWindow::new();
        window.push(10);
        window.push(20);
        window.push(30);
        if let Some(latest) = window.newest_mut() {
            *latest += 1;
        }
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![20, 31]);
        assert_eq!(window.get(2), None);
    }
}
