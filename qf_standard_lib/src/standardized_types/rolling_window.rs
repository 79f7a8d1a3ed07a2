use std::collections::VecDeque;

/// Fixed capacity history, newest first. Index 0 is the most recent item.
#[derive(Clone, Debug)]
pub struct RollingWindow<T> {
    history: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        RollingWindow {
            history: VecDeque::new(),
            capacity,
        }
    }

    pub fn add(&mut self, data: T) {
        self.history.push_front(data);
        if self.history.len() > self.capacity {
            self.history.pop_back();
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.history.front()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.history.get(index)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.history.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.history.iter()
    }
}
