/// Linear undo/redo over whole-state snapshots.
///
/// Snapshots are owned values: pushing one moves it out of the caller's
/// reach, so later edits to the live state cannot reach back into history.
#[derive(Debug, Clone)]
pub struct History<T: Clone> {
    undo: Vec<T>,
    redo: Vec<T>,
    limit: Option<usize>,
}

impl<T: Clone> Default for History<T> {
    fn default() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: None,
        }
    }
}

impl<T: Clone> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` undo steps, dropping the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Record the state as it was before an edit. Clears redo.
    pub fn push(&mut self, before: T) {
        self.redo.clear();
        self.undo.push(before);
        if let Some(limit) = self.limit {
            if self.undo.len() > limit {
                let excess = self.undo.len() - limit;
                self.undo.drain(..excess);
            }
        }
    }

    /// Trade `current` for the most recent snapshot. `None` (and nothing
    /// recorded) at the bottom of history.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo.pop()?;
        self.redo.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
