//! Undo/redo contract
//!
//! A linear command stack with a cursor. Everything before the cursor has
//! been applied; everything after it is the redo branch. Pushing a new
//! command drops the redo branch, which releases whatever those commands
//! still own.

/// A reversible edit against some target
pub trait Command {
    type Target: ?Sized;

    /// Perform (or re-perform) the edit
    fn apply(&mut self, target: &mut Self::Target);

    /// Undo the edit, restoring the target to its state before `apply`
    fn rollback(&mut self, target: &mut Self::Target);

    /// Short label for logs
    fn label(&self) -> &str {
        "command"
    }
}

/// Linear undo/redo stack
pub struct History<C: Command> {
    commands: Vec<C>,
    cursor: usize,
    /// Maximum number of retained commands (0 = unlimited)
    limit: usize,
}

impl<C: Command> Default for History<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command> History<C> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            cursor: 0,
            limit: 0,
        }
    }

    /// Keep at most `limit` commands, dropping the oldest first
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    /// Record an already-applied command, truncating the redo branch
    pub fn push(&mut self, command: C) {
        let pruned = self.commands.len() - self.cursor;
        if pruned > 0 {
            tracing::debug!("history: pruning {} redo entries", pruned);
        }
        self.commands.truncate(self.cursor);
        self.commands.push(command);
        self.cursor = self.commands.len();

        if self.limit > 0 && self.commands.len() > self.limit {
            let excess = self.commands.len() - self.limit;
            self.commands.drain(..excess);
            self.cursor -= excess;
        }
    }

    /// Apply a command to `target` and record it
    pub fn execute(&mut self, mut command: C, target: &mut C::Target) {
        command.apply(target);
        self.push(command);
    }

    /// Roll back the most recent applied command
    pub fn undo(&mut self, target: &mut C::Target) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let command = &mut self.commands[self.cursor];
        tracing::debug!("history: undo {}", command.label());
        command.rollback(target);
        true
    }

    /// Re-apply the next command on the redo branch
    pub fn redo(&mut self, target: &mut C::Target) -> bool {
        if self.cursor == self.commands.len() {
            return false;
        }
        let command = &mut self.commands[self.cursor];
        tracing::debug!("history: redo {}", command.label());
        command.apply(target);
        self.cursor += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// Current position in the stack
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every recorded command
    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Append(i32);

    impl Command for Append {
        type Target = Vec<i32>;

        fn apply(&mut self, target: &mut Vec<i32>) {
            target.push(self.0);
        }

        fn rollback(&mut self, target: &mut Vec<i32>) {
            target.pop();
        }
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut doc = Vec::new();
        let mut history = History::new();

        history.execute(Append(1), &mut doc);
        history.execute(Append(2), &mut doc);
        assert_eq!(doc, vec![1, 2]);

        assert!(history.undo(&mut doc));
        assert_eq!(doc, vec![1]);
        assert!(history.redo(&mut doc));
        assert_eq!(doc, vec![1, 2]);
        assert!(!history.redo(&mut doc));
    }

    #[test]
    fn test_push_truncates_redo_branch() {
        let mut doc = Vec::new();
        let mut history = History::new();

        history.execute(Append(1), &mut doc);
        history.execute(Append(2), &mut doc);
        history.undo(&mut doc);
        history.execute(Append(3), &mut doc);

        assert_eq!(doc, vec![1, 3]);
        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut doc = Vec::new();
        let mut history = History::with_limit(2);

        for i in 0..4 {
            history.execute(Append(i), &mut doc);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 2);

        assert!(history.undo(&mut doc));
        assert!(history.undo(&mut doc));
        assert!(!history.undo(&mut doc));
        assert_eq!(doc, vec![0, 1]);
    }
}
