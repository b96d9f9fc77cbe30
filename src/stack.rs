//! Bounded stack of owned values, used for the `(`/`)` image-list stack and
//! the `{`/`}` settings stack.
//!
//! A push that would exceed the bound hands the value back untouched, so the
//! caller's state is exactly what it was before the attempt.

use thiserror::Error;

/// Maximum nesting depth of either stack.
pub const MAX_STACK_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("stack depth limit of {0} reached")]
    TooDeep(usize),
    #[error("stack is empty")]
    Empty,
}

/// A push that was refused; carries the value back to the caller.
#[derive(Debug)]
pub struct Rejected<T> {
    pub value: T,
    pub error: StackError,
}

#[derive(Debug, Clone)]
pub struct BoundedStack<T> {
    frames: Vec<T>,
    limit: usize,
}

impl<T> Default for BoundedStack<T> {
    fn default() -> Self {
        Self::new(MAX_STACK_DEPTH)
    }
}

impl<T> BoundedStack<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            limit,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.limit
    }

    pub fn push(&mut self, value: T) -> Result<(), Rejected<T>> {
        if self.is_full() {
            return Err(Rejected {
                value,
                error: StackError::TooDeep(self.limit),
            });
        }
        self.frames.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, StackError> {
        self.frames.pop().ok_or(StackError::Empty)
    }

    pub fn top(&self) -> Option<&T> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut T> {
        self.frames.last_mut()
    }

    /// Remove every frame, innermost first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.frames.drain(..).rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = BoundedStack::new(4);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.top(), Some(&2));
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
        assert_eq!(stack.pop().unwrap_err(), StackError::Empty);
    }

    #[test]
    fn overflow_returns_the_value() {
        let mut stack = BoundedStack::new(2);
        stack.push("a").unwrap();
        stack.push("b").unwrap();
        let rejected = stack.push("c").unwrap_err();
        assert_eq!(rejected.value, "c");
        assert_eq!(rejected.error, StackError::TooDeep(2));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn default_limit_is_thirty_two() {
        let mut stack = BoundedStack::default();
        for i in 0..MAX_STACK_DEPTH {
            stack.push(i).unwrap();
        }
        assert!(stack.is_full());
        assert!(stack.push(99).is_err());
        assert_eq!(stack.depth(), 32);
    }

    #[test]
    fn drain_is_innermost_first() {
        let mut stack = BoundedStack::new(4);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        let drained: Vec<_> = stack.drain().collect();
        assert_eq!(drained, vec![2, 1]);
        assert!(stack.is_empty());
    }
}
