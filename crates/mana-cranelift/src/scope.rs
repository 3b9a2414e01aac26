//! Lexical scope stack used while lowering a function body.

use std::collections::HashMap;

#[derive(Debug)]
pub struct Scopes<T> {
    frames: Vec<HashMap<String, T>>,
}

impl<T> Default for Scopes<T> {
    fn default() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }
}

impl<T> Scopes<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame. The outermost frame is never removed.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind `name` in the innermost frame, shadowing outer bindings and
    /// replacing an earlier binding in the same frame.
    pub fn declare(&mut self, name: impl Into<String>, value: T) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut scopes = Scopes::new();
        scopes.declare("x", 1);
        scopes.push();
        scopes.declare("x", 2);
        assert_eq!(scopes.lookup("x"), Some(&2));
        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(&1));
    }

    #[test]
    fn test_bindings_end_with_their_frame() {
        let mut scopes = Scopes::new();
        scopes.push();
        scopes.declare("y", 1);
        scopes.pop();
        assert_eq!(scopes.lookup("y"), None);
    }

    #[test]
    fn test_outermost_frame_survives_pop() {
        let mut scopes = Scopes::new();
        scopes.declare("a", 1);
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
        assert_eq!(scopes.lookup("a"), Some(&1));
    }
}
