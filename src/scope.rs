use crate::value::Value;
use std::collections::HashMap;

/// Nested variable scope: an ordered stack of name→value frames. Lookup
/// walks innermost-to-outermost; declarations land in the innermost frame
/// only, shadowing outer bindings instead of overwriting them.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    /// Create a scope whose top frame is seeded with the given variables
    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self {
            frames: vec![variables],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the root frame");
        self.frames.pop();
    }

    /// Bind a name in the innermost frame
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut scope = Scope::new();
        scope.declare("a", Value::Int(1));
        scope.push();
        scope.declare("b", Value::Int(2));

        assert_eq!(scope.lookup("a"), Some(&Value::Int(1)));
        assert_eq!(scope.lookup("b"), Some(&Value::Int(2)));
        assert_eq!(scope.lookup("c"), None);
    }

    #[test]
    fn test_shadowing_not_mutation() {
        let mut scope = Scope::new();
        scope.declare("x", Value::Int(1));
        scope.push();
        scope.declare("x", Value::Int(2));
        assert_eq!(scope.lookup("x"), Some(&Value::Int(2)));

        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_binding_dropped_after_pop() {
        let mut scope = Scope::new();
        scope.push();
        scope.declare("loop_var", Value::Int(1));
        scope.pop();
        assert_eq!(scope.lookup("loop_var"), None);
    }
}
