//! Shadowed symbol table used for static shape inference during parsing.
//!
//! Every construct that introduces names opens a frame. Binding a name records
//! what it shadowed (or that it was absent) in the current frame, and closing
//! the frame restores exactly that.

use std::collections::{BTreeMap, HashMap};

use coil_expr::{Shape, Symbols};

#[derive(Debug, Default)]
pub struct SymbolTable {
    bindings: HashMap<String, Shape>,
    /// Per frame: each name bound in it, with the shape it shadowed.
    frames: Vec<Vec<(String, Option<Shape>)>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from a template's input shape: one binding per field.
    pub fn from_input(input: &Shape) -> Self {
        let mut table = Self::new();
        if let Shape::Object(fields) = input {
            for (name, shape) in fields.iter() {
                table.bind(name, shape.clone());
            }
        }
        table
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Close the current frame, restoring every name it shadowed.
    pub fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (name, previous) in frame.into_iter().rev() {
            match previous {
                Some(shape) => {
                    self.bindings.insert(name, shape);
                }
                None => {
                    self.bindings.remove(&name);
                }
            }
        }
    }

    /// Bind `name` in the current frame. Outside any frame the binding is permanent.
    pub fn bind(&mut self, name: &str, shape: Shape) {
        let previous = self.bindings.insert(name.to_string(), shape);
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.to_string(), previous));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.bindings.get(name)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Current bindings, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, Shape> {
        self.bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Symbols for SymbolTable {
    fn lookup(&self, name: &str) -> Option<Shape> {
        self.bindings.get(name).cloned()
    }
}
