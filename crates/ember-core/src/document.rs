//! Document tree for persisted descriptions.
//!
//! Serialized state (program descriptions, scene fragments) is written as a
//! tree of named elements with text content. Reading and writing the concrete
//! on-disk markup is the host application's concern; this layer only needs to
//! build and walk the tree.

/// A named node with text content and child elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Create an element with text content in one step.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Append a child and return a reference to it for further building.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        self.children.last_mut().unwrap()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given name, if any.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first child with the given name, if that child exists.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}
