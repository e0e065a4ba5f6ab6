use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A visual block program: the top-level scripts on the canvas, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockProgram {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl BlockProgram {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Pre-order walk over every block of every top-level script.
    pub fn iter(&self) -> Blocks<'_> {
        Blocks {
            stack: self.blocks.iter().rev().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// One node of a block program.
///
/// `id`, `x` and `y` only describe where the block sits in the editor and
/// never take part in grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shadow: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mutation: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<Block>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Value,
    Statement,
}

/// A named child slot: a value socket or a statement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<Block>>,
}

impl Block {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            id: None,
            x: None,
            y: None,
            shadow: false,
            attributes: BTreeMap::new(),
            mutation: BTreeMap::new(),
            fields: Vec::new(),
            inputs: Vec::new(),
            next: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_value(self, name: impl Into<String>, block: Block) -> Self {
        self.with_input(name, InputKind::Value, block)
    }

    pub fn with_statement(self, name: impl Into<String>, block: Block) -> Self {
        self.with_input(name, InputKind::Statement, block)
    }

    fn with_input(mut self, name: impl Into<String>, kind: InputKind, block: Block) -> Self {
        self.inputs.push(Input {
            name: name.into(),
            kind,
            block: Some(Box::new(block)),
        });
        self
    }

    pub fn with_mutation(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.mutation.insert(name.into(), value.into());
        self
    }

    pub fn with_next(mut self, block: Block) -> Self {
        self.next = Some(Box::new(block));
        self
    }

    pub fn as_shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    pub fn input_block(&self, name: &str) -> Option<&Block> {
        self.inputs
            .iter()
            .find(|input| input.name == name)
            .and_then(|input| input.block.as_deref())
    }

    /// Pre-order walk over this block, its inputs and its `next` chain.
    pub fn iter(&self) -> Blocks<'_> {
        Blocks { stack: vec![self] }
    }
}

/// Pre-order iterator: a block, then its inputs in slot order, then `next`.
pub struct Blocks<'a> {
    stack: Vec<&'a Block>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.stack.pop()?;
        if let Some(next) = block.next.as_deref() {
            self.stack.push(next);
        }
        for input in block.inputs.iter().rev() {
            if let Some(child) = input.block.as_deref() {
                self.stack.push(child);
            }
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preorder_walk() {
        let program = BlockProgram::new(vec![
            Block::new("controls_repeat_ext")
                .with_value("TIMES", Block::new("math_number").with_field("NUM", "3"))
                .with_statement("DO", Block::new("text_print"))
                .with_next(Block::new("text_print")),
            Block::new("variables_get"),
        ]);

        let types: Vec<&str> = program.iter().map(|b| b.block_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "controls_repeat_ext",
                "math_number",
                "text_print",
                "text_print",
                "variables_get"
            ]
        );
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "blocks": [{
                "type": "text_print",
                "id": "a1",
                "x": 10,
                "y": 20,
                "inputs": [{"name": "TEXT", "block": {"type": "text", "fields": [{"name": "TEXT", "value": "hi"}]}}]
            }]
        }"#;
        let program: BlockProgram = serde_json::from_str(json).unwrap();
        let print = &program.blocks[0];
        assert_eq!(print.id.as_deref(), Some("a1"));
        assert_eq!(print.inputs[0].kind, InputKind::Value);
        assert_eq!(print.input_block("TEXT").unwrap().field("TEXT"), Some("hi"));
    }
}
