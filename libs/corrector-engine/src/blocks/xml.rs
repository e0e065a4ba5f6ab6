// Blockly XML workspace import
use corrector_common::blocks::{Block, BlockProgram, Field, Input, InputKind};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlImportError {
    #[error("syntax error: {0}")]
    Syntax(#[from] roxmltree::Error),
    #[error("bad block program: {0}")]
    BadProgram(Cow<'static, str>),
}

/// Parse a Blockly workspace (`<xml>…</xml>`) or a single `<block>` element.
pub fn parse_program(data: &str) -> Result<BlockProgram, XmlImportError> {
    let doc = roxmltree::Document::parse(data)?;
    let root = doc.root_element();
    match root.tag_name().name() {
        "xml" => {
            let blocks = root
                .children()
                .filter(|node| is_block(*node))
                .map(parse_block)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BlockProgram::new(blocks))
        }
        "block" | "shadow" => Ok(BlockProgram::new(vec![parse_block(root)?])),
        other => Err(XmlImportError::BadProgram(
            format!("unexpected root element <{} />", other).into(),
        )),
    }
}

fn is_block(node: roxmltree::Node<'_, '_>) -> bool {
    node.is_element() && matches!(node.tag_name().name(), "block" | "shadow")
}

fn required_attribute<'a>(
    node: roxmltree::Node<'a, '_>,
    name: &str,
) -> Result<&'a str, XmlImportError> {
    node.attribute(name).ok_or_else(|| {
        XmlImportError::BadProgram(
            format!(
                "{} attribute missing in <{} />",
                name,
                node.tag_name().name()
            )
            .into(),
        )
    })
}

fn parse_coordinate(node: roxmltree::Node<'_, '_>, name: &str) -> Result<Option<f64>, XmlImportError> {
    node.attribute(name)
        .map(|raw| {
            raw.trim().parse::<f64>().map_err(|_| {
                XmlImportError::BadProgram(format!("{} coordinate '{}' is not a number", name, raw).into())
            })
        })
        .transpose()
}

fn parse_block(node: roxmltree::Node<'_, '_>) -> Result<Block, XmlImportError> {
    let mut block = Block::new(required_attribute(node, "type")?);
    block.shadow = node.tag_name().name() == "shadow";
    block.id = node.attribute("id").map(str::to_string);
    block.x = parse_coordinate(node, "x")?;
    block.y = parse_coordinate(node, "y")?;
    for attribute in node.attributes() {
        if !matches!(attribute.name(), "type" | "id" | "x" | "y") {
            block
                .attributes
                .insert(attribute.name().to_string(), attribute.value().to_string());
        }
    }

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "field" => block.fields.push(Field {
                name: required_attribute(child, "name")?.to_string(),
                value: child.text().unwrap_or_default().to_string(),
            }),
            "value" | "statement" => {
                let kind = if child.tag_name().name() == "value" {
                    InputKind::Value
                } else {
                    InputKind::Statement
                };
                block.inputs.push(Input {
                    name: required_attribute(child, "name")?.to_string(),
                    kind,
                    block: slot_block(child)?.map(Box::new),
                });
            }
            "next" => block.next = slot_block(child)?.map(Box::new),
            "mutation" => {
                for attribute in child.attributes() {
                    block
                        .mutation
                        .insert(attribute.name().to_string(), attribute.value().to_string());
                }
            }
            // comments, data and other editor metadata
            _ => {}
        }
    }
    Ok(block)
}

/// A real block wins over the shadow default in the same slot.
fn slot_block(slot: roxmltree::Node<'_, '_>) -> Result<Option<Block>, XmlImportError> {
    let candidates: Vec<_> = slot.children().filter(|node| is_block(*node)).collect();
    let chosen = candidates
        .iter()
        .find(|node| node.tag_name().name() == "block")
        .or_else(|| candidates.first());
    chosen.map(|node| parse_block(*node)).transpose()
}
