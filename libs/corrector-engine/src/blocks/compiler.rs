//! Block Compiler - Block Program to Sandbox Script
//!
//! **Core Responsibility:**
//! Turn a validated block tree into one script for the sandbox interpreter.
//!
//! **Translation Rules:**
//! - Every top-level script compiles in canvas order, following `next` chains
//! - Variables are declared once up front, initialised to unit
//! - Empty value slots take the editor's defaults (`0`, `""`, `false`)
//! - Division always produces a float, as the block editor does
//! - `text_print` output goes through `to_text`, the codec's canonical encoding
//! - Disabled blocks are skipped

use corrector_common::blocks::{Block, BlockProgram};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const VALUE_BLOCKS: &[&str] = &[
    "text",
    "text_join",
    "text_length",
    "math_number",
    "math_arithmetic",
    "math_modulo",
    "math_single",
    "logic_boolean",
    "logic_compare",
    "logic_operation",
    "logic_negate",
    "logic_null",
    "logic_ternary",
    "variables_get",
];

const STATEMENT_BLOCKS: &[&str] = &[
    "text_print",
    "controls_if",
    "controls_repeat",
    "controls_repeat_ext",
    "controls_whileUntil",
    "controls_for",
    "controls_flow_statements",
    "variables_set",
    "math_change",
];

const VARIABLE_BLOCKS: &[&str] = &["variables_get", "variables_set", "math_change", "controls_for"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Unsupported block type '{0}'")]
    UnsupportedBlock(String),
    #[error("Block '{block_type}' is missing its '{field}' field")]
    MissingField { block_type: String, field: String },
    #[error("Block '{block_type}' has an invalid '{field}' value '{value}'")]
    InvalidField {
        block_type: String,
        field: String,
        value: String,
    },
    #[error("Block '{0}' produces no value and cannot be plugged into an input")]
    NotAnExpression(String),
    #[error("Block '{0}' can only be used inside a loop")]
    OutsideLoop(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub source: String,
}

pub fn compile(program: &BlockProgram) -> Result<CompiledProgram, CompileError> {
    let mut compiler = Compiler::new(program)?;
    let declarations: Vec<String> = compiler
        .variables
        .values()
        .map(|ident| format!("let {} = ();", ident))
        .collect();
    for declaration in declarations {
        compiler.emit(declaration);
    }
    for script in &program.blocks {
        compiler.chain(script)?;
    }
    Ok(CompiledProgram {
        source: compiler.output,
    })
}

struct Compiler {
    variables: BTreeMap<String, String>,
    output: String,
    indent: usize,
    loop_depth: usize,
    next_id: usize,
}

impl Compiler {
    fn new(program: &BlockProgram) -> Result<Self, CompileError> {
        let mut names = BTreeSet::new();
        for block in program.iter() {
            if VARIABLE_BLOCKS.contains(&block.block_type.as_str()) {
                names.insert(required_field(block, "VAR")?.to_string());
            }
        }
        let variables = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let ident = format!("v{}_{}", index, sanitize(&name));
                (name, ident)
            })
            .collect();

        Ok(Self {
            variables,
            output: String::new(),
            indent: 0,
            loop_depth: 0,
            next_id: 0,
        })
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line.as_ref());
        self.output.push('\n');
    }

    fn unique_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn variable(&self, block: &Block) -> Result<String, CompileError> {
        let name = required_field(block, "VAR")?;
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::MissingField {
                block_type: block.block_type.clone(),
                field: "VAR".to_string(),
            })
    }

    /// Compile a statement and everything chained after it.
    fn chain(&mut self, first: &Block) -> Result<(), CompileError> {
        let mut current = Some(first);
        while let Some(block) = current {
            if !is_disabled(block) {
                self.statement(block)?;
            }
            current = block.next.as_deref();
        }
        Ok(())
    }

    fn body(&mut self, block: &Block, input: &str) -> Result<(), CompileError> {
        self.indent += 1;
        let result = match block.input_block(input) {
            Some(first) => self.chain(first),
            None => Ok(()),
        };
        self.indent -= 1;
        result
    }

    fn loop_body(&mut self, block: &Block, input: &str) -> Result<(), CompileError> {
        self.loop_depth += 1;
        let result = self.body(block, input);
        self.loop_depth -= 1;
        result
    }

    fn statement(&mut self, block: &Block) -> Result<(), CompileError> {
        match block.block_type.as_str() {
            "text_print" => {
                let text = self.value_or(block, "TEXT", "\"\"")?;
                self.emit(format!("print(to_text({}));", text));
            }
            "variables_set" => {
                let var = self.variable(block)?;
                let value = self.value_or(block, "VALUE", "0")?;
                self.emit(format!("{} = {};", var, value));
            }
            "math_change" => {
                let var = self.variable(block)?;
                let delta = self.value_or(block, "DELTA", "0")?;
                self.emit(format!(
                    "if type_of({0}) != \"i64\" && type_of({0}) != \"f64\" {{ {0} = 0; }}",
                    var
                ));
                self.emit(format!("{0} = {0} + {1};", var, delta));
            }
            "controls_if" => self.conditional(block)?,
            "controls_repeat" => {
                let raw = required_field(block, "TIMES")?;
                let times = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| invalid_field(block, "TIMES", raw))?;
                self.repeat(block, times.to_string())?;
            }
            "controls_repeat_ext" => {
                let times = self.value_or(block, "TIMES", "0")?;
                self.repeat(block, times)?;
            }
            "controls_whileUntil" => {
                let condition = self.value_or(block, "BOOL", "false")?;
                let condition = match required_field(block, "MODE")? {
                    "WHILE" => condition,
                    "UNTIL" => format!("!{}", condition),
                    other => return Err(invalid_field(block, "MODE", other)),
                };
                self.emit(format!("while {} {{", condition));
                self.loop_body(block, "DO")?;
                self.emit("}");
            }
            "controls_for" => self.counting_loop(block)?,
            "controls_flow_statements" => {
                if self.loop_depth == 0 {
                    return Err(CompileError::OutsideLoop(block.block_type.clone()));
                }
                match required_field(block, "FLOW")? {
                    "BREAK" => self.emit("break;"),
                    "CONTINUE" => self.emit("continue;"),
                    other => return Err(invalid_field(block, "FLOW", other)),
                }
            }
            other if VALUE_BLOCKS.contains(&other) => {
                let value = self.expression(block)?;
                self.emit(format!("{};", value));
            }
            other => return Err(CompileError::UnsupportedBlock(other.to_string())),
        }
        Ok(())
    }

    fn conditional(&mut self, block: &Block) -> Result<(), CompileError> {
        let else_ifs = match block.mutation.get("elseif") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid_field(block, "elseif", raw))?,
            None => 0,
        };
        let has_else = block.mutation.get("else").map(String::as_str) == Some("1")
            || has_input(block, "ELSE");

        let mut branch = 0;
        while branch <= else_ifs || has_input(block, &format!("IF{}", branch)) {
            let condition = self.value_or(block, &format!("IF{}", branch), "false")?;
            if branch == 0 {
                self.emit(format!("if {} {{", condition));
            } else {
                self.emit(format!("}} else if {} {{", condition));
            }
            self.body(block, &format!("DO{}", branch))?;
            branch += 1;
        }
        if has_else {
            self.emit("} else {");
            self.body(block, "ELSE")?;
        }
        self.emit("}");
        Ok(())
    }

    /// Counter loop; the counter advances first so `continue` cannot stall it.
    fn repeat(&mut self, block: &Block, times: String) -> Result<(), CompileError> {
        let id = self.unique_id();
        self.emit(format!("let r{}_times = {};", id, times));
        self.emit(format!("let r{}_done = 0;", id));
        self.emit(format!("while r{0}_done < r{0}_times {{", id));
        self.indent += 1;
        self.emit(format!("r{0}_done += 1;", id));
        self.indent -= 1;
        self.loop_body(block, "DO")?;
        self.emit("}");
        Ok(())
    }

    /// Inclusive count from FROM to TO in steps of |BY|, direction picked
    /// from the bounds. The step is applied at the top of every pass after
    /// the first, so `continue` still advances the variable.
    fn counting_loop(&mut self, block: &Block) -> Result<(), CompileError> {
        let var = self.variable(block)?;
        let from = self.value_or(block, "FROM", "0")?;
        let to = self.value_or(block, "TO", "0")?;
        let by = self.value_or(block, "BY", "1")?;
        let id = self.unique_id();

        self.emit(format!("let f{}_to = {};", id, to));
        self.emit(format!("let f{}_step = abs({});", id, by));
        self.emit(format!("{} = {};", var, from));
        self.emit(format!("let f{0}_up = {1} <= f{0}_to;", id, var));
        self.emit(format!("let f{}_first = true;", id));
        self.emit("loop {");
        self.indent += 1;
        self.emit(format!(
            "if f{0}_first {{ f{0}_first = false; }} else if f{0}_up {{ {1} = {1} + f{0}_step; }} else {{ {1} = {1} - f{0}_step; }}",
            id, var
        ));
        self.emit(format!(
            "if (f{0}_up && {1} > f{0}_to) || (!f{0}_up && {1} < f{0}_to) {{ break; }}",
            id, var
        ));
        self.indent -= 1;
        self.loop_body(block, "DO")?;
        self.emit("}");
        Ok(())
    }

    fn value_or(&mut self, block: &Block, input: &str, default: &str) -> Result<String, CompileError> {
        match block.input_block(input) {
            Some(child) if !is_disabled(child) => self.expression(child),
            _ => Ok(default.to_string()),
        }
    }

    fn expression(&mut self, block: &Block) -> Result<String, CompileError> {
        let code = match block.block_type.as_str() {
            "text" => string_literal(block.field("TEXT").unwrap_or_default()),
            "text_join" => {
                let items = match block.mutation.get("items") {
                    Some(raw) => raw
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid_field(block, "items", raw))?,
                    None => block
                        .inputs
                        .iter()
                        .filter(|input| input.name.starts_with("ADD"))
                        .count(),
                };
                if items == 0 {
                    "\"\"".to_string()
                } else {
                    let mut parts = Vec::with_capacity(items);
                    for index in 0..items {
                        let part = self.value_or(block, &format!("ADD{}", index), "\"\"")?;
                        parts.push(format!("to_text({})", part));
                    }
                    format!("({})", parts.join(" + "))
                }
            }
            "text_length" => {
                let value = self.value_or(block, "VALUE", "\"\"")?;
                format!("to_text({}).len()", value)
            }
            "math_number" => {
                let raw = required_field(block, "NUM")?;
                number_literal(raw).ok_or_else(|| invalid_field(block, "NUM", raw))?
            }
            "math_arithmetic" => {
                let a = self.value_or(block, "A", "0")?;
                let b = self.value_or(block, "B", "0")?;
                match required_field(block, "OP")? {
                    "ADD" => format!("({} + {})", a, b),
                    "MINUS" => format!("({} - {})", a, b),
                    "MULTIPLY" => format!("({} * {})", a, b),
                    "DIVIDE" => format!("(({} + 0.0) / {})", a, b),
                    "POWER" => format!("(({} + 0.0) ** {})", a, b),
                    other => return Err(invalid_field(block, "OP", other)),
                }
            }
            "math_modulo" => {
                let dividend = self.value_or(block, "DIVIDEND", "0")?;
                let divisor = self.value_or(block, "DIVISOR", "0")?;
                format!("({} % {})", dividend, divisor)
            }
            "math_single" => {
                let num = self.value_or(block, "NUM", "0")?;
                match required_field(block, "OP")? {
                    "ROOT" => format!("sqrt({} + 0.0)", num),
                    "ABS" => format!("abs({})", num),
                    "NEG" => format!("(-{})", num),
                    "LN" => format!("ln({} + 0.0)", num),
                    "LOG10" => format!("log({} + 0.0)", num),
                    "EXP" => format!("exp({} + 0.0)", num),
                    "POW10" => format!("(10.0 ** {})", num),
                    other => return Err(invalid_field(block, "OP", other)),
                }
            }
            "logic_boolean" => match required_field(block, "BOOL")? {
                "TRUE" => "true".to_string(),
                "FALSE" => "false".to_string(),
                other => return Err(invalid_field(block, "BOOL", other)),
            },
            "logic_compare" => {
                let operator = match required_field(block, "OP")? {
                    "EQ" => "==",
                    "NEQ" => "!=",
                    "LT" => "<",
                    "LTE" => "<=",
                    "GT" => ">",
                    "GTE" => ">=",
                    other => return Err(invalid_field(block, "OP", other)),
                };
                let a = self.value_or(block, "A", "0")?;
                let b = self.value_or(block, "B", "0")?;
                format!("({} {} {})", a, operator, b)
            }
            "logic_operation" => {
                let (operator, neutral) = match required_field(block, "OP")? {
                    "AND" => ("&&", "true"),
                    "OR" => ("||", "false"),
                    other => return Err(invalid_field(block, "OP", other)),
                };
                // both slots empty: false, one empty: the operator's neutral element
                let neutral = if block.input_block("A").is_none() && block.input_block("B").is_none() {
                    "false"
                } else {
                    neutral
                };
                let a = self.value_or(block, "A", neutral)?;
                let b = self.value_or(block, "B", neutral)?;
                format!("({} {} {})", a, operator, b)
            }
            "logic_negate" => {
                let value = self.value_or(block, "BOOL", "true")?;
                format!("(!{})", value)
            }
            "logic_null" => "()".to_string(),
            "logic_ternary" => {
                let condition = self.value_or(block, "IF", "false")?;
                let then = self.value_or(block, "THEN", "()")?;
                let otherwise = self.value_or(block, "ELSE", "()")?;
                format!("(if {} {{ {} }} else {{ {} }})", condition, then, otherwise)
            }
            "variables_get" => self.variable(block)?,
            other if STATEMENT_BLOCKS.contains(&other) => {
                return Err(CompileError::NotAnExpression(other.to_string()))
            }
            other => return Err(CompileError::UnsupportedBlock(other.to_string())),
        };
        Ok(code)
    }
}

fn required_field<'a>(block: &'a Block, field: &str) -> Result<&'a str, CompileError> {
    block.field(field).ok_or_else(|| CompileError::MissingField {
        block_type: block.block_type.clone(),
        field: field.to_string(),
    })
}

fn invalid_field(block: &Block, field: &str, value: &str) -> CompileError {
    CompileError::InvalidField {
        block_type: block.block_type.clone(),
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn has_input(block: &Block, name: &str) -> bool {
    block.inputs.iter().any(|input| input.name == name)
}

fn is_disabled(block: &Block) -> bool {
    block.attributes.get("disabled").map(String::as_str) == Some("true")
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn number_literal(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let literal = if let Ok(integer) = raw.parse::<i64>() {
        integer.to_string()
    } else {
        let float = raw.parse::<f64>().ok().filter(|f| f.is_finite())?;
        let mut text = float.to_string();
        if !text.contains('.') {
            text.push_str(".0");
        }
        text
    };
    if literal.starts_with('-') {
        Some(format!("({})", literal))
    } else {
        Some(literal)
    }
}

fn string_literal(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('"');
    for c in text.chars() {
        match c {
            '"' => literal.push_str("\\\""),
            '\\' => literal.push_str("\\\\"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if (c as u32) < 0x20 => literal.push_str(&format!("\\u{:04x}", c as u32)),
            c => literal.push(c),
        }
    }
    literal.push('"');
    literal
}
