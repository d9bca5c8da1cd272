//! Source-side IR: the Scratch program model handed to the converter.
//!
//! The upstream reader parses a Scratch project archive into these types;
//! this crate only consumes them. Instruction trees are the raw block lists
//! of the Scratch JSON format, lifted into the closed `ScriptElement`
//! variant type so the converter can pattern-match instead of inspecting
//! runtime shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STAGE_WIDTH_IN_PIXELS: i32 = 480;
pub const STAGE_HEIGHT_IN_PIXELS: i32 = 360;

// Script (hat) block identifiers. These only ever occur at the root of a
// script, never nested inside another instruction.
pub const SCRIPT_GREEN_FLAG: &str = "whenGreenFlag";
pub const SCRIPT_RECEIVE: &str = "whenIReceive";
pub const SCRIPT_KEY_PRESSED: &str = "whenKeyPressed";
pub const SCRIPT_SCENE_STARTS: &str = "whenSceneStarts";
pub const SCRIPT_CLICKED: &str = "whenClicked";
pub const SCRIPT_CLONED: &str = "whenCloned";
pub const SCRIPT_PROC_DEF: &str = "procDef";
pub const SCRIPT_SENSOR_GREATER_THAN: &str = "whenSensorGreaterThan";
pub const SCRIPT_BACKGROUND_SWITCHES_TO: &str = "whenBackgroundSwitchesTo";

pub const SCRIPTS: [&str; 9] = [
    SCRIPT_GREEN_FLAG,
    SCRIPT_RECEIVE,
    SCRIPT_KEY_PRESSED,
    SCRIPT_SCENE_STARTS,
    SCRIPT_CLICKED,
    SCRIPT_CLONED,
    SCRIPT_PROC_DEF,
    SCRIPT_SENSOR_GREATER_THAN,
    SCRIPT_BACKGROUND_SWITCHES_TO,
];

pub fn is_script_identifier(name: &str) -> bool {
    SCRIPTS.contains(&name)
}

/// An atomic block argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    /// Numeric view of the value. Booleans count as 0/1 and strings are
    /// parsed when they hold a plain number, matching how Scratch itself
    /// coerces reporter inputs.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Literal::Number(n) => Some(*n),
            Literal::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Literal::Text(s) => s.clone(),
        }
    }

    pub fn from_raw(value: &Value) -> Option<Literal> {
        match value {
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Literal::Number),
            Value::String(s) => Some(Literal::Text(s.clone())),
            _ => None,
        }
    }
}

/// One node of a Scratch instruction tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptElement {
    /// An instruction: identifier plus ordered arguments.
    Block { name: String, args: Vec<ScriptElement> },
    /// A literal argument.
    Value(Literal),
    /// A nested statement body (loop/branch/procedure body).
    List(Vec<ScriptElement>),
}

impl ScriptElement {
    pub fn block(name: &str, args: Vec<ScriptElement>) -> ScriptElement {
        ScriptElement::Block {
            name: name.to_string(),
            args,
        }
    }

    /// Lifts a raw Scratch JSON block tree into the variant type. A JSON
    /// array starting with a string is an instruction, any other array is
    /// a statement body. Absent bodies are serialized as `null` by Scratch
    /// and arrive here as an empty body.
    pub fn from_raw(value: &Value) -> ScriptElement {
        match value {
            Value::Array(items) => match items.first() {
                Some(Value::String(name)) => ScriptElement::Block {
                    name: name.clone(),
                    args: items[1..].iter().map(ScriptElement::from_raw).collect(),
                },
                _ => ScriptElement::List(items.iter().map(ScriptElement::from_raw).collect()),
            },
            Value::Null => ScriptElement::List(Vec::new()),
            other => match Literal::from_raw(other) {
                Some(lit) => ScriptElement::Value(lit),
                None => ScriptElement::List(Vec::new()),
            },
        }
    }
}

/// One Scratch script: a hat identifier, its raw arguments, and the body.
///
/// Hat arguments stay raw JSON because their shape varies per hat kind
/// (`procDef` carries nested label/default lists, `whenSensorGreaterThan`
/// may carry a whole expression block as its threshold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub trigger: String,
    pub arguments: Vec<Value>,
    pub body: ScriptElement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Costume {
    pub name: String,
    pub md5_name: String,
    pub resolution: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    pub name: String,
    pub md5_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableData {
    pub name: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListData {
    pub name: String,
    pub contents: Vec<Literal>,
}

/// Which construct observed a key being sensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySensingStyle {
    /// A `whenKeyPressed` hat script.
    EventScript,
    /// A `keyPressed:` reporter polled inside a formula.
    PollingBrick,
}

/// One Scratch object (the stage or a sprite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    pub is_stage: bool,
    pub scripts: Vec<Script>,
    pub variables: Vec<VariableData>,
    pub lists: Vec<ListData>,
    pub costumes: Vec<Costume>,
    pub sounds: Vec<Sound>,
    pub current_costume_index: Option<f64>,
    pub x: f64,
    pub y: f64,
    pub scale: Option<f64>,
    pub direction: Option<f64>,
    pub visible: Option<bool>,
    pub rotation_style: Option<String>,
    /// Variables with an on-screen monitor widget.
    pub visible_variables: Vec<String>,
}

impl Object {
    pub fn new(name: &str) -> Object {
        Object {
            name: name.to_string(),
            is_stage: false,
            scripts: Vec::new(),
            variables: Vec::new(),
            lists: Vec::new(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            current_costume_index: None,
            x: 0.0,
            y: 0.0,
            scale: None,
            direction: None,
            visible: None,
            rotation_style: None,
            visible_variables: Vec::new(),
        }
    }

    pub fn stage(name: &str) -> Object {
        let mut object = Object::new(name);
        object.is_stage = true;
        object
    }
}

/// A whole Scratch program. The stage, when present, is the first object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub objects: Vec<Object>,
    /// (key name, sensing style) pairs observed anywhere in the program,
    /// collected by the upstream reader. May contain the reserved key
    /// name "any".
    pub listened_keys: Vec<(String, KeySensingStyle)>,
    /// Whether any script reads the pointer position.
    pub has_mouse_position: bool,
}

impl Project {
    pub fn new(name: &str) -> Project {
        Project {
            name: name.to_string(),
            objects: Vec::new(),
            listened_keys: Vec::new(),
            has_mouse_position: false,
        }
    }

    pub fn stage(&self) -> Option<&Object> {
        self.objects.iter().find(|o| o.is_stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_block_becomes_instruction() {
        let element = ScriptElement::from_raw(&json!(["forward:", 10]));
        assert_eq!(
            element,
            ScriptElement::block("forward:", vec![ScriptElement::Value(Literal::Number(10.0))])
        );
    }

    #[test]
    fn raw_array_of_blocks_becomes_body() {
        let element = ScriptElement::from_raw(&json!([["show"], ["hide"]]));
        match element {
            ScriptElement::List(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0], ScriptElement::block("show", vec![]));
            }
            other => panic!("expected body, got {:?}", other),
        }
    }

    #[test]
    fn null_body_is_empty() {
        let element = ScriptElement::from_raw(&json!(null));
        assert_eq!(element, ScriptElement::List(Vec::new()));
    }

    #[test]
    fn literal_number_coercion() {
        assert_eq!(Literal::Text("  3.5 ".to_string()).as_number(), Some(3.5));
        assert_eq!(Literal::Bool(true).as_number(), Some(1.0));
        assert_eq!(Literal::Text("abc".to_string()).as_number(), None);
    }

    #[test]
    fn script_identifiers_are_recognized() {
        assert!(is_script_identifier(SCRIPT_GREEN_FLAG));
        assert!(is_script_identifier(SCRIPT_PROC_DEF));
        assert!(!is_script_identifier("forward:"));
    }
}
