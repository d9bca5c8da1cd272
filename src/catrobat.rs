//! Target-side IR: the Catrobat program graph the converter produces.
//!
//! The graph is fully linked and ready for the downstream XML serializer;
//! nothing in this crate writes bytes. Structural brick pairs (loop
//! begin/end, if/else/end) carry `BrickId` back-references instead of
//! mutual pointers, so the graph stays acyclic and plain-old-data.

use anyhow::{bail, ensure, Result};
use regex::Regex;
use serde::Serialize;

use crate::scratch::Literal;

/// Prefix for variables this converter synthesizes itself, so they can be
/// told apart from variables the Scratch author declared.
pub const GENERATED_VARIABLE_PREFIX: &str = "s2cc:";

pub fn generated_variable_name(name: &str) -> String {
    format!("{}{}", GENERATED_VARIABLE_PREFIX, name)
}

pub fn is_generated_variable(name: &str) -> bool {
    name.starts_with(GENERATED_VARIABLE_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Plus,
    Minus,
    Mult,
    Divide,
    SmallerThan,
    Equal,
    GreaterThan,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Function {
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Exp,
    Ln,
    Log,
    Round,
    Rand,
    Mod,
    Floor,
    Ceil,
    ListItem,
    NumberOfItems,
    Contains,
    Length,
    Letter,
    Join,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sensor {
    ObjectX,
    ObjectY,
    ObjectRotation,
    ObjectSize,
    ObjectBackgroundName,
    ObjectBackgroundNumber,
    ObjectLookName,
    ObjectLookNumber,
    FingerTouched,
    FingerX,
    FingerY,
    CollidesWithFinger,
    CollidesWithEdge,
    Loudness,
    TimeSecond,
    TimeMinute,
    TimeHour,
    DateWeekday,
    DateDay,
    DateMonth,
    DateYear,
}

/// One node of a Catrobat formula tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FormulaElement {
    Number(f64),
    Text(String),
    UserVariable(String),
    UserList(String),
    Sensor(Sensor),
    /// Collision test against the named object.
    Collision(String),
    Bracket(Box<FormulaElement>),
    UnaryOp {
        op: Operator,
        child: Box<FormulaElement>,
    },
    BinaryOp {
        op: Operator,
        left: Box<FormulaElement>,
        right: Box<FormulaElement>,
    },
    Function {
        function: Function,
        args: Vec<FormulaElement>,
    },
}

impl FormulaElement {
    pub fn number(value: f64) -> FormulaElement {
        FormulaElement::Number(value)
    }

    pub fn text(value: &str) -> FormulaElement {
        FormulaElement::Text(value.to_string())
    }

    pub fn variable(name: &str) -> FormulaElement {
        FormulaElement::UserVariable(name.to_string())
    }

    pub fn list(name: &str) -> FormulaElement {
        FormulaElement::UserList(name.to_string())
    }

    pub fn sensor(sensor: Sensor) -> FormulaElement {
        FormulaElement::Sensor(sensor)
    }

    pub fn collision(object_name: &str) -> FormulaElement {
        FormulaElement::Collision(object_name.to_string())
    }

    pub fn bracket(child: FormulaElement) -> FormulaElement {
        FormulaElement::Bracket(Box::new(child))
    }

    pub fn unary(op: Operator, child: FormulaElement) -> FormulaElement {
        FormulaElement::UnaryOp {
            op,
            child: Box::new(child),
        }
    }

    pub fn binary(op: Operator, left: FormulaElement, right: FormulaElement) -> FormulaElement {
        FormulaElement::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn function(function: Function, args: Vec<FormulaElement>) -> FormulaElement {
        FormulaElement::Function { function, args }
    }

    /// Literal values become number leaves whenever they read as numbers,
    /// the way Scratch coerces reporter slots; everything else stays text.
    pub fn from_literal(literal: &Literal) -> FormulaElement {
        match literal {
            Literal::Bool(b) => FormulaElement::Number(if *b { 1.0 } else { 0.0 }),
            Literal::Number(n) => FormulaElement::Number(*n),
            Literal::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if !s.trim().is_empty() => FormulaElement::Number(n),
                _ => FormulaElement::Text(s.clone()),
            },
        }
    }
}

/// Identity of a structural brick, used for begin/end back-references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BrickId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RotationStyle {
    LeftRight,
    AllAround,
    DontRotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopOption {
    ThisScript,
    All,
    OtherScripts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GoToTarget {
    TouchPosition,
    RandomPosition,
    Object(String),
}

/// One executable Catrobat brick.
///
/// Loop and branch bodies are not nested: a body is the flat run of bricks
/// between its begin brick and the matching end brick, exactly as Catrobat
/// scripts store them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Brick {
    // events and control
    Broadcast { message: String },
    BroadcastAndWait { message: String },
    Wait { millis: FormulaElement },
    WaitUntil { condition: FormulaElement },
    Forever { id: BrickId, end: BrickId },
    Repeat { id: BrickId, times: FormulaElement, end: BrickId },
    RepeatUntil { id: BrickId, condition: FormulaElement, end: BrickId },
    LoopEnd { id: BrickId, start: BrickId },
    IfThenBegin { id: BrickId, condition: FormulaElement, end: BrickId },
    IfThenEnd { id: BrickId, begin: BrickId },
    IfElseBegin { id: BrickId, condition: FormulaElement, else_branch: BrickId, end: BrickId },
    IfElse { id: BrickId, begin: BrickId, end: BrickId },
    IfElseEnd { id: BrickId, begin: BrickId, else_branch: BrickId },
    StopScript { option: StopOption },
    Clone { object: String },
    DeleteThisClone,
    /// Non-executable marker carrying diagnostic text for a construct the
    /// conversion could not express.
    Note { text: String },

    // motion
    PlaceAt { x: FormulaElement, y: FormulaElement },
    SetX { value: FormulaElement },
    SetY { value: FormulaElement },
    ChangeXBy { delta: FormulaElement },
    ChangeYBy { delta: FormulaElement },
    MoveNSteps { steps: FormulaElement },
    TurnLeft { degrees: FormulaElement },
    TurnRight { degrees: FormulaElement },
    PointInDirection { degrees: FormulaElement },
    PointTo { object: String },
    GoTo { target: GoToTarget },
    Glide { x: FormulaElement, y: FormulaElement, millis: FormulaElement },
    IfOnEdgeBounce,
    SetRotationStyle { style: RotationStyle },

    // looks
    SetLook { look: String },
    SetLookByIndex { index: FormulaElement },
    NextLook,
    PreviousLook,
    SetBackground { look: String },
    SetBackgroundAndWait { look: String },
    SetBackgroundByIndex { index: FormulaElement },
    SetBackgroundByIndexAndWait { index: FormulaElement },
    SetSizeTo { percent: FormulaElement },
    ChangeSizeBy { delta: FormulaElement },
    Show,
    Hide,
    ComeToFront,
    GoBackLayers { layers: FormulaElement },
    SetBrightness { percent: FormulaElement },
    ChangeBrightnessBy { delta: FormulaElement },
    SetTransparency { percent: FormulaElement },
    ChangeTransparencyBy { delta: FormulaElement },
    SetColor { value: FormulaElement },
    ChangeColorBy { delta: FormulaElement },
    ClearGraphicEffects,
    Say { text: FormulaElement },
    SayFor { text: FormulaElement, duration_secs: FormulaElement },
    Think { text: FormulaElement },
    ThinkFor { text: FormulaElement, duration_secs: FormulaElement },
    ChooseCamera { front: bool },
    Camera { on: bool },

    // sound
    PlaySound { sound: String },
    PlaySoundAndWait { sound: String },
    StopAllSounds,
    SetVolumeTo { percent: FormulaElement },
    ChangeVolumeBy { delta: FormulaElement },

    // variables and lists
    SetVariable { variable: String, value: FormulaElement },
    ChangeVariable { variable: String, delta: FormulaElement },
    ShowVariable { variable: String, x: i32, y: i32 },
    HideVariable { variable: String },
    AddItemToList { list: String, value: FormulaElement },
    InsertItemIntoList { list: String, index: FormulaElement, value: FormulaElement },
    DeleteItemOfList { list: String, index: FormulaElement },
    ReplaceItemInList { list: String, index: FormulaElement, value: FormulaElement },

    // sensing and pen
    Ask { question: FormulaElement, answer_variable: String },
    PenDown,
    PenUp,
    Stamp,
    ClearBackground,
    SetPenColor { red: FormulaElement, green: FormulaElement, blue: FormulaElement },
    SetPenSize { size: FormulaElement },

    // user-defined procedures
    UserBrickCall { header: String, arguments: Vec<FormulaElement> },
}

impl Brick {
    pub fn note(text: impl Into<String>) -> Brick {
        Brick::Note { text: text.into() }
    }
}

/// A script's activation condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Trigger {
    ProgramStart,
    Tapped,
    BroadcastReceived { message: String },
    Cloned,
    Condition { condition: FormulaElement },
    BackgroundChangesTo { look: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    pub trigger: Trigger,
    pub bricks: Vec<Brick>,
}

impl Script {
    pub fn new(trigger: Trigger) -> Script {
        Script {
            trigger,
            bricks: Vec::new(),
        }
    }
}

/// Kind of a user-defined procedure parameter, from its `%n`/`%s`/`%b`
/// placeholder in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Number,
    Text,
    Boolean,
}

impl ParamKind {
    pub fn from_token(token: &str) -> Option<ParamKind> {
        match token {
            "%n" => Some(ParamKind::Number),
            "%s" => Some(ParamKind::Text),
            "%b" => Some(ParamKind::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HeaderElement {
    Label(String),
    Parameter { label: String, kind: ParamKind },
}

/// A user-defined procedure: the header layout is computed exactly once
/// (first occurrence of a call or the definition), the body exactly once
/// (at the definition). All call sites share this template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureDefinition {
    pub header: String,
    pub elements: Vec<HeaderElement>,
    pub defaults: Vec<FormulaElement>,
    pub body: Vec<Brick>,
}

impl ProcedureDefinition {
    /// Builds the template layout from the raw header text and the declared
    /// parameter labels. Escaped percent signs (`\%`) are plain text and do
    /// not open a parameter slot.
    pub fn from_header(header: &str, labels: &[String]) -> Result<ProcedureDefinition> {
        let filtered = header.replace("\\%", "");
        let placeholder_re = Regex::new(r"%[nsb]")?;
        let param_count = placeholder_re.find_iter(&filtered).count();
        ensure!(
            labels.is_empty() || labels.len() == param_count,
            "procedure header '{}' declares {} parameters but {} labels were given",
            header,
            param_count,
            labels.len()
        );

        let mut elements = Vec::new();
        let mut param_index = 0;
        for part in filtered.split_whitespace() {
            if part.starts_with('%') {
                let Some(kind) = ParamKind::from_token(part) else {
                    bail!("unknown parameter placeholder '{}' in header '{}'", part, header);
                };
                let label = labels
                    .get(param_index)
                    .cloned()
                    .unwrap_or_else(|| format!("param{}", param_index + 1));
                elements.push(HeaderElement::Parameter { label, kind });
                param_index += 1;
            } else {
                elements.push(HeaderElement::Label(part.to_string()));
            }
        }

        Ok(ProcedureDefinition {
            header: header.to_string(),
            elements,
            defaults: Vec::new(),
            body: Vec::new(),
        })
    }

    pub fn param_kinds(&self) -> Vec<ParamKind> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                HeaderElement::Parameter { kind, .. } => Some(*kind),
                HeaderElement::Label(_) => None,
            })
            .collect()
    }

    pub fn param_count(&self) -> usize {
        self.param_kinds().len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Look {
    pub name: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundInfo {
    pub name: String,
    pub file_name: String,
}

/// A declared variable. The initial value is what the variable holds
/// before any script runs; `None` means uninitialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserVariable {
    pub name: String,
    pub initial: Option<FormulaElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserList {
    pub name: String,
}

/// One Catrobat object (the background or a regular sprite).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sprite {
    pub name: String,
    pub looks: Vec<Look>,
    pub sounds: Vec<SoundInfo>,
    pub variables: Vec<UserVariable>,
    pub lists: Vec<UserList>,
    pub scripts: Vec<Script>,
    pub procedures: Vec<ProcedureDefinition>,
}

impl Sprite {
    pub fn new(name: &str) -> Sprite {
        Sprite {
            name: name.to_string(),
            looks: Vec::new(),
            sounds: Vec::new(),
            variables: Vec::new(),
            lists: Vec::new(),
            scripts: Vec::new(),
            procedures: Vec::new(),
        }
    }

    pub fn look_named(&self, name: &str) -> Option<&Look> {
        self.looks.iter().find(|l| l.name == name)
    }

    pub fn sound_named(&self, name: &str) -> Option<&SoundInfo> {
        self.sounds.iter().find(|s| s.name == name)
    }

    /// The sprite's first program-start script, created on demand. Startup
    /// state bricks are inserted here.
    pub fn start_script_mut(&mut self) -> &mut Script {
        let existing = self
            .scripts
            .iter()
            .position(|s| s.trigger == Trigger::ProgramStart);
        let index = match existing {
            Some(i) => i,
            None => {
                self.scripts.push(Script::new(Trigger::ProgramStart));
                self.scripts.len() - 1
            }
        };
        &mut self.scripts[index]
    }
}

/// The converted program, handed to the external serializer as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub name: String,
    pub virtual_screen_width: i32,
    pub virtual_screen_height: i32,
    pub objects: Vec<Sprite>,
    /// Program-scope variables, shared by all objects.
    pub variables: Vec<UserVariable>,
    pub lists: Vec<UserList>,
}

impl Program {
    /// The background object. By construction it is the first object.
    pub fn background(&self) -> Option<&Sprite> {
        self.objects.first()
    }

    pub fn object_named(&self, name: &str) -> Option<&Sprite> {
        self.objects.iter().find(|o| o.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_interleaves_labels_and_parameters() {
        let labels = vec!["count".to_string(), "word".to_string()];
        let def = ProcedureDefinition::from_header("repeat %n saying %s", &labels).unwrap();
        assert_eq!(
            def.elements,
            vec![
                HeaderElement::Label("repeat".to_string()),
                HeaderElement::Parameter {
                    label: "count".to_string(),
                    kind: ParamKind::Number
                },
                HeaderElement::Label("saying".to_string()),
                HeaderElement::Parameter {
                    label: "word".to_string(),
                    kind: ParamKind::Text
                },
            ]
        );
        assert_eq!(def.param_count(), 2);
    }

    #[test]
    fn escaped_percent_is_plain_text() {
        let def = ProcedureDefinition::from_header("add 10\\% to %n", &["v".to_string()]).unwrap();
        assert_eq!(def.param_count(), 1);
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        assert!(ProcedureDefinition::from_header("broken %x", &[]).is_err());
    }

    #[test]
    fn label_count_mismatch_is_rejected() {
        let labels = vec!["only".to_string()];
        assert!(ProcedureDefinition::from_header("two %n %s", &labels).is_err());
    }

    #[test]
    fn numeric_text_becomes_number_leaf() {
        assert_eq!(
            FormulaElement::from_literal(&Literal::Text("42".to_string())),
            FormulaElement::Number(42.0)
        );
        assert_eq!(
            FormulaElement::from_literal(&Literal::Text("hello".to_string())),
            FormulaElement::Text("hello".to_string())
        );
    }

    #[test]
    fn start_script_is_created_once() {
        let mut sprite = Sprite::new("cat");
        sprite.start_script_mut().bricks.push(Brick::Show);
        sprite.start_script_mut().bricks.push(Brick::Hide);
        assert_eq!(sprite.scripts.len(), 1);
        assert_eq!(sprite.scripts[0].bricks.len(), 2);
    }
}
