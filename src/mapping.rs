//! The static mapping from Scratch block identifiers to Catrobat
//! constructs.
//!
//! `lookup` is closed and total: every identifier the Scratch reader can
//! produce resolves to exactly one entry, with `Mapping::Unmapped` standing
//! in for blocks Catrobat has no brick for. Entries are plain data or named
//! pure constructor functions; nothing in here touches conversion state.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::catrobat::{
    Brick, FormulaElement, Function, Operator, Sensor, StopOption, Trigger,
};
use crate::scratch::{self, Literal};

/// A converted block argument, as produced by the traversal engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(Literal),
    Formula(FormulaElement),
    Bricks(Vec<Brick>),
}

impl Arg {
    /// The argument as a formula leaf or tree. Statement bodies have no
    /// formula reading.
    pub fn formula(&self) -> Result<FormulaElement> {
        match self {
            Arg::Literal(lit) => Ok(FormulaElement::from_literal(lit)),
            Arg::Formula(f) => Ok(f.clone()),
            Arg::Bricks(_) => bail!("statement body used in a value position"),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Literal(Literal::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Arg::Literal(lit) => lit.as_number(),
            _ => None,
        }
    }

    /// True for arguments that can only be read as a computed expression.
    pub fn is_computed(&self) -> bool {
        matches!(self, Arg::Formula(_))
    }

    pub fn bricks(&self) -> Result<Vec<Brick>> {
        match self {
            Arg::Bricks(bricks) => Ok(bricks.clone()),
            other => bail!("expected a statement body, got {:?}", other),
        }
    }

    /// Short rendering for placeholder notes and log lines.
    pub fn summary(&self) -> String {
        match self {
            Arg::Literal(lit) => lit.to_display_string(),
            Arg::Formula(_) => "<formula>".to_string(),
            Arg::Bricks(bricks) => format!("<{} bricks>", bricks.len()),
        }
    }
}

pub type StmtCtor = fn(&[Arg]) -> Result<Vec<Brick>>;
pub type TriggerCtor = fn(&[Value]) -> Result<Trigger>;

/// What an identifier maps to on the Catrobat side.
#[derive(Clone, Copy)]
pub enum Mapping {
    /// A plain or computed statement constructor.
    Stmt(StmtCtor),
    Operator(Operator),
    Function(Function),
    Sensor(Sensor),
    /// Conversion is overridden by a dedicated adapter in the converter.
    Adapter,
    /// No Catrobat equivalent; a placeholder note is emitted.
    Unmapped,
}

/// What a hat identifier maps to.
#[derive(Clone, Copy)]
pub enum TriggerMapping {
    Ctor(TriggerCtor),
    SensorGreaterThan,
    BackgroundSwitchesTo,
    ProcedureDefinition,
}

pub fn trigger_for(identifier: &str) -> Option<TriggerMapping> {
    match identifier {
        scratch::SCRIPT_GREEN_FLAG => Some(TriggerMapping::Ctor(green_flag_trigger)),
        scratch::SCRIPT_RECEIVE => Some(TriggerMapping::Ctor(receive_trigger)),
        scratch::SCRIPT_KEY_PRESSED => Some(TriggerMapping::Ctor(key_pressed_trigger)),
        scratch::SCRIPT_SCENE_STARTS => Some(TriggerMapping::Ctor(scene_starts_trigger)),
        scratch::SCRIPT_CLICKED => Some(TriggerMapping::Ctor(clicked_trigger)),
        scratch::SCRIPT_CLONED => Some(TriggerMapping::Ctor(cloned_trigger)),
        scratch::SCRIPT_PROC_DEF => Some(TriggerMapping::ProcedureDefinition),
        scratch::SCRIPT_SENSOR_GREATER_THAN => Some(TriggerMapping::SensorGreaterThan),
        scratch::SCRIPT_BACKGROUND_SWITCHES_TO => Some(TriggerMapping::BackgroundSwitchesTo),
        _ => None,
    }
}

pub fn lookup(identifier: &str) -> Mapping {
    match identifier {
        // control
        "wait:elapsed:from:" => Mapping::Stmt(wait_stmt),
        "doWaitUntil" => Mapping::Stmt(wait_until_stmt),
        "stopScripts" => Mapping::Stmt(stop_scripts_stmt),
        "doForever" | "doRepeat" | "doUntil" | "doIf" | "doIfElse" => Mapping::Adapter,
        "broadcast:" | "doBroadcastAndWait" => Mapping::Adapter,

        // motion
        "turnRight:" => Mapping::Stmt(turn_right_stmt),
        "turnLeft:" => Mapping::Stmt(turn_left_stmt),
        "heading:" => Mapping::Stmt(point_in_direction_stmt),
        "forward:" => Mapping::Stmt(move_steps_stmt),
        "gotoX:y:" => Mapping::Stmt(place_at_stmt),
        "glideSecs:toX:y:elapsed:from:" => Mapping::Stmt(glide_stmt),
        "xpos:" => Mapping::Stmt(set_x_stmt),
        "ypos:" => Mapping::Stmt(set_y_stmt),
        "changeXposBy:" => Mapping::Stmt(change_x_stmt),
        "changeYposBy:" => Mapping::Stmt(change_y_stmt),
        "bounceOffEdge" => Mapping::Stmt(bounce_stmt),
        "pointTowards:" | "gotoSpriteOrMouse:" | "setRotationStyle" => Mapping::Adapter,

        // variables
        "setVar:to:" | "changeVar:by:" | "readVariable" | "showVariable:" | "hideVariable:" => {
            Mapping::Adapter
        }

        // lists
        "append:toList:" | "insert:at:ofList:" | "deleteLine:ofList:" | "setLine:ofList:to:"
        | "contentsOfList:" => Mapping::Adapter,
        "getLine:ofList:" => Mapping::Function(Function::ListItem),
        "lineCountOfList:" => Mapping::Function(Function::NumberOfItems),
        "list:contains:" => Mapping::Function(Function::Contains),
        "showList:" | "hideList:" => Mapping::Unmapped,

        // looks
        "lookLike:" | "startScene" | "startSceneAndWait" => Mapping::Adapter,
        "nextCostume" => Mapping::Stmt(next_look_stmt),
        // only the background object switches scenes, so this is a plain
        // next-look there
        "nextScene" => Mapping::Stmt(next_look_stmt),
        "setGraphicEffect:to:" | "changeGraphicEffect:by:" => Mapping::Adapter,
        "filterReset" => Mapping::Stmt(clear_graphic_effects_stmt),
        "changeSizeBy:" => Mapping::Stmt(change_size_stmt),
        "setSizeTo:" => Mapping::Stmt(set_size_stmt),
        "show" => Mapping::Stmt(show_stmt),
        "hide" => Mapping::Stmt(hide_stmt),
        "comeToFront" => Mapping::Stmt(come_to_front_stmt),
        "goBackByLayers:" => Mapping::Stmt(go_back_layers_stmt),
        "setVideoState" => Mapping::Stmt(set_video_state_stmt),

        // sound
        "playSound:" | "doPlaySoundAndWait" => Mapping::Adapter,
        "stopAllSounds" => Mapping::Stmt(stop_all_sounds_stmt),
        "changeVolumeBy:" => Mapping::Stmt(change_volume_stmt),
        "setVolumeTo:" => Mapping::Stmt(set_volume_stmt),
        "soundLevel" => Mapping::Adapter,

        // speech bubbles and input
        "say:" | "say:duration:elapsed:from:" | "think:" | "think:duration:elapsed:from:"
        | "doAsk" | "answer" => Mapping::Adapter,

        // clones
        "createCloneOf" => Mapping::Adapter,
        "deleteClone" => Mapping::Stmt(delete_clone_stmt),

        // pen
        "putPenDown" => Mapping::Stmt(pen_down_stmt),
        "putPenUp" => Mapping::Stmt(pen_up_stmt),
        "stampCostume" => Mapping::Stmt(stamp_stmt),
        "clearPenTrails" => Mapping::Stmt(clear_background_stmt),
        "penColor:" | "penSize:" => Mapping::Adapter,
        "setPenHueTo:" => Mapping::Unmapped,

        // user-defined procedures
        "call" | "getParam" => Mapping::Adapter,

        // object state sensors
        "xpos" => Mapping::Sensor(Sensor::ObjectX),
        "ypos" => Mapping::Sensor(Sensor::ObjectY),
        "heading" => Mapping::Sensor(Sensor::ObjectRotation),
        "scale" => Mapping::Sensor(Sensor::ObjectSize),
        "sceneName" => Mapping::Sensor(Sensor::ObjectBackgroundName),
        "costumeName" => Mapping::Sensor(Sensor::ObjectLookName),
        "backgroundIndex" => Mapping::Sensor(Sensor::ObjectBackgroundNumber),
        "costumeIndex" => Mapping::Sensor(Sensor::ObjectLookNumber),

        // input sensors; pointer position reads go through the tracker
        // sprite's mirror variables, key polling through the indicator
        // objects' flag variables
        "mousePressed" => Mapping::Sensor(Sensor::FingerTouched),
        "mouseX" | "mouseY" | "keyPressed:" => Mapping::Adapter,
        "touching:" | "timeAndDate" => Mapping::Adapter,

        // math functions
        "abs" => Mapping::Function(Function::Abs),
        "sqrt" => Mapping::Function(Function::Sqrt),
        "sin" => Mapping::Function(Function::Sin),
        "cos" => Mapping::Function(Function::Cos),
        "tan" => Mapping::Function(Function::Tan),
        "asin" => Mapping::Function(Function::Arcsin),
        "acos" => Mapping::Function(Function::Arccos),
        "atan" => Mapping::Function(Function::Arctan),
        "e^" => Mapping::Function(Function::Exp),
        "ln" => Mapping::Function(Function::Ln),
        "log" => Mapping::Function(Function::Log),
        "rounded" => Mapping::Function(Function::Round),
        "randomFrom:to:" => Mapping::Function(Function::Rand),
        "%" => Mapping::Function(Function::Mod),
        "floor" => Mapping::Function(Function::Floor),
        "ceiling" => Mapping::Function(Function::Ceil),
        "10 ^" => Mapping::Adapter,
        "computeFunction:of:" => Mapping::Adapter,

        // string functions
        "stringLength:" => Mapping::Function(Function::Length),
        "letter:of:" => Mapping::Function(Function::Letter),
        "concatenate:with:" => Mapping::Function(Function::Join),

        // operators
        "+" => Mapping::Operator(Operator::Plus),
        "-" => Mapping::Operator(Operator::Minus),
        "*" => Mapping::Operator(Operator::Mult),
        "/" => Mapping::Operator(Operator::Divide),
        "<" => Mapping::Operator(Operator::SmallerThan),
        "=" => Mapping::Operator(Operator::Equal),
        ">" => Mapping::Operator(Operator::GreaterThan),
        "&" => Mapping::Operator(Operator::And),
        "|" => Mapping::Operator(Operator::Or),
        "not" => Mapping::Operator(Operator::Not),
        "()" => Mapping::Adapter,

        _ => Mapping::Unmapped,
    }
}

/// Broadcast message carried by the synthesized key-indicator objects.
pub fn key_broadcast_message(key: &str) -> String {
    format!("key {} pressed", key)
}

pub fn background_look_broadcast_message(look_name: &str) -> String {
    format!("start background scene: {}", look_name)
}

/// Scratch durations are seconds, Catrobat wait/glide bricks take
/// milliseconds. Literal values are folded, computed values are scaled in
/// the formula.
pub fn sec_to_msec(duration: FormulaElement) -> FormulaElement {
    match duration {
        FormulaElement::Number(secs) => FormulaElement::Number(secs * 1000.0),
        other => FormulaElement::binary(Operator::Mult, other, FormulaElement::Number(1000.0)),
    }
}

fn expect_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("expected a plain value, got {}", other),
    }
}

// trigger constructors

fn green_flag_trigger(_args: &[Value]) -> Result<Trigger> {
    Ok(Trigger::ProgramStart)
}

fn clicked_trigger(_args: &[Value]) -> Result<Trigger> {
    Ok(Trigger::Tapped)
}

fn cloned_trigger(_args: &[Value]) -> Result<Trigger> {
    Ok(Trigger::Cloned)
}

fn receive_trigger(args: &[Value]) -> Result<Trigger> {
    let [message] = args else {
        bail!("broadcast hat expects one message argument");
    };
    // lower case to dodge case-sensitivity mismatches between sender and
    // receiver
    Ok(Trigger::BroadcastReceived {
        message: expect_text(message)?.to_lowercase(),
    })
}

fn key_pressed_trigger(args: &[Value]) -> Result<Trigger> {
    let [key] = args else {
        bail!("key hat expects one key argument");
    };
    Ok(Trigger::BroadcastReceived {
        message: key_broadcast_message(&expect_text(key)?),
    })
}

fn scene_starts_trigger(args: &[Value]) -> Result<Trigger> {
    let [look_name] = args else {
        bail!("scene hat expects one look argument");
    };
    Ok(Trigger::BroadcastReceived {
        message: background_look_broadcast_message(&expect_text(look_name)?),
    })
}

// statement constructors

fn one(brick: Brick) -> Result<Vec<Brick>> {
    Ok(vec![brick])
}

fn wait_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [duration] = args else {
        bail!("wait expects one duration argument");
    };
    one(Brick::Wait {
        millis: sec_to_msec(duration.formula()?),
    })
}

fn wait_until_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [condition] = args else {
        bail!("wait-until expects one condition argument");
    };
    one(Brick::WaitUntil {
        condition: condition.formula()?,
    })
}

fn stop_scripts_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [subject] = args else {
        bail!("stop expects one subject argument");
    };
    let option = match subject.as_text() {
        Some("this script") => StopOption::ThisScript,
        Some("all") => StopOption::All,
        Some("other scripts in sprite") | Some("other scripts in stage") => {
            StopOption::OtherScripts
        }
        other => bail!("unknown stop subject {:?}", other),
    };
    one(Brick::StopScript { option })
}

fn turn_right_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [degrees] = args else {
        bail!("turn expects one argument");
    };
    one(Brick::TurnRight {
        degrees: degrees.formula()?,
    })
}

fn turn_left_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [degrees] = args else {
        bail!("turn expects one argument");
    };
    one(Brick::TurnLeft {
        degrees: degrees.formula()?,
    })
}

fn point_in_direction_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [degrees] = args else {
        bail!("point-in-direction expects one argument");
    };
    one(Brick::PointInDirection {
        degrees: degrees.formula()?,
    })
}

fn move_steps_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [steps] = args else {
        bail!("move expects one argument");
    };
    one(Brick::MoveNSteps {
        steps: steps.formula()?,
    })
}

fn place_at_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [x, y] = args else {
        bail!("go-to-x-y expects two arguments");
    };
    one(Brick::PlaceAt {
        x: x.formula()?,
        y: y.formula()?,
    })
}

fn glide_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [duration, x, y] = args else {
        bail!("glide expects three arguments");
    };
    one(Brick::Glide {
        x: x.formula()?,
        y: y.formula()?,
        millis: sec_to_msec(duration.formula()?),
    })
}

fn set_x_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [value] = args else {
        bail!("set-x expects one argument");
    };
    one(Brick::SetX {
        value: value.formula()?,
    })
}

fn set_y_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [value] = args else {
        bail!("set-y expects one argument");
    };
    one(Brick::SetY {
        value: value.formula()?,
    })
}

fn change_x_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [delta] = args else {
        bail!("change-x expects one argument");
    };
    one(Brick::ChangeXBy {
        delta: delta.formula()?,
    })
}

fn change_y_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [delta] = args else {
        bail!("change-y expects one argument");
    };
    one(Brick::ChangeYBy {
        delta: delta.formula()?,
    })
}

fn bounce_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::IfOnEdgeBounce)
}

fn next_look_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::NextLook)
}

fn clear_graphic_effects_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::ClearGraphicEffects)
}

fn change_size_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [delta] = args else {
        bail!("change-size expects one argument");
    };
    one(Brick::ChangeSizeBy {
        delta: delta.formula()?,
    })
}

fn set_size_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [percent] = args else {
        bail!("set-size expects one argument");
    };
    one(Brick::SetSizeTo {
        percent: percent.formula()?,
    })
}

fn show_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::Show)
}

fn hide_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::Hide)
}

fn come_to_front_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::ComeToFront)
}

fn go_back_layers_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [layers] = args else {
        bail!("go-back expects one argument");
    };
    one(Brick::GoBackLayers {
        layers: layers.formula()?,
    })
}

fn set_video_state_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [status] = args else {
        bail!("video state expects one argument");
    };
    let status = status.as_text().unwrap_or("off").to_lowercase();
    // front camera by default
    Ok(vec![
        Brick::ChooseCamera { front: true },
        Brick::Camera { on: status != "off" },
    ])
}

fn stop_all_sounds_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::StopAllSounds)
}

fn change_volume_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [delta] = args else {
        bail!("change-volume expects one argument");
    };
    one(Brick::ChangeVolumeBy {
        delta: delta.formula()?,
    })
}

fn set_volume_stmt(args: &[Arg]) -> Result<Vec<Brick>> {
    let [percent] = args else {
        bail!("set-volume expects one argument");
    };
    one(Brick::SetVolumeTo {
        percent: percent.formula()?,
    })
}

fn delete_clone_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::DeleteThisClone)
}

fn pen_down_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::PenDown)
}

fn pen_up_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::PenUp)
}

fn stamp_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::Stamp)
}

fn clear_background_stmt(_args: &[Arg]) -> Result<Vec<Brick>> {
    one(Brick::ClearBackground)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_identifier_is_unmapped() {
        assert!(matches!(lookup("definitely-not-a-block"), Mapping::Unmapped));
    }

    #[test]
    fn wait_converts_seconds_to_milliseconds() {
        let bricks = wait_stmt(&[Arg::Literal(Literal::Number(1.5))]).unwrap();
        assert_eq!(
            bricks,
            vec![Brick::Wait {
                millis: FormulaElement::Number(1500.0)
            }]
        );
    }

    #[test]
    fn computed_wait_duration_is_scaled_in_the_formula() {
        let bricks = wait_stmt(&[Arg::Formula(FormulaElement::variable("t"))]).unwrap();
        match &bricks[0] {
            Brick::Wait {
                millis: FormulaElement::BinaryOp { op, .. },
            } => assert_eq!(*op, Operator::Mult),
            other => panic!("unexpected brick {:?}", other),
        }
    }

    #[test]
    fn stop_subject_indices() {
        let stage = stop_scripts_stmt(&[Arg::Literal(Literal::Text(
            "other scripts in stage".to_string(),
        ))])
        .unwrap();
        assert_eq!(
            stage,
            vec![Brick::StopScript {
                option: StopOption::OtherScripts
            }]
        );
        assert!(stop_scripts_stmt(&[Arg::Literal(Literal::Text("nonsense".to_string()))]).is_err());
    }

    #[test]
    fn video_state_emits_camera_pair() {
        let bricks = set_video_state_stmt(&[Arg::Literal(Literal::Text("on".to_string()))]).unwrap();
        assert_eq!(
            bricks,
            vec![Brick::ChooseCamera { front: true }, Brick::Camera { on: true }]
        );
        let off = set_video_state_stmt(&[Arg::Literal(Literal::Text("off".to_string()))]).unwrap();
        assert_eq!(off[1], Brick::Camera { on: false });
    }

    #[test]
    fn receive_trigger_folds_case() {
        let trigger = receive_trigger(&[json!("Hello World")]).unwrap();
        assert_eq!(
            trigger,
            Trigger::BroadcastReceived {
                message: "hello world".to_string()
            }
        );
    }

    #[test]
    fn key_hat_maps_to_key_broadcast() {
        let trigger = key_pressed_trigger(&[json!("space")]).unwrap();
        assert_eq!(
            trigger,
            Trigger::BroadcastReceived {
                message: "key space pressed".to_string()
            }
        );
    }

    #[test]
    fn pure_constructor_samples_never_fail_on_valid_arguments() {
        let unary = [Arg::Literal(Literal::Number(7.0))];
        for ctor in [
            turn_right_stmt as StmtCtor,
            turn_left_stmt,
            move_steps_stmt,
            set_x_stmt,
            change_volume_stmt,
            set_size_stmt,
        ] {
            let bricks = ctor(&unary).unwrap();
            assert!(!bricks
                .iter()
                .any(|b| matches!(b, Brick::Note { .. })));
        }
    }
}
