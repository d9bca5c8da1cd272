//! Synthesized objects for Scratch capabilities Catrobat has no direct
//! equivalent for: keyboard sensing and pointer position/click sensing.
//!
//! Runs once per conversion, after every declared object has been
//! converted, and adds its objects to the same arena.

use std::collections::HashSet;

use crate::catrobat::{
    generated_variable_name, Brick, FormulaElement, GoToTarget, Look, Operator, Script, Sensor,
    Trigger,
};
use crate::converter::ProgramConverter;
use crate::mapping::key_broadcast_message;
use crate::scratch::{KeySensingStyle, STAGE_HEIGHT_IN_PIXELS, STAGE_WIDTH_IN_PIXELS};

pub(crate) const MOUSE_SPRITE_NAME: &str = "_mouse_";
pub(crate) const MOUSE_MOVE_MESSAGE: &str = "_mouse_move_";

const ANY_KEY_NAME: &str = "any";
const KEYS_PER_ROW: i32 = 12;
const KEY_GRID_STEP: i32 = 40;
const KEY_GRID_OFFSET: i32 = -20;
const SPACE_BAR_WIDTH_IN_CELLS: i32 = 4;
const KEY_INDICATOR_SIZE_PERCENT: f64 = 33.0;

const KEY_REPEAT_DELAY_MS: f64 = 250.0;
const KEY_REPEAT_INTERVAL_MS: f64 = 50.0;
const POSITION_UPDATE_INTERVAL_MS: f64 = 40.0;
const POINTER_TRANSPARENCY_PERCENT: f64 = 99.99;

pub(crate) fn key_variable_name(key: &str) -> String {
    generated_variable_name(&format!("key_{}", key))
}

pub(crate) fn mouse_x_variable_name() -> String {
    generated_variable_name("mouse_x")
}

pub(crate) fn mouse_y_variable_name() -> String {
    generated_variable_name("mouse_y")
}

/// One key-indicator object per sensed key, carrying the scripts for the
/// sensing styles that were actually observed. Returns the key names that
/// got an indicator, for the pointer pass-through condition.
pub(crate) fn add_key_sprites(conv: &mut ProgramConverter) -> Vec<String> {
    let listened = conv.source.listened_keys.clone();
    if listened.is_empty() {
        return Vec::new();
    }

    let space_exists = listened.iter().any(|(key, _)| key == "space");
    let any_variants: Vec<KeySensingStyle> = listened
        .iter()
        .filter(|(key, _)| key == ANY_KEY_NAME)
        .map(|(_, style)| *style)
        .collect();
    let any_script_exists = any_variants.contains(&KeySensingStyle::EventScript);
    let any_brick_exists = any_variants.contains(&KeySensingStyle::PollingBrick);

    let mut keys: Vec<(String, Option<KeySensingStyle>)> = listened
        .iter()
        .filter(|(key, _)| key != ANY_KEY_NAME)
        .map(|(key, style)| (key.clone(), Some(*style)))
        .collect();
    if !any_variants.is_empty() && keys.is_empty() {
        // "any key" sensing still needs one carrier object
        keys.push(("a".to_string(), None));
    }

    let mut any_scripts_added: HashSet<String> = HashSet::new();
    let mut any_bricks_added: HashSet<String> = HashSet::new();
    let mut space_variants: Vec<Option<KeySensingStyle>> = Vec::new();
    let mut key_pos: i32 = 0;

    for (key, style) in &keys {
        if key == "space" {
            space_variants.push(*style);
            continue;
        }
        if space_exists && key_pos == 4 {
            // leave room for the wide space bar in the first row
            key_pos += SPACE_BAR_WIDTH_IN_CELLS;
        }
        let width_pos = key_pos % KEYS_PER_ROW;
        let height_pos = key_pos / KEYS_PER_ROW + 1;
        let y = -(STAGE_HEIGHT_IN_PIXELS / 2) + KEY_GRID_OFFSET + KEY_GRID_STEP * height_pos;
        let x = -(STAGE_WIDTH_IN_PIXELS / 2) + KEY_GRID_OFFSET + KEY_GRID_STEP * (width_pos + 1);

        let event_style = *style == Some(KeySensingStyle::EventScript);
        let polling_style = *style == Some(KeySensingStyle::PollingBrick);
        let mut sprite_added = false;
        if event_style || any_script_exists {
            let add_any = any_script_exists && any_scripts_added.insert(key.clone());
            sprite_added |= add_key_event_scripts(conv, key, x, y, event_style, add_any);
        }
        if polling_style || any_brick_exists {
            let add_any = any_brick_exists && any_bricks_added.insert(key.clone());
            sprite_added |= add_key_polling_scripts(conv, key, x, y, polling_style, add_any);
        }
        if sprite_added {
            key_pos += 1;
        }
    }

    if !space_variants.is_empty() {
        let y = -(STAGE_HEIGHT_IN_PIXELS / 2) + KEY_GRID_OFFSET + KEY_GRID_STEP;
        let x = 0;
        let space_event = space_variants.contains(&Some(KeySensingStyle::EventScript));
        let space_polling = space_variants.contains(&Some(KeySensingStyle::PollingBrick));
        if space_event || any_script_exists {
            add_key_event_scripts(conv, "space", x, y, space_event, any_script_exists);
        }
        if space_polling || any_brick_exists {
            add_key_polling_scripts(conv, "space", x, y, space_polling, any_brick_exists);
        }
    }

    keys.into_iter().map(|(key, _)| key).collect()
}

/// Finds or creates the indicator object for `key`. Both sensing styles
/// share one object per key.
fn key_indicator_sprite(
    conv: &mut ProgramConverter,
    key: &str,
    x: i32,
    y: i32,
) -> (crate::context::ObjectId, bool) {
    let message = key_broadcast_message(key);
    if let Some(id) = conv.arena.lookup(&message) {
        return (id, false);
    }
    let file_name = conv.resolver.key_image_file_name(key);
    let id = conv.arena.declare(&message);
    let sprite = conv.arena.sprite_mut(id);
    sprite.looks.push(Look {
        name: message.clone(),
        file_name,
    });

    let mut start = Script::new(Trigger::ProgramStart);
    start.bricks.push(Brick::PlaceAt {
        x: FormulaElement::Number(x as f64),
        y: FormulaElement::Number(y as f64),
    });
    start.bricks.push(Brick::SetLook { look: message });
    start.bricks.push(Brick::SetSizeTo {
        percent: FormulaElement::Number(KEY_INDICATOR_SIZE_PERCENT),
    });
    sprite.scripts.push(start);
    (id, true)
}

fn not_touching_finger() -> FormulaElement {
    FormulaElement::unary(
        Operator::Not,
        FormulaElement::sensor(Sensor::CollidesWithFinger),
    )
}

/// Event-style sensing: while the indicator is tapped, broadcast the key
/// message once, then keep re-broadcasting on a short interval until the
/// contact ends.
fn key_tapped_script(conv: &mut ProgramConverter, message: &str) -> Script {
    let start = conv.ctx.brick_ids.next_id();
    let end = conv.ctx.brick_ids.next_id();
    let mut script = Script::new(Trigger::Tapped);
    script.bricks.extend([
        Brick::Broadcast {
            message: message.to_string(),
        },
        Brick::Wait {
            millis: FormulaElement::Number(KEY_REPEAT_DELAY_MS),
        },
        Brick::RepeatUntil {
            id: start,
            condition: not_touching_finger(),
            end,
        },
        Brick::Broadcast {
            message: message.to_string(),
        },
        Brick::Wait {
            millis: FormulaElement::Number(KEY_REPEAT_INTERVAL_MS),
        },
        Brick::LoopEnd { id: end, start },
    ]);
    script
}

/// Polling-style sensing: a shared flag variable holds 1 while the
/// indicator is touched and falls back to 0 on release.
fn key_polled_script(conv: &mut ProgramConverter, key: &str) -> Script {
    let variable = key_variable_name(key);
    conv.declare_program_variable(&variable, Some(FormulaElement::Number(0.0)));
    let mut script = Script::new(Trigger::Tapped);
    script.bricks.extend([
        Brick::SetVariable {
            variable: variable.clone(),
            value: FormulaElement::Number(1.0),
        },
        Brick::WaitUntil {
            condition: not_touching_finger(),
        },
        Brick::SetVariable {
            variable,
            value: FormulaElement::Number(0.0),
        },
    ]);
    script
}

fn add_key_event_scripts(
    conv: &mut ProgramConverter,
    key: &str,
    x: i32,
    y: i32,
    add_key_script: bool,
    add_any_key_script: bool,
) -> bool {
    let (id, added) = key_indicator_sprite(conv, key, x, y);
    if add_key_script {
        let script = key_tapped_script(conv, &key_broadcast_message(key));
        conv.arena.sprite_mut(id).scripts.push(script);
    }
    if add_any_key_script {
        let script = key_tapped_script(conv, &key_broadcast_message(ANY_KEY_NAME));
        conv.arena.sprite_mut(id).scripts.push(script);
    }
    added
}

fn add_key_polling_scripts(
    conv: &mut ProgramConverter,
    key: &str,
    x: i32,
    y: i32,
    add_key_script: bool,
    add_any_key_script: bool,
) -> bool {
    let (id, added) = key_indicator_sprite(conv, key, x, y);
    if add_key_script {
        let script = key_polled_script(conv, key);
        conv.arena.sprite_mut(id).scripts.push(script);
    }
    if add_any_key_script {
        let script = key_polled_script(conv, ANY_KEY_NAME);
        conv.arena.sprite_mut(id).scripts.push(script);
    }
    added
}

/// True unless the touch overlaps one of the key-indicator objects: a
/// click on a key stays with the key, a background click re-positions the
/// pointer tracker.
pub(crate) fn pass_through_condition(key_names: &[String]) -> FormulaElement {
    let mut disjunction: Option<FormulaElement> = None;
    for key in key_names.iter().rev() {
        let collides = FormulaElement::collision(&key_broadcast_message(key));
        disjunction = Some(match disjunction {
            None => collides,
            Some(rest) => FormulaElement::binary(Operator::Or, collides, rest),
        });
    }
    // with no indicators on stage the touch never lands on one
    let touched_any = disjunction.unwrap_or(FormulaElement::Number(0.0));
    FormulaElement::unary(Operator::Not, touched_any)
}

/// The pointer tracker: a nearly invisible object that mirrors its
/// position into two shared variables and follows touches via transient
/// clones, passing clicks on key indicators through untouched.
pub(crate) fn add_pointer_sprite(conv: &mut ProgramConverter, key_names: &[String]) {
    let track_position = conv.source.has_mouse_position || conv.ctx.mouse_position_used;
    if conv.arena.lookup(MOUSE_SPRITE_NAME).is_none() && !track_position {
        return;
    }

    let file_name = conv.resolver.pointer_image_file_name();
    let id = conv.arena.declare(MOUSE_SPRITE_NAME);
    conv.arena.sprite_mut(id).looks.push(Look {
        name: MOUSE_SPRITE_NAME.to_string(),
        file_name,
    });

    if track_position {
        let x_variable = mouse_x_variable_name();
        let y_variable = mouse_y_variable_name();
        conv.declare_program_variable(&x_variable, Some(FormulaElement::Number(0.0)));
        conv.declare_program_variable(&y_variable, Some(FormulaElement::Number(0.0)));

        let start = conv.ctx.brick_ids.next_id();
        let end = conv.ctx.brick_ids.next_id();
        let mut mirror = Script::new(Trigger::ProgramStart);
        mirror.bricks.extend([
            Brick::Forever { id: start, end },
            Brick::SetVariable {
                variable: x_variable,
                value: FormulaElement::sensor(Sensor::ObjectX),
            },
            Brick::SetVariable {
                variable: y_variable,
                value: FormulaElement::sensor(Sensor::ObjectY),
            },
            Brick::Wait {
                millis: FormulaElement::Number(POSITION_UPDATE_INTERVAL_MS),
            },
            Brick::LoopEnd { id: end, start },
        ]);
        conv.arena.sprite_mut(id).scripts.push(mirror);
    }

    let mut move_script = Script::new(Trigger::BroadcastReceived {
        message: MOUSE_MOVE_MESSAGE.to_string(),
    });
    move_script.bricks.push(Brick::GoTo {
        target: GoToTarget::TouchPosition,
    });
    conv.arena.sprite_mut(id).scripts.push(move_script);

    let start = conv.ctx.brick_ids.next_id();
    let end = conv.ctx.brick_ids.next_id();
    let mut spawner = Script::new(Trigger::ProgramStart);
    spawner.bricks.extend([
        Brick::SetTransparency {
            percent: FormulaElement::Number(POINTER_TRANSPARENCY_PERCENT),
        },
        Brick::Forever { id: start, end },
        Brick::WaitUntil {
            condition: FormulaElement::sensor(Sensor::FingerTouched),
        },
        Brick::Clone {
            object: MOUSE_SPRITE_NAME.to_string(),
        },
        Brick::LoopEnd { id: end, start },
    ]);
    conv.arena.sprite_mut(id).scripts.push(spawner);

    let begin = conv.ctx.brick_ids.next_id();
    let end = conv.ctx.brick_ids.next_id();
    let mut clone_script = Script::new(Trigger::Cloned);
    clone_script.bricks.extend([
        Brick::GoTo {
            target: GoToTarget::TouchPosition,
        },
        Brick::IfThenBegin {
            id: begin,
            condition: pass_through_condition(key_names),
            end,
        },
        Brick::Broadcast {
            message: MOUSE_MOVE_MESSAGE.to_string(),
        },
        Brick::IfThenEnd { id: end, begin },
        Brick::DeleteThisClone,
    ]);
    conv.arena.sprite_mut(id).scripts.push(clone_script);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_with_no_keys_is_always_true() {
        let condition = pass_through_condition(&[]);
        assert_eq!(
            condition,
            FormulaElement::unary(Operator::Not, FormulaElement::Number(0.0))
        );
    }

    #[test]
    fn pass_through_with_one_key_negates_single_collision() {
        let condition = pass_through_condition(&["space".to_string()]);
        assert_eq!(
            condition,
            FormulaElement::unary(
                Operator::Not,
                FormulaElement::collision("key space pressed")
            )
        );
    }

    #[test]
    fn pass_through_with_three_keys_chains_disjunctions() {
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let condition = pass_through_condition(&keys);
        let expected = FormulaElement::unary(
            Operator::Not,
            FormulaElement::binary(
                Operator::Or,
                FormulaElement::collision("key a pressed"),
                FormulaElement::binary(
                    Operator::Or,
                    FormulaElement::collision("key b pressed"),
                    FormulaElement::collision("key c pressed"),
                ),
            ),
        );
        assert_eq!(condition, expected);
    }

    #[test]
    fn key_variable_names_carry_generated_prefix() {
        assert_eq!(key_variable_name("space"), "s2cc:key_space");
        assert!(crate::catrobat::is_generated_variable(&mouse_x_variable_name()));
    }
}
