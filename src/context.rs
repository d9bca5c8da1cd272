//! Conversion-time state: object arena with forward references, procedure
//! template registry, widget layout cursor, structural-brick id allocation.
//!
//! Everything here lives for exactly one program conversion and is dropped
//! once the target graph has been handed off.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use crate::catrobat::{BrickId, ProcedureDefinition, Sprite};

/// Allocates ids for structural brick pairs.
#[derive(Debug, Default)]
pub struct BrickIdGen {
    next: u32,
}

impl BrickIdGen {
    pub fn next_id(&mut self) -> BrickId {
        self.next += 1;
        BrickId(self.next)
    }
}

/// Handle into the object arena. Stable across forward registration and
/// later declaration: the slot is filled in place, never replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

struct Slot {
    sprite: Sprite,
    declared: bool,
}

/// All target objects under construction, keyed by name.
///
/// A sprite referenced before its declaration (clone target, point-towards
/// target) gets a stub slot; when the real declaration arrives the same
/// slot is reused, so every reference taken earlier keeps pointing at the
/// same identity.
#[derive(Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
    by_name: HashMap<String, usize>,
    declared_order: Vec<usize>,
}

impl ObjectArena {
    pub fn new() -> ObjectArena {
        ObjectArena::default()
    }

    pub fn lookup(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied().map(ObjectId)
    }

    /// Slot for `name`, registering a stub if the object is not known yet.
    pub fn get_or_register(&mut self, name: &str) -> ObjectId {
        if let Some(&index) = self.by_name.get(name) {
            return ObjectId(index);
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            sprite: Sprite::new(name),
            declared: false,
        });
        self.by_name.insert(name.to_string(), index);
        ObjectId(index)
    }

    /// Marks `name` as declared, reusing a forward-registered stub when one
    /// exists. Declaring the same name twice returns the existing entry.
    pub fn declare(&mut self, name: &str) -> ObjectId {
        let id = self.get_or_register(name);
        if !self.slots[id.0].declared {
            self.slots[id.0].declared = true;
            self.declared_order.push(id.0);
        }
        id
    }

    pub fn is_declared(&self, id: ObjectId) -> bool {
        self.slots[id.0].declared
    }

    pub fn sprite(&self, id: ObjectId) -> &Sprite {
        &self.slots[id.0].sprite
    }

    pub fn sprite_mut(&mut self, id: ObjectId) -> &mut Sprite {
        &mut self.slots[id.0].sprite
    }

    pub fn undeclared_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| !s.declared)
            .map(|s| s.sprite.name.clone())
            .collect()
    }

    /// Final object list: declaration order first, then any stubs that were
    /// referenced but never declared (so their references stay valid in the
    /// output program).
    pub fn into_sprites(self) -> Vec<Sprite> {
        let declared: HashSet<usize> = self.declared_order.iter().copied().collect();
        let mut sprites = Vec::with_capacity(self.slots.len());
        let mut slots: Vec<Option<Slot>> = self.slots.into_iter().map(Some).collect();
        for &index in &self.declared_order {
            if let Some(slot) = slots[index].take() {
                sprites.push(slot.sprite);
            }
        }
        for (index, slot) in slots.into_iter().enumerate() {
            if declared.contains(&index) {
                continue;
            }
            if let Some(slot) = slot {
                sprites.push(slot.sprite);
            }
        }
        sprites
    }
}

// Layout grid for on-screen variable widgets: down one column, then over
// to the next.
const VISIBLE_VAR_X_INIT: i32 = -220;
const VISIBLE_VAR_Y_INIT: i32 = 170;
const VISIBLE_VAR_POSITION_STEP_X: i32 = 80;
const VISIBLE_VAR_POSITION_STEP_Y: i32 = 40;
const VISIBLE_VAR_POSITION_THRESHOLD_X: i32 = 220;
const VISIBLE_VAR_POSITION_THRESHOLD_Y: i32 = -20;

/// Cursor handing out positions for auto-placed variable widgets.
#[derive(Debug)]
pub struct LayoutCursor {
    x: i32,
    y: i32,
}

impl Default for LayoutCursor {
    fn default() -> Self {
        LayoutCursor {
            x: VISIBLE_VAR_X_INIT,
            y: VISIBLE_VAR_Y_INIT,
        }
    }
}

impl LayoutCursor {
    pub fn next_position(&mut self) -> (i32, i32) {
        let position = (self.x, self.y);
        self.y -= VISIBLE_VAR_POSITION_STEP_Y;
        if self.y <= VISIBLE_VAR_POSITION_THRESHOLD_Y {
            self.y = VISIBLE_VAR_Y_INIT;
            self.x += VISIBLE_VAR_POSITION_STEP_X;
        }
        if self.x >= VISIBLE_VAR_POSITION_THRESHOLD_X {
            log::info!("too many visible variable widgets, positions run off screen");
        }
        position
    }
}

/// Program-wide conversion state.
#[derive(Default)]
pub struct ProgramContext {
    pub brick_ids: BrickIdGen,
    pub layout: LayoutCursor,
    /// Set when a converted block reads the pointer position, in addition
    /// to whatever the source model already observed.
    pub mouse_position_used: bool,
}

/// Per-object conversion state: user-defined procedure templates.
pub struct SpriteContext {
    pub name: String,
    /// Header text -> declared parameter labels, pre-scanned from the
    /// object's definition scripts before any script is converted.
    pub declared_labels: HashMap<String, Vec<String>>,
    templates: Vec<ProcedureDefinition>,
    template_index: HashMap<String, usize>,
    declared: HashSet<String>,
}

impl SpriteContext {
    pub fn new(name: &str, declared_labels: HashMap<String, Vec<String>>) -> SpriteContext {
        SpriteContext {
            name: name.to_string(),
            declared_labels,
            templates: Vec::new(),
            template_index: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    /// The template for `header`, created lazily on first use so that call
    /// sites seen before the definition share the same layout.
    pub fn template_for(&mut self, header: &str) -> Result<&mut ProcedureDefinition> {
        if let Some(&index) = self.template_index.get(header) {
            return Ok(&mut self.templates[index]);
        }
        let Some(labels) = self.declared_labels.get(header) else {
            bail!(
                "no procedure with signature '{}' declared in object '{}'",
                header,
                self.name
            );
        };
        let template = ProcedureDefinition::from_header(header, labels)?;
        let index = self.templates.len();
        self.templates.push(template);
        self.template_index.insert(header.to_string(), index);
        Ok(&mut self.templates[index])
    }

    /// Marks the definition occurrence of `header`. A second definition of
    /// the same signature is a contract violation in the input pre-pass.
    pub fn mark_declared(&mut self, header: &str) {
        assert!(
            self.declared.insert(header.to_string()),
            "duplicate procedure definition with signature '{}'",
            header
        );
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn into_templates(self) -> Vec<ProcedureDefinition> {
        self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catrobat::Brick;

    #[test]
    fn forward_registration_fills_slot_in_place() {
        let mut arena = ObjectArena::new();
        let forward = arena.get_or_register("Banana");
        arena.sprite_mut(forward).scripts.push(
            crate::catrobat::Script::new(crate::catrobat::Trigger::Cloned),
        );
        let declared = arena.declare("Banana");
        assert_eq!(forward, declared);
        assert!(arena.is_declared(declared));
        assert_eq!(arena.sprite(declared).scripts.len(), 1);
    }

    #[test]
    fn output_order_is_declaration_order_then_stubs() {
        let mut arena = ObjectArena::new();
        arena.declare("Stage");
        arena.get_or_register("Ghost");
        arena.declare("Cat");
        arena.declare("Ghost2");
        let names: Vec<String> = arena.into_sprites().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Stage", "Cat", "Ghost2", "Ghost"]);
    }

    #[test]
    fn layout_cursor_wraps_to_next_column() {
        let mut cursor = LayoutCursor::default();
        let mut positions = Vec::new();
        for _ in 0..6 {
            positions.push(cursor.next_position());
        }
        assert_eq!(positions[0], (-220, 170));
        assert_eq!(positions[4], (-220, 10));
        assert_eq!(positions[5], (-140, 170));
    }

    #[test]
    fn template_created_once_per_signature() {
        let mut labels = HashMap::new();
        labels.insert(
            "block %n".to_string(),
            vec!["steps".to_string()],
        );
        let mut ctx = SpriteContext::new("cat", labels);
        ctx.template_for("block %n").unwrap();
        ctx.template_for("block %n").unwrap().body.push(Brick::Show);
        assert_eq!(ctx.template_count(), 1);
        assert_eq!(ctx.into_templates()[0].body, vec![Brick::Show]);
    }

    #[test]
    #[should_panic(expected = "duplicate procedure definition")]
    fn duplicate_declaration_panics() {
        let mut ctx = SpriteContext::new("cat", HashMap::new());
        ctx.mark_declared("block %n");
        ctx.mark_declared("block %n");
    }

    #[test]
    fn brick_ids_are_unique() {
        let mut gen = BrickIdGen::default();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_ne!(a, b);
    }
}
