//! The conversion engine: walks Scratch instruction trees in post-order
//! over an explicit evaluation stack and produces the Catrobat graph.
//!
//! Blocks whose mapping is a plain constructor go through the registry in
//! `mapping`; everything with extra semantics (loops, symbolic list
//! positions, look index arithmetic, user procedures, ...) has an adapter
//! here. A single failing block never aborts the conversion: it is
//! replaced by a note brick carrying the identifier, and the surrounding
//! script stays intact.

use std::collections::HashMap;

use anyhow::{anyhow, bail, ensure, Result};
use serde_json::Value;

use crate::catrobat::{
    generated_variable_name, is_generated_variable, Brick, FormulaElement, Function, GoToTarget,
    Look, Operator, ParamKind, Program, RotationStyle, Sensor, SoundInfo, Trigger, UserList,
    UserVariable,
};
use crate::context::{ObjectArena, ObjectId, ProgramContext, SpriteContext};
use crate::emulation;
use crate::mapping::{self, Arg, Mapping, TriggerMapping};
use crate::scratch::{self, Literal, ScriptElement};

const UNSUPPORTED_SCRIPT_MARKER: &str = "UNSUPPORTED SCRIPT";

/// Maps source resource identities to the file names the packaged program
/// will use. Media transcoding itself happens downstream; the converter
/// only needs the names.
pub trait AssetResolver {
    fn resource_file_name(&self, md5_name: &str, resource_name: &str) -> String;

    /// File name for the image of a synthesized key-indicator object.
    fn key_image_file_name(&self, key: &str) -> String {
        format!("key_{}.png", key.replace(' ', "_"))
    }

    /// File name for the image of the synthesized pointer-tracker object.
    fn pointer_image_file_name(&self) -> String {
        "mouse_cursor_dummy.png".to_string()
    }
}

/// Default naming scheme: `<md5>_<resource name>`, the layout the media
/// converter writes.
pub struct BasicResolver;

impl AssetResolver for BasicResolver {
    fn resource_file_name(&self, md5_name: &str, resource_name: &str) -> String {
        format!("{}_{}", md5_name, resource_name)
    }
}

pub fn shared_answer_variable_name() -> String {
    generated_variable_name("global_answer")
}

pub fn timer_variable_name() -> String {
    generated_variable_name("timer")
}

/// Converts a whole Scratch program into a Catrobat program graph.
pub fn convert(project: &scratch::Project, resolver: &dyn AssetResolver) -> Result<Program> {
    ProgramConverter::new(project, resolver).run()
}

fn unsupported_block_note(description: &str) -> Brick {
    Brick::note(format!(
        "Missing brick for Scratch identifier: [{}]",
        description
    ))
}

fn unsupported_formula_note(held_by: &str, description: &str) -> Brick {
    Brick::note(format!(
        "Missing formula element in brick: [{}] for Scratch identifier: [{}]",
        held_by, description
    ))
}

fn describe_block(name: &str, args: &[Arg]) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = args.iter().map(|a| a.summary()).collect();
    format!("{}, {}", name, rendered.join(", "))
}

/// A block with no Catrobat equivalent, kept on the stack until its
/// position (statement or argument) decides the placeholder wording.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UnmappedBlock {
    description: String,
}

impl UnmappedBlock {
    fn new(name: &str, args: &[Arg]) -> UnmappedBlock {
        UnmappedBlock {
            description: describe_block(name, args),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// One entry of the evaluation stack.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StackEntry {
    /// Recursion boundary for an instruction being converted.
    Marker(String),
    /// Boundary for a nested statement body.
    ListMarker,
    Raw(Literal),
    Formula(FormulaElement),
    Brick(Brick),
    Bricks(Vec<Brick>),
    Unmapped(UnmappedBlock),
}

pub(crate) struct ProgramConverter<'a> {
    pub(crate) source: &'a scratch::Project,
    pub(crate) resolver: &'a dyn AssetResolver,
    pub(crate) arena: ObjectArena,
    pub(crate) ctx: ProgramContext,
    pub(crate) program_variables: Vec<UserVariable>,
    pub(crate) program_lists: Vec<UserList>,
    background: Option<ObjectId>,
}

impl<'a> ProgramConverter<'a> {
    pub(crate) fn new(
        source: &'a scratch::Project,
        resolver: &'a dyn AssetResolver,
    ) -> ProgramConverter<'a> {
        ProgramConverter {
            source,
            resolver,
            arena: ObjectArena::new(),
            ctx: ProgramContext::default(),
            program_variables: Vec::new(),
            program_lists: Vec::new(),
            background: None,
        }
    }

    pub(crate) fn run(mut self) -> Result<Program> {
        let source = self.source;

        // The shared answer variable must exist before the stage's startup
        // bricks are assembled, even when only a later object asks.
        if program_reads_answer(source) {
            self.declare_program_variable(&shared_answer_variable_name(), None);
        }

        for object in &source.objects {
            self.convert_object(object)?;
        }

        let key_names = emulation::add_key_sprites(&mut self);
        emulation::add_pointer_sprite(&mut self, &key_names);

        let undeclared = self.arena.undeclared_names();
        if !undeclared.is_empty() {
            log::warn!(
                "objects referenced but never declared, keeping stubs: {}",
                undeclared.join(", ")
            );
        }

        Ok(Program {
            name: source.name.clone(),
            virtual_screen_width: scratch::STAGE_WIDTH_IN_PIXELS,
            virtual_screen_height: scratch::STAGE_HEIGHT_IN_PIXELS,
            objects: self.arena.into_sprites(),
            variables: self.program_variables,
            lists: self.program_lists,
        })
    }

    // variable and list registries; identity is (name, scope) and repeated
    // declaration returns the existing entry

    pub(crate) fn declare_program_variable(&mut self, name: &str, initial: Option<FormulaElement>) {
        if self.program_variables.iter().any(|v| v.name == name) {
            return;
        }
        self.program_variables.push(UserVariable {
            name: name.to_string(),
            initial,
        });
    }

    pub(crate) fn declare_program_list(&mut self, name: &str) {
        if self.program_lists.iter().any(|l| l.name == name) {
            return;
        }
        self.program_lists.push(UserList {
            name: name.to_string(),
        });
    }

    fn declare_sprite_variable(&mut self, id: ObjectId, name: &str) {
        let sprite = self.arena.sprite_mut(id);
        if sprite.variables.iter().any(|v| v.name == name) {
            return;
        }
        sprite.variables.push(UserVariable {
            name: name.to_string(),
            initial: None,
        });
    }

    fn declare_sprite_list(&mut self, id: ObjectId, name: &str) {
        let sprite = self.arena.sprite_mut(id);
        if sprite.lists.iter().any(|l| l.name == name) {
            return;
        }
        sprite.lists.push(UserList {
            name: name.to_string(),
        });
    }

    /// Sprite scope first, then program scope.
    fn has_variable(&self, id: ObjectId, name: &str) -> bool {
        self.arena.sprite(id).variables.iter().any(|v| v.name == name)
            || self.program_variables.iter().any(|v| v.name == name)
    }

    fn has_list(&self, id: ObjectId, name: &str) -> bool {
        self.arena.sprite(id).lists.iter().any(|l| l.name == name)
            || self.program_lists.iter().any(|l| l.name == name)
    }

    fn has_program_variable(&self, name: &str) -> bool {
        self.program_variables.iter().any(|v| v.name == name)
    }

    fn is_background(&self, id: ObjectId) -> bool {
        self.background == Some(id)
    }

    fn shared_answer_variable(&mut self) -> String {
        let name = shared_answer_variable_name();
        self.declare_program_variable(&name, None);
        name
    }

    fn convert_object(&mut self, object: &'a scratch::Object) -> Result<()> {
        let sprite_id = self.arena.declare(&object.name);
        if object.is_stage {
            self.background = Some(sprite_id);
        }
        log::info!("converting object '{}'", object.name);

        let mut declared_labels: HashMap<String, Vec<String>> = HashMap::new();
        for script in &object.scripts {
            if script.trigger != scratch::SCRIPT_PROC_DEF {
                continue;
            }
            let Some(header) = script.arguments.first().and_then(Value::as_str) else {
                continue;
            };
            let labels = script
                .arguments
                .get(1)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            declared_labels.insert(header.to_string(), labels);
        }
        let mut sprite_ctx = SpriteContext::new(&object.name, declared_labels);

        // looks and sounds first: script conversion validates against them
        let mut costume_resolution = None;
        for costume in &object.costumes {
            match (costume_resolution, costume.resolution) {
                (None, resolution) => costume_resolution = resolution,
                (Some(seen), Some(resolution)) if seen != resolution => {
                    log::warn!(
                        "costume resolution not same for all costumes of '{}', keeping {}",
                        object.name,
                        seen
                    );
                }
                _ => {}
            }
            let file_name = self
                .resolver
                .resource_file_name(&costume.md5_name, &costume.name);
            self.arena.sprite_mut(sprite_id).looks.push(Look {
                name: costume.name.clone(),
                file_name,
            });
        }
        for sound in &object.sounds {
            let file_name = self
                .resolver
                .resource_file_name(&sound.md5_name, &sound.name);
            self.arena.sprite_mut(sprite_id).sounds.push(SoundInfo {
                name: sound.name.clone(),
                file_name,
            });
        }

        for list in &object.lists {
            ensure!(!list.name.is_empty(), "empty list name in '{}'", object.name);
            if object.is_stage {
                self.declare_program_list(&list.name);
            } else {
                self.declare_sprite_list(sprite_id, &list.name);
            }
        }
        for variable in &object.variables {
            if object.is_stage {
                self.declare_program_variable(&variable.name, None);
            } else {
                self.declare_sprite_variable(sprite_id, &variable.name);
            }
        }

        for script in &object.scripts {
            if script.trigger == scratch::SCRIPT_PROC_DEF {
                if let Err(e) = self.convert_procedure_definition(script, sprite_id, &mut sprite_ctx)
                {
                    log::warn!(
                        "unable to convert procedure definition in '{}': {:#}",
                        object.name,
                        e
                    );
                    let mut fallback = crate::catrobat::Script::new(Trigger::ProgramStart);
                    fallback.bricks.push(unsupported_block_note(&format!(
                        "{}, {}",
                        UNSUPPORTED_SCRIPT_MARKER,
                        scratch::SCRIPT_PROC_DEF
                    )));
                    self.arena.sprite_mut(sprite_id).scripts.push(fallback);
                }
                continue;
            }

            log::debug!("  script '{}', args: {:?}", script.trigger, script.arguments);
            let mut leading_note = None;
            let trigger = match self.create_trigger(script, sprite_id, &mut sprite_ctx) {
                Ok(trigger) => trigger,
                Err(e) => {
                    log::warn!(
                        "unable to convert script '{}', replacing with start script: {:#}",
                        script.trigger,
                        e
                    );
                    leading_note = Some(unsupported_block_note(&format!(
                        "{}, {}",
                        UNSUPPORTED_SCRIPT_MARKER, script.trigger
                    )));
                    Trigger::ProgramStart
                }
            };

            let body = {
                let mut traverser = Traverser::new(self, sprite_id, &mut sprite_ctx);
                traverser.convert_body(&script.body)
            };
            let bricks = match body {
                Ok(bricks) => bricks,
                Err(e) => {
                    log::error!(
                        "unable to convert script body in '{}': {:#}",
                        object.name,
                        e
                    );
                    vec![unsupported_block_note(&format!(
                        "{}, {}",
                        UNSUPPORTED_SCRIPT_MARKER, script.trigger
                    ))]
                }
            };

            let mut converted = crate::catrobat::Script::new(trigger);
            if let Some(note) = leading_note {
                converted.bricks.push(note);
            }
            converted.bricks.extend(bricks);
            self.arena.sprite_mut(sprite_id).scripts.push(converted);
        }

        self.arena.sprite_mut(sprite_id).procedures = sprite_ctx.into_templates();

        // startup-state synthesis is isolated per object: a failure here
        // skips only this augmentation, converted scripts stay intact
        if let Err(e) = self.add_default_behaviour(sprite_id, object, costume_resolution) {
            log::error!(
                "cannot add default behaviour to object '{}': {:#}",
                object.name,
                e
            );
        }
        Ok(())
    }

    fn convert_procedure_definition(
        &mut self,
        script: &scratch::Script,
        sprite_id: ObjectId,
        sprite_ctx: &mut SpriteContext,
    ) -> Result<()> {
        ensure!(
            script.arguments.len() >= 3,
            "procedure definition needs header, labels and defaults"
        );
        let header = script
            .arguments
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("procedure header must be a string"))?
            .to_string();

        let kinds = sprite_ctx.template_for(&header)?.param_kinds();
        sprite_ctx.mark_declared(&header);

        let defaults_raw = script
            .arguments
            .get(2)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        ensure!(
            defaults_raw.len() == kinds.len(),
            "procedure '{}' declares {} parameters but {} defaults",
            header,
            kinds.len(),
            defaults_raw.len()
        );
        let defaults = defaults_raw
            .iter()
            .zip(kinds.iter())
            .map(|(value, kind)| default_param_value(value, *kind))
            .collect();
        sprite_ctx.template_for(&header)?.defaults = defaults;

        let body = {
            let mut traverser = Traverser::new(self, sprite_id, sprite_ctx);
            traverser.convert_body(&script.body)?
        };
        sprite_ctx.template_for(&header)?.body = body;
        Ok(())
    }

    fn create_trigger(
        &mut self,
        script: &scratch::Script,
        sprite_id: ObjectId,
        sprite_ctx: &mut SpriteContext,
    ) -> Result<Trigger> {
        let Some(trigger_mapping) = mapping::trigger_for(&script.trigger) else {
            bail!("unknown script identifier '{}'", script.trigger);
        };
        match trigger_mapping {
            TriggerMapping::Ctor(ctor) => ctor(&script.arguments),
            TriggerMapping::ProcedureDefinition => {
                bail!("procedure definitions are not scripts")
            }
            TriggerMapping::SensorGreaterThan => {
                let [sensor_type, threshold] = script.arguments.as_slice() else {
                    bail!("sensor hat expects a sensor name and a threshold");
                };
                let left = match sensor_type.as_str() {
                    Some("timer") => {
                        let name = timer_variable_name();
                        self.declare_program_variable(&name, Some(FormulaElement::Number(0.0)));
                        FormulaElement::UserVariable(name)
                    }
                    Some("loudness") => FormulaElement::sensor(Sensor::Loudness),
                    other => bail!("unsupported sensor type {:?}", other),
                };
                let right = self.convert_expression_value(threshold, sprite_id, sprite_ctx)?;
                Ok(Trigger::Condition {
                    condition: FormulaElement::binary(Operator::GreaterThan, left, right),
                })
            }
            TriggerMapping::BackgroundSwitchesTo => {
                let look = script
                    .arguments
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("background hat expects a look name"))?;
                let background = self
                    .background
                    .unwrap_or(sprite_id);
                ensure!(
                    self.arena.sprite(background).look_named(look).is_some(),
                    "background does not contain look with name: {}",
                    look
                );
                Ok(Trigger::BackgroundChangesTo {
                    look: look.to_string(),
                })
            }
        }
    }

    /// Converts a raw value that may itself be a nested expression block,
    /// through a traverser with fresh stacks.
    fn convert_expression_value(
        &mut self,
        raw: &Value,
        sprite_id: ObjectId,
        sprite_ctx: &mut SpriteContext,
    ) -> Result<FormulaElement> {
        let element = ScriptElement::from_raw(raw);
        let mut traverser = Traverser::new(self, sprite_id, sprite_ctx);
        traverser.traverse(&element);
        ensure!(
            traverser.stack.len() == 1,
            "expression did not convert to a single value"
        );
        match traverser.stack.pop() {
            Some(StackEntry::Formula(f)) => Ok(f),
            Some(StackEntry::Raw(lit)) => Ok(FormulaElement::from_literal(&lit)),
            other => bail!("expression converted to {:?}", other),
        }
    }

    /// Scratch keeps some startup state in plain object attributes; here
    /// the equivalent bricks are synthesized into the start script.
    fn add_default_behaviour(
        &mut self,
        sprite_id: ObjectId,
        object: &scratch::Object,
        costume_resolution: Option<i32>,
    ) -> Result<()> {
        let mut implicit: Vec<Brick> = Vec::new();

        // seed declared list contents
        for list in &object.lists {
            assert!(
                self.has_list(sprite_id, &list.name),
                "list '{}' missing after declaration pre-pass",
                list.name
            );
            for value in &list.contents {
                implicit.push(Brick::AddItemToList {
                    list: list.name.clone(),
                    value: FormulaElement::from_literal(value),
                });
            }
        }

        if let Some(raw_index) = object.current_costume_index {
            let index = raw_index.round() as i64;
            if index != 0 {
                let look = self
                    .arena
                    .sprite(sprite_id)
                    .looks
                    .get(index as usize)
                    .ok_or_else(|| anyhow!("startup look index {} out of range", index))?;
                implicit.push(Brick::SetLook {
                    look: look.name.clone(),
                });
            }
        }

        let x = object.x as i64;
        let y = object.y as i64;
        if x != 0 || y != 0 {
            implicit.push(Brick::PlaceAt {
                x: FormulaElement::Number(x as f64),
                y: FormulaElement::Number(y as f64),
            });
        }

        if costume_resolution.is_some() {
            let object_scale = object.scale.unwrap_or(1.0) * 100.0;
            if object_scale != 100.0 {
                implicit.push(Brick::SetSizeTo {
                    percent: FormulaElement::Number(object_scale),
                });
            }
        }

        let rotation = object.direction.unwrap_or(90.0);
        let full_rotations = (rotation / 360.0).round();
        let effective_rotation = rotation - 360.0 * full_rotations;
        if effective_rotation != 90.0 {
            implicit.push(Brick::PointInDirection {
                degrees: FormulaElement::Number(effective_rotation),
            });
        }

        if object.visible == Some(false) {
            implicit.push(Brick::Hide);
        }

        match object.rotation_style.as_deref() {
            Some("leftRight") => implicit.push(Brick::SetRotationStyle {
                style: RotationStyle::LeftRight,
            }),
            Some("none") => implicit.push(Brick::SetRotationStyle {
                style: RotationStyle::DontRotate,
            }),
            _ => {}
        }

        // variable initialization runs before everything else
        let mut init: Vec<Brick> = Vec::new();
        for variable in &object.variables {
            if variable.name == shared_answer_variable_name() {
                continue;
            }
            init.push(Brick::SetVariable {
                variable: variable.name.clone(),
                value: FormulaElement::from_literal(&variable.value),
            });
        }
        if object.is_stage && self.has_program_variable(&shared_answer_variable_name()) {
            init.push(Brick::SetVariable {
                variable: shared_answer_variable_name(),
                value: FormulaElement::text(""),
            });
        }

        let mut widgets: Vec<Brick> = Vec::new();
        for name in &object.visible_variables {
            ensure!(
                self.has_variable(sprite_id, name),
                "visible variable '{}' is not declared",
                name
            );
            let (x, y) = self.ctx.layout.next_position();
            widgets.push(Brick::ShowVariable {
                variable: name.clone(),
                x,
                y,
            });
        }

        if init.is_empty() && implicit.is_empty() && widgets.is_empty() {
            return Ok(());
        }
        let mut bricks = init;
        bricks.extend(implicit);
        bricks.extend(widgets);
        let script = self.arena.sprite_mut(sprite_id).start_script_mut();
        script.bricks.splice(0..0, bricks);
        Ok(())
    }
}

fn program_reads_answer(project: &scratch::Project) -> bool {
    fn mentions(element: &ScriptElement) -> bool {
        match element {
            ScriptElement::Block { name, args } => {
                name == "doAsk" || name == "answer" || args.iter().any(mentions)
            }
            ScriptElement::List(items) => items.iter().any(mentions),
            ScriptElement::Value(_) => false,
        }
    }
    project
        .objects
        .iter()
        .flat_map(|o| &o.scripts)
        .any(|s| mentions(&s.body))
}

fn default_param_value(value: &Value, kind: ParamKind) -> FormulaElement {
    match kind {
        ParamKind::Number | ParamKind::Boolean => {
            let number = match value {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::Bool(b) => {
                    if *b {
                        1.0
                    } else {
                        0.0
                    }
                }
                Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
                _ => 0.0,
            };
            FormulaElement::Number(number.trunc())
        }
        ParamKind::Text => match value {
            Value::String(s) => FormulaElement::Text(s.clone()),
            Value::Null => FormulaElement::text(""),
            other => FormulaElement::Text(other.to_string()),
        },
    }
}

fn coerce_param_value(arg: &Arg, kind: ParamKind) -> Result<FormulaElement> {
    match arg {
        Arg::Formula(f) => Ok(f.clone()),
        Arg::Literal(lit) => Ok(match kind {
            ParamKind::Number | ParamKind::Boolean => {
                FormulaElement::Number(lit.as_number().unwrap_or(0.0).trunc())
            }
            ParamKind::Text => FormulaElement::Text(lit.to_display_string()),
        }),
        Arg::Bricks(_) => bail!("statement body bound to a procedure parameter"),
    }
}

pub(crate) struct Traverser<'t, 'a> {
    conv: &'t mut ProgramConverter<'a>,
    sprite: ObjectId,
    sprite_ctx: &'t mut SpriteContext,
    pub(crate) stack: Vec<StackEntry>,
    pending_hoist: Vec<Vec<Brick>>,
}

impl<'t, 'a> Traverser<'t, 'a> {
    pub(crate) fn new(
        conv: &'t mut ProgramConverter<'a>,
        sprite: ObjectId,
        sprite_ctx: &'t mut SpriteContext,
    ) -> Traverser<'t, 'a> {
        Traverser {
            conv,
            sprite,
            sprite_ctx,
            stack: Vec::new(),
            pending_hoist: Vec::new(),
        }
    }

    /// Converts a top-level statement body into its brick sequence.
    pub(crate) fn convert_body(&mut self, element: &ScriptElement) -> Result<Vec<Brick>> {
        self.traverse(element);
        ensure!(
            self.stack.len() == 1,
            "script body left {} entries on the evaluation stack",
            self.stack.len()
        );
        match self.stack.pop() {
            Some(StackEntry::Bricks(bricks)) => Ok(bricks),
            other => bail!("script body converted to {:?}", other),
        }
    }

    pub(crate) fn traverse(&mut self, element: &ScriptElement) {
        match element {
            ScriptElement::Value(lit) => self.stack.push(StackEntry::Raw(lit.clone())),
            ScriptElement::Block { name, args } => {
                self.stack.push(StackEntry::Marker(name.clone()));
                for arg in args {
                    self.traverse(arg);
                }
                self.visit_block(name);
            }
            ScriptElement::List(items) => {
                self.stack.push(StackEntry::ListMarker);
                for item in items {
                    self.traverse(item);
                }
                self.visit_list();
            }
        }
    }

    fn visit_block(&mut self, name: &str) {
        let marker_pos = self
            .stack
            .iter()
            .rposition(|e| matches!(e, StackEntry::Marker(n) if n == name))
            .expect("instruction marker missing from evaluation stack");
        let mut raw_entries = self.stack.split_off(marker_pos + 1);
        self.stack.pop();

        // function blocks share one identifier with the function name as
        // first argument; strip it so the registry sees the function
        let mut name = name.to_string();
        if name == "computeFunction:of:" {
            if let Some(StackEntry::Raw(Literal::Text(function))) = raw_entries.first() {
                name = function.clone();
                raw_entries.remove(0);
            }
        }

        // arguments that themselves failed to map become a note plus a
        // neutral zero in their slot
        let mut notes: Vec<Brick> = Vec::new();
        let args: Vec<Arg> = raw_entries
            .into_iter()
            .map(|entry| match entry {
                StackEntry::Raw(lit) => Arg::Literal(lit),
                StackEntry::Formula(f) => Arg::Formula(f),
                StackEntry::Brick(b) => Arg::Bricks(vec![b]),
                StackEntry::Bricks(v) => Arg::Bricks(v),
                StackEntry::Unmapped(unmapped) => {
                    notes.push(unsupported_formula_note(&name, unmapped.description()));
                    Arg::Formula(FormulaElement::Number(0.0))
                }
                StackEntry::Marker(_) | StackEntry::ListMarker => {
                    log::warn!("stray marker in argument position of '{}'", name);
                    Arg::Formula(FormulaElement::Number(0.0))
                }
            })
            .collect();

        let mut out = match self.dispatch(&name, &args) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "replacing block [{}] with note brick: {:#}",
                    describe_block(&name, &args),
                    e
                );
                vec![StackEntry::Brick(unsupported_block_note(&name))]
            }
        };

        if !notes.is_empty() {
            let mut with_notes: Vec<StackEntry> =
                notes.into_iter().map(StackEntry::Brick).collect();
            with_notes.append(&mut out);
            out = with_notes;
        }

        // a result that resolves into statement position flushes any
        // pending hoisted setup bricks ahead of itself
        let all_bricks = out.iter().all(|e| matches!(e, StackEntry::Brick(_)));
        if !self.pending_hoist.is_empty() && all_bricks {
            for group in std::mem::take(&mut self.pending_hoist).into_iter().rev() {
                self.stack.extend(group.into_iter().map(StackEntry::Brick));
            }
        }

        // setup statements produced in an expression position are hoisted;
        // only the trailing expression stays as this node's value
        if out.len() > 1
            && matches!(out.last(), Some(StackEntry::Formula(_)))
            && out[..out.len() - 1]
                .iter()
                .all(|e| matches!(e, StackEntry::Brick(_)))
        {
            let formula = out.pop().expect("formula entry");
            let setup = out
                .into_iter()
                .map(|e| match e {
                    StackEntry::Brick(b) => b,
                    _ => unreachable!("checked to be bricks"),
                })
                .collect();
            self.pending_hoist.push(setup);
            out = vec![formula];
        }

        self.stack.extend(out);
    }

    fn visit_list(&mut self) {
        let marker_pos = self
            .stack
            .iter()
            .rposition(|e| matches!(e, StackEntry::ListMarker))
            .expect("list marker missing from evaluation stack");
        let entries = self.stack.split_off(marker_pos + 1);
        self.stack.pop();

        let mut bricks = Vec::new();
        for entry in entries {
            match entry {
                StackEntry::Brick(b) => bricks.push(b),
                StackEntry::Bricks(v) => bricks.extend(v),
                StackEntry::Unmapped(unmapped) => {
                    bricks.push(unsupported_block_note(unmapped.description()));
                }
                StackEntry::Raw(_) | StackEntry::Formula(_) => {
                    // matches Scratch behavior: stray values in statement
                    // position are ignored
                    log::debug!("ignoring non-statement value in statement body");
                }
                StackEntry::Marker(_) | StackEntry::ListMarker => {
                    log::warn!("stray marker inside statement body");
                }
            }
        }
        self.stack.push(StackEntry::Bricks(bricks));
    }

    /// Sub-conversion entry point used by adapters: converts one identifier
    /// with an explicit argument list, without touching the evaluation
    /// stack of the enclosing traversal.
    fn convert_helper(&mut self, name: &str, args: &[Arg]) -> Result<Vec<StackEntry>> {
        self.dispatch(name, args)
    }

    fn helper_formula(&mut self, name: &str, args: &[Arg]) -> Result<FormulaElement> {
        let mut out = self.convert_helper(name, args)?;
        match (out.len(), out.pop()) {
            (1, Some(StackEntry::Formula(f))) => Ok(f),
            (_, other) => bail!("helper '{}' did not produce a formula: {:?}", name, other),
        }
    }

    fn dispatch(&mut self, name: &str, args: &[Arg]) -> Result<Vec<StackEntry>> {
        if scratch::is_script_identifier(name) {
            bail!("script identifier '{}' nested inside a script body", name);
        }
        if let Some(result) = self.adapter(name, args) {
            return result;
        }
        match mapping::lookup(name) {
            Mapping::Stmt(ctor) => Ok(ctor(args)?.into_iter().map(StackEntry::Brick).collect()),
            Mapping::Operator(Operator::Not) => {
                let [operand] = args else {
                    bail!("'not' expects one operand");
                };
                Ok(formula_out(FormulaElement::unary(
                    Operator::Not,
                    operand.formula()?,
                )))
            }
            Mapping::Operator(op) => {
                let [left, right] = args else {
                    bail!("operator '{}' expects two operands", name);
                };
                Ok(formula_out(FormulaElement::binary(
                    op,
                    left.formula()?,
                    right.formula()?,
                )))
            }
            Mapping::Function(function) => {
                let converted: Result<Vec<FormulaElement>> =
                    args.iter().map(Arg::formula).collect();
                Ok(formula_out(FormulaElement::function(function, converted?)))
            }
            Mapping::Sensor(sensor) => Ok(formula_out(FormulaElement::sensor(sensor))),
            Mapping::Adapter => bail!("adapter identifier '{}' fell through", name),
            Mapping::Unmapped => {
                log::debug!("no Catrobat construct for '{}'", name);
                Ok(vec![StackEntry::Unmapped(UnmappedBlock::new(name, args))])
            }
        }
    }

    fn adapter(&mut self, name: &str, args: &[Arg]) -> Option<Result<Vec<StackEntry>>> {
        let result = match name {
            "()" => self.bracket_block(args),
            "10 ^" => self.pow_of_ten_block(args),
            "computeFunction:of:" => Err(anyhow!("malformed function block")),
            "lineCountOfList:" => self.line_count_block(args),
            "list:contains:" => self.list_contains_block(args),
            "getLine:ofList:" => self.get_line_block(args),
            "contentsOfList:" => self.contents_of_list_block(args),
            "append:toList:" => self.append_to_list_block(args),
            "insert:at:ofList:" => self.insert_at_list_block(args),
            "deleteLine:ofList:" => self.delete_line_block(args),
            "setLine:ofList:to:" => self.set_line_block(args),
            "doForever" | "doRepeat" => self.loop_block(name, args),
            "doUntil" => self.do_until_block(args),
            "doIf" => self.if_block(args),
            "doIfElse" => self.if_else_block(args),
            "lookLike:" => self.look_like_block(args),
            "startScene" => self.start_scene_block(args),
            "startSceneAndWait" => self.start_scene_and_wait_block(args),
            "setGraphicEffect:to:" => self.set_graphic_effect_block(args),
            "changeGraphicEffect:by:" => self.change_graphic_effect_block(args),
            "setVar:to:" => self.variable_block(args, false),
            "changeVar:by:" => self.variable_block(args, true),
            "readVariable" => self.read_variable_block(args),
            "showVariable:" => self.show_variable_block(args),
            "hideVariable:" => self.hide_variable_block(args),
            "playSound:" => self.play_sound_block(args, false),
            "doPlaySoundAndWait" => self.play_sound_block(args, true),
            "say:" => self.say_block(args),
            "say:duration:elapsed:from:" => self.say_for_block(args),
            "think:" => self.think_block(args),
            "think:duration:elapsed:from:" => self.think_for_block(args),
            "doAsk" => self.do_ask_block(args),
            "answer" => self.answer_block(args),
            "createCloneOf" => self.create_clone_block(args),
            "timeAndDate" => self.time_and_date_block(args),
            "penColor:" => self.pen_color_block(args),
            "penSize:" => self.pen_size_block(args),
            "setRotationStyle" => self.set_rotation_style_block(args),
            "call" => self.call_block(args),
            "getParam" => self.get_param_block(args),
            "pointTowards:" => self.point_towards_block(args),
            "gotoSpriteOrMouse:" => self.goto_sprite_or_mouse_block(args),
            "touching:" => self.touching_block(args),
            "broadcast:" => self.broadcast_block(args, false),
            "doBroadcastAndWait" => self.broadcast_block(args, true),
            "soundLevel" => self.sound_level_block(args),
            "mouseX" => self.mouse_position_block(true),
            "mouseY" => self.mouse_position_block(false),
            "keyPressed:" => self.key_pressed_block(args),
            _ => return None,
        };
        Some(result)
    }

    // formula element adapters

    fn bracket_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [value] = args else {
            bail!("bracket expects one value");
        };
        Ok(formula_out(FormulaElement::bracket(value.formula()?)))
    }

    fn pow_of_ten_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [value] = args else {
            bail!("power-of-ten expects one value");
        };
        // Catrobat has no 10^x, but exp and ln exist and
        // 10^x == exp(x * ln(10)); round to hide floating point dust
        let ln_ten = self.helper_formula("ln", &[Arg::Literal(Literal::Number(10.0))])?;
        let exponent =
            self.helper_formula("*", &[value.clone(), Arg::Formula(ln_ten)])?;
        let raised = self.helper_formula("e^", &[Arg::Formula(exponent)])?;
        let rounded = self.helper_formula("rounded", &[Arg::Formula(raised)])?;
        Ok(formula_out(rounded))
    }

    fn list_length_formula(&mut self, list_name: &str) -> FormulaElement {
        assert!(
            self.conv.has_list(self.sprite, list_name),
            "list '{}' must be declared before use",
            list_name
        );
        FormulaElement::function(
            Function::NumberOfItems,
            vec![FormulaElement::list(list_name)],
        )
    }

    /// Shared resolution of symbolic list positions: "last" is the current
    /// length, "random" a random index in [1, length], anything else is a
    /// 1-based index value.
    fn symbolic_list_index(&mut self, position: &Arg, list_name: &str) -> Result<FormulaElement> {
        match position.as_text() {
            Some("last") => Ok(self.list_length_formula(list_name)),
            Some("random") => {
                let length = self.list_length_formula(list_name);
                Ok(FormulaElement::function(
                    Function::Rand,
                    vec![FormulaElement::Number(1.0), length],
                ))
            }
            _ => position.formula(),
        }
    }

    fn line_count_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [list_name] = args else {
            bail!("list length expects one list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?
            .to_string();
        Ok(formula_out(self.list_length_formula(&name)))
    }

    fn list_contains_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [list_name, value] = args else {
            bail!("list contains expects a list name and a value");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?;
        assert!(
            self.conv.has_list(self.sprite, name),
            "list '{}' must be declared before use",
            name
        );
        Ok(formula_out(FormulaElement::function(
            Function::Contains,
            vec![FormulaElement::list(name), value.formula()?],
        )))
    }

    fn get_line_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [position, list_name] = args else {
            bail!("list item expects a position and a list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?
            .to_string();
        let index = self.symbolic_list_index(position, &name)?;
        Ok(formula_out(FormulaElement::function(
            Function::ListItem,
            vec![index, FormulaElement::list(&name)],
        )))
    }

    fn contents_of_list_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [list_name] = args else {
            bail!("list contents expects one list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?;
        assert!(
            self.conv.has_list(self.sprite, name),
            "list '{}' must be declared before use",
            name
        );
        Ok(formula_out(FormulaElement::list(name)))
    }

    // list statement adapters

    fn append_to_list_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [value, list_name] = args else {
            bail!("append expects a value and a list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?;
        assert!(
            self.conv.has_list(self.sprite, name),
            "list '{}' must be declared before use",
            name
        );
        Ok(bricks_out(vec![Brick::AddItemToList {
            list: name.to_string(),
            value: value.formula()?,
        }]))
    }

    fn insert_at_list_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [value, position, list_name] = args else {
            bail!("insert expects a value, a position and a list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?
            .to_string();
        if position.as_text() == Some("last") {
            return self.convert_helper(
                "append:toList:",
                &[value.clone(), Arg::Literal(Literal::Text(name))],
            );
        }
        let index = self.symbolic_list_index(position, &name)?;
        assert!(
            self.conv.has_list(self.sprite, &name),
            "list '{}' must be declared before use",
            name
        );
        Ok(bricks_out(vec![Brick::InsertItemIntoList {
            list: name,
            index,
            value: value.formula()?,
        }]))
    }

    fn delete_line_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [position, list_name] = args else {
            bail!("delete expects a position and a list name");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?
            .to_string();
        match position.as_text() {
            Some("all") => {
                // delete item 1 length-many times; there is no clear-list
                // brick
                let length = self.list_length_formula(&name);
                let start = self.conv.ctx.brick_ids.next_id();
                let end = self.conv.ctx.brick_ids.next_id();
                Ok(bricks_out(vec![
                    Brick::Repeat {
                        id: start,
                        times: length,
                        end,
                    },
                    Brick::DeleteItemOfList {
                        list: name,
                        index: FormulaElement::Number(1.0),
                    },
                    Brick::LoopEnd { id: end, start },
                ]))
            }
            _ => {
                let index = self.symbolic_list_index(position, &name)?;
                Ok(bricks_out(vec![Brick::DeleteItemOfList { list: name, index }]))
            }
        }
    }

    fn set_line_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [position, list_name, value] = args else {
            bail!("replace expects a position, a list name and a value");
        };
        let name = list_name
            .as_text()
            .ok_or_else(|| anyhow!("list name must be static"))?
            .to_string();
        let index = self.symbolic_list_index(position, &name)?;
        Ok(bricks_out(vec![Brick::ReplaceItemInList {
            list: name,
            index,
            value: value.formula()?,
        }]))
    }

    // control flow adapters

    fn loop_block(&mut self, name: &str, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let start = self.conv.ctx.brick_ids.next_id();
        let end = self.conv.ctx.brick_ids.next_id();
        let (begin, body) = if name == "doRepeat" {
            let times = args
                .first()
                .ok_or_else(|| anyhow!("repeat expects a count"))?
                .formula()?;
            let body = match args.get(1) {
                Some(arg) => arg.bricks()?,
                None => Vec::new(),
            };
            (
                Brick::Repeat {
                    id: start,
                    times,
                    end,
                },
                body,
            )
        } else {
            let body = match args.first() {
                Some(arg) => arg.bricks()?,
                None => Vec::new(),
            };
            (Brick::Forever { id: start, end }, body)
        };
        let mut bricks = vec![begin];
        bricks.extend(body);
        bricks.push(Brick::LoopEnd { id: end, start });
        Ok(bricks_out(bricks))
    }

    fn do_until_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let condition = args
            .first()
            .ok_or_else(|| anyhow!("repeat-until expects a condition"))?
            .formula()?;
        let body = match args.get(1) {
            Some(arg) => arg.bricks()?,
            None => Vec::new(),
        };
        let start = self.conv.ctx.brick_ids.next_id();
        let end = self.conv.ctx.brick_ids.next_id();
        let mut bricks = vec![Brick::RepeatUntil {
            id: start,
            condition,
            end,
        }];
        bricks.extend(body);
        bricks.push(Brick::LoopEnd { id: end, start });
        Ok(bricks_out(bricks))
    }

    fn if_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let condition = args
            .first()
            .ok_or_else(|| anyhow!("if expects a condition"))?
            .formula()?;
        let body = match args.get(1) {
            Some(arg) => arg.bricks()?,
            None => Vec::new(),
        };
        let begin = self.conv.ctx.brick_ids.next_id();
        let end = self.conv.ctx.brick_ids.next_id();
        let mut bricks = vec![Brick::IfThenBegin {
            id: begin,
            condition,
            end,
        }];
        bricks.extend(body);
        bricks.push(Brick::IfThenEnd { id: end, begin });
        Ok(bricks_out(bricks))
    }

    fn if_else_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let condition = args
            .first()
            .ok_or_else(|| anyhow!("if-else expects a condition"))?
            .formula()?;
        let then_body = match args.get(1) {
            Some(arg) => arg.bricks()?,
            None => Vec::new(),
        };
        let else_body = match args.get(2) {
            Some(arg) => arg.bricks()?,
            None => Vec::new(),
        };
        let begin = self.conv.ctx.brick_ids.next_id();
        let else_branch = self.conv.ctx.brick_ids.next_id();
        let end = self.conv.ctx.brick_ids.next_id();
        let mut bricks = vec![Brick::IfElseBegin {
            id: begin,
            condition,
            else_branch,
            end,
        }];
        bricks.extend(then_body);
        bricks.push(Brick::IfElse {
            id: else_branch,
            begin,
            end,
        });
        bricks.extend(else_body);
        bricks.push(Brick::IfElseEnd {
            id: end,
            begin,
            else_branch,
        });
        Ok(bricks_out(bricks))
    }

    // look adapters

    /// Both instruction sets use 1-based look indices, but a Scratch index
    /// may be out of range, so selecting by number always wraps:
    /// ((value - 1) mod number_of_looks) + 1.
    fn wrapped_look_index(&mut self, value: FormulaElement, number_of_looks: usize) -> FormulaElement {
        if number_of_looks == 1 {
            return FormulaElement::Number(1.0);
        }
        match value {
            FormulaElement::Number(v) => {
                let n = number_of_looks as i64;
                let effective = (v.trunc() as i64 - 1).rem_euclid(n) + 1;
                FormulaElement::Number(effective as f64)
            }
            other => {
                let minus_one =
                    FormulaElement::binary(Operator::Minus, other, FormulaElement::Number(1.0));
                let wrapped = FormulaElement::function(
                    Function::Mod,
                    vec![
                        FormulaElement::bracket(minus_one),
                        FormulaElement::Number(number_of_looks as f64),
                    ],
                );
                FormulaElement::binary(Operator::Plus, wrapped, FormulaElement::Number(1.0))
            }
        }
    }

    fn look_like_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [argument] = args else {
            bail!("switch-look expects one argument");
        };
        if is_numeric_or_computed(argument) {
            let number_of_looks = self.conv.arena.sprite(self.sprite).looks.len();
            ensure!(number_of_looks > 0, "object has no looks");
            let index = self.wrapped_look_index(argument.formula()?, number_of_looks);
            return Ok(bricks_out(vec![Brick::SetLookByIndex { index }]));
        }
        let look_name = argument
            .as_text()
            .ok_or_else(|| anyhow!("look selector must be a name or a number"))?;
        let sprite = self.conv.arena.sprite(self.sprite);
        if sprite.look_named(look_name).is_none() {
            let available: Vec<&str> = sprite.looks.iter().map(|l| l.name.as_str()).collect();
            let message = format!(
                "Look name: '{}' not found in object '{}'. Available looks: {}",
                look_name,
                sprite.name,
                available.join(", ")
            );
            log::warn!("{}", message);
            return Ok(bricks_out(vec![Brick::note(message)]));
        }
        Ok(bricks_out(vec![Brick::SetLook {
            look: look_name.to_string(),
        }]))
    }

    fn background_look_count(&mut self) -> Result<usize> {
        let background = self
            .conv
            .background
            .ok_or_else(|| anyhow!("program has no background object"))?;
        let count = self.conv.arena.sprite(background).looks.len();
        ensure!(count > 0, "background has no looks");
        Ok(count)
    }

    fn start_scene_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [argument] = args else {
            bail!("switch-backdrop expects one argument");
        };
        if is_numeric_or_computed(argument) {
            let count = self.background_look_count()?;
            let index = self.wrapped_look_index(argument.formula()?, count);
            return Ok(bricks_out(vec![Brick::SetBackgroundByIndex { index }]));
        }
        let look_name = argument
            .as_text()
            .ok_or_else(|| anyhow!("backdrop selector must be a name or a number"))?;
        match look_name {
            // only the background object has native next/previous
            // semantics, elsewhere the index is computed explicitly
            "next backdrop" => {
                if self.conv.is_background(self.sprite) {
                    return Ok(bricks_out(vec![Brick::NextLook]));
                }
                let index = FormulaElement::binary(
                    Operator::Plus,
                    FormulaElement::sensor(Sensor::ObjectBackgroundNumber),
                    FormulaElement::Number(1.0),
                );
                Ok(bricks_out(vec![Brick::SetBackgroundByIndex { index }]))
            }
            "previous backdrop" => {
                if self.conv.is_background(self.sprite) {
                    return Ok(bricks_out(vec![Brick::PreviousLook]));
                }
                let index = FormulaElement::binary(
                    Operator::Minus,
                    FormulaElement::sensor(Sensor::ObjectBackgroundNumber),
                    FormulaElement::Number(1.0),
                );
                Ok(bricks_out(vec![Brick::SetBackgroundByIndex { index }]))
            }
            name => {
                let background = self
                    .conv
                    .background
                    .ok_or_else(|| anyhow!("program has no background object"))?;
                if self.conv.arena.sprite(background).look_named(name).is_none() {
                    let message =
                        format!("Background does not contain look with name: {}", name);
                    log::warn!("{}", message);
                    return Ok(bricks_out(vec![Brick::note(message)]));
                }
                Ok(bricks_out(vec![Brick::SetBackground {
                    look: name.to_string(),
                }]))
            }
        }
    }

    fn start_scene_and_wait_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        ensure!(
            self.conv.is_background(self.sprite),
            "switch-backdrop-and-wait can only be used by the background object"
        );
        let [argument] = args else {
            bail!("switch-backdrop-and-wait expects one argument");
        };
        if is_numeric_or_computed(argument) {
            let count = self.background_look_count()?;
            let index = self.wrapped_look_index(argument.formula()?, count);
            return Ok(bricks_out(vec![Brick::SetBackgroundByIndexAndWait { index }]));
        }
        let look_name = argument
            .as_text()
            .ok_or_else(|| anyhow!("backdrop selector must be a name or a number"))?;
        match look_name {
            "next backdrop" => Ok(bricks_out(vec![Brick::NextLook])),
            "previous backdrop" => Ok(bricks_out(vec![Brick::PreviousLook])),
            name => {
                if self.conv.arena.sprite(self.sprite).look_named(name).is_none() {
                    let message =
                        format!("Background does not contain look with name: {}", name);
                    log::warn!("{}", message);
                    return Ok(bricks_out(vec![Brick::note(message)]));
                }
                Ok(bricks_out(vec![Brick::SetBackgroundAndWait {
                    look: name.to_string(),
                }]))
            }
        }
    }

    // graphic effect adapters

    fn set_graphic_effect_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [effect, value] = args else {
            bail!("set-effect expects an effect name and a value");
        };
        match effect.as_text() {
            Some("brightness") => {
                // range  Scratch: -100 to 100  (default:   0)
                // range Catrobat:    0 to 200% (default: 100%)
                let percent = match value.formula()? {
                    FormulaElement::Number(v) => FormulaElement::Number(v + 100.0),
                    other => FormulaElement::binary(
                        Operator::Plus,
                        other,
                        FormulaElement::Number(100.0),
                    ),
                };
                Ok(bricks_out(vec![Brick::SetBrightness { percent }]))
            }
            Some("ghost") => Ok(bricks_out(vec![Brick::SetTransparency {
                percent: value.formula()?,
            }])),
            Some("color") => Ok(bricks_out(vec![Brick::SetColor {
                value: value.formula()?,
            }])),
            _ => Ok(bricks_out(vec![unsupported_block_note(&describe_block(
                "setGraphicEffect:to:",
                args,
            ))])),
        }
    }

    fn change_graphic_effect_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [effect, value] = args else {
            bail!("change-effect expects an effect name and a value");
        };
        match effect.as_text() {
            // a relative change is already an increment, no range remap
            Some("brightness") => Ok(bricks_out(vec![Brick::ChangeBrightnessBy {
                delta: value.formula()?,
            }])),
            Some("ghost") => Ok(bricks_out(vec![Brick::ChangeTransparencyBy {
                delta: value.formula()?,
            }])),
            Some("color") => Ok(bricks_out(vec![Brick::ChangeColorBy {
                delta: value.formula()?,
            }])),
            _ => Ok(bricks_out(vec![unsupported_block_note(&describe_block(
                "changeGraphicEffect:by:",
                args,
            ))])),
        }
    }

    // variable adapters

    fn variable_block(&mut self, args: &[Arg], change: bool) -> Result<Vec<StackEntry>> {
        let [variable_name, value] = args else {
            bail!("variable block expects a name and a value");
        };
        let name = variable_name
            .as_text()
            .ok_or_else(|| anyhow!("variable name must be static"))?
            .to_string();
        if !self.conv.has_variable(self.sprite, &name) {
            // generated helpers are declared on first use, anything else
            // points at a project that skipped its declaration
            if !is_generated_variable(&name) {
                log::warn!("variable '{}' does not exist, declaring it now", name);
            }
            if self.conv.is_background(self.sprite) {
                self.conv.declare_program_variable(&name, None);
            } else {
                self.conv.declare_sprite_variable(self.sprite, &name);
            }
        }
        let value = value.formula()?;
        let brick = if change {
            Brick::ChangeVariable {
                variable: name,
                delta: value,
            }
        } else {
            Brick::SetVariable {
                variable: name,
                value,
            }
        };
        Ok(bricks_out(vec![brick]))
    }

    fn read_variable_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [variable_name] = args else {
            bail!("read-variable expects one name");
        };
        let name = variable_name
            .as_text()
            .ok_or_else(|| anyhow!("variable name must be static"))?;
        Ok(formula_out(FormulaElement::variable(name)))
    }

    fn show_variable_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [variable_name] = args else {
            bail!("show-variable expects one name");
        };
        let name = variable_name
            .as_text()
            .ok_or_else(|| anyhow!("variable name must be static"))?;
        assert!(
            self.conv.has_variable(self.sprite, name),
            "variable '{}' must be declared before its widget is shown",
            name
        );
        Ok(bricks_out(vec![Brick::ShowVariable {
            variable: name.to_string(),
            x: 0,
            y: 0,
        }]))
    }

    fn hide_variable_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [variable_name] = args else {
            bail!("hide-variable expects one name");
        };
        let name = variable_name
            .as_text()
            .ok_or_else(|| anyhow!("variable name must be static"))?;
        assert!(
            self.conv.has_variable(self.sprite, name),
            "variable '{}' must be declared before its widget is hidden",
            name
        );
        Ok(bricks_out(vec![Brick::HideVariable {
            variable: name.to_string(),
        }]))
    }

    // sound, speech and input adapters

    fn play_sound_block(&mut self, args: &[Arg], wait: bool) -> Result<Vec<StackEntry>> {
        let [sound_name] = args else {
            bail!("play-sound expects one sound name");
        };
        let name = sound_name
            .as_text()
            .ok_or_else(|| anyhow!("sound name must be static"))?;
        ensure!(
            self.conv.arena.sprite(self.sprite).sound_named(name).is_some(),
            "object does not contain sound with name={}",
            name
        );
        let brick = if wait {
            Brick::PlaySoundAndWait {
                sound: name.to_string(),
            }
        } else {
            Brick::PlaySound {
                sound: name.to_string(),
            }
        };
        Ok(bricks_out(vec![brick]))
    }

    fn say_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [message] = args else {
            bail!("say expects one message");
        };
        Ok(bricks_out(vec![Brick::Say {
            text: message.formula()?,
        }]))
    }

    fn say_for_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [message, duration] = args else {
            bail!("say-for expects a message and a duration");
        };
        Ok(bricks_out(vec![Brick::SayFor {
            text: message.formula()?,
            duration_secs: duration.formula()?,
        }]))
    }

    fn think_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [message] = args else {
            bail!("think expects one message");
        };
        Ok(bricks_out(vec![Brick::Think {
            text: message.formula()?,
        }]))
    }

    fn think_for_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [message, duration] = args else {
            bail!("think-for expects a message and a duration");
        };
        Ok(bricks_out(vec![Brick::ThinkFor {
            text: message.formula()?,
            duration_secs: duration.formula()?,
        }]))
    }

    fn do_ask_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [question] = args else {
            bail!("ask expects one question");
        };
        let answer_variable = self.conv.shared_answer_variable();
        Ok(bricks_out(vec![Brick::Ask {
            question: question.formula()?,
            answer_variable,
        }]))
    }

    fn answer_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        ensure!(args.is_empty(), "answer takes no arguments");
        let name = self.conv.shared_answer_variable();
        Ok(formula_out(FormulaElement::UserVariable(name)))
    }

    fn sound_level_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        ensure!(args.is_empty(), "loudness takes no arguments");
        // Scratch reports an integer, Catrobat a float
        Ok(formula_out(FormulaElement::function(
            Function::Round,
            vec![FormulaElement::sensor(Sensor::Loudness)],
        )))
    }

    fn mouse_position_block(&mut self, x_axis: bool) -> Result<Vec<StackEntry>> {
        let name = if x_axis {
            emulation::mouse_x_variable_name()
        } else {
            emulation::mouse_y_variable_name()
        };
        self.conv
            .declare_program_variable(&name, Some(FormulaElement::Number(0.0)));
        self.conv.ctx.mouse_position_used = true;
        Ok(formula_out(FormulaElement::UserVariable(name)))
    }

    fn key_pressed_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [key] = args else {
            bail!("key-pressed expects one key name");
        };
        let key = key
            .as_text()
            .ok_or_else(|| anyhow!("key name must be static"))?;
        let name = emulation::key_variable_name(key);
        self.conv
            .declare_program_variable(&name, Some(FormulaElement::Number(0.0)));
        Ok(formula_out(FormulaElement::UserVariable(name)))
    }

    // clone and object reference adapters

    fn create_clone_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [target] = args else {
            bail!("clone expects one target");
        };
        if target.is_computed() {
            return Ok(bricks_out(vec![Brick::note(
                "Cannot convert clone block with a computed target.",
            )]));
        }
        let Some(name) = target.as_text() else {
            return Ok(bricks_out(vec![Brick::note(
                "Cannot convert clone block without a target.",
            )]));
        };
        if name.is_empty() {
            return Ok(bricks_out(vec![Brick::note(
                "Cannot convert clone block without a target.",
            )]));
        }
        let own_name = self.conv.arena.sprite(self.sprite).name.clone();
        if name == "_myself_" || name == own_name {
            return Ok(bricks_out(vec![Brick::Clone { object: own_name }]));
        }
        self.conv.arena.get_or_register(name);
        Ok(bricks_out(vec![Brick::Clone {
            object: name.to_string(),
        }]))
    }

    fn point_towards_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [target] = args else {
            bail!("point-towards expects one target");
        };
        let Some(name) = target.as_text() else {
            return Ok(bricks_out(vec![Brick::note(
                "Not a valid point-towards target.",
            )]));
        };
        self.conv.arena.get_or_register(name);
        Ok(bricks_out(vec![Brick::PointTo {
            object: name.to_string(),
        }]))
    }

    fn goto_sprite_or_mouse_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [target] = args else {
            bail!("go-to expects one target");
        };
        match target.as_text() {
            Some("_random_") => Ok(bricks_out(vec![Brick::GoTo {
                target: GoToTarget::RandomPosition,
            }])),
            Some(name) => {
                self.conv.arena.get_or_register(name);
                Ok(bricks_out(vec![Brick::GoTo {
                    target: GoToTarget::Object(name.to_string()),
                }]))
            }
            None => Ok(bricks_out(vec![Brick::note("Not a valid go-to target.")])),
        }
    }

    fn touching_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [target] = args else {
            bail!("touching expects one target");
        };
        let formula = match target.as_text() {
            Some("_mouse_") => FormulaElement::sensor(Sensor::CollidesWithFinger),
            Some("_edge_") => FormulaElement::sensor(Sensor::CollidesWithEdge),
            Some(name) => FormulaElement::collision(name),
            None => bail!("touching target must be static"),
        };
        Ok(formula_out(formula))
    }

    fn broadcast_block(&mut self, args: &[Arg], wait: bool) -> Result<Vec<StackEntry>> {
        let [message] = args else {
            bail!("broadcast expects one message");
        };
        if message.is_computed() {
            log::warn!("replacing computed broadcast message with note brick");
            return Ok(bricks_out(vec![Brick::note(
                "Catrobat does not support computed broadcast messages",
            )]));
        }
        let Arg::Literal(lit) = message else {
            bail!("broadcast message must be a value");
        };
        let message = lit.to_display_string().to_lowercase();
        let brick = if wait {
            Brick::BroadcastAndWait { message }
        } else {
            Brick::Broadcast { message }
        };
        Ok(bricks_out(vec![brick]))
    }

    fn time_and_date_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [which] = args else {
            bail!("time-and-date expects one selector");
        };
        let sensor = match which.as_text() {
            Some("second") => Sensor::TimeSecond,
            Some("minute") => Sensor::TimeMinute,
            Some("hour") => Sensor::TimeHour,
            Some("day of week") => Sensor::DateWeekday,
            Some("date") => Sensor::DateDay,
            Some("month") => Sensor::DateMonth,
            Some("year") => Sensor::DateYear,
            _ => {
                return Ok(bricks_out(vec![Brick::note(
                    "Cannot convert time-and-date block.",
                )]))
            }
        };
        let mut formula = FormulaElement::sensor(sensor);
        if sensor == Sensor::DateWeekday {
            // Scratch weeks are 1-based
            formula =
                FormulaElement::binary(Operator::Plus, formula, FormulaElement::Number(1.0));
        }
        Ok(formula_out(formula))
    }

    // pen adapters

    fn pen_color_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [color] = args else {
            bail!("pen-color expects one value");
        };
        for channel in ["red", "green", "blue"] {
            self.conv.declare_sprite_variable(self.sprite, channel);
        }
        if let Some(packed) = color.as_number() {
            let packed = packed as i64;
            let red = ((packed >> 16) & 0xFF) as f64;
            let green = ((packed >> 8) & 0xFF) as f64;
            let blue = (packed & 0xFF) as f64;
            return Ok(bricks_out(vec![
                Brick::SetVariable {
                    variable: "red".to_string(),
                    value: FormulaElement::Number(red),
                },
                Brick::SetVariable {
                    variable: "green".to_string(),
                    value: FormulaElement::Number(green),
                },
                Brick::SetVariable {
                    variable: "blue".to_string(),
                    value: FormulaElement::Number(blue),
                },
                Brick::SetPenColor {
                    red: FormulaElement::Number(red),
                    green: FormulaElement::Number(green),
                    blue: FormulaElement::Number(blue),
                },
            ]));
        }
        if !color.is_computed() {
            return Ok(bricks_out(vec![Brick::note(
                "Pen color expects a number or a formula.",
            )]));
        }
        // no native channel extraction: peel blue, green and red out of the
        // packed value with modulo/divide/subtract
        let value = color.formula()?;
        let blue = FormulaElement::function(
            Function::Mod,
            vec![value.clone(), FormulaElement::Number(256.0)],
        );
        let blue_b = FormulaElement::bracket(blue.clone());
        let value_minus_blue =
            FormulaElement::binary(Operator::Minus, value.clone(), blue_b);
        let vmb_b = FormulaElement::bracket(value_minus_blue);
        let vmb_div = FormulaElement::binary(
            Operator::Divide,
            vmb_b,
            FormulaElement::Number(256.0),
        );
        let vmb_div_b = FormulaElement::bracket(vmb_div);
        let green = FormulaElement::function(
            Function::Mod,
            vec![vmb_div_b.clone(), FormulaElement::Number(256.0)],
        );
        let green_b = FormulaElement::bracket(green.clone());
        let div_minus_green =
            FormulaElement::binary(Operator::Minus, vmb_div_b, green_b);
        let red = FormulaElement::binary(
            Operator::Divide,
            FormulaElement::bracket(div_minus_green),
            FormulaElement::Number(256.0),
        );
        Ok(bricks_out(vec![
            Brick::SetVariable {
                variable: "red".to_string(),
                value: red.clone(),
            },
            Brick::SetVariable {
                variable: "green".to_string(),
                value: green.clone(),
            },
            Brick::SetVariable {
                variable: "blue".to_string(),
                value: blue.clone(),
            },
            Brick::SetPenColor { red, green, blue },
        ]))
    }

    fn pen_size_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [size] = args else {
            bail!("pen-size expects one value");
        };
        self.conv.declare_sprite_variable(self.sprite, "pen_size");
        let size = size.formula()?;
        Ok(bricks_out(vec![
            Brick::SetVariable {
                variable: "pen_size".to_string(),
                value: size.clone(),
            },
            Brick::SetPenSize { size },
        ]))
    }

    fn set_rotation_style_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let [style] = args else {
            bail!("rotation-style expects one selector");
        };
        let style = match style.as_text() {
            Some("left-right") => RotationStyle::LeftRight,
            Some("all around") => RotationStyle::AllAround,
            Some("don't rotate") => RotationStyle::DontRotate,
            other => bail!("unknown rotation style {:?}", other),
        };
        Ok(bricks_out(vec![Brick::SetRotationStyle { style }]))
    }

    // user-defined procedure adapters

    fn call_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let Some(header) = args.first().and_then(Arg::as_text) else {
            bail!("procedure signature must be static");
        };
        let header = header.to_string();
        let kinds = self.sprite_ctx.template_for(&header)?.param_kinds();
        let params = &args[1..];
        ensure!(
            params.len() == kinds.len(),
            "call to '{}' binds {} arguments, template has {} parameters",
            header,
            params.len(),
            kinds.len()
        );
        let arguments = params
            .iter()
            .zip(kinds.iter())
            .map(|(arg, kind)| coerce_param_value(arg, *kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(bricks_out(vec![Brick::UserBrickCall { header, arguments }]))
    }

    fn get_param_block(&mut self, args: &[Arg]) -> Result<Vec<StackEntry>> {
        let Some(name) = args.first().and_then(Arg::as_text) else {
            bail!("parameter name must be static");
        };
        Ok(formula_out(FormulaElement::variable(name)))
    }
}

fn is_numeric_or_computed(arg: &Arg) -> bool {
    matches!(arg, Arg::Literal(Literal::Number(_)) | Arg::Formula(_))
}

fn formula_out(formula: FormulaElement) -> Vec<StackEntry> {
    vec![StackEntry::Formula(formula)]
}

fn bricks_out(bricks: Vec<Brick>) -> Vec<StackEntry> {
    bricks.into_iter().map(StackEntry::Brick).collect()
}
