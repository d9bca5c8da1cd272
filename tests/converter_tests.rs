use serde_json::{json, Value};

use sb2cat::catrobat::{
    Brick, FormulaElement, Function, Operator, Program, Sprite, Trigger,
};
use sb2cat::scratch::{
    Costume, KeySensingStyle, ListData, Literal, Object, Project, Script, ScriptElement,
    VariableData, SCRIPT_GREEN_FLAG, SCRIPT_PROC_DEF,
};
use sb2cat::{convert, BasicResolver};

fn green_flag_script(body: Value) -> Script {
    Script {
        trigger: SCRIPT_GREEN_FLAG.to_string(),
        arguments: Vec::new(),
        body: ScriptElement::from_raw(&body),
    }
}

fn costume(name: &str) -> Costume {
    Costume {
        name: name.to_string(),
        md5_name: format!("{}.png", name),
        resolution: Some(1),
    }
}

/// Stage plus one sprite named "cat" running the given scripts.
fn cat_project(scripts: Vec<Script>) -> Project {
    let mut project = Project::new("test project");
    project.objects.push(Object::stage("Stage"));
    let mut cat = Object::new("cat");
    cat.scripts = scripts;
    project.objects.push(cat);
    project
}

fn convert_ok(project: &Project) -> Program {
    convert(project, &BasicResolver).expect("conversion must not abort")
}

fn object<'p>(program: &'p Program, name: &str) -> &'p Sprite {
    program
        .object_named(name)
        .unwrap_or_else(|| panic!("no object named '{}'", name))
}

fn is_note(brick: &Brick) -> bool {
    matches!(brick, Brick::Note { .. })
}

#[test]
fn repeat_until_with_placeholder_child_keeps_loop_pair_linked() {
    let project = cat_project(vec![green_flag_script(json!([[
        "doUntil",
        ["=", 1, 2],
        [["definitelyUnknownBlock"]]
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 3);
    let Brick::RepeatUntil { id: begin_id, end: begin_end, .. } = &bricks[0] else {
        panic!("expected loop begin, got {:?}", bricks[0]);
    };
    match &bricks[1] {
        Brick::Note { text } => assert!(text.contains("definitelyUnknownBlock")),
        other => panic!("expected placeholder note, got {:?}", other),
    }
    let Brick::LoopEnd { id: end_id, start } = &bricks[2] else {
        panic!("expected loop end, got {:?}", bricks[2]);
    };
    assert_eq!(start, begin_id);
    assert_eq!(end_id, begin_end);
}

#[test]
fn packed_red_decomposes_to_channel_values() {
    let project = cat_project(vec![green_flag_script(json!([["penColor:", 16711680]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(
        bricks[0],
        Brick::SetVariable {
            variable: "red".to_string(),
            value: FormulaElement::Number(255.0)
        }
    );
    assert_eq!(
        bricks[1],
        Brick::SetVariable {
            variable: "green".to_string(),
            value: FormulaElement::Number(0.0)
        }
    );
    assert_eq!(
        bricks[2],
        Brick::SetVariable {
            variable: "blue".to_string(),
            value: FormulaElement::Number(0.0)
        }
    );
    assert_eq!(
        bricks[3],
        Brick::SetPenColor {
            red: FormulaElement::Number(255.0),
            green: FormulaElement::Number(0.0),
            blue: FormulaElement::Number(0.0),
        }
    );
}

#[test]
fn computed_pen_color_builds_extraction_chain() {
    let project = cat_project(vec![green_flag_script(json!([[
        "penColor:",
        ["readVariable", "c"]
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 4);
    // blue channel is the low byte
    match &bricks[2] {
        Brick::SetVariable { variable, value } => {
            assert_eq!(variable, "blue");
            match value {
                FormulaElement::Function { function, args } => {
                    assert_eq!(*function, Function::Mod);
                    assert_eq!(args[1], FormulaElement::Number(256.0));
                }
                other => panic!("expected modulo chain, got {:?}", other),
            }
        }
        other => panic!("expected blue assignment, got {:?}", other),
    }
    assert!(matches!(bricks[3], Brick::SetPenColor { .. }));
}

#[test]
fn space_key_with_both_styles_yields_one_indicator_with_both_scripts() {
    let mut project = cat_project(vec![]);
    project.listened_keys = vec![
        ("space".to_string(), KeySensingStyle::EventScript),
        ("space".to_string(), KeySensingStyle::PollingBrick),
    ];
    let program = convert_ok(&project);
    let indicators: Vec<&Sprite> = program
        .objects
        .iter()
        .filter(|o| o.name == "key space pressed")
        .collect();
    assert_eq!(indicators.len(), 1);
    let indicator = indicators[0];
    // start script (placement) + event script + polling script
    assert_eq!(indicator.scripts.len(), 3);
    let tapped: Vec<&Vec<Brick>> = indicator
        .scripts
        .iter()
        .filter(|s| s.trigger == Trigger::Tapped)
        .map(|s| &s.bricks)
        .collect();
    assert_eq!(tapped.len(), 2);
    let has_broadcast_script = tapped.iter().any(|bricks| {
        matches!(bricks.first(), Some(Brick::Broadcast { message }) if message == "key space pressed")
    });
    let has_polling_script = tapped.iter().any(|bricks| {
        matches!(bricks.first(), Some(Brick::SetVariable { variable, .. }) if variable == "s2cc:key_space")
    });
    assert!(has_broadcast_script);
    assert!(has_polling_script);
    assert!(program.variables.iter().any(|v| v.name == "s2cc:key_space"));
}

#[test]
fn hoisted_setup_notes_land_before_the_consuming_statement() {
    let project = cat_project(vec![green_flag_script(json!([[
        "setVar:to:",
        "x",
        ["+", ["definitelyUnknownSensor"], 1]
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 2);
    match &bricks[0] {
        Brick::Note { text } => {
            assert!(text.contains("definitelyUnknownSensor"));
            assert!(text.contains("[+]"));
        }
        other => panic!("expected hoisted note, got {:?}", other),
    }
    match &bricks[1] {
        Brick::SetVariable { variable, value } => {
            assert_eq!(variable, "x");
            // the unmapped operand was substituted by a neutral zero
            assert_eq!(
                *value,
                FormulaElement::binary(
                    Operator::Plus,
                    FormulaElement::Number(0.0),
                    FormulaElement::Number(1.0)
                )
            );
        }
        other => panic!("expected the consuming statement, got {:?}", other),
    }
}

#[test]
fn absolute_backdrop_index_wraps_for_all_values() {
    for (requested, effective) in [(5, 2), (3, 3), (0, 3), (-1, 2), (7, 1)] {
        let mut project = Project::new("backdrops");
        let mut stage = Object::stage("Stage");
        stage.costumes = vec![costume("one"), costume("two"), costume("three")];
        stage.scripts = vec![green_flag_script(json!([["startScene", requested]]))];
        project.objects.push(stage);
        let program = convert_ok(&project);
        let bricks = &object(&program, "Stage").scripts[0].bricks;
        assert_eq!(
            bricks[0],
            Brick::SetBackgroundByIndex {
                index: FormulaElement::Number(effective as f64)
            },
            "requested index {}",
            requested
        );
    }
}

#[test]
fn computed_backdrop_index_builds_wrap_formula() {
    let mut project = Project::new("backdrops");
    let mut stage = Object::stage("Stage");
    stage.costumes = vec![costume("one"), costume("two"), costume("three")];
    stage.scripts = vec![green_flag_script(json!([[
        "startScene",
        ["readVariable", "i"]
    ]]))];
    project.objects.push(stage);
    let program = convert_ok(&project);
    let bricks = &object(&program, "Stage").scripts[0].bricks;
    let Brick::SetBackgroundByIndex { index } = &bricks[0] else {
        panic!("expected backdrop-by-index, got {:?}", bricks[0]);
    };
    // ((i - 1) mod 3) + 1
    match index {
        FormulaElement::BinaryOp { op, right, .. } => {
            assert_eq!(*op, Operator::Plus);
            assert_eq!(**right, FormulaElement::Number(1.0));
        }
        other => panic!("expected wrap formula, got {:?}", other),
    }
}

#[test]
fn next_backdrop_elsewhere_computes_the_index() {
    let mut project = Project::new("backdrops");
    let mut stage = Object::stage("Stage");
    stage.costumes = vec![costume("one"), costume("two")];
    project.objects.push(stage);
    let mut cat = Object::new("cat");
    cat.scripts = vec![green_flag_script(json!([["startScene", "next backdrop"]]))];
    project.objects.push(cat);
    let program = convert_ok(&project);

    let cat_bricks = &object(&program, "cat").scripts[0].bricks;
    assert!(matches!(
        cat_bricks[0],
        Brick::SetBackgroundByIndex { .. }
    ));

    // on the background object the direct brick is used
    let mut project = Project::new("backdrops");
    let mut stage = Object::stage("Stage");
    stage.costumes = vec![costume("one"), costume("two")];
    stage.scripts = vec![green_flag_script(json!([["startScene", "next backdrop"]]))];
    project.objects.push(stage);
    let program = convert_ok(&project);
    assert_eq!(object(&program, "Stage").scripts[0].bricks[0], Brick::NextLook);
}

#[test]
fn brightness_is_remapped_only_for_absolute_set() {
    let project = cat_project(vec![green_flag_script(json!([
        ["setGraphicEffect:to:", "brightness", 40],
        ["changeGraphicEffect:by:", "brightness", 40]
    ]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(
        bricks[0],
        Brick::SetBrightness {
            percent: FormulaElement::Number(140.0)
        }
    );
    assert_eq!(
        bricks[1],
        Brick::ChangeBrightnessBy {
            delta: FormulaElement::Number(40.0)
        }
    );
}

#[test]
fn unknown_graphic_effect_becomes_note() {
    let project = cat_project(vec![green_flag_script(json!([[
        "setGraphicEffect:to:",
        "fisheye",
        30
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    match &bricks[0] {
        Brick::Note { text } => {
            assert!(text.contains("fisheye"));
            assert!(text.contains("setGraphicEffect:to:"));
        }
        other => panic!("expected note, got {:?}", other),
    }
}

#[test]
fn symbolic_list_positions_resolve_to_length_and_random() {
    let mut project = cat_project(vec![green_flag_script(json!([
        ["deleteLine:ofList:", "last", "todo"],
        ["setLine:ofList:to:", "random", "todo", "done"],
        ["deleteLine:ofList:", 2, "todo"]
    ]))]);
    project.objects[1].lists = vec![ListData {
        name: "todo".to_string(),
        contents: Vec::new(),
    }];
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;

    let length = FormulaElement::function(
        Function::NumberOfItems,
        vec![FormulaElement::list("todo")],
    );
    assert_eq!(
        bricks[0],
        Brick::DeleteItemOfList {
            list: "todo".to_string(),
            index: length.clone(),
        }
    );
    assert_eq!(
        bricks[1],
        Brick::ReplaceItemInList {
            list: "todo".to_string(),
            index: FormulaElement::function(
                Function::Rand,
                vec![FormulaElement::Number(1.0), length.clone()]
            ),
            value: FormulaElement::Text("done".to_string()),
        }
    );
    assert_eq!(
        bricks[2],
        Brick::DeleteItemOfList {
            list: "todo".to_string(),
            index: FormulaElement::Number(2.0),
        }
    );
}

#[test]
fn delete_all_unrolls_into_counted_loop() {
    let mut project = cat_project(vec![green_flag_script(json!([[
        "deleteLine:ofList:",
        "all",
        "todo"
    ]]))]);
    project.objects[1].lists = vec![ListData {
        name: "todo".to_string(),
        contents: Vec::new(),
    }];
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 3);
    assert!(matches!(bricks[0], Brick::Repeat { .. }));
    assert_eq!(
        bricks[1],
        Brick::DeleteItemOfList {
            list: "todo".to_string(),
            index: FormulaElement::Number(1.0),
        }
    );
    assert!(matches!(bricks[2], Brick::LoopEnd { .. }));
}

#[test]
fn procedure_template_is_shared_across_call_sites_and_definition() {
    let call = || green_flag_script(json!([["call", "walk %n steps saying %s", 5, "hi"]]));
    let definition = Script {
        trigger: SCRIPT_PROC_DEF.to_string(),
        arguments: vec![
            json!("walk %n steps saying %s"),
            json!(["count", "word"]),
            json!([1, ""]),
            json!(false),
        ],
        body: ScriptElement::from_raw(&json!([
            ["forward:", ["getParam", "count", "r"]],
            ["say:", ["getParam", "word", "r"]]
        ])),
    };
    let project = cat_project(vec![call(), definition, call()]);
    let program = convert_ok(&project);
    let cat = object(&program, "cat");

    assert_eq!(cat.procedures.len(), 1);
    let template = &cat.procedures[0];
    assert_eq!(template.header, "walk %n steps saying %s");
    assert_eq!(template.param_count(), 2);
    assert_eq!(template.body.len(), 2);
    assert!(matches!(
        template.body[0],
        Brick::MoveNSteps {
            steps: FormulaElement::UserVariable(_)
        }
    ));

    // both call sites (before and after the definition) bound the same
    // template
    assert_eq!(cat.scripts.len(), 2);
    for script in &cat.scripts {
        assert_eq!(
            script.bricks[0],
            Brick::UserBrickCall {
                header: "walk %n steps saying %s".to_string(),
                arguments: vec![
                    FormulaElement::Number(5.0),
                    FormulaElement::Text("hi".to_string())
                ],
            }
        );
    }
}

#[test]
fn call_with_wrong_arity_becomes_note() {
    let definition = Script {
        trigger: SCRIPT_PROC_DEF.to_string(),
        arguments: vec![json!("walk %n"), json!(["count"]), json!([0]), json!(false)],
        body: ScriptElement::from_raw(&json!([])),
    };
    let bad_call = green_flag_script(json!([["call", "walk %n", 1, 2]]));
    let project = cat_project(vec![definition, bad_call]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert!(is_note(&bricks[0]));
}

#[test]
fn pure_constructor_blocks_produce_no_placeholders() {
    let project = cat_project(vec![green_flag_script(json!([
        ["forward:", 10],
        ["turnRight:", 15],
        ["gotoX:y:", 10, 20],
        ["wait:elapsed:from:", 1],
        ["changeSizeBy:", 10],
        ["show"],
        ["hide"],
        ["comeToFront"],
        ["stopAllSounds"],
        ["putPenDown"],
        ["bounceOffEdge"]
    ]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 11);
    assert!(!bricks.iter().any(is_note));
}

#[test]
fn broadcast_messages_are_case_folded_on_both_ends() {
    let mut project = cat_project(vec![green_flag_script(json!([["broadcast:", "GO Now"]]))]);
    project.objects[1].scripts.push(Script {
        trigger: "whenIReceive".to_string(),
        arguments: vec![json!("Go NOW")],
        body: ScriptElement::from_raw(&json!([])),
    });
    let program = convert_ok(&project);
    let cat = object(&program, "cat");
    assert_eq!(
        cat.scripts[0].bricks[0],
        Brick::Broadcast {
            message: "go now".to_string()
        }
    );
    assert_eq!(
        cat.scripts[1].trigger,
        Trigger::BroadcastReceived {
            message: "go now".to_string()
        }
    );
}

#[test]
fn computed_broadcast_message_is_unsupported() {
    let project = cat_project(vec![green_flag_script(json!([[
        "broadcast:",
        ["readVariable", "msg"]
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert!(is_note(&bricks[0]));
}

#[test]
fn forward_referenced_clone_target_merges_with_later_declaration() {
    let mut project = Project::new("forward");
    project.objects.push(Object::stage("Stage"));
    let mut cat = Object::new("cat");
    cat.scripts = vec![green_flag_script(json!([["createCloneOf", "Banana"]]))];
    project.objects.push(cat);
    let mut banana = Object::new("Banana");
    banana.scripts = vec![green_flag_script(json!([["show"]]))];
    project.objects.push(banana);

    let program = convert_ok(&project);
    let names: Vec<&str> = program.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Stage", "cat", "Banana"]);
    assert_eq!(
        object(&program, "cat").scripts[0].bricks[0],
        Brick::Clone {
            object: "Banana".to_string()
        }
    );
    assert_eq!(object(&program, "Banana").scripts[0].bricks[0], Brick::Show);
}

#[test]
fn never_declared_reference_keeps_a_stub_object() {
    let project = cat_project(vec![green_flag_script(json!([[
        "pointTowards:",
        "Phantom"
    ]]))]);
    let program = convert_ok(&project);
    assert!(program.object_named("Phantom").is_some());
}

#[test]
fn asking_anywhere_initializes_the_shared_answer_on_the_stage() {
    let project = cat_project(vec![green_flag_script(json!([
        ["doAsk", "name?"],
        ["say:", ["answer"]]
    ]))]);
    let program = convert_ok(&project);
    assert!(program.variables.iter().any(|v| v.name == "s2cc:global_answer"));

    let stage = object(&program, "Stage");
    let start = stage
        .scripts
        .iter()
        .find(|s| s.trigger == Trigger::ProgramStart)
        .expect("stage start script");
    assert_eq!(
        start.bricks[0],
        Brick::SetVariable {
            variable: "s2cc:global_answer".to_string(),
            value: FormulaElement::text(""),
        }
    );

    let cat_bricks = &object(&program, "cat").scripts[0].bricks;
    assert!(matches!(cat_bricks[0], Brick::Ask { .. }));
    assert_eq!(
        cat_bricks[1],
        Brick::Say {
            text: FormulaElement::UserVariable("s2cc:global_answer".to_string())
        }
    );
}

#[test]
fn pointer_sensing_synthesizes_the_tracker_object() {
    let mut project = cat_project(vec![green_flag_script(json!([[
        "gotoX:y:",
        ["mouseX"],
        ["mouseY"]
    ]]))]);
    project.has_mouse_position = true;
    project.listened_keys = vec![("a".to_string(), KeySensingStyle::EventScript)];
    let program = convert_ok(&project);

    let tracker = object(&program, "_mouse_");
    // position mirror, move-on-message, clone spawner, clone behaviour
    assert_eq!(tracker.scripts.len(), 4);
    assert!(program.variables.iter().any(|v| v.name == "s2cc:mouse_x"));
    assert!(program.variables.iter().any(|v| v.name == "s2cc:mouse_y"));

    let clone_script = tracker
        .scripts
        .iter()
        .find(|s| s.trigger == Trigger::Cloned)
        .expect("clone script");
    assert!(matches!(clone_script.bricks[1], Brick::IfThenBegin { .. }));
    assert_eq!(clone_script.bricks[4], Brick::DeleteThisClone);

    // pointer reads go through the mirror variables
    let cat_bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(
        cat_bricks[0],
        Brick::PlaceAt {
            x: FormulaElement::UserVariable("s2cc:mouse_x".to_string()),
            y: FormulaElement::UserVariable("s2cc:mouse_y".to_string()),
        }
    );
}

#[test]
fn startup_state_becomes_bricks_in_the_start_script() {
    let mut project = Project::new("startup");
    project.objects.push(Object::stage("Stage"));
    let mut cat = Object::new("cat");
    cat.costumes = vec![costume("idle"), costume("running")];
    cat.current_costume_index = Some(1.0);
    cat.x = 15.0;
    cat.y = -40.0;
    cat.visible = Some(false);
    cat.variables = vec![VariableData {
        name: "score".to_string(),
        value: Literal::Number(7.0),
    }];
    cat.visible_variables = vec!["score".to_string()];
    project.objects.push(cat);

    let program = convert_ok(&project);
    let start = &object(&program, "cat").scripts[0];
    assert_eq!(start.trigger, Trigger::ProgramStart);
    assert_eq!(
        start.bricks[0],
        Brick::SetVariable {
            variable: "score".to_string(),
            value: FormulaElement::Number(7.0)
        }
    );
    assert_eq!(
        start.bricks[1],
        Brick::SetLook {
            look: "running".to_string()
        }
    );
    assert_eq!(
        start.bricks[2],
        Brick::PlaceAt {
            x: FormulaElement::Number(15.0),
            y: FormulaElement::Number(-40.0)
        }
    );
    assert_eq!(start.bricks[3], Brick::Hide);
    assert_eq!(
        start.bricks[4],
        Brick::ShowVariable {
            variable: "score".to_string(),
            x: -220,
            y: 170
        }
    );
}

#[test]
fn unmapped_statement_becomes_note_and_conversion_continues() {
    let project = cat_project(vec![green_flag_script(json!([
        ["definitelyUnknownBlock", 1, 2],
        ["show"]
    ]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 2);
    match &bricks[0] {
        Brick::Note { text } => {
            assert!(text.contains("Missing brick for Scratch identifier"));
            assert!(text.contains("definitelyUnknownBlock"));
        }
        other => panic!("expected note, got {:?}", other),
    }
    assert_eq!(bricks[1], Brick::Show);
}

#[test]
fn unknown_hat_falls_back_to_start_script_with_note() {
    let mut project = cat_project(vec![]);
    project.objects[1].scripts.push(Script {
        trigger: "whenSomethingWeird".to_string(),
        arguments: Vec::new(),
        body: ScriptElement::from_raw(&json!([["show"]])),
    });
    let program = convert_ok(&project);
    let script = &object(&program, "cat").scripts[0];
    assert_eq!(script.trigger, Trigger::ProgramStart);
    assert!(is_note(&script.bricks[0]));
    assert_eq!(script.bricks[1], Brick::Show);
}

#[test]
fn sensor_hat_builds_condition_trigger() {
    let mut project = cat_project(vec![]);
    project.objects[1].scripts.push(Script {
        trigger: "whenSensorGreaterThan".to_string(),
        arguments: vec![json!("loudness"), json!(30)],
        body: ScriptElement::from_raw(&json!([["show"]])),
    });
    let program = convert_ok(&project);
    let script = &object(&program, "cat").scripts[0];
    match &script.trigger {
        Trigger::Condition { condition } => match condition {
            FormulaElement::BinaryOp { op, .. } => assert_eq!(*op, Operator::GreaterThan),
            other => panic!("expected comparison, got {:?}", other),
        },
        other => panic!("expected condition trigger, got {:?}", other),
    }
}

#[test]
fn if_else_triple_is_cross_linked() {
    let project = cat_project(vec![green_flag_script(json!([[
        "doIfElse",
        ["=", 1, 1],
        [["show"]],
        [["hide"]]
    ]]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 5);
    let Brick::IfElseBegin { id: begin, else_branch, end, .. } = &bricks[0] else {
        panic!("expected if begin, got {:?}", bricks[0]);
    };
    assert_eq!(bricks[1], Brick::Show);
    let Brick::IfElse { id: else_id, begin: else_begin, end: else_end } = &bricks[2] else {
        panic!("expected else, got {:?}", bricks[2]);
    };
    assert_eq!(bricks[3], Brick::Hide);
    let Brick::IfElseEnd { id: end_id, begin: end_begin, else_branch: end_else } = &bricks[4]
    else {
        panic!("expected if end, got {:?}", bricks[4]);
    };
    assert_eq!(else_id, else_branch);
    assert_eq!(else_begin, begin);
    assert_eq!(else_end, end);
    assert_eq!(end_id, end);
    assert_eq!(end_begin, begin);
    assert_eq!(end_else, else_branch);
}

#[test]
fn missing_bodies_default_to_empty() {
    let project = cat_project(vec![green_flag_script(json!([
        ["doIf", ["=", 1, 1], null],
        ["doForever", null]
    ]))]);
    let program = convert_ok(&project);
    let bricks = &object(&program, "cat").scripts[0].bricks;
    assert_eq!(bricks.len(), 4);
    assert!(matches!(bricks[0], Brick::IfThenBegin { .. }));
    assert!(matches!(bricks[1], Brick::IfThenEnd { .. }));
    assert!(matches!(bricks[2], Brick::Forever { .. }));
    assert!(matches!(bricks[3], Brick::LoopEnd { .. }));
}

#[test]
fn stage_list_contents_seed_the_start_script() {
    let mut project = Project::new("lists");
    let mut stage = Object::stage("Stage");
    stage.lists = vec![ListData {
        name: "highscores".to_string(),
        contents: vec![Literal::Number(12.0), Literal::Text("ada".to_string())],
    }];
    project.objects.push(stage);
    let program = convert_ok(&project);
    assert!(program.lists.iter().any(|l| l.name == "highscores"));
    let start = &object(&program, "Stage").scripts[0];
    assert_eq!(
        start.bricks[0],
        Brick::AddItemToList {
            list: "highscores".to_string(),
            value: FormulaElement::Number(12.0)
        }
    );
    assert_eq!(
        start.bricks[1],
        Brick::AddItemToList {
            list: "highscores".to_string(),
            value: FormulaElement::Text("ada".to_string())
        }
    );
}
