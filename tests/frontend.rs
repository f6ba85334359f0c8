//! Front-end structure tests: source text to `SourceUnit`.

use evscript::prelude::*;

fn parse_ok(source: &str) -> SourceUnit {
    let reporter = Reporter::with_color(false);
    parse(source, &reporter).expect("source parses")
}

#[test]
fn typedefs_resolve_transitively() {
    let unit = parse_ok("typedef u16 coord; typedef coord pos;");
    assert_eq!(unit.get_type("coord").unwrap().size, Width::Word);
    assert_eq!(unit.get_type("pos").unwrap().size, Width::Word);
}

#[test]
fn unknown_base_type_is_a_parse_error() {
    let reporter = Reporter::with_color(false);
    let result = parse("typedef notatype thing;", &reporter);
    assert!(matches!(result, Err(ParseError::Invalid { line: 1, .. })));
}

#[test]
fn environment_settings_and_definitions() {
    let unit = parse_ok(
        "env game {
	use std;
	pool = 32;
	section = \"ROM0\";
	terminator = -1;
	def wait_frames(const u8);
	def move_to(u8, u8);
	mac greet = wait_frames($1);
	alias log = DebugPrint(u8, ...);
}",
    );
    let env = unit.environment("game").expect("env declared");
    assert_eq!(env.pool, 32);
    assert_eq!(env.section, "ROM0");
    assert_eq!(env.terminator, -1);

    // `use std` came first, so user bytecodes follow the standard set.
    let std_count = Environment::standard().bytecode_count;
    match env.get_define("wait_frames") {
        Some(Definition::Def {
            bytecode,
            parameters,
        }) => {
            assert_eq!(*bytecode, std_count);
            assert_eq!(parameters.len(), 1);
            assert_eq!(parameters[0].kind, ParamKind::Con);
            assert_eq!(parameters[0].size, Width::Byte);
        }
        other => panic!("unexpected {other:?}"),
    }
    match env.get_define("move_to") {
        Some(Definition::Def { parameters, .. }) => {
            assert!(parameters.iter().all(|p| p.kind == ParamKind::Arg));
        }
        other => panic!("unexpected {other:?}"),
    }
    match env.get_define("greet") {
        Some(Definition::Mac { alias, arguments }) => {
            assert_eq!(alias, "wait_frames");
            assert_eq!(*arguments, vec![Arg::Positional(1)]);
        }
        other => panic!("unexpected {other:?}"),
    }
    match env.get_define("log") {
        Some(Definition::Alias { target, parameters }) => {
            assert_eq!(target, "DebugPrint");
            assert_eq!(parameters.len(), 2);
            assert_eq!(parameters[1].kind, ParamKind::Varargs);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_import_is_ignored_with_a_warning() {
    let unit = parse_ok("env e { use nonstandard; pool = 4; }");
    let env = unit.environment("e").expect("env declared");
    assert_eq!(env.bytecode_count, 0);
    assert_eq!(env.pool, 4);
}

#[test]
fn script_defaults_to_the_std_environment() {
    let unit = parse_ok("script main { }");
    let (name, script) = &unit.scripts[0];
    assert_eq!(name, "main");
    assert_eq!(script.env, "std");
    assert!(script.statements.is_empty());
}

#[test]
fn statement_forms() {
    let unit = parse_ok(
        "script main uses game {
	u8 x;
	u16 y = 40;
	u8 z = x;
	x = 5;
	x = z;
	x = x + 1;
	x = x / z;
	drop z;
	here:
	goto here;
	beep(1, x, \"hello\");
	callasm UpdateSprites;
}",
    );
    let statements = &unit.scripts[0].1.statements;
    assert_eq!(
        statements[0],
        Statement::Declare {
            name: "x".into(),
            size: Width::Byte
        }
    );
    assert_eq!(
        statements[1],
        Statement::DeclareAssign {
            name: "y".into(),
            size: Width::Word,
            value: 40
        }
    );
    assert_eq!(
        statements[2],
        Statement::DeclareCopy {
            name: "z".into(),
            size: Width::Byte,
            source: "x".into()
        }
    );
    assert_eq!(
        statements[3],
        Statement::Assign {
            name: "x".into(),
            value: 5
        }
    );
    assert_eq!(
        statements[4],
        Statement::Copy {
            dest: "x".into(),
            source: "z".into()
        }
    );
    assert_eq!(
        statements[5],
        Statement::Binary {
            op: Op::Add,
            dest: Some("x".into()),
            lhs: "x".into(),
            rhs: Operand::Imm(1)
        }
    );
    assert_eq!(
        statements[6],
        Statement::Binary {
            op: Op::Div,
            dest: Some("x".into()),
            lhs: "x".into(),
            rhs: Operand::Var("z".into())
        }
    );
    assert_eq!(statements[7], Statement::Drop { name: "z".into() });
    assert_eq!(statements[8], Statement::Label { name: "here".into() });
    assert_eq!(
        statements[9],
        Statement::Goto {
            target: "here".into()
        }
    );
    assert_eq!(
        statements[10],
        Statement::Call {
            callee: "beep".into(),
            args: vec![
                Arg::Num(1),
                Arg::Var("x".into()),
                Arg::Str("hello".into())
            ]
        }
    );
    assert_eq!(
        statements[11],
        Statement::CallAsm {
            target: "UpdateSprites".into()
        }
    );
}

#[test]
fn control_flow_nests() {
    let unit = parse_ok(
        "script main {
	u8 x = 0;
	if (x == 1) {
		while (x < 3) {
			x = x + 1;
		}
	} else {
		do {
			repeat(4) { x = x + 1; }
		} while (x != 9);
	}
	loop {
		for (u8 i = 0; i < 2; i = i + 1) {
			x = x | i;
		}
	}
}",
    );
    let statements = &unit.scripts[0].1.statements;
    let Statement::If {
        condition,
        then_body,
        else_body,
    } = &statements[1]
    else {
        panic!("expected if, found {:?}", statements[1]);
    };
    assert_eq!(
        **condition,
        Statement::Binary {
            op: Op::Equ,
            dest: None,
            lhs: "x".into(),
            rhs: Operand::Imm(1)
        }
    );
    assert!(matches!(then_body[0], Statement::While { .. }));
    let Statement::DoWhile { body, .. } = &else_body[0] else {
        panic!("expected do-while, found {:?}", else_body[0]);
    };
    assert!(matches!(body[0], Statement::Repeat { count: 4, .. }));
    let Statement::Loop { body } = &statements[2] else {
        panic!("expected loop, found {:?}", statements[2]);
    };
    let Statement::For { init, test, step, .. } = &body[0] else {
        panic!("expected for, found {:?}", body[0]);
    };
    assert!(matches!(**init, Statement::DeclareAssign { .. }));
    assert!(matches!(
        **test,
        Statement::Binary {
            op: Op::Lt,
            dest: None,
            ..
        }
    ));
    assert!(matches!(
        **step,
        Statement::Binary {
            op: Op::Add,
            dest: Some(_),
            ..
        }
    ));
}

#[test]
fn numeric_left_operand_is_rejected() {
    let reporter = Reporter::with_color(false);
    let result = parse("script main { x = 5 + y; }", &reporter);
    assert!(matches!(result, Err(ParseError::Invalid { .. })));
}

#[test]
fn missing_semicolon_is_reported_with_a_line() {
    let reporter = Reporter::with_color(false);
    let result = parse("script main {\n\tu8 x = 5\n}", &reporter);
    match result {
        Err(ParseError::UnexpectedToken { line, .. }) => assert_eq!(line, 3),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn break_and_continue_parse() {
    let unit = parse_ok("script main { loop { break; continue; } }");
    let Statement::Loop { body } = &unit.scripts[0].1.statements[0] else {
        panic!("expected loop");
    };
    assert_eq!(body[0], Statement::Break);
    assert_eq!(body[1], Statement::Continue);
}
