//! Integration tests for JIT execution
//!
//! These tests compile syntax trees, link them into an execution engine and
//! check what the entry point prints and returns.

use mana_ast::{BinaryOperator, Expr, Stmt, UnaryOperator};
use mana_cranelift::{
    CodeGenerator, CodegenOptions, CompilationUnit, EngineConfig, EngineErrorKind,
    ExecutionEngine, LinkFailure, OptLevel, SymbolOrigin, TargetInfo, compile_program,
};
use mana_runtime::capture_output;
use tracing_subscriber::EnvFilter;

/// Log to the test harness when `RUST_LOG` is set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn host() -> TargetInfo {
    TargetInfo::host().expect("host target should be supported")
}

fn run_unit(engine: &mut ExecutionEngine, unit: CompilationUnit) -> (i32, String) {
    init_tracing();
    engine.add_module(unit).expect("unit should link");
    let (status, output) = capture_output(|| engine.invoke_entry("main"));
    (status.expect("main should be invocable"), output)
}

fn run(statements: &[Stmt]) -> (i32, String) {
    let unit = compile_program("test", &host(), statements).expect("program should compile");
    let mut engine = ExecutionEngine::create().expect("engine should start");
    run_unit(&mut engine, unit)
}

fn bin(left: Expr, operator: BinaryOperator, right: Expr) -> Expr {
    Expr::binary(left, operator, right)
}

fn var(name: &str) -> Expr {
    Expr::variable(name)
}

/// `function side() { print("side"); return 1; }`
fn side_effect() -> Stmt {
    Stmt::function(
        "side",
        &[],
        vec![
            Stmt::print(Expr::string("side")),
            Stmt::return_value(Expr::int(1)),
        ],
    )
}

fn side_is_one() -> Expr {
    bin(Expr::call("side", vec![]), BinaryOperator::Equal, Expr::int(1))
}

fn factorial() -> Stmt {
    Stmt::function(
        "factorial",
        &["n"],
        vec![
            Stmt::if_then(
                bin(var("n"), BinaryOperator::LessEqual, Expr::int(1)),
                Stmt::block(vec![Stmt::return_value(Expr::int(1))]),
            ),
            Stmt::return_value(bin(
                var("n"),
                BinaryOperator::Multiply,
                Expr::call(
                    "factorial",
                    vec![bin(var("n"), BinaryOperator::Subtract, Expr::int(1))],
                ),
            )),
        ],
    )
}

/// (name, program, expected output, expected status)
fn programs() -> Vec<(&'static str, Vec<Stmt>, &'static str, i32)> {
    vec![
        (
            "while_loop",
            vec![Stmt::function(
                "main",
                &[],
                vec![
                    Stmt::var("x", Expr::int(1)),
                    Stmt::while_loop(
                        bin(var("x"), BinaryOperator::Less, Expr::int(3)),
                        Stmt::block(vec![
                            Stmt::print(Expr::string("x")),
                            Stmt::expression(Expr::assign(
                                "x",
                                bin(var("x"), BinaryOperator::Add, Expr::int(1)),
                            )),
                        ]),
                    ),
                ],
            )],
            "x\nx\n",
            0,
        ),
        (
            "and_evaluates_both_operands",
            vec![
                side_effect(),
                Stmt::function(
                    "main",
                    &[],
                    vec![
                        Stmt::print(bin(Expr::bool(false), BinaryOperator::And, side_is_one())),
                        Stmt::print(bin(Expr::bool(true), BinaryOperator::Or, side_is_one())),
                    ],
                ),
            ],
            "side\nfalse\nside\ntrue\n",
            0,
        ),
        (
            "arithmetic",
            vec![
                Stmt::print(bin(Expr::int(7), BinaryOperator::Divide, Expr::int(2))),
                Stmt::print(bin(
                    Expr::unary(UnaryOperator::Negate, Expr::int(7)),
                    BinaryOperator::Remainder,
                    Expr::int(3),
                )),
                Stmt::print(bin(Expr::float(1.5), BinaryOperator::Multiply, Expr::float(2.0))),
                Stmt::print(bin(Expr::float(0.1), BinaryOperator::Add, Expr::float(0.2))),
                Stmt::print(Expr::unary(UnaryOperator::Negate, Expr::grouping(Expr::float(2.5)))),
                Stmt::print(bin(Expr::int(i32::MAX), BinaryOperator::Add, Expr::int(1))),
            ],
            "3\n-1\n3\n0.30000000000000004\n-2.5\n-2147483648\n",
            0,
        ),
        (
            "comparisons",
            vec![
                Stmt::print(bin(Expr::int(2), BinaryOperator::Less, Expr::int(3))),
                Stmt::print(bin(Expr::int(-1), BinaryOperator::GreaterEqual, Expr::int(0))),
                Stmt::print(bin(Expr::float(1.0), BinaryOperator::NotEqual, Expr::float(1.0))),
                Stmt::print(bin(Expr::bool(false), BinaryOperator::Less, Expr::bool(true))),
                Stmt::print(Expr::unary(
                    UnaryOperator::Not,
                    Expr::grouping(bin(Expr::int(1), BinaryOperator::Equal, Expr::int(1))),
                )),
            ],
            "true\nfalse\nfalse\ntrue\nfalse\n",
            0,
        ),
        (
            "print_values",
            vec![
                Stmt::var("n", Expr::call("print", vec![Expr::string("first")])),
                Stmt::print(var("n")),
                Stmt::print(Expr::nil()),
                Stmt::print(Expr::bool(true)),
                Stmt::print(Expr::string("tab\there")),
            ],
            "first\nnil\nnil\ntrue\ntab\there\n",
            0,
        ),
        (
            "recursion_sets_status",
            vec![
                factorial(),
                Stmt::function(
                    "main",
                    &[],
                    vec![Stmt::return_value(Expr::call("factorial", vec![Expr::int(5)]))],
                ),
            ],
            "",
            120,
        ),
        (
            "block_shadowing",
            vec![
                Stmt::var("x", Expr::int(1)),
                Stmt::block(vec![
                    Stmt::var("x", Expr::string("inner")),
                    Stmt::print(var("x")),
                ]),
                Stmt::print(var("x")),
                Stmt::var("x", bin(var("x"), BinaryOperator::Add, Expr::int(10))),
                Stmt::print(var("x")),
            ],
            "inner\n1\n11\n",
            0,
        ),
        (
            "assignment_yields_value",
            vec![
                Stmt::var_uninit("y"),
                Stmt::print(var("y")),
                Stmt::print(Expr::assign("y", Expr::int(5))),
                Stmt::print(var("y")),
            ],
            "0\n5\n5\n",
            0,
        ),
        (
            "if_else_chain",
            vec![
                Stmt::function(
                    "classify",
                    &["n"],
                    vec![Stmt::if_else(
                        bin(var("n"), BinaryOperator::Less, Expr::int(0)),
                        Stmt::print(Expr::string("negative")),
                        Stmt::if_else(
                            bin(var("n"), BinaryOperator::Equal, Expr::int(0)),
                            Stmt::print(Expr::string("zero")),
                            Stmt::block(vec![Stmt::print(Expr::string("positive"))]),
                        ),
                    )],
                ),
                Stmt::expression(Expr::call("classify", vec![Expr::int(-4)])),
                Stmt::expression(Expr::call("classify", vec![Expr::int(0)])),
                Stmt::expression(Expr::call("classify", vec![Expr::int(9)])),
            ],
            "negative\nzero\npositive\n",
            0,
        ),
        (
            "return_skips_rest",
            vec![
                Stmt::print(Expr::string("before")),
                Stmt::if_else(
                    Expr::bool(true),
                    Stmt::return_value(Expr::int(3)),
                    Stmt::return_value(Expr::int(4)),
                ),
                Stmt::print(Expr::string("after")),
            ],
            "before\n",
            3,
        ),
        (
            "return_inside_loop",
            vec![
                Stmt::var("i", Expr::int(0)),
                Stmt::while_loop(
                    Expr::bool(true),
                    Stmt::block(vec![
                        Stmt::if_then(
                            bin(var("i"), BinaryOperator::Equal, Expr::int(2)),
                            Stmt::return_value(var("i")),
                        ),
                        Stmt::print(var("i")),
                        Stmt::expression(Expr::assign(
                            "i",
                            bin(var("i"), BinaryOperator::Add, Expr::int(1)),
                        )),
                    ]),
                ),
            ],
            "0\n1\n",
            2,
        ),
        (
            "int_promotes_to_float",
            vec![
                Stmt::var("n", Expr::int(3)),
                Stmt::print(bin(var("n"), BinaryOperator::Add, Expr::float(0.5))),
                Stmt::print(bin(Expr::float(1.0), BinaryOperator::Divide, Expr::int(4))),
                Stmt::print(bin(Expr::int(7), BinaryOperator::Divide, Expr::int(2))),
                Stmt::print(bin(var("n"), BinaryOperator::GreaterEqual, Expr::float(3.0))),
            ],
            "3.5\n0.25\n3\ntrue\n",
            0,
        ),
        (
            "integer_division_never_traps",
            vec![
                Stmt::var("zero", Expr::int(0)),
                Stmt::var("minus_one", Expr::int(-1)),
                Stmt::print(bin(Expr::int(7), BinaryOperator::Divide, var("zero"))),
                Stmt::print(bin(Expr::int(7), BinaryOperator::Remainder, var("zero"))),
                Stmt::print(bin(Expr::int(i32::MIN), BinaryOperator::Divide, var("minus_one"))),
                Stmt::print(bin(Expr::int(i32::MIN), BinaryOperator::Remainder, var("minus_one"))),
                Stmt::print(bin(Expr::int(-7), BinaryOperator::Divide, Expr::int(2))),
                Stmt::print(bin(Expr::int(-7), BinaryOperator::Remainder, Expr::int(2))),
            ],
            "0\n0\n-2147483648\n0\n-3\n-1\n",
            0,
        ),
        ("empty_program", vec![], "", 0),
    ]
}

#[test]
fn test_programs() {
    for (name, program, expected_output, expected_status) in programs() {
        let (status, output) = run(&program);
        assert_eq!(output, expected_output, "output of {name}");
        assert_eq!(status, expected_status, "status of {name}");
    }
}

#[test]
fn test_optimized_engine_agrees() {
    let config = EngineConfig {
        opt_level: OptLevel::Speed,
        verify: true,
    };

    for (name, program, expected_output, expected_status) in programs() {
        let unit = compile_program(name, &host(), &program).unwrap();
        let mut engine = ExecutionEngine::with_config(config.clone()).unwrap();
        assert_eq!(
            run_unit(&mut engine, unit),
            (expected_status, expected_output.to_string()),
            "{name}"
        );
    }
}

#[test]
fn test_dump_round_trip_executes_identically() {
    let program = vec![
        Stmt::var("greeting", Expr::string("hello")),
        Stmt::print(var("greeting")),
        Stmt::print(bin(Expr::int(6), BinaryOperator::Multiply, Expr::int(7))),
        Stmt::print(bin(Expr::float(1.0), BinaryOperator::Divide, Expr::float(4.0))),
        Stmt::return_value(Expr::int(5)),
    ];
    let direct = run(&program);

    let unit = compile_program("round_trip", &host(), &program).unwrap();
    let text = unit.display_ir();
    let reassembled = CompilationUnit::from_ir(&text, &host()).unwrap();
    let mut engine = ExecutionEngine::create().unwrap();

    assert_eq!(run_unit(&mut engine, reassembled), direct);
    assert_eq!(direct, (5, "hello\n42\n0.25\n".to_string()));
}

#[test]
fn test_lookup_failure_leaves_session_usable() {
    let unit = compile_program("test", &host(), &[Stmt::print(Expr::int(1))]).unwrap();
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(unit).unwrap();

    let error = engine.lookup("nope").unwrap_err();
    assert!(matches!(error.kind(), EngineErrorKind::SymbolNotFound(name) if name == "nope"));
    insta::assert_snapshot!(error, @"symbol `nope` not found");

    assert!(!engine.lookup("main").unwrap().as_ptr().is_null());
    let (status, output) = capture_output(|| engine.invoke_entry("main"));
    assert_eq!((status.unwrap(), output.as_str()), (0, "1\n"));
}

#[test]
fn test_host_symbols_are_visible() {
    let engine = ExecutionEngine::create().unwrap();

    assert_eq!(
        engine.lookup("mana_print").unwrap().as_ptr(),
        mana_runtime::mana_print as *const u8
    );
    assert_eq!(engine.symbol_origin("mana_print"), Some(SymbolOrigin::Host));
    assert!(matches!(
        engine.invoke_entry("mana_print").unwrap_err().kind(),
        EngineErrorKind::InvalidEntry { .. }
    ));
}

#[test]
fn test_local_builtins_are_not_exported() {
    let unit = compile_program("test", &host(), &[]).unwrap();
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(unit).unwrap();

    assert!(engine.lookup("print").is_err());
}

#[test]
fn test_entry_signature_is_checked() {
    let unit = compile_program("test", &host(), &[factorial()]).unwrap();
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(unit).unwrap();

    let error = engine.invoke_entry("factorial").unwrap_err();
    assert!(matches!(error.kind(), EngineErrorKind::InvalidEntry { name, .. } if name == "factorial"));
}

fn library() -> CompilationUnit {
    let mut generator = CodeGenerator::with_options(
        "library",
        &host(),
        CodegenOptions {
            synthesize_entry: false,
        },
    );
    generator
        .generate(&[Stmt::function(
            "double",
            &["n"],
            vec![Stmt::return_value(bin(var("n"), BinaryOperator::Add, var("n")))],
        )])
        .unwrap();
    generator.into_unit()
}

fn client() -> CompilationUnit {
    let mut generator = CodeGenerator::initialize("client", &host());
    generator.declare_external_function("double", 1).unwrap();
    generator
        .generate(&[Stmt::print(Expr::call("double", vec![Expr::int(21)]))])
        .unwrap();
    generator.into_unit()
}

#[test]
fn test_units_link_against_earlier_units() {
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(library()).unwrap();

    assert_eq!(run_unit(&mut engine, client()), (0, "42\n".to_string()));
    assert_eq!(
        engine.symbol_origin("double"),
        Some(SymbolOrigin::Unit("library".to_string()))
    );
    assert_eq!(engine.unit_names().collect::<Vec<_>>(), ["library", "client"]);
}

#[test]
fn test_rejected_unit_publishes_nothing() {
    let mut engine = ExecutionEngine::create().unwrap();

    let error = engine.add_module(client()).unwrap_err();
    match error.kind() {
        EngineErrorKind::Link { unit, reason } => {
            assert_eq!(unit, "client");
            assert!(matches!(reason, LinkFailure::UnresolvedImport(name) if name == "double"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.lookup("main").is_err());
    assert_eq!(engine.unit_names().count(), 0);

    engine.add_module(library()).unwrap();
    assert_eq!(run_unit(&mut engine, client()), (0, "42\n".to_string()));
}

#[test]
fn test_duplicate_exports_are_rejected() {
    let mut engine = ExecutionEngine::create().unwrap();
    engine
        .add_module(compile_program("first", &host(), &[]).unwrap())
        .unwrap();

    let error = engine
        .add_module(compile_program("second", &host(), &[]).unwrap())
        .unwrap_err();
    insta::assert_snapshot!(
        error,
        @"failed to link module `second`: symbol `main` is already defined"
    );
    assert_eq!(
        engine.symbol_origin("main"),
        Some(SymbolOrigin::Unit("first".to_string()))
    );
}

#[test]
fn test_shutdown_releases_engine() {
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(library()).unwrap();
    engine.shutdown();
}

#[test]
fn test_import_signature_must_match_export() {
    let mut engine = ExecutionEngine::create().unwrap();
    engine.add_module(library()).unwrap();

    let mut generator = CodeGenerator::initialize("client", &host());
    generator.declare_external_function("double", 3).unwrap();
    generator
        .generate(&[Stmt::print(Expr::call(
            "double",
            vec![Expr::int(1), Expr::int(2), Expr::int(3)],
        ))])
        .unwrap();

    let error = engine.add_module(generator.into_unit()).unwrap_err();
    assert!(matches!(
        error.kind(),
        EngineErrorKind::Link {
            unit,
            reason: LinkFailure::SignatureMismatch { name, .. },
        } if unit == "client" && name == "double"
    ));
    assert!(engine.lookup("main").is_err());
    assert_eq!(run_unit(&mut engine, client()), (0, "42\n".to_string()));
}

#[cfg(unix)]
#[test]
fn test_process_symbols_are_visible() {
    let engine = ExecutionEngine::create().unwrap();

    assert!(!engine.lookup("malloc").unwrap().as_ptr().is_null());
    assert_eq!(engine.symbol_origin("malloc"), Some(SymbolOrigin::Host));
    assert!(matches!(
        engine.invoke_entry("malloc").unwrap_err().kind(),
        EngineErrorKind::InvalidEntry { .. }
    ));
    assert!(engine.symbol_origin("mana_no_such_symbol").is_none());
}

#[cfg(unix)]
#[test]
fn test_units_import_process_symbols() {
    let mut generator = CodeGenerator::initialize("client", &host());
    generator.declare_external_function("abs", 1).unwrap();
    generator
        .generate(&[Stmt::print(Expr::call("abs", vec![Expr::int(-7)]))])
        .unwrap();

    let mut engine = ExecutionEngine::create().unwrap();
    assert_eq!(run_unit(&mut engine, generator.into_unit()), (0, "7\n".to_string()));
    assert_eq!(engine.symbol_origin("abs"), Some(SymbolOrigin::Host));
}
