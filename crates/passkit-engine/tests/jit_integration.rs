#![cfg(feature = "jit")]

//! JIT end-to-end integration tests.
//!
//! Tests the full pipeline: IR text → passes → Cranelift → native execution.
//! Organized in 4 categories:
//! 1. The add2sub scenario
//! 2. Arithmetic and widths
//! 3. Control flow and calls
//! 4. Errors

use passkit_engine::ir::{parse_module, Function, IrBuilder, IrError, Module, Param, Type};
use passkit_engine::jit::{CodegenError, ExecError, JitConfig, JitEngine, OptLevel};
use passkit_engine::PassManager;

const SIMPLE_ADD: &str = r#"
; ModuleID = 'simple_lang.c'
source_filename = "simple_lang.c"
target triple = "x86_64-pc-linux-gnu"

define dso_local i32 @simple_add(i32 noundef %a, i32 noundef %b) #0 {
entry:
  %add = add nsw i32 %a, %b
  ret i32 %add
}

attributes #0 = { noinline nounwind optnone uwtable "frame-pointer"="all" }
"#;

fn run(source: &str, entry: &str, args: &[i64]) -> Result<i64, ExecError> {
    let module = parse_module("test", source).expect("parse");
    JitEngine::default().run(module, entry, args)
}

// ============================================================================
// 1. add2sub scenario
// ============================================================================

#[test]
fn test_simple_add_unmodified() {
    assert_eq!(run(SIMPLE_ADD, "simple_add", &[10, 5]).unwrap(), 15);
}

#[test]
fn test_simple_add_after_add2sub() {
    let mut module = parse_module("simple_lang", SIMPLE_ADD).unwrap();
    let summary = PassManager::default_pipeline().run(&mut module);
    assert!(summary.modified);

    let result = JitEngine::default().run(module, "simple_add", &[10, 5]).unwrap();
    assert_eq!(result, 5);
}

#[test]
fn test_pipeline_twice_then_repeated_execution() {
    let mut module = parse_module("simple_lang", SIMPLE_ADD).unwrap();
    let pm = PassManager::default_pipeline();
    assert!(pm.run(&mut module).modified);
    assert!(!pm.run(&mut module).modified);

    let compiled = JitEngine::default().compile(module).unwrap();
    for _ in 0..3 {
        assert_eq!(compiled.call("simple_add", &[10, 5]).unwrap(), 5);
    }
}

#[test]
fn test_builder_module() {
    let mut func = Function::new(
        "simple_add",
        vec![
            Param { name: "a".into(), ty: Type::I64 },
            Param { name: "b".into(), ty: Type::I64 },
        ],
        Type::I64,
    );
    {
        let mut b = IrBuilder::new(&mut func);
        let (a0, a1) = (b.arg(0), b.arg(1));
        let sum = b.add(Type::I64, a0, a1);
        b.ret(Some(sum));
    }
    let mut module = Module::new("built");
    module.add_function(func).unwrap();
    PassManager::default_pipeline().run(&mut module);

    let result = JitEngine::default().run(module, "simple_add", &[3, 40]).unwrap();
    assert_eq!(result, -37);
}

// ============================================================================
// 2. Arithmetic and widths
// ============================================================================

#[test]
fn test_arithmetic_ops() {
    let source = r#"
define i64 @calc(i64 %x, i64 %y) {
entry:
  %m = mul i64 %x, %y
  %d = sdiv i64 %m, 3
  %r = srem i64 %x, %y
  %s = shl i64 %r, 2
  %o = or i64 %d, %s
  %n = xor i64 %o, -1
  %z = lshr i64 %n, 60
  %w = ashr i64 %n, 60
  %t = sub i64 %z, %w
  ret i64 %t
}
"#;
    let (x, y) = (17i64, 5i64);
    let m = x * y;
    let d = m / 3;
    let r = x % y;
    let s = r << 2;
    let o = d | s;
    let n = o ^ -1;
    let z = ((n as u64) >> 60) as i64;
    let w = n >> 60;
    assert_eq!(run(source, "calc", &[x, y]).unwrap(), z - w);
}

#[test]
fn test_i8_wraps_and_sign_extends() {
    let source = "define i8 @wrap(i8 %a) {\n  %r = add i8 %a, 1\n  ret i8 %r\n}\n";
    assert_eq!(run(source, "wrap", &[127]).unwrap(), -128);
    // Arguments are narrowed to the parameter width
    assert_eq!(run(source, "wrap", &[0x1ff]).unwrap(), 0);
}

#[test]
fn test_i16_constant_masking() {
    let source = "define i16 @k() {\n  %r = add i16 -1, -1\n  ret i16 %r\n}\n";
    assert_eq!(run(source, "k", &[]).unwrap(), -2);
}

#[test]
fn test_bool_signed_semantics() {
    // As signed values, i1 true is -1 and false is 0
    let source = r#"
define i1 @slt(i1 %a, i1 %b) {
entry:
  %c = icmp slt i1 %a, %b
  ret i1 %c
}

define i1 @ult(i1 %a, i1 %b) {
entry:
  %c = icmp ult i1 %a, %b
  ret i1 %c
}

define i1 @sra(i1 %a) {
entry:
  %s = ashr i1 %a, 0
  ret i1 %s
}

define i1 @rem(i1 %a) {
entry:
  %r = srem i1 %a, true
  ret i1 %r
}
"#;
    for verify in [true, false] {
        let module = parse_module("bools", source).unwrap();
        let engine = JitEngine::new(JitConfig { verify, ..Default::default() });
        let compiled = engine.compile(module).unwrap();
        assert_eq!(compiled.call("slt", &[1, 0]).unwrap(), -1);
        assert_eq!(compiled.call("slt", &[0, 1]).unwrap(), 0);
        assert_eq!(compiled.call("ult", &[1, 0]).unwrap(), 0);
        assert_eq!(compiled.call("ult", &[0, 1]).unwrap(), -1);
        assert_eq!(compiled.call("sra", &[1]).unwrap(), -1);
        assert_eq!(compiled.call("rem", &[1]).unwrap(), 0);
    }
}

#[test]
fn test_opt_levels_agree() {
    let source = "define i32 @f(i32 %a) {\n  %m = mul i32 %a, %a\n  %r = add i32 %m, 7\n  ret i32 %r\n}\n";
    for opt_level in [OptLevel::None, OptLevel::Speed, OptLevel::SpeedAndSize] {
        let module = parse_module("m", source).unwrap();
        let engine = JitEngine::new(JitConfig { opt_level, verify: true });
        assert_eq!(engine.run(module, "f", &[6]).unwrap(), 43);
    }
}

// ============================================================================
// 3. Control flow and calls
// ============================================================================

const CONTROL_FLOW: &str = r#"
define i64 @abs(i64 %x) {
entry:
  %neg = icmp slt i64 %x, 0
  br i1 %neg, label %flip, label %done
flip:
  %y = sub i64 0, %x
  ret i64 %y
done:
  ret i64 %x
}

define i64 @max(i64 %a, i64 %b) {
entry:
  %gt = icmp sgt i64 %a, %b
  %m = select i1 %gt, i64 %a, i64 %b
  ret i64 %m
}

define i64 @dist(i64 %a, i64 %b) {
entry:
  %d = sub i64 %a, %b
  %r = call i64 @abs(i64 %d)
  ret i64 %r
}

define i1 @is_zero(i32 %v) {
entry:
  %z = icmp eq i32 %v, 0
  ret i1 %z
}

define void @nothing() {
entry:
  ret void
}
"#;

#[test]
fn test_branches() {
    let compiled = JitEngine::default()
        .compile(parse_module("cf", CONTROL_FLOW).unwrap())
        .unwrap();
    assert_eq!(compiled.call("abs", &[-9]).unwrap(), 9);
    assert_eq!(compiled.call("abs", &[4]).unwrap(), 4);
    assert_eq!(compiled.call("max", &[3, 11]).unwrap(), 11);
    assert_eq!(compiled.call("max", &[-3, -11]).unwrap(), -3);
}

#[test]
fn test_calls_and_result_widening() {
    let compiled = JitEngine::default()
        .compile(parse_module("cf", CONTROL_FLOW).unwrap())
        .unwrap();
    assert_eq!(compiled.call("dist", &[2, 10]).unwrap(), 8);
    // i1 results are sign-extended: true is -1
    assert_eq!(compiled.call("is_zero", &[0]).unwrap(), -1);
    assert_eq!(compiled.call("is_zero", &[5]).unwrap(), 0);
    assert_eq!(compiled.call("nothing", &[]).unwrap(), 0);
}

// ============================================================================
// 4. Errors
// ============================================================================

#[test]
fn test_function_not_found_before_compilation() {
    // The module would fail verification; the lookup must fail first.
    let mut func = Function::new("broken", vec![], Type::I32);
    func.add_block("entry");
    let mut module = Module::new("m");
    module.add_function(func).unwrap();

    let err = JitEngine::default().run(module, "main", &[]).unwrap_err();
    assert!(matches!(err, ExecError::FunctionNotFound(ref name) if name == "main"));
}

#[test]
fn test_malformed_module_rejected() {
    let mut func = Function::new("broken", vec![], Type::I32);
    func.add_block("entry");
    let mut module = Module::new("m");
    module.add_function(func).unwrap();

    let err = JitEngine::default().run(module, "broken", &[]).unwrap_err();
    assert!(matches!(err, ExecError::Malformed(IrError::Malformed { .. })));
}

#[test]
fn test_lowering_failure_without_verification() {
    let mut func = Function::new("broken", vec![], Type::I32);
    func.add_block("entry");
    let mut module = Module::new("m");
    module.add_function(func).unwrap();

    let engine = JitEngine::new(JitConfig { verify: false, ..Default::default() });
    let err = engine.run(module, "broken", &[]).unwrap_err();
    assert!(matches!(err, ExecError::EngineCreationFailed(CodegenError::Lowering(_))));
}

#[test]
fn test_mistyped_module_rejected_before_codegen() {
    let mut func = Function::new(
        "mixed",
        vec![
            Param { name: "a".into(), ty: Type::I32 },
            Param { name: "b".into(), ty: Type::I64 },
        ],
        Type::I32,
    );
    {
        let mut b = IrBuilder::new(&mut func);
        let (a0, a1) = (b.arg(0), b.arg(1));
        let sum = b.add(Type::I32, a0, a1);
        b.ret(Some(sum));
    }
    let mut module = Module::new("m");
    module.add_function(func).unwrap();

    let err = JitEngine::default().run(module, "mixed", &[1, 2]).unwrap_err();
    assert!(matches!(err, ExecError::Malformed(IrError::Malformed { .. })));
}

#[test]
fn test_non_dominating_use_rejected() {
    let source = r#"
define i32 @pick(i1 %c) {
entry:
  br i1 %c, label %then, label %join
then:
  %v = add i32 1, 2
  br label %join
join:
  ret i32 %v
}
"#;
    let module = parse_module("m", source).unwrap();
    let err = JitEngine::default().run(module, "pick", &[0]).unwrap_err();
    assert!(matches!(err, ExecError::Malformed(IrError::Malformed { .. })));
    assert!(err.to_string().contains("does not dominate"));
}

#[test]
fn test_argument_count_mismatch() {
    let err = run(SIMPLE_ADD, "simple_add", &[1, 2, 3]).unwrap_err();
    assert!(matches!(err, ExecError::ArgumentCount { expected: 2, given: 3, .. }));
    assert!(err.to_string().contains("takes 2 argument(s), 3 given"));
}
