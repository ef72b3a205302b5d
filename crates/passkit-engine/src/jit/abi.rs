//! Native signatures and entry trampolines
//!
//! Every IR function is compiled with its natural native signature. To call
//! it from Rust without knowing that signature at compile time, each function
//! also gets an entry trampoline with the fixed ABI
//!
//! `extern "C" fn(args: *const i64) -> i64`
//!
//! The trampoline loads each argument from `args`, narrows it to the declared
//! parameter width, calls the function, and widens the result back to `i64`
//! (sign-extended, so `i1` true is -1; `void` returns 0).

use cranelift_codegen::ir::{self, types, AbiParam, InstBuilder, MemFlags};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::FunctionBuilder;

use crate::ir::{Function, Type};

/// Native trampoline type
pub type EntryFn = unsafe extern "C" fn(*const i64) -> i64;

/// Cranelift type holding values of `ty` (`i1` lives in a byte)
pub fn clif_type(ty: Type) -> Option<ir::Type> {
    match ty {
        Type::I1 | Type::I8 => Some(types::I8),
        Type::I16 => Some(types::I16),
        Type::I32 => Some(types::I32),
        Type::I64 => Some(types::I64),
        Type::Void => None,
    }
}

/// Immediate for an `iconst` of `ty`: the value zero-extended from the type width
pub fn const_bits(ty: Type, value: i64) -> i64 {
    match ty {
        Type::I1 => value & 1,
        Type::I8 => value & 0xff,
        Type::I16 => value & 0xffff,
        Type::I32 => value & 0xffff_ffff,
        Type::I64 | Type::Void => value,
    }
}

/// Native signature of an IR function
pub fn function_signature(func: &Function, call_conv: CallConv) -> ir::Signature {
    let mut sig = ir::Signature::new(call_conv);
    for param in &func.params {
        if let Some(ty) = clif_type(param.ty) {
            sig.params.push(AbiParam::new(ty));
        }
    }
    if let Some(ty) = clif_type(func.ret) {
        sig.returns.push(AbiParam::new(ty));
    }
    sig
}

/// Signature of every entry trampoline
pub fn entry_signature(pointer_type: ir::Type, call_conv: CallConv) -> ir::Signature {
    let mut sig = ir::Signature::new(call_conv);
    sig.params.push(AbiParam::new(pointer_type)); // args
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

/// Symbol name of the trampoline for `name`
pub fn entry_symbol(name: &str) -> String {
    format!("__passkit_entry.{}", name)
}

/// Emit the body of the trampoline for `func`, which calls `target`
pub fn build_entry_trampoline(func: &Function, target: ir::FuncRef, mut builder: FunctionBuilder<'_>) {
    let block = builder.create_block();
    builder.append_block_params_for_function_params(block);
    builder.switch_to_block(block);
    builder.seal_block(block);
    let args_ptr = builder.block_params(block)[0];

    let mut args = Vec::with_capacity(func.params.len());
    for (i, param) in func.params.iter().enumerate() {
        let Some(ty) = clif_type(param.ty) else { continue };
        let raw = builder
            .ins()
            .load(types::I64, MemFlags::trusted(), args_ptr, (i * 8) as i32);
        let narrowed = if ty == types::I64 { raw } else { builder.ins().ireduce(ty, raw) };
        let arg = if param.ty == Type::I1 {
            builder.ins().band_imm(narrowed, 1)
        } else {
            narrowed
        };
        args.push(arg);
    }

    let call = builder.ins().call(target, &args);
    let result = builder.inst_results(call).first().copied();

    let widened = match (func.ret, result) {
        (Type::I64, Some(v)) => v,
        (Type::I1, Some(v)) => {
            let bit = builder.ins().uextend(types::I64, v);
            builder.ins().ineg(bit)
        }
        (_, Some(v)) => builder.ins().sextend(types::I64, v),
        (_, None) => builder.ins().iconst(types::I64, 0),
    };
    builder.ins().return_(&[widened]);
    builder.finalize();
}
