//! Parser for the textual IR (a strict subset of LLVM assembly).
//!
//! Parsing is two-phase per function: the body is first read into raw blocks
//! with symbolic names, then names are resolved into block IDs, argument
//! indices, and instruction IDs. Forward references to values and labels are
//! therefore allowed anywhere in the body.

use rustc_hash::FxHashMap;

use super::function::{Function, Param};
use super::instr::{BlockId, InstData, InstId, IntPredicate, Opcode, Operand};
use super::lexer::{line_col, tokenize, LexError, Span, Token};
use super::module::Module;
use super::types::Type;

/// Attribute-like words that carry no meaning for this IR and are skipped
const DECORATIONS: &[&str] = &[
    "dso_local",
    "dso_preemptable",
    "internal",
    "private",
    "hidden",
    "local_unnamed_addr",
    "unnamed_addr",
    "noundef",
    "signext",
    "zeroext",
    "nsw",
    "nuw",
    "exact",
    "tail",
    "musttail",
    "notail",
];

/// Malformed IR input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Parse a whole module
pub fn parse_module(name: &str, source: &str) -> Result<Module, ParseError> {
    let tokens = tokenize(source).map_err(|(kind, span)| {
        let (line, column) = line_col(source, span.start);
        let message = match kind {
            LexError::UnexpectedCharacter => format!("unexpected character '{}'", &source[span]),
            LexError::IntegerOutOfRange => format!("integer literal out of range: {}", &source[span]),
        };
        ParseError { line, column, message }
    })?;

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        calls: Vec::new(),
    };
    let mut module = Module::new(name);

    while let Some(token) = parser.peek().cloned() {
        match token {
            Token::Define => {
                let offset = parser.offset();
                let func = parser.parse_function()?;
                module
                    .add_function(func)
                    .map_err(|e| parser.error_at(offset, e.to_string()))?;
            }
            Token::SourceFilename => {
                parser.bump();
                parser.expect(Token::Equals)?;
                parser.expect_str()?;
            }
            Token::Target => {
                parser.bump();
                parser.expect_ident()?;
                parser.expect(Token::Equals)?;
                parser.expect_str()?;
            }
            Token::Attributes => parser.skip_attribute_group()?,
            Token::Declare => {
                return Err(parser.error("external declarations are not supported".to_string()))
            }
            other => return Err(parser.error(format!("expected 'define', found {}", other))),
        }
    }

    parser.check_calls(&module)?;
    Ok(module)
}

// ===== Raw (unresolved) function body =====

#[derive(Debug, Clone)]
enum RawValue {
    Local(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug)]
enum RawKind {
    Binary { op: Opcode, ty: Type, lhs: RawValue, rhs: RawValue },
    ICmp { pred: IntPredicate, ty: Type, lhs: RawValue, rhs: RawValue },
    Select { ty: Type, cond: RawValue, a: RawValue, b: RawValue },
    Call { ret: Type, callee: String, args: Vec<(Type, RawValue)> },
    Jump(String),
    Branch { cond: RawValue, then_label: String, else_label: String },
    Ret(Option<(Type, RawValue)>),
}

impl RawKind {
    fn is_terminator(&self) -> bool {
        matches!(self, RawKind::Jump(_) | RawKind::Branch { .. } | RawKind::Ret(_))
    }

    fn result_type(&self) -> Type {
        match self {
            RawKind::Binary { ty, .. } | RawKind::Select { ty, .. } => *ty,
            RawKind::ICmp { .. } => Type::I1,
            RawKind::Call { ret, .. } => *ret,
            RawKind::Jump(_) | RawKind::Branch { .. } | RawKind::Ret(_) => Type::Void,
        }
    }
}

#[derive(Debug)]
struct RawInst {
    name: Option<String>,
    kind: RawKind,
    offset: usize,
}

#[derive(Debug)]
struct RawBlock {
    name: String,
    offset: usize,
    insts: Vec<RawInst>,
}

/// A call whose signature is checked once every function is known
#[derive(Debug)]
struct CallSite {
    offset: usize,
    callee: String,
    ret: Type,
    args: Vec<Type>,
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    calls: Vec<CallSite>,
}

impl<'a> Parser<'a> {
    // ===== Token cursor =====

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.start,
            None => self.source.len(),
        }
    }

    fn error_at(&self, offset: usize, message: String) -> ParseError {
        let (line, column) = line_col(self.source, offset);
        ParseError { line, column, message }
    }

    fn error(&self, message: String) -> ParseError {
        self.error_at(self.offset(), message)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found {}", expected, token)),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("string")),
        }
    }

    fn expect_local(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Local(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("local name")),
        }
    }

    fn expect_global(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Global(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("global name")),
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_decorations(&mut self) {
        while let Some(Token::Ident(s)) = self.peek() {
            if DECORATIONS.contains(&s.as_str()) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn skip_attr_refs(&mut self) {
        while self.peek() == Some(&Token::AttrRef) {
            self.pos += 1;
        }
    }

    fn skip_attribute_group(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Attributes)?;
        self.expect(Token::AttrRef)?;
        self.expect(Token::Equals)?;
        self.expect(Token::LBrace)?;
        loop {
            match self.bump() {
                Some(Token::RBrace) => return Ok(()),
                Some(_) => {}
                None => return Err(self.unexpected("'}'")),
            }
        }
    }

    /// Calls against the signatures of functions defined in the module.
    ///
    /// Calls to functions the module does not define are left to the verifier.
    fn check_calls(&self, module: &Module) -> Result<(), ParseError> {
        for call in &self.calls {
            let Some(callee) = module.function(&call.callee) else { continue };
            let params: Vec<Type> = callee.params.iter().map(|p| p.ty).collect();
            if call.ret != callee.ret || call.args != params {
                let render = |tys: &[Type]| tys.iter().map(Type::to_string).collect::<Vec<_>>().join(", ");
                return Err(self.error_at(
                    call.offset,
                    format!(
                        "call to @{} as {} ({}) does not match its signature {} ({})",
                        call.callee,
                        call.ret,
                        render(&call.args),
                        callee.ret,
                        render(&params)
                    ),
                ));
            }
        }
        Ok(())
    }

    // ===== Grammar =====

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        self.skip_decorations();
        let offset = self.offset();
        let word = self.expect_ident()?;
        Type::from_keyword(&word).ok_or_else(|| self.error_at(offset, format!("unknown type '{}'", word)))
    }

    fn parse_value(&mut self) -> Result<RawValue, ParseError> {
        self.skip_decorations();
        let value = match self.peek() {
            Some(Token::Local(name)) => RawValue::Local(name.clone()),
            Some(Token::Int(v)) => RawValue::Int(*v),
            Some(Token::True) => RawValue::Bool(true),
            Some(Token::False) => RawValue::Bool(false),
            _ => return Err(self.unexpected("value")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn parse_typed_value(&mut self) -> Result<(Type, RawValue), ParseError> {
        let ty = self.parse_type()?;
        let value = self.parse_value()?;
        Ok((ty, value))
    }

    fn parse_label_ref(&mut self) -> Result<String, ParseError> {
        self.expect(Token::Label)?;
        self.expect_local()
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        self.expect(Token::Define)?;
        let ret = self.parse_type()?;
        let name = self.expect_global()?;

        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let ty = self.parse_type()?;
                self.skip_decorations();
                let offset = self.offset();
                let param_name = self.expect_local()?;
                if params.iter().any(|p: &Param| p.name == param_name) {
                    return Err(self.error_at(offset, format!("duplicate parameter '%{}'", param_name)));
                }
                params.push(Param { name: param_name, ty });
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        self.skip_decorations();
        self.skip_attr_refs();
        self.expect(Token::LBrace)?;

        let blocks = self.parse_body()?;
        self.expect(Token::RBrace)?;

        for inst in blocks.iter().flat_map(|b| &b.insts) {
            if let RawKind::Call { ret, callee, args } = &inst.kind {
                self.calls.push(CallSite {
                    offset: inst.offset,
                    callee: callee.clone(),
                    ret: *ret,
                    args: args.iter().map(|(ty, _)| *ty).collect(),
                });
            }
        }

        Resolver::new(self, Function::new(name, params, ret)).resolve(blocks)
    }

    fn parse_body(&mut self) -> Result<Vec<RawBlock>, ParseError> {
        let mut blocks: Vec<RawBlock> = Vec::new();

        loop {
            match self.peek() {
                Some(Token::RBrace) | None => break,
                Some(Token::LabelDef(label)) => {
                    let label = label.clone();
                    let offset = self.offset();
                    self.pos += 1;
                    blocks.push(RawBlock { name: label, offset, insts: vec![] });
                }
                _ => {
                    let needs_label = match blocks.last() {
                        None => false,
                        Some(block) => block.insts.last().is_some_and(|i| i.kind.is_terminator()),
                    };
                    if needs_label {
                        return Err(self.error("expected a label after a terminator".to_string()));
                    }
                    if blocks.is_empty() {
                        blocks.push(RawBlock {
                            name: "entry".to_string(),
                            offset: self.offset(),
                            insts: vec![],
                        });
                    }
                    let inst = self.parse_inst()?;
                    if let Some(block) = blocks.last_mut() {
                        block.insts.push(inst);
                    }
                }
            }
        }

        if blocks.is_empty() {
            return Err(self.error("function body has no blocks".to_string()));
        }
        Ok(blocks)
    }

    fn parse_inst(&mut self) -> Result<RawInst, ParseError> {
        let offset = self.offset();
        let name = match self.peek() {
            Some(Token::Local(name)) => {
                let name = name.clone();
                self.pos += 1;
                self.expect(Token::Equals)?;
                Some(name)
            }
            _ => None,
        };

        self.skip_decorations();
        let op_offset = self.offset();
        let mnemonic = self.expect_ident()?;

        let kind = if let Some(op) = Opcode::binary_from_mnemonic(&mnemonic) {
            let ty = self.parse_type()?;
            let lhs = self.parse_value()?;
            self.expect(Token::Comma)?;
            let rhs = self.parse_value()?;
            RawKind::Binary { op, ty, lhs, rhs }
        } else {
            match mnemonic.as_str() {
                "icmp" => {
                    let pred_offset = self.offset();
                    let pred_word = self.expect_ident()?;
                    let pred = IntPredicate::from_keyword(&pred_word).ok_or_else(|| {
                        self.error_at(pred_offset, format!("unknown icmp predicate '{}'", pred_word))
                    })?;
                    let ty = self.parse_type()?;
                    let lhs = self.parse_value()?;
                    self.expect(Token::Comma)?;
                    let rhs = self.parse_value()?;
                    RawKind::ICmp { pred, ty, lhs, rhs }
                }
                "select" => {
                    let cond_offset = self.offset();
                    let (cond_ty, cond) = self.parse_typed_value()?;
                    if cond_ty != Type::I1 {
                        return Err(self.error_at(cond_offset, format!("select condition must be i1, found {}", cond_ty)));
                    }
                    self.expect(Token::Comma)?;
                    let (ty, a) = self.parse_typed_value()?;
                    self.expect(Token::Comma)?;
                    let b_offset = self.offset();
                    let (b_ty, b) = self.parse_typed_value()?;
                    if b_ty != ty {
                        return Err(self.error_at(b_offset, format!("select arms differ in type: {} and {}", ty, b_ty)));
                    }
                    RawKind::Select { ty, cond, a, b }
                }
                "call" => {
                    let ret = self.parse_type()?;
                    let callee = self.expect_global()?;
                    self.expect(Token::LParen)?;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_typed_value()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    self.skip_attr_refs();
                    RawKind::Call { ret, callee, args }
                }
                "br" => {
                    if self.peek() == Some(&Token::Label) {
                        RawKind::Jump(self.parse_label_ref()?)
                    } else {
                        let cond_offset = self.offset();
                        let (cond_ty, cond) = self.parse_typed_value()?;
                        if cond_ty != Type::I1 {
                            return Err(self.error_at(cond_offset, format!("branch condition must be i1, found {}", cond_ty)));
                        }
                        self.expect(Token::Comma)?;
                        let then_label = self.parse_label_ref()?;
                        self.expect(Token::Comma)?;
                        let else_label = self.parse_label_ref()?;
                        RawKind::Branch { cond, then_label, else_label }
                    }
                }
                "ret" => {
                    if self.eat_keyword("void") {
                        RawKind::Ret(None)
                    } else {
                        RawKind::Ret(Some(self.parse_typed_value()?))
                    }
                }
                other => {
                    return Err(self.error_at(op_offset, format!("unsupported instruction '{}'", other)))
                }
            }
        };

        let operand_ty = match &kind {
            RawKind::Binary { ty, .. } | RawKind::ICmp { ty, .. } | RawKind::Select { ty, .. } => Some(*ty),
            _ => None,
        };
        if operand_ty == Some(Type::Void) {
            return Err(self.error_at(op_offset, format!("'{}' cannot operate on void", mnemonic)));
        }
        if let (Some(n), Type::Void) = (&name, kind.result_type()) {
            return Err(self.error_at(offset, format!("'%{}' names an instruction without a result", n)));
        }
        Ok(RawInst { name, kind, offset })
    }
}

// ===== Name resolution =====

#[derive(Clone, Copy)]
enum ValueRef {
    Arg(u32, Type),
    Inst(InstId, Type),
}

struct Resolver<'p, 'a> {
    parser: &'p Parser<'a>,
    func: Function,
    values: FxHashMap<String, ValueRef>,
    labels: FxHashMap<String, BlockId>,
}

impl<'p, 'a> Resolver<'p, 'a> {
    fn new(parser: &'p Parser<'a>, func: Function) -> Self {
        let values = func
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), ValueRef::Arg(i as u32, p.ty)))
            .collect();
        Resolver {
            parser,
            func,
            values,
            labels: FxHashMap::default(),
        }
    }

    fn resolve(mut self, blocks: Vec<RawBlock>) -> Result<Function, ParseError> {
        // Block labels and value names first. Instruction IDs are handed out
        // sequentially by the arena, so they can be predicted here.
        let mut next_id = 0u32;
        for block in &blocks {
            if self.labels.contains_key(&block.name) {
                return Err(self.parser.error_at(block.offset, format!("duplicate label '{}'", block.name)));
            }
            let id = self.func.add_block(block.name.clone());
            self.labels.insert(block.name.clone(), id);

            for inst in &block.insts {
                if let Some(name) = &inst.name {
                    if self.values.contains_key(name) {
                        return Err(self.parser.error_at(inst.offset, format!("redefinition of '%{}'", name)));
                    }
                    self.values
                        .insert(name.clone(), ValueRef::Inst(InstId(next_id), inst.kind.result_type()));
                }
                next_id += 1;
            }
        }

        // Instructions; operands naming a not-yet-created instruction get a
        // placeholder and are patched once everything exists.
        let mut fixups: Vec<(InstId, usize, InstId)> = Vec::new();
        for (block_index, block) in blocks.into_iter().enumerate() {
            let block_id = BlockId(block_index as u32);
            for inst in block.insts {
                let next = InstId(self.func.arena_len() as u32);
                let mut pending = Vec::new();
                let data = self.lower(inst, next, &mut pending)?;
                let id = self.func.append_inst(block_id, data);
                debug_assert_eq!(id, next);
                fixups.extend(pending.into_iter().map(|(idx, target)| (id, idx, target)));
            }
        }
        for (inst, index, target) in fixups {
            self.func.set_operand(inst, index, Operand::Inst(target));
        }

        Ok(self.func)
    }

    fn lower(
        &self,
        inst: RawInst,
        id: InstId,
        pending: &mut Vec<(usize, InstId)>,
    ) -> Result<InstData, ParseError> {
        let offset = inst.offset;
        let error = |message: String| self.parser.error_at(offset, message);
        let mut operand = |value: &RawValue, ty: Type, index: usize| -> Result<Operand, ParseError> {
            if ty == Type::Void {
                return Err(error("void is not a value type".to_string()));
            }
            match value {
                RawValue::Int(v) => Ok(Operand::constant(ty, *v)),
                RawValue::Bool(b) if ty == Type::I1 => Ok(Operand::constant(Type::I1, *b as i64)),
                RawValue::Bool(_) => Err(error(format!("boolean literal used as {}", ty))),
                RawValue::Local(name) => {
                    let value_ref = self
                        .values
                        .get(name)
                        .copied()
                        .ok_or_else(|| error(format!("use of undefined value '%{}'", name)))?;
                    let actual = match value_ref {
                        ValueRef::Arg(_, actual) | ValueRef::Inst(_, actual) => actual,
                    };
                    if actual != ty {
                        return Err(error(format!("'%{}' has type {}, expected {}", name, actual, ty)));
                    }
                    match value_ref {
                        ValueRef::Arg(i, _) => Ok(Operand::Arg(i)),
                        ValueRef::Inst(target, _) if target == id => {
                            Err(error(format!("'%{}' uses its own result", name)))
                        }
                        ValueRef::Inst(target, _) if target > id => {
                            pending.push((index, target));
                            Ok(Operand::constant(ty, 0))
                        }
                        ValueRef::Inst(target, _) => Ok(Operand::Inst(target)),
                    }
                }
            }
        };

        let data = match inst.kind {
            RawKind::Binary { op, ty, lhs, rhs } => {
                InstData::binary(op, ty, operand(&lhs, ty, 0)?, operand(&rhs, ty, 1)?)
            }
            RawKind::ICmp { pred, ty, lhs, rhs } => {
                InstData::icmp(pred, operand(&lhs, ty, 0)?, operand(&rhs, ty, 1)?)
            }
            RawKind::Select { ty, cond, a, b } => InstData::select(
                ty,
                operand(&cond, Type::I1, 0)?,
                operand(&a, ty, 1)?,
                operand(&b, ty, 2)?,
            ),
            RawKind::Call { ret, callee, args } => {
                let mut ops = Vec::with_capacity(args.len());
                for (index, (ty, value)) in args.iter().enumerate() {
                    ops.push(operand(value, *ty, index)?);
                }
                InstData::call(ret, callee, ops)
            }
            RawKind::Jump(label) => InstData::jump(self.label(&label, offset)?),
            RawKind::Branch { cond, then_label, else_label } => InstData::branch(
                operand(&cond, Type::I1, 0)?,
                self.label(&then_label, offset)?,
                self.label(&else_label, offset)?,
            ),
            RawKind::Ret(None) if self.func.ret == Type::Void => InstData::ret(None),
            RawKind::Ret(None) => return Err(error(format!("'ret void' in a function returning {}", self.func.ret))),
            RawKind::Ret(Some((ty, _))) if ty != self.func.ret => {
                return Err(error(format!("returns {} from a function returning {}", ty, self.func.ret)))
            }
            RawKind::Ret(Some((ty, value))) => InstData::ret(Some(operand(&value, ty, 0)?)),
        };

        Ok(match inst.name {
            Some(name) => data.named(name),
            None => data,
        })
    }

    fn label(&self, name: &str, offset: usize) -> Result<BlockId, ParseError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| self.parser.error_at(offset, format!("use of undefined label '%{}'", name)))
    }
}
