//! x86-64 assembly emission.
//!
//! The generator walks each function's tree depth-first, allocating values
//! into a fixed pool of four clobber registers. Structural nodes
//! (sequencing, branches, loops, calls, the function wrapper) order their
//! own children and clear the pool between statements, so four registers
//! bound the depth of any single expression.

mod error;

pub use error::CodegenError;

use std::io::Write;

use log::debug;

use crate::ast::{Node, Op, Payload};
use crate::symbols::{Storage, Structure, Symbol, SymbolId, SymbolTable};
use crate::types::Type;

const REGISTER_COUNT: usize = 4;

const REGISTERS: [&str; REGISTER_COUNT] = ["%r10", "%r11", "%r12", "%r13"];
const DWORD_REGISTERS: [&str; REGISTER_COUNT] = ["%r10d", "%r11d", "%r12d", "%r13d"];
const BYTE_REGISTERS: [&str; REGISTER_COUNT] = ["%r10b", "%r11b", "%r12b", "%r13b"];

// The first four call arguments, in order.
const ARG_REGISTERS: [&str; 4] = ["%rcx", "%rdx", "%r8", "%r9"];
const ARG_DWORD_REGISTERS: [&str; 4] = ["%ecx", "%edx", "%r8d", "%r9d"];
const ARG_BYTE_REGISTERS: [&str; 4] = ["%cl", "%dl", "%r8b", "%r9b"];

/// A handle on one of the four clobber registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(usize);

impl Reg {
    fn quad(self) -> &'static str {
        REGISTERS[self.0]
    }

    fn dword(self) -> &'static str {
        DWORD_REGISTERS[self.0]
    }

    fn byte(self) -> &'static str {
        BYTE_REGISTERS[self.0]
    }
}

fn set_instruction(op: Op) -> &'static str {
    match op {
        Op::Equal => "sete",
        Op::NotEqual => "setne",
        Op::Less => "setl",
        Op::Greater => "setg",
        Op::LessEqual => "setle",
        _ => "setge",
    }
}

/// The jump taken when a fused comparison fails.
fn inverse_jump(op: Op) -> &'static str {
    match op {
        Op::Equal => "jne",
        Op::NotEqual => "je",
        Op::Less => "jge",
        Op::Greater => "jle",
        Op::LessEqual => "jg",
        _ => "jl",
    }
}

/// Round a member offset up to a 4-byte boundary. Chars pack tight;
/// anything without a primitive size cannot sit in a composite.
pub fn align_memory(ty: Type, offset: u32) -> Result<u32, CodegenError> {
    let size = ty
        .primitive_size()
        .map_err(|_| CodegenError::UnsupportedAlignment(ty))?;
    if size == 1 {
        return Ok(offset);
    }
    Ok((offset + 3) & !3)
}

pub struct CodeGen<W: Write> {
    out: W,
    used: [bool; REGISTER_COUNT],
    label_count: usize,
    local_offset: u32,
    frame_offset: u32,
}

impl<W: Write> CodeGen<W> {
    pub fn new(out: W) -> CodeGen<W> {
        CodeGen {
            out,
            used: [false; REGISTER_COUNT],
            label_count: 0,
            local_offset: 0,
            frame_offset: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn flush(&mut self) -> Result<(), CodegenError> {
        self.out.flush()?;
        Ok(())
    }

    /// Claim a free register; a fifth concurrent value is an error.
    pub fn allocate_register(&mut self) -> Result<Reg, CodegenError> {
        for (index, used) in self.used.iter_mut().enumerate() {
            if !*used {
                *used = true;
                return Ok(Reg(index));
            }
        }
        Err(CodegenError::OutOfRegisters)
    }

    /// Release a register claimed by [`allocate_register`].
    pub fn free_register(&mut self, reg: Reg) -> Result<(), CodegenError> {
        if !self.used[reg.0] {
            return Err(CodegenError::FreeUnusedRegister(reg.0));
        }
        self.used[reg.0] = false;
        Ok(())
    }

    pub fn free_all_registers(&mut self) {
        self.used = [false; REGISTER_COUNT];
    }

    pub fn new_label(&mut self) -> usize {
        self.label_count += 1;
        self.label_count
    }

    /// File header; also resets the register pool.
    pub fn preamble(&mut self) -> Result<(), CodegenError> {
        self.free_all_registers();
        writeln!(self.out, "\t.text")?;
        Ok(())
    }

    fn label(&mut self, label: usize) -> Result<(), CodegenError> {
        writeln!(self.out, "\nL{}:", label)?;
        Ok(())
    }

    fn jump(&mut self, label: usize) -> Result<(), CodegenError> {
        writeln!(self.out, "\tjmp\tL{}", label)?;
        Ok(())
    }

    fn load_integer(&mut self, value: i64) -> Result<Reg, CodegenError> {
        let reg = self.allocate_register()?;
        writeln!(self.out, "\tmovq\t${}, {}", value, reg.quad())?;
        Ok(reg)
    }

    fn load_string(&mut self, label: usize) -> Result<Reg, CodegenError> {
        let reg = self.allocate_register()?;
        writeln!(self.out, "\tleaq\tL{}(%rip), {}", label, reg.quad())?;
        Ok(reg)
    }

    /// Emit the bytes of a string literal under a fresh label and return
    /// that label.
    pub fn new_string(&mut self, text: &str) -> Result<usize, CodegenError> {
        let label = self.new_label();
        self.label(label)?;
        for byte in text.as_bytes() {
            writeln!(self.out, "\t.byte\t{}", byte)?;
        }
        writeln!(self.out, "\t.byte\t0")?;
        Ok(label)
    }

    fn add(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\taddq\t{}, {}", left.quad(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    fn subtract(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tsubq\t{}, {}", right.quad(), left.quad())?;
        self.free_register(right)?;
        Ok(left)
    }

    fn multiply(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\timulq\t{}, {}", left.quad(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    fn divide(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tmovq\t{}, %rax", left.quad())?;
        writeln!(self.out, "\tcqo")?;
        writeln!(self.out, "\tidivq\t{}", right.quad())?;
        writeln!(self.out, "\tmovq\t%rax, {}", left.quad())?;
        self.free_register(right)?;
        Ok(left)
    }

    fn bitwise_and(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tandq\t{}, {}", left.quad(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    fn bitwise_or(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\torq\t{}, {}", left.quad(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    fn bitwise_xor(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\txorq\t{}, {}", left.quad(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    fn shift_left(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tmovb\t{}, %cl", right.byte())?;
        writeln!(self.out, "\tshlq\t%cl, {}", left.quad())?;
        self.free_register(right)?;
        Ok(left)
    }

    fn shift_right(&mut self, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tmovb\t{}, %cl", right.byte())?;
        writeln!(self.out, "\tshrq\t%cl, {}", left.quad())?;
        self.free_register(right)?;
        Ok(left)
    }

    fn shift_left_by(&mut self, reg: Reg, amount: u32) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tsalq\t${}, {}", amount, reg.quad())?;
        Ok(reg)
    }

    fn negate(&mut self, reg: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tnegq\t{}", reg.quad())?;
        Ok(reg)
    }

    fn invert(&mut self, reg: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tnotq\t{}", reg.quad())?;
        Ok(reg)
    }

    fn boolean_not(&mut self, reg: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\ttest\t{}, {}", reg.quad(), reg.quad())?;
        writeln!(self.out, "\tsete\t{}", reg.byte())?;
        writeln!(self.out, "\tmovzbq\t{}, {}", reg.byte(), reg.quad())?;
        Ok(reg)
    }

    /// Collapse a value to a truth value. Directly under a branch or loop
    /// this jumps to the exit label on zero instead of materialising 0/1.
    fn boolean_convert(
        &mut self,
        reg: Reg,
        parent: Option<Op>,
        label: Option<usize>,
    ) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\ttest\t{}, {}", reg.quad(), reg.quad())?;
        match parent {
            Some(Op::If) | Some(Op::Loop) => {
                let label = label.ok_or(CodegenError::MissingJumpTarget(Op::BoolConvert))?;
                writeln!(self.out, "\tje\tL{}", label)?;
            }
            _ => {
                writeln!(self.out, "\tsetnz\t{}", reg.byte())?;
                writeln!(self.out, "\tmovzbq\t{}, {}", reg.byte(), reg.quad())?;
            }
        }
        Ok(reg)
    }

    fn compare_set(&mut self, op: Op, left: Reg, right: Reg) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tcmpq\t{}, {}", right.quad(), left.quad())?;
        writeln!(self.out, "\t{}\t{}", set_instruction(op), right.byte())?;
        writeln!(self.out, "\tmovzbq\t{}, {}", right.byte(), right.quad())?;
        self.free_register(left)?;
        Ok(right)
    }

    /// Fused comparison under a branch or loop: compare and take the
    /// inverse jump to `label` when the condition fails.
    fn compare_jump(&mut self, op: Op, left: Reg, right: Reg, label: usize) -> Result<(), CodegenError> {
        writeln!(self.out, "\tcmpq\t{}, {}", right.quad(), left.quad())?;
        writeln!(self.out, "\t{}\tL{}", inverse_jump(op), label)?;
        self.free_all_registers();
        Ok(())
    }

    fn load_global(&mut self, symbol: &Symbol, op: Option<Op>) -> Result<Reg, CodegenError> {
        let reg = self.allocate_register()?;
        let name = &symbol.name;
        match symbol.ty.primitive_size()? {
            1 => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincb\t{}(%rip)", name)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecb\t{}(%rip)", name)?;
                }
                writeln!(self.out, "\tmovzbq\t{}(%rip), {}", name, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincb\t{}(%rip)", name)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecb\t{}(%rip)", name)?;
                }
            }
            4 => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincl\t{}(%rip)", name)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecl\t{}(%rip)", name)?;
                }
                writeln!(self.out, "\tmovslq\t{}(%rip), {}", name, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincl\t{}(%rip)", name)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecl\t{}(%rip)", name)?;
                }
            }
            _ => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincq\t{}(%rip)", name)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecq\t{}(%rip)", name)?;
                }
                writeln!(self.out, "\tmovq\t{}(%rip), {}", name, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincq\t{}(%rip)", name)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecq\t{}(%rip)", name)?;
                }
            }
        }
        Ok(reg)
    }

    fn local_offset_of(symbol: &Symbol) -> i32 {
        match symbol.structure {
            Structure::Variable { offset } => offset,
            _ => 0,
        }
    }

    fn load_local(&mut self, symbol: &Symbol, op: Option<Op>) -> Result<Reg, CodegenError> {
        let reg = self.allocate_register()?;
        let offset = Self::local_offset_of(symbol);
        match symbol.ty.primitive_size()? {
            1 => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincb\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecb\t{}(%rbp)", offset)?;
                }
                writeln!(self.out, "\tmovzbq\t{}(%rbp), {}", offset, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincb\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecb\t{}(%rbp)", offset)?;
                }
            }
            4 => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincl\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecl\t{}(%rbp)", offset)?;
                }
                writeln!(self.out, "\tmovslq\t{}(%rbp), {}", offset, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincl\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecl\t{}(%rbp)", offset)?;
                }
            }
            _ => {
                if op == Some(Op::PreIncrement) {
                    writeln!(self.out, "\tincq\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PreDecrement) {
                    writeln!(self.out, "\tdecq\t{}(%rbp)", offset)?;
                }
                writeln!(self.out, "\tmovq\t{}(%rbp), {}", offset, reg.quad())?;
                if op == Some(Op::PostIncrement) {
                    writeln!(self.out, "\tincq\t{}(%rbp)", offset)?;
                }
                if op == Some(Op::PostDecrement) {
                    writeln!(self.out, "\tdecq\t{}(%rbp)", offset)?;
                }
            }
        }
        Ok(reg)
    }

    fn load_symbol(&mut self, symbol: &Symbol, op: Option<Op>) -> Result<Reg, CodegenError> {
        match symbol.storage {
            Storage::Local | Storage::Param => self.load_local(symbol, op),
            _ => self.load_global(symbol, op),
        }
    }

    fn store_global(&mut self, symbol: &Symbol, reg: Reg) -> Result<Reg, CodegenError> {
        match symbol.ty.primitive_size()? {
            1 => writeln!(self.out, "\tmovb\t{}, {}(%rip)", reg.byte(), symbol.name)?,
            4 => writeln!(self.out, "\tmovl\t{}, {}(%rip)", reg.dword(), symbol.name)?,
            _ => writeln!(self.out, "\tmovq\t{}, {}(%rip)", reg.quad(), symbol.name)?,
        }
        Ok(reg)
    }

    fn store_local(&mut self, symbol: &Symbol, reg: Reg) -> Result<Reg, CodegenError> {
        let offset = Self::local_offset_of(symbol);
        match symbol.ty.primitive_size()? {
            1 => writeln!(self.out, "\tmovb\t{}, {}(%rbp)", reg.byte(), offset)?,
            4 => writeln!(self.out, "\tmovl\t{}, {}(%rbp)", reg.dword(), offset)?,
            _ => writeln!(self.out, "\tmovq\t{}, {}(%rbp)", reg.quad(), offset)?,
        }
        Ok(reg)
    }

    /// Store `value` through the pointer in `pointer`; the operand width
    /// follows the pointed-to value's type.
    fn store_deref(&mut self, value: Reg, pointer: Reg, ty: Type) -> Result<Reg, CodegenError> {
        match ty.primitive_size()? {
            1 => writeln!(self.out, "\tmovb\t{}, ({})", value.byte(), pointer.quad())?,
            4 => writeln!(self.out, "\tmovl\t{}, ({})", value.dword(), pointer.quad())?,
            _ => writeln!(self.out, "\tmovq\t{}, ({})", value.quad(), pointer.quad())?,
        }
        Ok(value)
    }

    /// Load the value a pointer register points at; `ty` is the value's
    /// type after the dereference.
    fn load_deref(&mut self, reg: Reg, ty: Type) -> Result<Reg, CodegenError> {
        match ty.primitive_size()? {
            1 => writeln!(self.out, "\tmovzbq\t({0}), {0}", reg.quad())?,
            4 => writeln!(self.out, "\tmovslq\t({0}), {0}", reg.quad())?,
            _ => writeln!(self.out, "\tmovq\t({0}), {0}", reg.quad())?,
        }
        Ok(reg)
    }

    fn address_of(&mut self, symbol: &Symbol) -> Result<Reg, CodegenError> {
        let reg = self.allocate_register()?;
        match symbol.storage {
            Storage::Local | Storage::Param => {
                writeln!(self.out, "\tleaq\t{}(%rbp), {}", Self::local_offset_of(symbol), reg.quad())?;
            }
            _ => writeln!(self.out, "\tleaq\t{}(%rip), {}", symbol.name, reg.quad())?,
        }
        Ok(reg)
    }

    /// Move an evaluated argument into its calling-convention position:
    /// the first four go to registers, the rest are pushed.
    fn copy_argument(&mut self, reg: Reg, position: usize) -> Result<(), CodegenError> {
        if position > 4 {
            writeln!(self.out, "\tpushq\t{}", reg.quad())?;
        } else {
            writeln!(self.out, "\tmovq\t{}, {}", reg.quad(), ARG_REGISTERS[position - 1])?;
        }
        Ok(())
    }

    fn call(&mut self, name: &str, args: usize) -> Result<Reg, CodegenError> {
        writeln!(self.out, "\tcall\t{}", name)?;
        if args > 4 {
            writeln!(self.out, "\taddq\t${}, %rsp", 8 * (args - 4))?;
        }
        let reg = self.allocate_register()?;
        writeln!(self.out, "\tmovq\t%rax, {}", reg.quad())?;
        Ok(reg)
    }

    fn print(&mut self, reg: Reg) -> Result<(), CodegenError> {
        writeln!(self.out, "\tmovq\t{}, %rcx", reg.quad())?;
        writeln!(self.out, "\tcall\tPrintInteger")?;
        Ok(())
    }

    /// Place the return value in %rax at the width of the function's
    /// declared type, then jump to the shared exit label.
    fn function_return(&mut self, function: &Symbol, reg: Reg) -> Result<(), CodegenError> {
        match function.ty.primitive_size()? {
            1 => writeln!(self.out, "\tmovzbl\t{}, %eax", reg.byte())?,
            4 => writeln!(self.out, "\tmovl\t{}, %eax", reg.dword())?,
            _ => writeln!(self.out, "\tmovq\t{}, %rax", reg.quad())?,
        }
        match function.structure {
            Structure::Function { exit_label, .. } => self.jump(exit_label),
            _ => Err(CodegenError::BadFunctionSymbol(function.name.clone())),
        }
    }

    /// Claim a downward-growing frame slot of at least 4 bytes.
    fn reserve_local(&mut self, ty: Type) -> Result<i32, CodegenError> {
        let size = ty.primitive_size()?.max(4);
        self.local_offset += size;
        Ok(-(self.local_offset as i32))
    }

    /// Lay out the frame, emit the function header, reserve the stack and
    /// spill register parameters to their slots.
    fn function_preamble(&mut self, table: &mut SymbolTable, id: SymbolId) -> Result<(), CodegenError> {
        let function = table.get(id);
        let name = function.name.clone();
        let params: Vec<SymbolId> = function.members.iter().copied().collect();
        debug!("generating function '{}'", name);

        self.local_offset = 4;
        // (frame offset, value size, argument position)
        let mut spills: Vec<(i32, u32, usize)> = Vec::new();
        for (index, &param) in params.iter().enumerate() {
            let position = index + 1;
            let ty = table.get(param).ty;
            let offset = if position <= 4 {
                let offset = self.reserve_local(ty)?;
                spills.push((offset, ty.primitive_size()?, position));
                offset
            } else {
                // Caller-pushed, above the saved %rbp and return address.
                16 + 8 * (position as i32 - 5)
            };
            if let Structure::Variable { offset: slot } = &mut table.get_mut(param).structure {
                *slot = offset;
            }
        }
        for local in table.local_ids() {
            let ty = table.get(local).ty;
            let offset = self.reserve_local(ty)?;
            if let Structure::Variable { offset: slot } = &mut table.get_mut(local).structure {
                *slot = offset;
            }
        }
        self.frame_offset = (self.local_offset + 31) & !31;

        writeln!(self.out, "\t.text")?;
        writeln!(self.out, "\t.globl\t{}", name)?;
        writeln!(self.out, "\t.def\t{};\t.scl\t2;\t.type\t32;\t.endef", name)?;
        writeln!(self.out, "{}:", name)?;
        writeln!(self.out, "\tpushq\t%rbp")?;
        writeln!(self.out, "\tmovq\t%rsp, %rbp")?;
        if name == "main" {
            writeln!(self.out, "\tcall\t__main")?;
        }
        writeln!(self.out, "\taddq\t$-{}, %rsp", self.frame_offset)?;
        for (offset, size, position) in spills {
            match size {
                1 => writeln!(
                    self.out,
                    "\tmovb\t{}, {}(%rbp)",
                    ARG_BYTE_REGISTERS[position - 1],
                    offset
                )?,
                4 => writeln!(
                    self.out,
                    "\tmovl\t{}, {}(%rbp)",
                    ARG_DWORD_REGISTERS[position - 1],
                    offset
                )?,
                _ => writeln!(
                    self.out,
                    "\tmovq\t{}, {}(%rbp)",
                    ARG_REGISTERS[position - 1],
                    offset
                )?,
            }
        }
        Ok(())
    }

    fn function_epilogue(&mut self, function: &Symbol) -> Result<(), CodegenError> {
        let exit_label = match function.structure {
            Structure::Function { exit_label, .. } => exit_label,
            _ => return Err(CodegenError::BadFunctionSymbol(function.name.clone())),
        };
        self.label(exit_label)?;
        writeln!(self.out, "\taddq\t${}, %rsp", self.frame_offset)?;
        writeln!(self.out, "\tpopq\t%rbp")?;
        writeln!(self.out, "\tret")?;
        Ok(())
    }

    /// Emit the zero-initialised `.data` block for a non-function global.
    pub fn global_symbol(&mut self, table: &SymbolTable, id: SymbolId) -> Result<(), CodegenError> {
        let symbol = table.get(id);
        if matches!(symbol.structure, Structure::Function { .. }) {
            return Ok(());
        }
        let size = match symbol.structure {
            Structure::Array { elements } => {
                elements as u32 * symbol.ty.value_at()?.primitive_size()?
            }
            _ => table.type_size(symbol.ty, symbol.composite)?,
        };
        writeln!(self.out, "\t.data")?;
        writeln!(self.out, "\t.globl\t{}", symbol.name)?;
        writeln!(self.out, "{}:", symbol.name)?;
        match (size, &symbol.structure) {
            (1, Structure::Variable { .. }) => writeln!(self.out, "\t.byte\t0")?,
            (4, Structure::Variable { .. }) => writeln!(self.out, "\t.long\t0")?,
            (8, Structure::Variable { .. }) => writeln!(self.out, "\t.quad\t0")?,
            _ => {
                for _ in 0..size {
                    writeln!(self.out, "\t.byte\t0")?;
                }
            }
        }
        Ok(())
    }

    /// Generate code for one completed declaration tree.
    pub fn generate(&mut self, node: &Node, table: &mut SymbolTable) -> Result<(), CodegenError> {
        self.tree(node, table, None, None)?;
        Ok(())
    }

    fn gen_if(&mut self, node: &Node, table: &mut SymbolTable) -> Result<Option<Reg>, CodegenError> {
        let condition = node.left.as_ref().ok_or(CodegenError::MissingOperand(Op::If))?;
        let false_label = self.new_label();
        let end_label = if node.right.is_some() { Some(self.new_label()) } else { None };

        self.tree(condition, table, Some(false_label), Some(Op::If))?;
        self.free_all_registers();
        if let Some(then_block) = &node.middle {
            self.tree(then_block, table, None, Some(Op::If))?;
            self.free_all_registers();
        }
        match (&node.right, end_label) {
            (Some(else_block), Some(end)) => {
                self.jump(end)?;
                self.label(false_label)?;
                self.tree(else_block, table, None, Some(Op::If))?;
                self.free_all_registers();
                self.label(end)?;
            }
            _ => self.label(false_label)?,
        }
        Ok(None)
    }

    fn gen_loop(&mut self, node: &Node, table: &mut SymbolTable) -> Result<Option<Reg>, CodegenError> {
        let condition = node.left.as_ref().ok_or(CodegenError::MissingOperand(Op::Loop))?;
        let body_label = self.new_label();
        let break_label = self.new_label();

        self.label(body_label)?;
        self.tree(condition, table, Some(break_label), Some(Op::Loop))?;
        self.free_all_registers();
        if let Some(body) = &node.right {
            self.tree(body, table, None, Some(Op::Loop))?;
            self.free_all_registers();
        }
        self.jump(body_label)?;
        self.label(break_label)?;
        Ok(None)
    }

    /// Evaluate and place each argument of a call, right-to-left down the
    /// glue chain, then emit the call itself.
    fn gen_call(&mut self, node: &Node, table: &mut SymbolTable) -> Result<Reg, CodegenError> {
        let id = node.symbol.ok_or(CodegenError::MissingSymbol(Op::Call))?;
        let name = table.get(id).name.clone();
        let mut args = 0;
        let mut glue = node.left.as_deref();
        while let Some(chain) = glue {
            let position = match chain.payload {
                Payload::Position(position) => position,
                _ => return Err(CodegenError::BadPayload(Op::Glue)),
            };
            let argument = chain.right.as_ref().ok_or(CodegenError::MissingOperand(Op::Glue))?;
            let reg = self
                .tree(argument, table, None, Some(Op::Glue))?
                .ok_or(CodegenError::MissingOperand(Op::Glue))?;
            self.copy_argument(reg, position)?;
            if args == 0 {
                args = position;
            }
            self.free_all_registers();
            glue = chain.left.as_deref();
        }
        self.call(&name, args)
    }

    fn tree(
        &mut self,
        node: &Node,
        table: &mut SymbolTable,
        label: Option<usize>,
        parent: Option<Op>,
    ) -> Result<Option<Reg>, CodegenError> {
        match node.op {
            Op::If => return self.gen_if(node, table),
            Op::Loop => return self.gen_loop(node, table),
            Op::Glue => {
                if let Some(left) = &node.left {
                    self.tree(left, table, None, Some(Op::Glue))?;
                    self.free_all_registers();
                }
                if let Some(right) = &node.right {
                    self.tree(right, table, None, Some(Op::Glue))?;
                    self.free_all_registers();
                }
                return Ok(None);
            }
            Op::Call => return self.gen_call(node, table).map(Some),
            Op::Function => {
                let id = node.symbol.ok_or(CodegenError::MissingSymbol(Op::Function))?;
                self.function_preamble(table, id)?;
                if let Some(body) = &node.left {
                    self.tree(body, table, None, Some(Op::Function))?;
                }
                let function = table.get(id).clone();
                self.function_epilogue(&function)?;
                return Ok(None);
            }
            _ => {}
        }

        let left_reg = match &node.left {
            Some(left) => self.tree(left, table, None, Some(node.op))?,
            None => None,
        };
        let right_reg = match &node.right {
            Some(right) => self.tree(right, table, None, Some(node.op))?,
            None => None,
        };
        let operand = |reg: Option<Reg>| reg.ok_or(CodegenError::MissingOperand(node.op));

        match node.op {
            Op::Add => self.add(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::Subtract => self.subtract(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::Multiply => self.multiply(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::Divide => self.divide(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::BitAnd | Op::BoolAnd => {
                self.bitwise_and(operand(left_reg)?, operand(right_reg)?).map(Some)
            }
            Op::BitOr | Op::BoolOr => {
                self.bitwise_or(operand(left_reg)?, operand(right_reg)?).map(Some)
            }
            Op::BitXor => self.bitwise_xor(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::ShiftLeft => self.shift_left(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::ShiftRight => self.shift_right(operand(left_reg)?, operand(right_reg)?).map(Some),
            Op::Scale => {
                let reg = operand(left_reg)?;
                match node.payload {
                    // Power-of-two pointee sizes become shifts.
                    Payload::Scale(2) => self.shift_left_by(reg, 1).map(Some),
                    Payload::Scale(4) => self.shift_left_by(reg, 2).map(Some),
                    Payload::Scale(8) => self.shift_left_by(reg, 3).map(Some),
                    Payload::Scale(size) => {
                        let factor = self.load_integer(size as i64)?;
                        self.multiply(factor, reg).map(Some)
                    }
                    _ => Err(CodegenError::BadPayload(Op::Scale)),
                }
            }
            op if op.is_comparison() => {
                let left = operand(left_reg)?;
                let right = operand(right_reg)?;
                if matches!(parent, Some(Op::If) | Some(Op::Loop)) {
                    let label = label.ok_or(CodegenError::MissingJumpTarget(op))?;
                    self.compare_jump(op, left, right, label)?;
                    Ok(None)
                } else {
                    self.compare_set(op, left, right).map(Some)
                }
            }
            Op::Assign => {
                let value = operand(left_reg)?;
                let target = node.right.as_ref().ok_or(CodegenError::MissingOperand(Op::Assign))?;
                match target.op {
                    Op::Ident => {
                        let id = target.symbol.ok_or(CodegenError::MissingSymbol(Op::Ident))?;
                        let symbol = table.get(id).clone();
                        match symbol.storage {
                            Storage::Local | Storage::Param => self.store_local(&symbol, value).map(Some),
                            _ => self.store_global(&symbol, value).map(Some),
                        }
                    }
                    Op::Dereference => {
                        let pointer = operand(right_reg)?;
                        self.store_deref(value, pointer, target.ty).map(Some)
                    }
                    other => Err(CodegenError::BadAssignmentTarget(other)),
                }
            }
            Op::Widen => Ok(left_reg),
            Op::Dereference => {
                let reg = operand(left_reg)?;
                if node.rvalue {
                    self.load_deref(reg, node.ty).map(Some)
                } else {
                    Ok(Some(reg))
                }
            }
            Op::Address => {
                let id = node.symbol.ok_or(CodegenError::MissingSymbol(Op::Address))?;
                let symbol = table.get(id).clone();
                self.address_of(&symbol).map(Some)
            }
            Op::Ident => {
                if node.rvalue || parent == Some(Op::Dereference) {
                    let id = node.symbol.ok_or(CodegenError::MissingSymbol(Op::Ident))?;
                    let symbol = table.get(id).clone();
                    self.load_symbol(&symbol, None).map(Some)
                } else {
                    Ok(None)
                }
            }
            Op::PreIncrement | Op::PreDecrement | Op::PostIncrement | Op::PostDecrement => {
                let id = node.symbol.ok_or(CodegenError::MissingSymbol(node.op))?;
                let symbol = table.get(id).clone();
                self.load_symbol(&symbol, Some(node.op)).map(Some)
            }
            Op::IntLiteral => match node.payload {
                Payload::Int(value) => self.load_integer(value).map(Some),
                _ => Err(CodegenError::BadPayload(Op::IntLiteral)),
            },
            Op::StrLiteral => match node.payload {
                Payload::StringLabel(string) => self.load_string(string).map(Some),
                _ => Err(CodegenError::BadPayload(Op::StrLiteral)),
            },
            Op::Return => {
                let id = node.symbol.ok_or(CodegenError::MissingSymbol(Op::Return))?;
                let function = table.get(id).clone();
                self.function_return(&function, operand(left_reg)?)?;
                Ok(None)
            }
            Op::Print => {
                self.print(operand(left_reg)?)?;
                self.free_all_registers();
                Ok(None)
            }
            Op::BoolNot => self.boolean_not(operand(left_reg)?).map(Some),
            Op::BitNot => self.invert(operand(left_reg)?).map(Some),
            Op::Negate => self.negate(operand(left_reg)?).map(Some),
            Op::BoolConvert => self.boolean_convert(operand(left_reg)?, parent, label).map(Some),
            other => Err(CodegenError::UnexpectedNode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen() -> CodeGen<Vec<u8>> {
        CodeGen::new(Vec::new())
    }

    #[test]
    fn register_pool_holds_exactly_four() {
        let mut gen = gen();
        let regs: Vec<Reg> = (0..4).map(|_| gen.allocate_register().unwrap()).collect();
        assert!(matches!(gen.allocate_register(), Err(CodegenError::OutOfRegisters)));
        gen.free_register(regs[2]).unwrap();
        assert_eq!(gen.allocate_register().unwrap(), regs[2]);
    }

    #[test]
    fn double_free_is_an_error() {
        let mut gen = gen();
        let reg = gen.allocate_register().unwrap();
        gen.free_register(reg).unwrap();
        assert!(matches!(
            gen.free_register(reg),
            Err(CodegenError::FreeUnusedRegister(_))
        ));
    }

    #[test]
    fn bulk_clear_releases_everything() {
        let mut gen = gen();
        for _ in 0..4 {
            gen.allocate_register().unwrap();
        }
        gen.free_all_registers();
        for _ in 0..4 {
            gen.allocate_register().unwrap();
        }
    }

    #[test]
    fn labels_are_monotonic_from_one() {
        let mut gen = gen();
        assert_eq!(gen.new_label(), 1);
        assert_eq!(gen.new_label(), 2);
        assert_eq!(gen.new_label(), 3);
    }

    #[test]
    fn member_alignment() {
        assert_eq!(align_memory(Type::CHAR, 1).unwrap(), 1);
        assert_eq!(align_memory(Type::INT, 1).unwrap(), 4);
        assert_eq!(align_memory(Type::LONG, 5).unwrap(), 8);
        assert_eq!(align_memory(Type::INT, 8).unwrap(), 8);
        assert!(align_memory(Type::VOID, 0).is_err());
    }

    #[test]
    fn string_literals_are_labelled_byte_runs() {
        let mut gen = gen();
        let label = gen.new_string("ok").unwrap();
        let out = String::from_utf8(gen.into_inner()).unwrap();
        assert!(out.contains(&format!("L{}:", label)));
        assert!(out.contains("\t.byte\t111"));
        assert!(out.contains("\t.byte\t107"));
        assert!(out.ends_with("\t.byte\t0\n"));
    }
}
