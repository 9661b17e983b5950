//! Pretty printing for ownership SSA functions.
//!
//! The textual form is for debugging and snapshot tests; there is no
//! parser for it.

use std::fmt::Write;

use crate::function::{BlockId, Function, InstId, Module, ValueDef, ValueId};
use crate::inst::InstKind;
use crate::ownership::OwnershipKind;

/// Pretty print every function of a module
pub fn pretty_print_module(module: &Module) -> String {
    let mut out = String::new();
    for (i, func) in module.functions().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&pretty_print_function(func));
    }
    out
}

/// Pretty print a single function
pub fn pretty_print_function(func: &Function) -> String {
    let mut out = String::new();
    let mut printer = PrettyPrinter::new(&mut out, func);
    printer.print_function();
    out
}

/// Pretty print one instruction, without indentation or trailing newline
pub fn pretty_print_instruction(func: &Function, inst: InstId) -> String {
    let mut out = String::new();
    let mut printer = PrettyPrinter::new(&mut out, func);
    printer.print_instruction(inst);
    out
}

struct PrettyPrinter<'a> {
    out: &'a mut String,
    func: &'a Function,
    indent: usize,
}

impl<'a> PrettyPrinter<'a> {
    fn new(out: &'a mut String, func: &'a Function) -> Self {
        Self {
            out,
            func,
            indent: 0,
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push(' ');
        }
    }

    fn print_function(&mut self) {
        let func = self.func;
        let _ = writeln!(self.out, "sil [{}] @{} {{", func.stage(), func.name());
        for block in func.blocks() {
            self.print_block_header(block.id());
            self.indent += 2;
            for &inst in block.insts() {
                self.write_indent();
                self.print_instruction(inst);
                self.out.push('\n');
            }
            self.indent -= 2;
        }
        self.out.push_str("}\n");
    }

    fn print_block_header(&mut self, id: BlockId) {
        let func = self.func;
        let args: Vec<String> = func
            .block(id)
            .args()
            .iter()
            .map(|&arg| {
                let ownership = match func.value_def(arg) {
                    ValueDef::Argument { ownership, .. } => ownership,
                    ValueDef::Result { .. } => OwnershipKind::None,
                };
                format!("{} : {} {}", arg, ownership, func.value_type(arg))
            })
            .collect();
        if args.is_empty() {
            let _ = writeln!(self.out, "{}:", id);
        } else {
            let _ = writeln!(self.out, "{}({}):", id, args.join(", "));
        }
    }

    fn print_instruction(&mut self, id: InstId) {
        let func = self.func;
        let data = func.inst(id);
        match data.results() {
            [] => {}
            [single] => {
                let _ = write!(self.out, "{} = ", single);
            }
            many => {
                let _ = write!(self.out, "({}) = ", list(many));
            }
        }
        self.out.push_str(data.kind().name());
        let detail = self.detail(data.kind());
        if !detail.is_empty() {
            self.out.push(' ');
            self.out.push_str(&detail);
        }
        if let [single] = data.results() {
            let _ = write!(self.out, " : {}", func.value_type(*single));
        }
        if let Some(OwnershipKind::None) = data.kind().forwarding_ownership() {
            // Only noted when the forwarded operand still has ownership.
            let owned_operand = data
                .kind()
                .operands()
                .first()
                .is_some_and(|&op| func.ownership_kind(op) != OwnershipKind::None);
            if owned_operand {
                self.out.push_str(", forwarding: @none");
            }
        }
    }

    fn detail(&self, kind: &InstKind) -> String {
        let v = |id: &ValueId| id.to_string();
        match kind {
            InstKind::IntegerLiteral { value } => value.to_string(),
            InstKind::FunctionRef { name } => format!("@{}", name),
            InstKind::ClassMethod { operand, method } => format!("{}, #{}", operand, method),
            InstKind::Apply { callee, args } => format!("{}({})", callee, list(args)),
            InstKind::AllocStack { name } => match name {
                Some(name) => format!("[var_decl] \"{}\"", name),
                None => String::new(),
            },
            InstKind::Load { address, qualifier } => format!("{}{}", qualifier, address),
            InstKind::Store {
                src,
                dest,
                qualifier,
            } => format!("{} to {}{}", src, qualifier, dest),
            InstKind::StoreBorrow { src, dest } => format!("{} to {}", src, dest),
            InstKind::UncheckedOwnershipConversion { operand, to } => {
                format!("{}, {} to {}", operand, self.func.ownership_kind(*operand), to)
            }
            InstKind::Enum { case, payload, .. } => match payload {
                Some(payload) => format!("#{}, {}", case, payload),
                None => format!("#{}", case),
            },
            InstKind::StructExtract { operand, field, .. }
            | InstKind::RefElementAddr { operand, field } => format!("{}, #{}", operand, field),
            InstKind::StructElementAddr { address, field } => format!("{}, #{}", address, field),
            InstKind::TupleExtract { operand, index, .. } => format!("{}, {}", operand, index),
            InstKind::TupleElementAddr { address, index } => format!("{}, {}", address, index),
            InstKind::UncheckedEnumData { operand, case, .. } => format!("{}, #{}", operand, case),
            InstKind::UncheckedTakeEnumDataAddr { address, case } => {
                format!("{}, #{}", address, case)
            }
            InstKind::SelectEnum {
                operand,
                cases,
                default,
            } => {
                let mut parts = vec![operand.to_string()];
                parts.extend(cases.iter().map(|(case, val)| format!("case #{}: {}", case, val)));
                if let Some(default) = default {
                    parts.push(format!("default {}", default));
                }
                parts.join(", ")
            }
            InstKind::SelectValue {
                operand,
                cases,
                default,
            } => {
                let mut parts = vec![operand.to_string()];
                parts.extend(cases.iter().map(|(case, val)| format!("case {}: {}", case, val)));
                if let Some(default) = default {
                    parts.push(format!("default {}", default));
                }
                parts.join(", ")
            }
            InstKind::MarkDependence { value, base, .. } => format!("{} on {}", value, base),
            InstKind::DebugValue { operand, name } => {
                format!("{}, let, name \"{}\"", operand, name)
            }
            InstKind::Branch { dest, args } => branch_target(*dest, args),
            InstKind::CondBranch {
                condition,
                true_dest,
                true_args,
                false_dest,
                false_args,
            } => format!(
                "{}, {}, {}",
                condition,
                branch_target(*true_dest, true_args),
                branch_target(*false_dest, false_args)
            ),
            InstKind::SwitchEnum {
                operand,
                cases,
                default,
                ..
            } => {
                let mut parts = vec![operand.to_string()];
                parts.extend(cases.iter().map(|(case, bb)| format!("case #{}: {}", case, bb)));
                if let Some(default) = default {
                    parts.push(format!("default {}", default));
                }
                parts.join(", ")
            }
            InstKind::CheckedCastBranch {
                operand,
                success,
                failure,
                ..
            } => format!("{}, {}, {}", operand, success, failure),
            InstKind::Unreachable => String::new(),
            other => other.operands().iter().map(v).collect::<Vec<_>>().join(", "),
        }
    }
}

fn list(values: &[ValueId]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn branch_target(dest: BlockId, args: &[ValueId]) -> String {
    if args.is_empty() {
        dest.to_string()
    } else {
        format!("{}({})", dest, list(args))
    }
}
