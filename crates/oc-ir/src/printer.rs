//! Textual form of the IR

use std::fmt::{self, Write};

use crate::inst::{Callee, Inst, Terminator, Value};
use crate::module::{Function, Module};

fn v(value: &Value) -> String {
    format!("%{}", value.0)
}

fn write_inst(out: &mut String, module: Option<&Module>, inst: &Inst) -> fmt::Result {
    match inst {
        Inst::Context => write!(out, "context"),
        Inst::Const { ty, bits } => write!(out, "const {} 0x{:x}", ty, bits),
        Inst::Undef(ty) => write!(out, "undef {}", ty),
        Inst::Unary { op, arg } => write!(out, "{:?} {}", op, v(arg)),
        Inst::Binary { op, lhs, rhs } => write!(out, "{:?} {}, {}", op, v(lhs), v(rhs)),
        Inst::Fma { a, b, c } => write!(out, "fma {}, {}, {}", v(a), v(b), v(c)),
        Inst::Icmp { pred, lhs, rhs } => write!(out, "icmp {:?} {}, {}", pred, v(lhs), v(rhs)),
        Inst::Fcmp { pred, lhs, rhs } => write!(out, "fcmp {:?} {}, {}", pred, v(lhs), v(rhs)),
        Inst::Select { cond, then, els } => {
            write!(out, "select {}, {}, {}", v(cond), v(then), v(els))
        }
        Inst::Cast { op, arg, to } => write!(out, "{:?} {} to {}", op, v(arg), to),
        Inst::ExtractElement { vec, lane } => write!(out, "extractelement {}, {}", v(vec), lane),
        Inst::InsertElement { vec, elem, lane } => {
            write!(out, "insertelement {}, {}, {}", v(vec), v(elem), lane)
        }
        Inst::Shuffle { lhs, rhs, mask } => {
            write!(out, "shuffle {}, {}, {:?}", v(lhs), v(rhs), mask)
        }
        Inst::Load { addr, ty, align } => write!(out, "load {}, [{}] align {}", ty, v(addr), align),
        Inst::Store { addr, value, align } => {
            write!(out, "store {}, [{}] align {}", v(value), v(addr), align)
        }
        Inst::ContextLoad { slot, ty } => write!(out, "ctx.load {} #{}", ty, slot),
        Inst::ContextStore { slot, value } => write!(out, "ctx.store #{}, {}", slot, v(value)),
        Inst::Call {
            callee,
            args,
            ret,
            tail,
        } => {
            if *tail {
                write!(out, "tail ")?;
            }
            write!(out, "call {} ", ret)?;
            match callee {
                Callee::Function(id) => match module {
                    Some(m) => write!(out, "@{}", m.function(*id).name)?,
                    None => write!(out, "@fn{}", id.0)?,
                },
                Callee::External(name) => write!(out, "@{}", name)?,
                Callee::Indirect(target) => write!(out, "indirect {}", v(target))?,
            }
            let args: Vec<String> = args.iter().map(v).collect();
            write!(out, "({})", args.join(", "))
        }
    }
}

fn write_term(out: &mut String, func: &Function, term: &Terminator) -> fmt::Result {
    let name = |b: &crate::inst::Block| func.block(*b).name.clone();
    match term {
        Terminator::Br(target) => write!(out, "br {}", name(target)),
        Terminator::CondBr {
            cond,
            then,
            els,
            hint,
        } => {
            write!(out, "condbr {}, {}, {}", v(cond), name(then), name(els))?;
            if let Some(hint) = hint {
                write!(out, " !{:?}", hint)?;
            }
            Ok(())
        }
        Terminator::Switch {
            value,
            default,
            cases,
        } => {
            write!(out, "switch {}, default {} [", v(value), name(default))?;
            for (i, (case, block)) in cases.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write!(out, "0x{:x} -> {}", case, name(block))?;
            }
            write!(out, "]")
        }
        Terminator::Return => write!(out, "ret"),
        Terminator::Unreachable => write!(out, "unreachable"),
    }
}

/// Render one function; `module` resolves callee names when given
pub fn function_to_string(func: &Function, module: Option<&Module>) -> String {
    let mut out = String::new();
    let _ = write_function(&mut out, func, module);
    out
}

fn write_function(out: &mut String, func: &Function, module: Option<&Module>) -> fmt::Result {
    if func.is_declaration() {
        return writeln!(out, "declare {} @{}", func.sig, func.name);
    }

    writeln!(out, "define {} @{} {{", func.sig, func.name)?;
    for data in &func.blocks {
        writeln!(out, "{}:", data.name)?;
        for value in &data.insts {
            let vd = &func.values[value.index()];
            write!(out, "    ")?;
            if vd.ty != crate::types::Type::VOID {
                write!(out, "{} = ", v(value))?;
            }
            write_inst(out, module, &vd.inst)?;
            writeln!(out)?;
        }
        write!(out, "    ")?;
        match &data.term {
            Some(term) => write_term(out, func, term)?,
            None => write!(out, "<unterminated>")?,
        }
        writeln!(out)?;
    }
    writeln!(out, "}}")
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&function_to_string(self, None))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (_, func) in self.functions() {
            f.write_str(&function_to_string(func, Some(self)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::emitter::{CallBuilder, CodeEmitter};
    use crate::module::Module;
    use crate::types::Type;

    #[test]
    fn test_print_function() {
        let mut module = Module::new("print");
        let id = module.declare_function(0x100, None);
        let mut b = module.builder(id);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        let c = b.constant(Type::I64, 42);
        let ctx = b.context_arg();
        b.call(CallBuilder::external("__trap").arg(ctx).arg(c));
        b.ret();

        let text = module.to_string();
        assert!(text.contains("define void (ptr) @__ppu_00000100"));
        assert!(text.contains("%1 = const i64 0x2a"));
        assert!(text.contains("call void @__trap(%0, %1)"));
        assert!(text.contains("    ret"));
    }
}
