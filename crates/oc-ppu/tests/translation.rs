//! Whole-function translation: control flow, linkage and flag behaviour
//! observed through the reference evaluator.

use oc_core::config::{IndirectMissPolicy, TranslatorConfig};
use oc_ir::interp::Machine;
use oc_ir::Module;
use oc_ppu::{
    translate_function, translate_parallel, ContextField, FunctionTable, LogDiagnostics,
    PpuDecoder, PpuThread, TranslationError, TranslationUnit,
};

const BLR: u32 = 0x4E80_0020;

fn unit(start: u64, words: &[u32]) -> TranslationUnit {
    let code: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    TranslationUnit::new(start, PpuDecoder::decode_range(&code, start))
}

fn translate(units: &[TranslationUnit], config: &TranslatorConfig) -> Module {
    let mut module = Module::new("t");
    let table = FunctionTable::new();
    let diag = LogDiagnostics::new();
    for unit in units {
        translate_function(&mut module, unit, &table, config, &diag).unwrap();
    }
    module
}

fn execute(module: &Module, entry: u64, thread: PpuThread) -> PpuThread {
    let mut machine = Machine::new(module, thread);
    machine.run(entry).unwrap();
    machine.host
}

#[test]
fn test_add_immediate_twice() {
    // addi r3,r3,5 ; addi r3,r3,5 ; blr
    let module = translate(
        &[unit(0x1000, &[0x3863_0005, 0x3863_0005, BLR])],
        &TranslatorConfig::default(),
    );
    let mut thread = PpuThread::new(0);
    thread.set_gpr(3, 10);
    thread.ctx.xer_so = true;
    thread.ctx.set_cr_field(0, 0b0100);

    let thread = execute(&module, 0x1000, thread);
    assert_eq!(thread.gpr(3), 20);
    assert_eq!(thread.ctx.cr_word(), 0x4000_0000);
    assert!(thread.ctx.xer_so);
    assert!(!thread.ctx.xer_ov);
    assert!(!thread.ctx.xer_ca);
}

#[test]
fn test_compare_immediate_equal() {
    // cmpwi cr2,r3,5 ; blr
    let module = translate(&[unit(0x1000, &[0x2D03_0005, BLR])], &TranslatorConfig::default());

    let thread = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(3, 5));
    assert_eq!(thread.get_cr_field(2), 0b0010);

    let mut thread = PpuThread::new(0).tap_gpr(3, 5);
    thread.ctx.xer_so = true;
    let thread = execute(&module, 0x1000, thread);
    assert_eq!(thread.get_cr_field(2), 0b0011);
}

#[test]
fn test_conditional_branch_has_two_successors() {
    // 0x1000: beq 0x1008 ; 0x1004: li r3,1 ; 0x1008: blr
    let module = translate(
        &[unit(0x1000, &[0x4182_0008, 0x3860_0001, BLR])],
        &TranslatorConfig::default(),
    );
    let func = module.function(module.function_at(0x1000).unwrap());
    assert!(func.verify().is_ok());

    let branch = func.block_by_name("loc_00001000").unwrap();
    let fallthrough = func.block_by_name("loc_00001004").unwrap();
    let taken = func.block_by_name("loc_00001008").unwrap();

    let mut successors = func.successors(branch);
    successors.sort();
    let mut expected = vec![fallthrough, taken];
    expected.sort();
    assert_eq!(successors, expected);

    for block in [fallthrough, taken] {
        let from_branch = func
            .predecessors(block)
            .into_iter()
            .filter(|p| *p == branch)
            .count();
        assert_eq!(from_branch, 1);
    }
}

#[test]
fn test_conditional_branch_executes_both_paths() {
    // cmpwi r3,0 ; beq +8 ; li r4,1 ; blr
    let module = translate(
        &[unit(0x1000, &[0x2C03_0000, 0x4182_0008, 0x3880_0001, BLR])],
        &TranslatorConfig::default(),
    );
    let taken = execute(&module, 0x1000, PpuThread::new(0));
    assert_eq!(taken.gpr(4), 0);
    let fallthrough = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(3, 9));
    assert_eq!(fallthrough.gpr(4), 1);
}

#[test]
fn test_indirect_branch_outside_range_exits() {
    // mtctr r5 ; bctr ; li r3,1 ; blr
    let words = [0x7CA9_03A6, 0x4E80_0420, 0x3860_0001, BLR];
    let module = translate(&[unit(0x1000, &words)], &TranslatorConfig::default());

    let thread = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(5, 0x9000));
    assert_eq!(thread.gpr(3), 0);
    assert_eq!(thread.ctx.cia, 0x9000);
    assert!(thread.traps.is_empty());

    // inside the function the resolver dispatches to the block
    let thread = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(5, 0x1008));
    assert_eq!(thread.gpr(3), 1);

    // unaligned targets inside the range have no block
    let thread = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(5, 0x1006));
    assert_eq!(thread.gpr(3), 0);
}

#[test]
fn test_indirect_miss_trap_policy() {
    let config = TranslatorConfig {
        indirect_miss: IndirectMissPolicy::Trap,
        ..TranslatorConfig::default()
    };
    let module = translate(&[unit(0x1000, &[0x7CA9_03A6, 0x4E80_0420, BLR])], &config);
    let thread = execute(&module, 0x1000, PpuThread::new(0).tap_gpr(5, 0x9000));
    assert_eq!(thread.traps, vec![0x9000]);
}

/// Caller at 0x1000 calls 0x2000, which returns 42 in r3 and scribbles r5
fn call_program() -> [TranslationUnit; 2] {
    let caller = unit(
        0x1000,
        &[
            0x7FE8_02A6, // mflr r31
            0x38A0_0007, // li r5,7
            0x4800_0FF9, // bl 0x2000
            0x7C66_1B78, // mr r6,r3
            0x7CA7_2B78, // mr r7,r5
            0x7FE8_03A6, // mtlr r31
            BLR,
        ],
    );
    let callee = unit(0x2000, &[0x3860_002A, 0x38A0_0009, BLR]);
    [caller, callee]
}

#[test]
fn test_call_invalidates_volatile_registers() {
    let module = translate(&call_program(), &TranslatorConfig::default());
    let thread = execute(&module, 0x1000, PpuThread::new(0));

    // return value survives, scratch registers do not
    assert_eq!(thread.gpr(6), 42);
    assert!(thread.is_undefined(ContextField::Gpr(7)));
    assert!(!thread.is_undefined(ContextField::Gpr(6)));
    // r31 carried the caller's return address across the call
    assert_eq!(thread.ctx.lr, 0);
    assert!(thread.unresolved_calls.is_empty());
}

#[test]
fn test_parallel_translation_links_calls() {
    let table = FunctionTable::new();
    let diag = LogDiagnostics::new();
    let units = call_program();
    let (module, failures) = translate_parallel(
        "linked",
        &units,
        &table,
        &TranslatorConfig::default(),
        &diag,
        2,
    );
    assert!(failures.is_empty());
    assert!(table.is_defined(0x1000));
    assert!(table.is_defined(0x2000));

    let mut defined = module.defined_addresses();
    defined.sort();
    assert_eq!(defined, vec![0x1000, 0x2000]);

    let thread = execute(&module, 0x1000, PpuThread::new(0));
    assert_eq!(thread.gpr(6), 42);
}

#[test]
fn test_failed_function_does_not_stop_the_session() {
    let table = FunctionTable::new();
    let diag = LogDiagnostics::new();
    let units = [
        unit(0x1000, &[0x3860_0001, BLR]),
        unit(0x2000, &[0x0000_0000, BLR]),
        unit(0x3000, &[0x3860_0003, BLR]),
    ];
    let (module, failures) = translate_parallel(
        "partial",
        &units,
        &table,
        &TranslatorConfig::default(),
        &diag,
        3,
    );

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 0x2000);
    assert!(matches!(
        failures[0].1,
        TranslationError::UnknownOpcode { addr: 0x2000, .. }
    ));
    assert_eq!(diag.messages().len(), 1);

    let thread = execute(&module, 0x3000, PpuThread::new(0));
    assert_eq!(thread.gpr(3), 3);
}

#[test]
fn test_overflow_summary_stays_set() {
    // addo r3,r4,r4 ; addo r3,r5,r5 ; blr
    let module = translate(
        &[unit(0x1000, &[0x7C64_2614, 0x7C65_2E14, BLR])],
        &TranslatorConfig::default(),
    );
    let mut thread = PpuThread::new(0);
    thread.set_gpr(4, 0x7FFF_FFFF_FFFF_FFFF);
    thread.set_gpr(5, 1);
    let thread = execute(&module, 0x1000, thread);
    assert_eq!(thread.gpr(3), 2);
    assert!(!thread.ctx.xer_ov);
    assert!(thread.ctx.xer_so);
}

#[test]
fn test_printed_module_names_guest_blocks() {
    let module = translate(
        &[unit(0x1000, &[0x4182_0008, 0x3860_0001, BLR])],
        &TranslatorConfig::default(),
    );
    let text = module.to_string();
    assert!(text.contains("loc_00001004"));
    assert!(text.contains("loc_00001008"));
}

trait TapGpr {
    fn tap_gpr(self, index: usize, value: u64) -> Self;
}

impl TapGpr for PpuThread {
    fn tap_gpr(mut self, index: usize, value: u64) -> Self {
        self.set_gpr(index, value);
        self
    }
}
