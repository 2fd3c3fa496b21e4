//! Test scaffolding: translate raw instruction words at [`BASE`] and run them

use oc_core::config::TranslatorConfig;
use oc_ir::interp::{GuestMemory, Machine};
use oc_ir::Module;

use crate::decoder::PpuDecoder;
use crate::linkage::FunctionTable;
use crate::thread::PpuThread;
use crate::translator::{translate_function, LogDiagnostics, TranslationUnit};

pub const BASE: u64 = 0x1000;
pub const BLR: u32 = 0x4E80_0020;

/// Translate `words` (a trailing `blr` is appended) into a fresh module
pub fn translate(words: &[u32], config: &TranslatorConfig) -> Module {
    let code: Vec<u8> = words
        .iter()
        .chain(std::iter::once(&BLR))
        .flat_map(|w| w.to_be_bytes())
        .collect();
    let unit = TranslationUnit::new(BASE, PpuDecoder::decode_range(&code, BASE));
    let mut module = Module::new("test");
    let table = FunctionTable::new();
    translate_function(&mut module, &unit, &table, config, &LogDiagnostics::new()).unwrap();
    module
}

pub fn run_with(
    words: &[u32],
    thread: PpuThread,
    memory: GuestMemory,
    config: &TranslatorConfig,
) -> (PpuThread, GuestMemory) {
    let module = translate(words, config);
    let mut machine = Machine::new(&module, thread);
    machine.memory = memory;
    machine.run(BASE).unwrap();
    (machine.host, machine.memory)
}

pub fn run_mem(words: &[u32], thread: PpuThread, memory: GuestMemory) -> (PpuThread, GuestMemory) {
    run_with(words, thread, memory, &TranslatorConfig::default())
}

pub fn run(words: &[u32], thread: PpuThread) -> PpuThread {
    run_mem(words, thread, GuestMemory::new()).0
}

/// Thread with the given GPRs preset
pub fn with_gprs(values: &[(usize, u64)]) -> PpuThread {
    let mut thread = PpuThread::new(0);
    for (r, v) in values {
        thread.set_gpr(*r, *v);
    }
    thread
}
