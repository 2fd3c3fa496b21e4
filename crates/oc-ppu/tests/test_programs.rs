//! Test program execution framework for PPU translation validation
//!
//! A test program is a small code image with initial and expected register
//! values. It is decoded, translated into IR and run in the reference
//! evaluator, then the expected registers are compared.

use oc_core::config::TranslatorConfig;
use oc_ir::interp::{GuestMemory, Machine};
use oc_ir::Module;
use oc_ppu::{translate_function, FunctionTable, LogDiagnostics, PpuDecoder, PpuThread, TranslationUnit};

/// Test program format
///
/// ```text
/// Offset | Size | Description
/// -------|------|------------
/// 0x0000 | 4    | Magic number: "PPUT" (0x50505554)
/// 0x0004 | 4    | Version: 1
/// 0x0008 | 4    | Entry point address
/// 0x000C | 4    | Code size
/// 0x0010 | 4    | Initial register count
/// 0x0014 | 4    | Expected register count
/// 0x0018 | ...  | Initial register values (reg_num:u8, value:u64) * count
/// ...    | ...  | Code bytes
/// ...    | ...  | Expected register values (reg_num:u8, value:u64) * count
/// ```
const TEST_PROGRAM_MAGIC: u32 = 0x50505554; // "PPUT"
const TEST_PROGRAM_VERSION: u32 = 1;

/// blr, appended so every program returns to the caller
const BLR: [u8; 4] = [0x4E, 0x80, 0x00, 0x20];

#[derive(Debug, Clone)]
pub struct TestProgram {
    pub entry_point: u32,
    pub code: Vec<u8>,
    /// Initial register states (register number, value)
    pub initial_regs: Vec<(u8, u64)>,
    /// Expected register states after execution (register number, value)
    pub expected_regs: Vec<(u8, u64)>,
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], String> {
        let end = self.offset + len;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or_else(|| format!("Unexpected end of program ({})", what))?;
        self.offset = end;
        Ok(bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32, String> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn regs(&mut self, count: usize, what: &str) -> Result<Vec<(u8, u64)>, String> {
        (0..count)
            .map(|_| {
                let bytes = self.take(9, what)?;
                let mut value = [0u8; 8];
                value.copy_from_slice(&bytes[1..]);
                Ok((bytes[0], u64::from_be_bytes(value)))
            })
            .collect()
    }
}

impl TestProgram {
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 0x18 {
            return Err("Test program too small".to_string());
        }
        let mut reader = Reader { data, offset: 0 };

        let magic = reader.u32("header")?;
        if magic != TEST_PROGRAM_MAGIC {
            return Err(format!("Invalid magic: 0x{:08X}", magic));
        }
        let version = reader.u32("header")?;
        if version != TEST_PROGRAM_VERSION {
            return Err(format!("Unsupported version: {}", version));
        }

        let entry_point = reader.u32("header")?;
        let code_size = reader.u32("header")? as usize;
        let initial_count = reader.u32("header")? as usize;
        let expected_count = reader.u32("header")? as usize;

        let initial_regs = reader.regs(initial_count, "initial regs")?;
        let code = reader.take(code_size, "code")?.to_vec();
        let expected_regs = reader.regs(expected_count, "expected regs")?;

        Ok(TestProgram {
            entry_point,
            code,
            initial_regs,
            expected_regs,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&TEST_PROGRAM_MAGIC.to_be_bytes());
        out.extend_from_slice(&TEST_PROGRAM_VERSION.to_be_bytes());
        out.extend_from_slice(&self.entry_point.to_be_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.initial_regs.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.expected_regs.len() as u32).to_be_bytes());
        for (reg, value) in &self.initial_regs {
            out.push(*reg);
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&self.code);
        for (reg, value) in &self.expected_regs {
            out.push(*reg);
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }

    /// Translate the program into a fresh module
    pub fn translate(&self, config: &TranslatorConfig) -> Result<Module, String> {
        let mut image = self.code.clone();
        image.extend_from_slice(&BLR);
        let entry = self.entry_point as u64;
        let unit = TranslationUnit::new(entry, PpuDecoder::decode_range(&image, entry));

        let mut module = Module::new("test_program");
        let table = FunctionTable::new();
        translate_function(&mut module, &unit, &table, config, &LogDiagnostics::new())
            .map_err(|e| format!("Translation failed: {}", e))?;
        Ok(module)
    }

    /// Translate, execute and verify results
    pub fn execute_and_verify(&self) -> Result<PpuThread, String> {
        let module = self.translate(&TranslatorConfig::default())?;

        let mut thread = PpuThread::new(0);
        for (reg, value) in &self.initial_regs {
            thread.set_gpr(*reg as usize, *value);
        }

        let mut machine = Machine::new(&module, thread);
        machine.memory = GuestMemory::new();
        machine
            .run(self.entry_point as u64)
            .map_err(|e| format!("Execution failed: {}", e))?;
        let thread = machine.host;

        for (reg, expected) in &self.expected_regs {
            let actual = thread.gpr(*reg as usize);
            if actual != *expected {
                return Err(format!(
                    "Register r{} mismatch: expected 0x{:016X}, got 0x{:016X}",
                    reg, expected, actual
                ));
            }
        }
        Ok(thread)
    }
}

fn code(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

#[test]
fn test_program_format() {
    let program = TestProgram {
        entry_point: 0x2000_0000,
        code: code(&[0x3860_002A]),
        initial_regs: vec![(4, 7)],
        expected_regs: vec![(3, 42)],
    };

    let parsed = TestProgram::from_bytes(&program.to_bytes()).unwrap();
    assert_eq!(parsed.entry_point, 0x2000_0000);
    assert_eq!(parsed.code.len(), 4);
    assert_eq!(parsed.initial_regs, vec![(4, 7)]);
    assert_eq!(parsed.expected_regs, vec![(3, 42)]);
}

#[test]
fn test_truncated_program_rejected() {
    let program = TestProgram {
        entry_point: 0x1000,
        code: code(&[0x3860_002A]),
        initial_regs: vec![],
        expected_regs: vec![(3, 42)],
    };
    let bytes = program.to_bytes();
    let err = TestProgram::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
    assert!(err.contains("expected regs"));

    let mut bad_magic = bytes.clone();
    bad_magic[0] = 0;
    assert!(TestProgram::from_bytes(&bad_magic).is_err());
}

#[test]
fn test_simple_add_program() {
    let program = TestProgram {
        entry_point: 0x2000_0000,
        // li r3,42
        code: code(&[0x3860_002A]),
        initial_regs: vec![],
        expected_regs: vec![(3, 42)],
    };
    program.execute_and_verify().unwrap();
}

#[test]
fn test_add_with_registers() {
    let program = TestProgram {
        entry_point: 0x2000_0000,
        // li r4,10 ; li r5,20 ; add r3,r4,r5
        code: code(&[0x3880_000A, 0x38A0_0014, 0x7C64_2A14]),
        initial_regs: vec![],
        expected_regs: vec![(3, 30), (4, 10), (5, 20)],
    };
    program.execute_and_verify().unwrap();
}

#[test]
fn test_counted_loop() {
    let program = TestProgram {
        entry_point: 0x1_0000,
        // li r3,0 ; mtctr r4 ; loop: addi r3,r3,3 ; bdnz loop
        code: code(&[0x3860_0000, 0x7C89_03A6, 0x3863_0003, 0x4200_FFFC]),
        initial_regs: vec![(4, 5)],
        expected_regs: vec![(3, 15)],
    };
    let thread = program.execute_and_verify().unwrap();
    assert_eq!(thread.ctx.ctr, 0);
}

#[test]
fn test_load_store() {
    let program = TestProgram {
        entry_point: 0x2000_0000,
        code: code(&[
            0x3CA0_2000, // lis r5,0x2000
            0x60A5_1000, // ori r5,r5,0x1000
            0x3880_1234, // li r4,0x1234
            0x9085_0000, // stw r4,0(r5)
            0x8065_0000, // lwz r3,0(r5)
        ]),
        initial_regs: vec![],
        expected_regs: vec![(3, 0x1234), (4, 0x1234)],
    };
    program.execute_and_verify().unwrap();
}

#[test]
fn test_mismatch_is_reported() {
    let program = TestProgram {
        entry_point: 0x1000,
        code: code(&[0x3860_002A]),
        initial_regs: vec![],
        expected_regs: vec![(3, 41)],
    };
    let err = program.execute_and_verify().unwrap_err();
    assert!(err.contains("r3 mismatch"));
}

#[test]
fn test_unknown_word_fails_translation() {
    let program = TestProgram {
        entry_point: 0x1000,
        code: code(&[0x3860_002A, 0x0000_0000]),
        initial_regs: vec![],
        expected_regs: vec![],
    };
    let err = program.translate(&TranslatorConfig::default()).unwrap_err();
    assert!(err.contains("Translation failed"));
}
