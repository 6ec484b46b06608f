//! Recording platform for host tests

use super::Platform;
use crate::tasking::RegisterSnapshot;

/// Captures text, simulates a register file and remembers every restore
pub struct MockPlatform {
    pub output: String,
    /// What the next capture reads
    pub registers: RegisterSnapshot,
    pub restored: Vec<RegisterSnapshot>,
    pub captures: usize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            registers: RegisterSnapshot::empty(),
            restored: Vec::new(),
            captures: 0,
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        self.output.lines().collect()
    }
}

impl Platform for MockPlatform {
    fn write_text(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn capture_registers(&mut self) -> RegisterSnapshot {
        self.captures += 1;
        self.registers
    }

    fn restore_registers(&mut self, snapshot: &RegisterSnapshot) {
        self.registers = *snapshot;
        self.restored.push(*snapshot);
    }

    fn halt(&mut self) -> ! {
        panic!("platform halted: {}", self.output.lines().last().unwrap_or(""));
    }
}
