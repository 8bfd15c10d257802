//! Register-level model of the ISL1208 on an `embedded-hal` bus

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::time::rtc::{
    ISL1208_ADDRESS,
    REG_STATUS,
    STATUS_RTCF,
    STATUS_WRTC,
    TIME_BLOCK_LEN,
};

/// Registers modelled, the chip's full map up to the user SRAM
const REGISTER_COUNT: usize = 0x14;

/// Simulated clock chip.
///
/// Writes set the register pointer from their first byte and then store with
/// auto-increment, reads continue from the pointer. Time registers ignore
/// writes while WRTC is clear, like the real part.
#[derive(Debug, Clone)]
pub struct SimulatedIsl1208 {
    address: u8,
    regs: [u8; REGISTER_COUNT],
    pointer: usize,
    transactions: usize,
    time_block_writes: usize,
    failure: Option<(usize, ErrorKind)>,
}

impl SimulatedIsl1208 {
    /// Creates a chip at the default address with cleared registers
    pub fn new() -> Self {
        SimulatedIsl1208 {
            address: ISL1208_ADDRESS,
            regs: [0; REGISTER_COUNT],
            pointer: 0,
            transactions: 0,
            time_block_writes: 0,
            failure: None,
        }
    }

    /// Raises or clears the power-failure flag
    pub fn set_power_failed(&mut self, failed: bool) {
        let status = &mut self.regs[usize::from(REG_STATUS)];
        if failed {
            *status |= STATUS_RTCF;
        } else {
            *status &= !STATUS_RTCF;
        }
    }

    /// Makes transaction number `index` (0-based) fail with `kind`
    pub fn fail_transaction(&mut self, index: usize, kind: ErrorKind) {
        self.failure = Some((index, kind));
    }

    /// Stores time registers directly, bypassing the write guard
    pub fn load_registers(&mut self, time_block: &[u8]) {
        let len = time_block.len().min(TIME_BLOCK_LEN);
        self.regs[..len].copy_from_slice(&time_block[..len]);
    }

    /// Register contents
    pub fn registers(&self) -> &[u8] {
        &self.regs
    }

    /// Transactions seen, failed ones included
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Transactions that stored at least one time register
    pub fn time_block_writes(&self) -> usize {
        self.time_block_writes
    }

    fn store(&mut self, data: &[u8]) -> bool {
        let Some((&reg, values)) = data.split_first() else {
            return false;
        };
        self.pointer = usize::from(reg) % REGISTER_COUNT;

        let mut stored_time = false;
        for &value in values {
            let reg = self.pointer;
            if reg < TIME_BLOCK_LEN {
                if self.regs[usize::from(REG_STATUS)] & STATUS_WRTC != 0 {
                    self.regs[reg] = value;
                    stored_time = true;
                }
            } else if reg == usize::from(REG_STATUS) {
                // RTCF is read-only
                let rtcf = self.regs[reg] & STATUS_RTCF;
                self.regs[reg] = (value & !STATUS_RTCF) | rtcf;
            } else {
                self.regs[reg] = value;
            }
            self.pointer = (self.pointer + 1) % REGISTER_COUNT;
        }

        if stored_time {
            // A valid time write restarts the oscillator
            self.regs[usize::from(REG_STATUS)] &= !STATUS_RTCF;
        }
        stored_time
    }

    fn load(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.regs[self.pointer];
            self.pointer = (self.pointer + 1) % REGISTER_COUNT;
        }
    }
}

impl Default for SimulatedIsl1208 {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for SimulatedIsl1208 {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for SimulatedIsl1208 {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let index = self.transactions;
        self.transactions += 1;

        if let Some((at, kind)) = self.failure {
            if at == index {
                return Err(kind);
            }
        }
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        let mut stored_time = false;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(data) => stored_time |= self.store(data),
                Operation::Read(buf) => self.load(buf),
            }
        }
        if stored_time {
            self.time_block_writes += 1;
        }
        Ok(())
    }
}
