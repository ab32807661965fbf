#![no_main]

use libfuzzer_sys::fuzz_target;
use z8_core::{
    opcode_info, DebugAction, FlatMemory, NullIo, StackMode, Z8Config, RESET_VECTOR, Z8,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let (header, program) = data.split_at(2);
    let _ = opcode_info(header[0]);

    let config = Z8Config {
        extended_registers: header[1] & 0x01 != 0,
        stack_mode: if header[1] & 0x02 != 0 {
            StackMode::External
        } else {
            StackMode::Internal
        },
        cycles_per_second: 0,
        ..Z8Config::default()
    };
    let mut memory = FlatMemory::new();
    memory.load(0x0000, program);
    memory.load(RESET_VECTOR, program);

    let mut z8 = Z8::new(config, memory, NullIo);
    let handle = z8.debug_handle();
    z8.run_until_parked(512);

    if header[1] & 0x04 != 0 {
        handle.submit_action(DebugAction::StepInto);
        z8.run_until_parked(64);
    }
    z8.reset(header[1] & 0x08 != 0);
    z8.run_until_parked(64);
});
