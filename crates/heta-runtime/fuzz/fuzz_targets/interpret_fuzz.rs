//! Compiler and interpreter stability fuzzer
//!
//! Feeds arbitrary source to a fresh VM. Any input must end in one of the
//! three interpret results; panics are bugs. Inputs that can loop forever
//! are skipped so libFuzzer timeouts stay meaningful.

#![no_main]

use heta_runtime::{Configuration, LoadModuleResult, Vm};
use libfuzzer_sys::fuzz_target;

const MEMORY_BUDGET: usize = 16 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if source.contains("while") || source.contains("for") {
        return;
    }

    let mut used = 0usize;
    let config = Configuration::new()
        .with_load_module(|name: &str| match name {
            "dep" => LoadModuleResult::Source("var Dep = 1".to_string()),
            _ => LoadModuleResult::NotFound,
        })
        .with_reallocator(move |old: usize, new: usize| {
            let next = used.saturating_add(new).saturating_sub(old);
            if new > old && next > MEMORY_BUDGET {
                return false;
            }
            used = next;
            true
        });

    let mut vm = Vm::new(config);
    vm.interpret("main", source);
    vm.collect_garbage();
});
