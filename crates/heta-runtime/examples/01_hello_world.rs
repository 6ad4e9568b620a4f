//! Minimal embedding example
//!
//! Creates a VM that prints to stdout, runs a script and reads one of its
//! variables back through the slot API.
//!
//! Run with: cargo run --example 01_hello_world -p heta-runtime

use heta_runtime::{Configuration, ErrorKind, InterpretResult, Vm};

fn main() {
    let config = Configuration::new()
        .with_write(|text: &str| print!("{text}"))
        .with_error(|kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str| {
            match (module, line) {
                (Some(module), Some(line)) => eprintln!("{kind:?} [{module} line {line}] {message}"),
                _ => eprintln!("{kind:?} {message}"),
            }
        });
    let mut vm = Vm::new(config);

    let source = r#"
var greeting = "Hello, " + "World!"
System.print(greeting)
System.print(1 + 2)
"#;
    let result = vm.interpret("main", source);
    println!("interpret: {result:?}");
    // Output: Hello, World!
    //         3
    //         interpret: Success

    // Module variables stay around for the host.
    if result == InterpretResult::Success {
        vm.ensure_slots(1);
        if vm.get_variable("main", "greeting", 0).is_ok() {
            if let Ok(text) = vm.get_slot_string(0) {
                println!("greeting from the host: {text}");
            }
        }
    }
}
