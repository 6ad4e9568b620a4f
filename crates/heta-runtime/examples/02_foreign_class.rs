//! Foreign classes and call handles
//!
//! Binds a `Vec2` foreign class whose payload holds two `f64`s, then calls a
//! script method from Rust through a call handle.
//!
//! Run with: cargo run --example 02_foreign_class -p heta-runtime

use heta_runtime::{
    foreign_method, ApiResult, Configuration, ForeignClassMethods, ForeignMethodFn, Vm,
};

fn read_vec(payload: &[u8]) -> (f64, f64) {
    let mut x = [0; 8];
    let mut y = [0; 8];
    x.copy_from_slice(&payload[..8]);
    y.copy_from_slice(&payload[8..16]);
    (f64::from_le_bytes(x), f64::from_le_bytes(y))
}

fn bind_method(module: &str, class: &str, _is_static: bool, signature: &str) -> Option<ForeignMethodFn> {
    if module != "main" || class != "Vec2" {
        return None;
    }
    match signature {
        "length" => Some(foreign_method(|vm| {
            let (x, y) = read_vec(vm.get_slot_foreign(0)?);
            vm.set_slot_double(0, x.hypot(y))
        })),
        "toString" => Some(foreign_method(|vm| {
            let (x, y) = read_vec(vm.get_slot_foreign(0)?);
            vm.set_slot_string(0, &format!("({x}, {y})"))
        })),
        _ => None,
    }
}

fn allocate(vm: &mut Vm) -> ApiResult<()> {
    let x = vm.get_slot_double(1)?;
    let y = vm.get_slot_double(2)?;
    let payload = vm.set_slot_new_foreign(0, 0, 16)?;
    payload[..8].copy_from_slice(&x.to_le_bytes());
    payload[8..].copy_from_slice(&y.to_le_bytes());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Configuration::new()
        .with_write(|text: &str| print!("{text}"))
        .with_bind_foreign_method(bind_method)
        .with_bind_foreign_class(|_module: &str, class: &str| {
            (class == "Vec2").then(|| {
                ForeignClassMethods::new(foreign_method(allocate))
                    .with_finalizer(|_payload: &mut [u8]| println!("Vec2 freed"))
            })
        });
    let mut vm = Vm::new(config);

    vm.interpret(
        "main",
        r#"
foreign class Vec2 {
  construct new(x, y) {}
  foreign length
  foreign toString
}

class Geometry {
  static describe(v) { "%(v) has length %(v.length)" }
}
System.print(Vec2.new(3, 4))
"#,
    );
    // Output: (3, 4)

    let describe = vm.make_call_handle("describe(_)")?;
    let make = vm.make_call_handle("new(_,_)")?;

    vm.ensure_slots(3);
    vm.get_variable("main", "Vec2", 0)?;
    vm.set_slot_double(1, 6.0)?;
    vm.set_slot_double(2, 8.0)?;
    vm.call(&make)?;
    let vector = vm.get_slot_handle(0)?;

    vm.ensure_slots(2);
    vm.get_variable("main", "Geometry", 0)?;
    vm.set_slot_handle(1, &vector)?;
    vm.call(&describe)?;
    println!("{}", vm.get_slot_string(0)?);
    // Output: (6, 8) has length 10

    vm.release_handle(vector)?;
    vm.release_handle(make)?;
    vm.release_handle(describe)?;
    Ok(())
    // Dropping the VM finalizes the remaining Vec2 instances.
}
