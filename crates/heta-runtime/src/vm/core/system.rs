//! `System`: output, time and the collector

use super::{static_primitive, Control};
use crate::heap::ObjRef;
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm, system: ObjRef) {
    static_primitive(vm, system, "print()", |vm, _| {
        vm.write_output("\n");
        Ok(Value::NULL)
    });
    static_primitive(vm, system, "print(_)", |vm, args| {
        let text = vm.stringify(args[1]).map_err(Control::Error)?;
        vm.write_output(&text);
        vm.write_output("\n");
        Ok(args[1])
    });
    static_primitive(vm, system, "write(_)", |vm, args| {
        let text = vm.stringify(args[1]).map_err(Control::Error)?;
        vm.write_output(&text);
        Ok(args[1])
    });
    static_primitive(vm, system, "clock", |vm, _| {
        Ok(Value::num(vm.started.elapsed().as_secs_f64()))
    });
    static_primitive(vm, system, "gc()", |vm, _| {
        vm.collect_garbage();
        Ok(Value::NULL)
    });
}
