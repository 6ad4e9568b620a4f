//! Text conversion for `toString`, string interpolation and `System.print`

use crate::heap::ObjRef;
use crate::object::{Method, ObjKind};
use crate::value::Value;
use crate::vm::Vm;

/// Format a number the way `printf("%.14g")` does, spelling out the
/// non-finite values.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "infinity" } else { "-infinity" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Fourteen significant digits; the exponent is taken after rounding.
    let scientific = format!("{n:.13e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..14).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (13 - exponent) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

impl Vm {
    /// Text of `value` as its `toString` would produce it. Script and
    /// foreign `toString` overrides run in a nested call; an error they raise
    /// comes back as `Err`.
    pub(crate) fn stringify(&mut self, value: Value) -> Result<String, Value> {
        let mut visiting = Vec::new();
        self.stringify_inner(value, &mut visiting)
    }

    fn stringify_inner(&mut self, value: Value, visiting: &mut Vec<ObjRef>) -> Result<String, Value> {
        if value.is_num() {
            return Ok(format_number(value.as_num()));
        }
        if value.is_bool() {
            return Ok(value.as_bool().to_string());
        }
        let Some(r) = value.try_object() else {
            return Ok("null".to_string());
        };

        let class = self.class_of(value);
        let symbol = self.method_names.find(&self.heap, "toString");
        if let Some(symbol) = symbol {
            if matches!(
                self.heap.class(class).method(symbol),
                Method::Block(_) | Method::Foreign(_)
            ) {
                let result = self.call_method_value(value, symbol, &[])?;
                return match self.heap.as_string(result) {
                    Some(string) => Ok(string.to_string_lossy().into_owned()),
                    None => self.stringify_inner(result, visiting),
                };
            }
        }

        match self.heap.kind(r) {
            ObjKind::String(string) => Ok(string.to_string_lossy().into_owned()),
            ObjKind::Range(range) => {
                let dots = if range.is_inclusive { ".." } else { "..." };
                Ok(format!(
                    "{}{dots}{}",
                    format_number(range.from),
                    format_number(range.to)
                ))
            }
            ObjKind::Class(class) => Ok(self.heap.string(class.name).to_string_lossy().into_owned()),
            ObjKind::Closure(_) => Ok("<fn>".to_string()),
            ObjKind::List(_) if visiting.contains(&r) => Ok("[...]".to_string()),
            ObjKind::Map(_) if visiting.contains(&r) => Ok("{...}".to_string()),
            ObjKind::List(_) => {
                visiting.push(r);
                let mut text = String::from("[");
                let mut index = 0;
                // Re-read on each step: a nested toString may mutate the list.
                while let Some(element) = self.heap.list_get(r, index) {
                    if index > 0 {
                        text.push_str(", ");
                    }
                    text.push_str(&self.stringify_inner(element, visiting)?);
                    index += 1;
                }
                visiting.pop();
                text.push(']');
                Ok(text)
            }
            ObjKind::Map(map) => {
                let entries: Vec<(Value, Value)> = map.iter().collect();
                visiting.push(r);
                let mut parts = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.stringify_inner(key, visiting)?;
                    let value = self.stringify_inner(value, visiting)?;
                    parts.push(format!("{key}: {value}"));
                }
                visiting.pop();
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            _ => Ok(format!("instance of {}", self.class_name(class))),
        }
    }
}
