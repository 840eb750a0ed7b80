//! The built-in intrinsic set. Each one is callable as a plain function or,
//! where it takes `self`, through dot syntax via the type maps.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{get_by_name, Intrinsic, IntrinsicResult, TypeMaps};
use crate::machine::context::Context;
use crate::machine::error::RuntimeError;
use crate::value::{ValMap, Value, MAX_SEQUENCE_SIZE};

/// Language version reported by `version`.
const MINISCRIPT_VERSION: &str = "1.5.1";
const BUILD_DATE: &str = "2025-08-01";

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

fn arg(ctx: &mut Context, name: &str) -> Value {
    ctx.get_var(name).unwrap_or(Value::Null)
}

fn self_arg(ctx: &Context) -> Value {
    ctx.self_value.clone()
}

fn text_of(v: &Value) -> String {
    match v {
        Value::Null => "null".into(),
        v => v.to_display_string(),
    }
}

fn num(v: f64) -> Result<IntrinsicResult, RuntimeError> {
    Ok(IntrinsicResult::done(Value::number(v)))
}

fn done(v: Value) -> Result<IntrinsicResult, RuntimeError> {
    Ok(IntrinsicResult::done(v))
}

pub(super) fn register_all() {
    register_math();
    register_strings();
    register_sequences();
    register_types();
    register_system();
}

fn register_math() {
    Intrinsic::create("abs")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().abs()))
        .install();

    Intrinsic::create("acos")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().acos()))
        .install();

    Intrinsic::create("asin")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().asin()))
        .install();

    Intrinsic::create("atan")
        .param_num("y", 0.0)
        .param_num("x", 1.0)
        .code(|ctx, _| {
            let y = arg(ctx, "y").double_value();
            let x = arg(ctx, "x").double_value();
            num(y.atan2(x))
        })
        .install();

    Intrinsic::create("bitAnd")
        .param_num("i", 0.0)
        .param_num("j", 0.0)
        .code(|ctx, _| num((arg(ctx, "i").int_value() & arg(ctx, "j").int_value()) as f64))
        .install();

    Intrinsic::create("bitOr")
        .param_num("i", 0.0)
        .param_num("j", 0.0)
        .code(|ctx, _| num((arg(ctx, "i").int_value() | arg(ctx, "j").int_value()) as f64))
        .install();

    Intrinsic::create("bitXor")
        .param_num("i", 0.0)
        .param_num("j", 0.0)
        .code(|ctx, _| num((arg(ctx, "i").int_value() ^ arg(ctx, "j").int_value()) as f64))
        .install();

    Intrinsic::create("ceil")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().ceil()))
        .install();

    Intrinsic::create("cos")
        .param_num("radians", 0.0)
        .code(|ctx, _| num(arg(ctx, "radians").double_value().cos()))
        .install();

    Intrinsic::create("floor")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().floor()))
        .install();

    Intrinsic::create("log")
        .param_num("x", 0.0)
        .param_num("base", 10.0)
        .code(|ctx, _| {
            let x = arg(ctx, "x").double_value();
            let base = arg(ctx, "base").double_value();
            num(x.log(base))
        })
        .install();

    Intrinsic::create("pi")
        .code(|_, _| num(std::f64::consts::PI))
        .install();

    Intrinsic::create("round")
        .param_num("x", 0.0)
        .param_num("decimalPlaces", 0.0)
        .code(|ctx, _| {
            let x = arg(ctx, "x").double_value();
            let places = arg(ctx, "decimalPlaces").int_value() as i32;
            let factor = 10f64.powi(places);
            num((x * factor).round() / factor)
        })
        .install();

    Intrinsic::create("rnd")
        .param("seed", Value::Null)
        .code(|ctx, _| {
            let seed = arg(ctx, "seed");
            if !matches!(seed, Value::Null) {
                RNG.with(|rng| {
                    *rng.borrow_mut() = StdRng::seed_from_u64(seed.int_value() as u64);
                });
            }
            num(RNG.with(|rng| rng.borrow_mut().gen::<f64>()))
        })
        .install();

    Intrinsic::create("sign")
        .param_num("x", 0.0)
        .code(|ctx, _| {
            let x = arg(ctx, "x").double_value();
            num(if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            })
        })
        .install();

    Intrinsic::create("sin")
        .param_num("radians", 0.0)
        .code(|ctx, _| num(arg(ctx, "radians").double_value().sin()))
        .install();

    Intrinsic::create("sqrt")
        .param_num("x", 0.0)
        .code(|ctx, _| num(arg(ctx, "x").double_value().sqrt()))
        .install();

    Intrinsic::create("tan")
        .param_num("radians", 0.0)
        .code(|ctx, _| num(arg(ctx, "radians").double_value().tan()))
        .install();
}

fn register_strings() {
    Intrinsic::create("char")
        .param_num("codePoint", 65.0)
        .code(|ctx, _| {
            let code_point = arg(ctx, "codePoint").int_value();
            match u32::try_from(code_point).ok().and_then(char::from_u32) {
                Some(c) => done(Value::string(c.to_string())),
                None => Err(RuntimeError::generic(format!(
                    "invalid character code point {code_point}"
                ))),
            }
        })
        .install();

    Intrinsic::create("code")
        .param("self", Value::Null)
        .code(|ctx, _| {
            let text = text_of(&self_arg(ctx));
            num(text.chars().next().map(|c| c as u32 as f64).unwrap_or(0.0))
        })
        .install();

    Intrinsic::create("lower")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::String(s) => done(Value::string(s.to_lowercase())),
            other => done(other),
        })
        .install();

    Intrinsic::create("upper")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::String(s) => done(Value::string(s.to_uppercase())),
            other => done(other),
        })
        .install();

    Intrinsic::create("split")
        .param("self", Value::Null)
        .param_str("delimiter", " ")
        .param_num("maxCount", -1.0)
        .code(|ctx, _| {
            let Value::String(s) = self_arg(ctx) else {
                return done(Value::Null);
            };
            let delimiter = text_of(&arg(ctx, "delimiter"));
            let max_count = arg(ctx, "maxCount").int_value();
            done(split_string(&s, &delimiter, max_count))
        })
        .install();

    Intrinsic::create("replace")
        .param("self", Value::Null)
        .param("oldval", Value::Null)
        .param("newval", Value::Null)
        .param("maxCount", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let old = arg(ctx, "oldval");
            let new = arg(ctx, "newval");
            let max_count = match arg(ctx, "maxCount") {
                Value::Null => i64::MAX,
                v => v.int_value(),
            };
            if max_count < 1 {
                return done(target);
            }
            match &target {
                Value::String(s) => {
                    if matches!(old, Value::Null) {
                        return Err(RuntimeError::generic("replace: oldval argument is null"));
                    }
                    let old_text = text_of(&old);
                    if old_text.is_empty() {
                        return Err(RuntimeError::generic("replace: oldval argument is empty"));
                    }
                    let new_text = text_of(&new);
                    done(Value::string(s.replacen(
                        old_text.as_str(),
                        &new_text,
                        max_count as usize,
                    )))
                }
                Value::List(l) => {
                    let mut replaced = 0i64;
                    let mut items = l.borrow_mut();
                    for item in items.iter_mut() {
                        if item.equality(&old, 16) == 1.0 {
                            *item = new.clone();
                            replaced += 1;
                            if replaced >= max_count {
                                break;
                            }
                        }
                    }
                    drop(items);
                    done(target.clone())
                }
                Value::Map(m) => {
                    let mut replaced = 0i64;
                    for (k, v) in m.iter_pairs() {
                        if v.equality(&old, 16) == 1.0 {
                            m.set(k, new.clone());
                            replaced += 1;
                            if replaced >= max_count {
                                break;
                            }
                        }
                    }
                    done(target.clone())
                }
                Value::Null => Err(RuntimeError::generic(
                    "argument to 'replace' must not be null",
                )),
                v => Err(RuntimeError::type_mismatch(format!(
                    "can't replace in a {}",
                    v.type_name()
                ))),
            }
        })
        .install();

    Intrinsic::create("val")
        .param("self", Value::zero())
        .code(|ctx, _| match self_arg(ctx) {
            v @ Value::Number(_) => done(v),
            Value::String(s) => num(s.trim().parse().unwrap_or(0.0)),
            _ => done(Value::Null),
        })
        .install();
}

fn register_sequences() {
    Intrinsic::create("hasIndex")
        .param("self", Value::Null)
        .param("index", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let index = arg(ctx, "index");
            match &target {
                Value::List(l) => {
                    if !matches!(index, Value::Number(_)) {
                        return done(Value::Null);
                    }
                    let len = l.borrow().len() as i64;
                    let i = index.int_value();
                    Ok(IntrinsicResult::truth(i >= -len && i < len))
                }
                Value::String(s) => {
                    if !matches!(index, Value::Number(_)) {
                        return done(Value::Null);
                    }
                    let len = s.chars().count() as i64;
                    let i = index.int_value();
                    Ok(IntrinsicResult::truth(i >= -len && i < len))
                }
                Value::Map(m) => Ok(IntrinsicResult::truth(m.contains(&index))),
                _ => done(Value::Null),
            }
        })
        .install();

    Intrinsic::create("indexes")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::List(l) => {
                let len = l.borrow().len();
                done(Value::from_vec(
                    (0..len).map(|i| Value::number(i as f64)).collect(),
                ))
            }
            Value::String(s) => {
                let len = s.chars().count();
                done(Value::from_vec(
                    (0..len).map(|i| Value::number(i as f64)).collect(),
                ))
            }
            Value::Map(m) => done(Value::from_vec(m.keys())),
            _ => done(Value::Null),
        })
        .install();

    Intrinsic::create("indexOf")
        .param("self", Value::Null)
        .param("value", Value::Null)
        .param("after", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let value = arg(ctx, "value");
            let after = arg(ctx, "after");
            match &target {
                Value::List(l) => {
                    let items = l.borrow();
                    let start = search_start(&after, items.len());
                    for (i, item) in items.iter().enumerate().skip(start) {
                        if item.equality(&value, 16) == 1.0 {
                            return num(i as f64);
                        }
                    }
                    done(Value::Null)
                }
                Value::String(s) => {
                    let haystack: Vec<char> = s.chars().collect();
                    let needle: Vec<char> = text_of(&value).chars().collect();
                    let start = search_start(&after, haystack.len());
                    if needle.is_empty() {
                        return done(Value::Null);
                    }
                    let mut i = start;
                    while i + needle.len() <= haystack.len() {
                        if haystack[i..i + needle.len()] == needle[..] {
                            return num(i as f64);
                        }
                        i += 1;
                    }
                    done(Value::Null)
                }
                Value::Map(m) => {
                    let mut past_after = matches!(after, Value::Null);
                    for (k, v) in m.iter_pairs() {
                        if past_after && v.equality(&value, 16) == 1.0 {
                            return done(k);
                        }
                        if !past_after && k.equality(&after, 16) == 1.0 {
                            past_after = true;
                        }
                    }
                    done(Value::Null)
                }
                _ => done(Value::Null),
            }
        })
        .install();

    Intrinsic::create("insert")
        .param("self", Value::Null)
        .param("index", Value::Null)
        .param("value", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let index = arg(ctx, "index");
            let value = arg(ctx, "value");
            if matches!(index, Value::Null) {
                return Err(RuntimeError::generic("insert: index argument required"));
            }
            if !matches!(index, Value::Number(_)) {
                return Err(RuntimeError::generic(
                    "insert: number required for index argument",
                ));
            }
            match &target {
                Value::List(l) => {
                    let len = l.borrow().len() as i64;
                    let mut idx = index.int_value();
                    if idx < 0 {
                        idx += len + 1;
                    }
                    if idx < 0 || idx > len {
                        return Err(RuntimeError::index_out_of_range(index.int_value(), "list"));
                    }
                    l.borrow_mut().insert(idx as usize, value);
                    done(target.clone())
                }
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let len = chars.len() as i64;
                    let mut idx = index.int_value();
                    if idx < 0 {
                        idx += len + 1;
                    }
                    if idx < 0 || idx > len {
                        return Err(RuntimeError::index_out_of_range(
                            index.int_value(),
                            "string",
                        ));
                    }
                    let mut out: String = chars[..idx as usize].iter().collect();
                    out.push_str(&text_of(&value));
                    out.extend(chars[idx as usize..].iter());
                    done(Value::string(out))
                }
                _ => Err(RuntimeError::type_mismatch("insert requires a list or string")),
            }
        })
        .install();

    Intrinsic::create("join")
        .param("self", Value::Null)
        .param_str("delimiter", " ")
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let Value::List(l) = &target else {
                return done(target);
            };
            let delimiter = text_of(&arg(ctx, "delimiter"));
            let parts: Vec<String> = l.borrow().iter().map(text_of).collect();
            done(Value::string(parts.join(&delimiter)))
        })
        .install();

    Intrinsic::create("len")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::List(l) => num(l.borrow().len() as f64),
            Value::String(s) => num(s.chars().count() as f64),
            Value::Map(m) => num(m.len() as f64),
            _ => done(Value::Null),
        })
        .install();

    Intrinsic::create("pop")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::List(l) => {
                let popped = l.borrow_mut().pop();
                done(popped.unwrap_or(Value::Null))
            }
            Value::Map(m) => {
                let len = m.len();
                if len == 0 {
                    return done(Value::Null);
                }
                let (key, _) = m.get_key_value_pair(len - 1).unwrap_or((Value::Null, Value::Null));
                m.remove(&key);
                done(key)
            }
            _ => done(Value::Null),
        })
        .install();

    Intrinsic::create("pull")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::List(l) => {
                let mut items = l.borrow_mut();
                if items.is_empty() {
                    return done(Value::Null);
                }
                done(items.remove(0))
            }
            Value::Map(m) => {
                if m.len() == 0 {
                    return done(Value::Null);
                }
                let (key, _) = m.get_key_value_pair(0).unwrap_or((Value::Null, Value::Null));
                m.remove(&key);
                done(key)
            }
            _ => done(Value::Null),
        })
        .install();

    Intrinsic::create("push")
        .param("self", Value::Null)
        .param("value", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let value = arg(ctx, "value");
            match &target {
                Value::List(l) => {
                    if l.borrow().len() + 1 > MAX_SEQUENCE_SIZE {
                        return Err(RuntimeError::limit_exceeded("list too large"));
                    }
                    l.borrow_mut().push(value);
                    done(target.clone())
                }
                Value::Map(m) => {
                    m.set_elem(value, Value::one());
                    done(target.clone())
                }
                v => Err(RuntimeError::type_mismatch(format!(
                    "can't push onto a {}",
                    v.type_name()
                ))),
            }
        })
        .install();

    Intrinsic::create("range")
        .param_num("from", 0.0)
        .param_num("to", 0.0)
        .param("step", Value::Null)
        .code(|ctx, _| {
            let from = arg(ctx, "from").double_value();
            let to = arg(ctx, "to").double_value();
            let step = match arg(ctx, "step") {
                Value::Null => {
                    if to >= from {
                        1.0
                    } else {
                        -1.0
                    }
                }
                v => v.double_value(),
            };
            if step == 0.0 {
                return Err(RuntimeError::generic("range() error (step==0)"));
            }
            let count = ((to - from) / step).floor() + 1.0;
            if count <= 0.0 || !count.is_finite() {
                return done(Value::from_vec(vec![]));
            }
            if count > MAX_SEQUENCE_SIZE as f64 {
                return Err(RuntimeError::limit_exceeded("list too large"));
            }
            let count = count as usize;
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                values.push(Value::number(from + i as f64 * step));
            }
            done(Value::from_vec(values))
        })
        .install();

    Intrinsic::create("remove")
        .param("self", Value::Null)
        .param("k", Value::Null)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let k = arg(ctx, "k");
            match &target {
                Value::Map(m) => Ok(IntrinsicResult::truth(m.remove(&k).is_some())),
                Value::List(l) => {
                    let len = l.borrow().len();
                    let idx = crate::value::normalize_index(k.int_value(), len, "list")?;
                    l.borrow_mut().remove(idx);
                    done(Value::Null)
                }
                Value::String(s) => {
                    let needle = text_of(&k);
                    match s.find(&needle) {
                        Some(pos) if !needle.is_empty() => {
                            let mut out = s.to_string();
                            out.replace_range(pos..pos + needle.len(), "");
                            done(Value::string(out))
                        }
                        _ => done(target.clone()),
                    }
                }
                Value::Null => Err(RuntimeError::generic(
                    "argument to 'remove' must not be null",
                )),
                v => Err(RuntimeError::type_mismatch(format!(
                    "can't remove from a {}",
                    v.type_name()
                ))),
            }
        })
        .install();

    Intrinsic::create("shuffle")
        .param("self", Value::Null)
        .code(|ctx, _| {
            match self_arg(ctx) {
                Value::List(l) => {
                    let mut items = l.borrow_mut();
                    let len = items.len();
                    RNG.with(|rng| {
                        let mut rng = rng.borrow_mut();
                        for i in (1..len).rev() {
                            let j = rng.gen_range(0..=i);
                            items.swap(i, j);
                        }
                    });
                }
                Value::Map(m) => {
                    let keys = m.keys();
                    let mut values = m.values();
                    RNG.with(|rng| {
                        let mut rng = rng.borrow_mut();
                        for i in (1..values.len()).rev() {
                            let j = rng.gen_range(0..=i);
                            values.swap(i, j);
                        }
                    });
                    for (k, v) in keys.into_iter().zip(values) {
                        m.set(k, v);
                    }
                }
                _ => {}
            }
            done(Value::Null)
        })
        .install();

    Intrinsic::create("slice")
        .param("seq", Value::Null)
        .param_num("from", 0.0)
        .param("to", Value::Null)
        .code(|ctx, _| {
            let seq = arg(ctx, "seq");
            let from = arg(ctx, "from");
            let to = arg(ctx, "to");
            match &seq {
                Value::List(l) => {
                    let items = l.borrow();
                    let (start, end) = slice_bounds(&from, &to, items.len());
                    done(Value::from_vec(items[start..end].to_vec()))
                }
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (start, end) = slice_bounds(&from, &to, chars.len());
                    done(Value::string(chars[start..end].iter().collect::<String>()))
                }
                _ => done(Value::Null),
            }
        })
        .install();

    Intrinsic::create("sort")
        .param("self", Value::Null)
        .param("byKey", Value::Null)
        .param_num("ascending", 1.0)
        .code(|ctx, _| {
            let target = self_arg(ctx);
            let by_key = arg(ctx, "byKey");
            let ascending = arg(ctx, "ascending").bool_value();
            let Value::List(l) = &target else {
                return done(target);
            };
            if l.borrow().len() < 2 {
                return done(target.clone());
            }
            let items = l.borrow().clone();
            let sorted = if matches!(by_key, Value::Null) {
                let mut items = items;
                items.sort_by(|a, b| ordered(compare_values(a, b), ascending));
                items
            } else {
                // keyed sort: extract each element's sort key up front, then
                // order the elements by those keys
                let mut keyed: Vec<(Value, Value)> = items
                    .into_iter()
                    .map(|item| {
                        let key = sort_key_of(&item, &by_key);
                        (item, key)
                    })
                    .collect();
                keyed.sort_by(|a, b| ordered(compare_values(&a.1, &b.1), ascending));
                keyed.into_iter().map(|(item, _)| item).collect()
            };
            *l.borrow_mut() = sorted;
            done(target.clone())
        })
        .install();

    Intrinsic::create("sum")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::List(l) => num(l.borrow().iter().map(|v| v.double_value()).sum()),
            Value::Map(m) => num(m.values().iter().map(|v| v.double_value()).sum()),
            _ => num(0.0),
        })
        .install();

    Intrinsic::create("values")
        .param("self", Value::Null)
        .code(|ctx, _| match self_arg(ctx) {
            Value::Map(m) => done(Value::from_vec(m.values())),
            Value::String(s) => done(Value::from_vec(
                s.chars().map(|c| Value::string(c.to_string())).collect(),
            )),
            v @ Value::List(_) => done(v),
            _ => done(Value::Null),
        })
        .install();
}

fn register_types() {
    Intrinsic::create("funcRef")
        .code(|_, _| done(Value::Map(super::function_type())))
        .install();

    Intrinsic::create("hash")
        .param("obj", Value::Null)
        .code(|ctx, _| num(arg(ctx, "obj").hash(16) as f64))
        .install();

    Intrinsic::create("list")
        .code(|_, _| done(Value::Map(super::list_type())))
        .install();

    Intrinsic::create("map")
        .code(|_, _| done(Value::Map(super::map_type())))
        .install();

    Intrinsic::create("number")
        .code(|_, _| done(Value::Map(super::number_type())))
        .install();

    Intrinsic::create("string")
        .code(|_, _| done(Value::Map(super::string_type())))
        .install();

    Intrinsic::create("str")
        .param("x", Value::empty_string())
        .code(|ctx, _| {
            let x = arg(ctx, "x");
            let text = ctx.describe(&x);
            done(Value::string(text))
        })
        .install();
}

fn register_system() {
    Intrinsic::create("print")
        .param_str("s", "")
        .code(|ctx, _| {
            let value = arg(ctx, "s");
            let text = ctx.describe(&value);
            ctx.shared.emit(&text);
            done(Value::Null)
        })
        .install();

    Intrinsic::create("time")
        .code(|ctx, _| num(ctx.shared.run_time()))
        .install();

    Intrinsic::create("version")
        .code(|_, _| {
            let map = ValMap::new();
            map.set(Value::string("miniscript"), Value::string(MINISCRIPT_VERSION));
            map.set(Value::string("buildDate"), Value::string(BUILD_DATE));
            super::with_host_info(|host| {
                map.set(Value::string("host"), Value::number(host.version));
                map.set(Value::string("hostName"), Value::string(&host.name));
                map.set(Value::string("hostInfo"), Value::string(&host.info));
            });
            done(Value::Map(Rc::new(map)))
        })
        .install();

    Intrinsic::create("wait")
        .param_num("seconds", 1.0)
        .code(|ctx, partial| {
            let now = ctx.shared.run_time();
            match partial {
                None => {
                    let seconds = arg(ctx, "seconds").double_value();
                    Ok(IntrinsicResult::partial(Value::number(now + seconds)))
                }
                Some(state) => {
                    if now >= state.value.double_value() {
                        Ok(IntrinsicResult::null())
                    } else {
                        Ok(state)
                    }
                }
            }
        })
        .install();

    Intrinsic::create("yield")
        .code(|ctx, _| {
            ctx.shared.yielding.set(true);
            done(Value::Null)
        })
        .install();
}

/// Populate the built-in type maps with the intrinsics that apply to each
/// primitive type, so dot syntax resolves through the prototype walk.
pub(super) fn build_type_maps() -> TypeMaps {
    let func = |name: &str| {
        get_by_name(name)
            .map(|i| i.get_func())
            .unwrap_or(Value::Null)
    };
    let fill = |names: &[&str]| {
        let map = ValMap::new();
        for name in names {
            map.set(Value::string(name), func(name));
        }
        Rc::new(map)
    };
    TypeMaps {
        list: fill(&[
            "hasIndex", "indexes", "indexOf", "insert", "join", "len", "pop", "pull", "push",
            "shuffle", "sort", "sum", "remove", "replace", "values",
        ]),
        string: fill(&[
            "hasIndex", "indexes", "indexOf", "insert", "code", "len", "lower", "upper", "val",
            "remove", "replace", "split", "values",
        ]),
        map: fill(&[
            "hasIndex", "indexes", "indexOf", "len", "pop", "pull", "push", "shuffle", "sum",
            "remove", "replace", "values",
        ]),
        number: Rc::new(ValMap::new()),
        function: Rc::new(ValMap::new()),
    }
}

/// First index to examine for `indexOf`, from the optional `after` argument.
fn search_start(after: &Value, len: usize) -> usize {
    match after {
        Value::Null => 0,
        v => {
            let mut idx = v.int_value();
            // -1 already means "from the beginning"
            if idx < -1 {
                idx += len as i64;
            }
            (idx + 1).max(0) as usize
        }
    }
}

fn split_string(s: &str, delimiter: &str, max_count: i64) -> Value {
    if max_count == 0 {
        return Value::from_vec(vec![]);
    }
    let mut parts: Vec<Value> = Vec::new();
    if delimiter.is_empty() {
        let chars: Vec<char> = s.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            if max_count >= 0 && parts.len() as i64 == max_count - 1 {
                parts.push(Value::string(chars[i..].iter().collect::<String>()));
                return Value::from_vec(parts);
            }
            parts.push(Value::string(c.to_string()));
        }
        return Value::from_vec(parts);
    }
    let mut rest = s;
    loop {
        if max_count >= 0 && parts.len() as i64 == max_count - 1 {
            parts.push(Value::string(rest));
            break;
        }
        match rest.find(delimiter) {
            Some(pos) => {
                parts.push(Value::string(&rest[..pos]));
                rest = &rest[pos + delimiter.len()..];
            }
            None => {
                parts.push(Value::string(rest));
                break;
            }
        }
    }
    Value::from_vec(parts)
}

fn slice_bounds(from: &Value, to: &Value, len: usize) -> (usize, usize) {
    let clamp = |v: i64| -> usize {
        let mut idx = v;
        if idx < 0 {
            idx += len as i64;
        }
        idx.clamp(0, len as i64) as usize
    };
    let start = clamp(from.int_value());
    let end = match to {
        Value::Null => len,
        v => clamp(v.int_value()),
    };
    (start, end.max(start))
}

/// Sort comparator: nulls last, strings stringwise, numbers numerically,
/// anything else considered equal for ordering purposes.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) => {
            a.to_display_string().cmp(&b.to_display_string())
        }
        _ => Ordering::Equal,
    }
}

fn ordered(ordering: Ordering, ascending: bool) -> Ordering {
    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

fn sort_key_of(item: &Value, by_key: &Value) -> Value {
    match item {
        Value::List(l) => {
            let items = l.borrow();
            let mut idx = by_key.int_value();
            if idx < 0 {
                idx += items.len() as i64;
            }
            if idx >= 0 && (idx as usize) < items.len() {
                items[idx as usize].clone()
            } else {
                Value::Null
            }
        }
        Value::Map(m) => m.get(by_key).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
