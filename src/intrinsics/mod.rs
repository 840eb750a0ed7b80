//! Intrinsic functions: registration by name, dispatch by numeric id.
//!
//! The registry is process-wide state initialised lazily on first access,
//! guarded by a first-call flag. Each intrinsic carries a one-line wrapper
//! function (`CallIntrinsicA` on its id) so that scripts call intrinsics
//! through exactly the same machinery as ordinary functions.

mod builtins;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::machine::context::Context;
use crate::machine::error::RuntimeError;
use crate::tac::{new_code, Line, Op};
use crate::value::{FuncDef, Param, ValMap, Value};

/// What an intrinsic hands back to the machine: either a finished value, or
/// (with `done == false`) opaque state to resume with on the next step.
#[derive(Clone, Debug)]
pub struct IntrinsicResult {
    pub done: bool,
    pub value: Value,
}

impl IntrinsicResult {
    pub fn done(value: Value) -> Self {
        Self { done: true, value }
    }

    pub fn partial(state: Value) -> Self {
        Self {
            done: false,
            value: state,
        }
    }

    pub fn null() -> Self {
        Self::done(Value::Null)
    }

    pub fn truth(b: bool) -> Self {
        Self::done(Value::truth(b))
    }

    pub fn empty_string() -> Self {
        Self::done(Value::empty_string())
    }

    /// Canonical "not done yet, no interesting state" result.
    pub fn waiting() -> Self {
        Self::partial(Value::one())
    }
}

pub type IntrinsicFn =
    Rc<dyn Fn(&mut Context, Option<IntrinsicResult>) -> Result<IntrinsicResult, RuntimeError>>;

pub struct Intrinsic {
    name: String,
    id: usize,
    code: IntrinsicFn,
    func: Rc<FuncDef>,
}

impl Intrinsic {
    /// Start defining a new intrinsic; finish with `install()`.
    pub fn create(name: &str) -> IntrinsicBuilder {
        IntrinsicBuilder {
            name: name.to_string(),
            params: Vec::new(),
            code: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn code(&self) -> IntrinsicFn {
        self.code.clone()
    }

    /// The wrapper FunctionValue scripts see when they name this intrinsic.
    pub fn get_func(&self) -> Value {
        Value::Function(self.func.clone(), None)
    }
}

pub struct IntrinsicBuilder {
    name: String,
    params: Vec<Param>,
    code: Option<IntrinsicFn>,
}

impl IntrinsicBuilder {
    pub fn param(mut self, name: &str, default_value: Value) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default_value,
        });
        self
    }

    pub fn param_num(self, name: &str, default: f64) -> Self {
        self.param(name, Value::number(default))
    }

    pub fn param_str(self, name: &str, default: &str) -> Self {
        self.param(name, Value::string(default))
    }

    pub fn code(
        mut self,
        f: impl Fn(&mut Context, Option<IntrinsicResult>) -> Result<IntrinsicResult, RuntimeError>
            + 'static,
    ) -> Self {
        self.code = Some(Rc::new(f));
        self
    }

    /// Register in the global registry, returning the assigned id.
    pub fn install(self) -> usize {
        REGISTRY.with(|r| {
            let mut registry = r.borrow_mut();
            let id = registry.all.len();
            let wrapper_code = new_code();
            wrapper_code.borrow_mut().push(Line::new(
                Value::Temp(0),
                Op::CallIntrinsicA,
                Value::number(id as f64),
                Value::Null,
            ));
            let func = Rc::new(FuncDef {
                parameters: self.params,
                code: wrapper_code,
            });
            let code = self
                .code
                .unwrap_or_else(|| Rc::new(|_: &mut Context, _| Ok(IntrinsicResult::null())));
            registry.by_name.insert(self.name.clone(), id);
            registry.all.push(Rc::new(Intrinsic {
                name: self.name,
                id,
                code,
                func,
            }));
            id
        })
    }
}

#[derive(Default)]
struct Registry {
    all: Vec<Rc<Intrinsic>>,
    by_name: HashMap<String, usize>,
    initialized: bool,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
    static TYPE_MAPS: RefCell<Option<TypeMaps>> = const { RefCell::new(None) };
}

pub(crate) struct TypeMaps {
    pub list: Rc<ValMap>,
    pub string: Rc<ValMap>,
    pub map: Rc<ValMap>,
    pub number: Rc<ValMap>,
    pub function: Rc<ValMap>,
}

fn ensure_builtins() {
    let fresh = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        if registry.initialized {
            false
        } else {
            registry.initialized = true;
            true
        }
    });
    if fresh {
        builtins::register_all();
    }
}

pub fn get_by_name(name: &str) -> Option<Rc<Intrinsic>> {
    ensure_builtins();
    REGISTRY.with(|r| {
        let registry = r.borrow();
        registry
            .by_name
            .get(name)
            .map(|id| registry.all[*id].clone())
    })
}

pub fn get_by_id(id: usize) -> Option<Rc<Intrinsic>> {
    ensure_builtins();
    REGISTRY.with(|r| r.borrow().all.get(id).cloned())
}

fn with_type_maps<R>(f: impl FnOnce(&TypeMaps) -> R) -> R {
    ensure_builtins();
    TYPE_MAPS.with(|tm| {
        if tm.borrow().is_none() {
            let maps = builtins::build_type_maps();
            *tm.borrow_mut() = Some(maps);
        }
        let borrowed = tm.borrow();
        f(borrowed.as_ref().unwrap())
    })
}

/// Built-in prototype map for lists; lazily instantiated, shared
/// process-wide.
pub fn list_type() -> Rc<ValMap> {
    with_type_maps(|t| t.list.clone())
}

pub fn string_type() -> Rc<ValMap> {
    with_type_maps(|t| t.string.clone())
}

pub fn map_type() -> Rc<ValMap> {
    with_type_maps(|t| t.map.clone())
}

pub fn number_type() -> Rc<ValMap> {
    with_type_maps(|t| t.number.clone())
}

pub fn function_type() -> Rc<ValMap> {
    with_type_maps(|t| t.function.clone())
}

/// Short names for the built-in type maps, used when printing values that
/// have no global name.
pub fn short_name_for(v: &Value) -> Option<String> {
    let Value::Map(m) = v else { return None };
    with_type_maps(|t| {
        let name = if Rc::ptr_eq(m, &t.list) {
            "list"
        } else if Rc::ptr_eq(m, &t.string) {
            "string"
        } else if Rc::ptr_eq(m, &t.map) {
            "map"
        } else if Rc::ptr_eq(m, &t.number) {
            "number"
        } else if Rc::ptr_eq(m, &t.function) {
            "funcRef"
        } else {
            return None;
        };
        Some(name.to_string())
    })
}

/// Host-supplied fields surfaced through the `version` intrinsic.
pub struct HostInfo {
    pub name: String,
    pub info: String,
    pub version: f64,
}

thread_local! {
    static HOST_INFO: RefCell<HostInfo> = RefCell::new(HostInfo {
        name: "miniscript-rs".into(),
        info: env!("CARGO_PKG_REPOSITORY").into(),
        version: 1.0,
    });
}

pub fn set_host_info(name: &str, info: &str, version: f64) {
    HOST_INFO.with(|h| {
        *h.borrow_mut() = HostInfo {
            name: name.into(),
            info: info.into(),
            version,
        };
    });
}

pub(crate) fn with_host_info<R>(f: impl FnOnce(&HostInfo) -> R) -> R {
    HOST_INFO.with(|h| f(&h.borrow()))
}
