use js_sys::{Function, Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};

use crate::capability::{Binding, GlobalScope};

/// The JS global object (`window` or the worker scope).
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserGlobals;

impl GlobalScope for BrowserGlobals {
    type Binding = JsBinding;

    fn lookup(&self, name: &str) -> Option<JsBinding> {
        let global = js_sys::global();
        let value = Reflect::get(&global, &JsValue::from_str(name)).ok()?;
        if value.is_undefined() {
            return None;
        }
        Some(JsBinding { value })
    }
}

#[derive(Debug, Clone)]
pub struct JsBinding {
    value: JsValue,
}

/// `Object.prototype.toString.call(value)` with the `[object ...]` wrapper stripped.
fn type_tag(value: &JsValue) -> Option<String> {
    let object_prototype = Object::get_prototype_of(&Object::new());
    let to_string: Function = Reflect::get(&object_prototype, &JsValue::from_str("toString"))
        .ok()?
        .dyn_into()
        .ok()?;
    let tag = to_string.call0(value).ok()?.as_string()?;
    tag.strip_prefix("[object ")?
        .strip_suffix(']')
        .map(str::to_owned)
}

fn is_function(target: &JsValue, name: &str) -> bool {
    Reflect::get(target, &JsValue::from_str(name))
        .map(|value| value.is_function())
        .unwrap_or(false)
}

impl JsBinding {
    fn prototype(&self) -> Option<Object> {
        // `Object.getPrototypeOf` throws on `null`.
        if !self.value.is_object() {
            return None;
        }
        let prototype = Object::get_prototype_of(&self.value);
        (!prototype.is_null()).then_some(prototype)
    }
}

impl Binding for JsBinding {
    fn type_tag(&self) -> Option<String> {
        type_tag(&self.value)
    }

    fn prototype_type_tag(&self) -> Option<String> {
        type_tag(&self.prototype()?)
    }

    fn has_method(&self, method: &str) -> bool {
        if !self.value.is_object() {
            return false;
        }
        is_function(&self.value, method)
            || self
                .prototype()
                .is_some_and(|prototype| is_function(&prototype, method))
    }
}
