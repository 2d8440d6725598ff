//! Order fulfilment fallback policy
//!
//! Bookkeeping for the order-specific rules:
//! - an order/cart context exists before any item is added
//! - items are added first; an item is searched for only after its add failed
//! - a search runs at most once per item
//! - a call that already failed is never repeated with the same arguments
//!
//! The policy only decides. Invocations happen in the router.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::config::FallbackConfig;

/// What a tool name means to the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRole {
    CreateOrder,
    AddToCart,
    FindInventory,
    Other,
}

/// Per-run fallback state
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    config: FallbackConfig,
    order_exists: bool,
    cart: Option<Value>,
    failed_calls: HashSet<String>,
    failed_adds: HashSet<String>,
    searched: HashSet<String>,
}

impl FallbackPolicy {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            order_exists: false,
            cart: None,
            failed_calls: HashSet::new(),
            failed_adds: HashSet::new(),
            searched: HashSet::new(),
        }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn role(&self, tool_name: &str) -> ToolRole {
        if tool_name == self.config.create_order_tool {
            ToolRole::CreateOrder
        } else if tool_name == self.config.add_to_cart_tool {
            ToolRole::AddToCart
        } else if tool_name == self.config.find_inventory_tool {
            ToolRole::FindInventory
        } else {
            ToolRole::Other
        }
    }

    /// Identity of a call: tool name plus canonical arguments
    fn call_key(tool_name: &str, arguments: &Value) -> String {
        format!("{}:{}", tool_name, canonical(arguments))
    }

    pub fn is_repeat_failure(&self, tool_name: &str, arguments: &Value) -> bool {
        self.failed_calls.contains(&Self::call_key(tool_name, arguments))
    }

    pub fn record_failure(&mut self, tool_name: &str, arguments: &Value) {
        self.failed_calls.insert(Self::call_key(tool_name, arguments));
    }

    /// The item an item-level call is about: the first configured item key present
    pub fn item_of(&self, arguments: &Value) -> Option<String> {
        let object = arguments.as_object()?;
        self.config.item_keys.iter().find_map(|key| match object.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        })
    }

    pub fn cart(&self) -> Option<&Value> {
        self.cart.as_ref()
    }

    pub fn order_exists(&self) -> bool {
        self.order_exists
    }

    /// Whether an add must be preceded by creating an order
    pub fn needs_order(&self, arguments: &Value) -> bool {
        !self.order_exists && !self.has_cart_argument(arguments)
    }

    fn has_cart_argument(&self, arguments: &Value) -> bool {
        arguments
            .get(&self.config.cart_argument)
            .is_some_and(|v| !v.is_null())
    }

    /// Add arguments with the known cart injected when the model left it out
    pub fn with_cart(&self, arguments: Value) -> Value {
        let Some(cart) = &self.cart else {
            return arguments;
        };
        if self.has_cart_argument(&arguments) {
            return arguments;
        }

        let mut object = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return other,
        };
        object.insert(self.config.cart_argument.clone(), cart.clone());
        Value::Object(object)
    }

    /// Adopt a cart the model passed explicitly
    pub fn remember_cart_from_arguments(&mut self, arguments: &Value) {
        if self.cart.is_none()
            && let Some(cart) = arguments.get(&self.config.cart_argument).filter(|v| !v.is_null())
        {
            self.order_exists = true;
            self.cart = Some(cart.clone());
        }
    }

    /// Note a successful create-order call and adopt its cart reference
    ///
    /// Returns false when the result carries no recognisable reference; the
    /// order still counts as created.
    pub fn order_created(&mut self, result: &Value) -> bool {
        self.order_exists = true;
        let cart = match result {
            Value::Object(object) => self
                .config
                .cart_result_keys
                .iter()
                .find_map(|key| object.get(key).filter(|v| !v.is_null()).cloned()),
            Value::String(s) if !s.trim().is_empty() => Some(Value::String(s.trim().to_string())),
            Value::Number(_) => Some(result.clone()),
            _ => None,
        };

        match cart {
            Some(cart) => {
                self.cart = Some(cart);
                true
            }
            None => false,
        }
    }

    pub fn record_add_failure(&mut self, item: &str) {
        self.failed_adds.insert(item.to_string());
    }

    /// May a search for `item` run now?
    ///
    /// `adds_available` is false when the catalog has no add-to-cart tool, in
    /// which case searching is the primary action rather than a fallback.
    pub fn admit_search(&self, item: Option<&str>, adds_available: bool) -> Result<(), String> {
        if let Some(item) = item
            && self.searched.contains(item)
        {
            return Err(format!("inventory was already searched for '{}'", item));
        }
        if !adds_available {
            return Ok(());
        }
        match item {
            Some(item) if self.failed_adds.contains(item) => Ok(()),
            Some(item) => Err(format!(
                "search for '{}' only after adding it to the cart has failed; use {} first",
                item, self.config.add_to_cart_tool
            )),
            None => Err(format!(
                "search only for an item whose {} failed",
                self.config.add_to_cart_tool
            )),
        }
    }

    pub fn record_search(&mut self, item: &str) {
        self.searched.insert(item.to_string());
    }

    pub fn was_searched(&self, item: &str) -> bool {
        self.searched.contains(item)
    }

    /// Arguments for the fallback search of `item`
    pub fn search_arguments(&self, item: &str) -> Value {
        let mut object = Map::new();
        object.insert(self.config.search_argument.clone(), Value::String(item.to_string()));
        Value::Object(object)
    }
}

/// Arguments rendered with object keys sorted at every level
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<_> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let fields: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), canonical(value)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}
