//! Ordered key -> method mapping with the active-thread / pending-delete
//! concurrency contract (spec.md §4.6).
//!
//! Grounded on `examples/original_source/src/method.cpp`'s
//! `MethodManager::ExecuteMethod`: a lookup under the registry mutex,
//! incrementing an active-thread counter while the mutex is released for
//! the call itself, then a second lock to decrement and physically remove
//! an entry whose removal was deferred because a caller was still inside
//! it.
//!
//! The original distinguishes a bare function pointer (not owned by the
//! manager) from a heap-allocated `Method` subtype (owned, freed on
//! removal) via a `delete_on_remove` flag. Entries here are held behind an
//! `Arc<dyn Method>`, so `execute` can clone the handle out from under the
//! lock instead of reaching for a raw pointer; `delete_on_remove` survives
//! purely as introspectable metadata, since Rust's refcounting already
//! frees the method the instant the last `Arc` drops.

use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub const LIST_METHODS: &str = "system.listMethods";
pub const LIST_METHODS_HELP: &str = "List the methods offered by this server";
pub const METHOD_HELP: &str = "system.methodHelp";
pub const METHOD_HELP_HELP: &str = "Get help for a given method";

/// A single registered RPC method. Called with the decoded parameters,
/// writes the outcome directly into `result`.
pub trait Method: Send + Sync {
    fn execute(&self, params: &Value, result: &mut Value) -> Result<()>;
    fn help(&self) -> &str;
    fn delete_on_remove(&self) -> bool {
        true
    }
}

/// Wraps a plain function so it can be registered the same way as a
/// stateful `Method`, matching the original's `MethodFunction` adapter.
struct FunctionMethod<F: Fn(&Value, &mut Value) -> Result<()> + Send + Sync> {
    func: F,
    help: String,
}

impl<F: Fn(&Value, &mut Value) -> Result<()> + Send + Sync> Method for FunctionMethod<F> {
    fn execute(&self, params: &Value, result: &mut Value) -> Result<()> {
        (self.func)(params, result)
    }

    fn help(&self) -> &str {
        &self.help
    }

    fn delete_on_remove(&self) -> bool {
        false
    }
}

type Methods = HashMap<String, Entry>;

struct Entry {
    method: Arc<dyn Method>,
    active_threads: AtomicUsize,
    pending_delete: AtomicBool,
}

impl Entry {
    fn new(method: Arc<dyn Method>) -> Self {
        Entry {
            method,
            active_threads: AtomicUsize::new(0),
            pending_delete: AtomicBool::new(false),
        }
    }
}

/// `system.listMethods`, dispatched through `execute` like any other
/// method, matching the original's `ListMethod` adapter around
/// `MethodManager::ListMethods`. Holds a `Weak` back-reference rather than
/// an `Arc` -- it lives inside the very map it reads, and an `Arc` there
/// would be a reference cycle the map could never drop.
struct ListMethodsMethod(Weak<Mutex<Methods>>);

impl Method for ListMethodsMethod {
    fn execute(&self, _params: &Value, result: &mut Value) -> Result<()> {
        let map = self.0.upgrade().expect("registry outlives its own methods");
        let guard = map.lock().unwrap();
        *result = Value::Array(guard.keys().map(|k| Value::String(k.clone())).collect());
        Ok(())
    }

    fn help(&self) -> &str {
        LIST_METHODS_HELP
    }
}

/// `system.methodHelp`, matching the original's `HelpMethod` adapter around
/// `MethodManager::FindHelpMethod`.
struct HelpMethodAdapter(Weak<Mutex<Methods>>);

impl Method for HelpMethodAdapter {
    fn execute(&self, params: &Value, result: &mut Value) -> Result<()> {
        let map = self.0.upgrade().expect("registry outlives its own methods");
        let args = params.as_array()?;
        if args.len() != 1 || !args[0].is_string() {
            return Err(AnyRpcError::new(ErrorKind::InvalidParams, "invalid parameters"));
        }
        let name = args[0].as_str()?;
        let guard = map.lock().unwrap();
        match guard.get(name) {
            Some(entry) => {
                *result = Value::String(entry.method.help().to_owned());
                Ok(())
            }
            None => Err(AnyRpcError::new(
                ErrorKind::MethodNotFound,
                format!("unknown method name: {name}"),
            )),
        }
    }

    fn help(&self) -> &str {
        METHOD_HELP_HELP
    }
}

/// Registered-method map shared across connections/threads.
pub struct MethodRegistry {
    inner: Arc<Mutex<Methods>>,
}

impl MethodRegistry {
    /// A fresh registry with `system.listMethods` / `system.methodHelp`
    /// pre-registered, mirroring `MethodManager`'s constructor.
    pub fn new() -> Self {
        let inner: Arc<Mutex<Methods>> = Arc::new(Mutex::new(HashMap::new()));
        {
            let mut guard = inner.lock().unwrap();
            let weak = Arc::downgrade(&inner);
            guard.insert(
                LIST_METHODS.to_owned(),
                Entry::new(Arc::new(ListMethodsMethod(weak.clone()))),
            );
            guard.insert(
                METHOD_HELP.to_owned(),
                Entry::new(Arc::new(HelpMethodAdapter(weak))),
            );
        }
        MethodRegistry { inner }
    }

    /// Registers a plain function. Fails with `FunctionRedefine` if the
    /// name is already taken.
    pub fn add_function(
        &self,
        name: impl Into<String>,
        help: impl Into<String>,
        func: impl Fn(&Value, &mut Value) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        let name = name.into();
        let mut guard = self.inner.lock().unwrap();
        if guard.contains_key(&name) {
            return Err(AnyRpcError::new(
                ErrorKind::FunctionRedefine,
                format!("attempt to redefine function name: {name}"),
            ));
        }
        guard.insert(
            name,
            Entry::new(Arc::new(FunctionMethod {
                func,
                help: help.into(),
            })),
        );
        Ok(())
    }

    /// Registers a stateful `Method`. Fails with `MethodRedefine` if the
    /// name is already taken; the rejected instance is dropped either way
    /// (Rust's ownership means "free on failure" is automatic here).
    pub fn add_method(&self, name: impl Into<String>, method: impl Method + 'static) -> Result<()> {
        let name = name.into();
        let mut guard = self.inner.lock().unwrap();
        if guard.contains_key(&name) {
            return Err(AnyRpcError::new(
                ErrorKind::MethodRedefine,
                format!("attempt to redefine method name: {name}"),
            ));
        }
        guard.insert(name, Entry::new(Arc::new(method)));
        Ok(())
    }

    /// Removes a method by name. Under a non-zero active-thread count the
    /// entry is only marked `pending_delete`; the last `execute` to finish
    /// physically removes it. Returns `false` if no such method exists.
    pub fn remove(&self, name: &str) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(entry) = guard.get(name) else {
            return false;
        };
        if entry.active_threads.load(Ordering::Acquire) > 0 {
            entry.pending_delete.store(true, Ordering::Release);
        } else {
            guard.remove(name);
        }
        true
    }

    /// Looks up `name` under the lock, bumps its active-thread count,
    /// clones its `Arc` handle, releases the lock, runs the method, then
    /// reacquires the lock to decrement and possibly finish a deferred
    /// removal. Returns `MethodNotFound` if no such method exists or it is
    /// pending delete.
    pub fn execute(&self, name: &str, params: &Value, result: &mut Value) -> Result<()> {
        let method = {
            let guard = self.inner.lock().unwrap();
            match guard.get(name) {
                Some(entry) if !entry.pending_delete.load(Ordering::Acquire) => {
                    entry.active_threads.fetch_add(1, Ordering::AcqRel);
                    entry.method.clone()
                }
                _ => {
                    return Err(AnyRpcError::new(
                        ErrorKind::MethodNotFound,
                        format!("unknown method name: {name}"),
                    ));
                }
            }
        };

        let call_result = method.execute(params, result);

        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.get(name) {
            let remaining = entry.active_threads.fetch_sub(1, Ordering::AcqRel) - 1;
            if entry.pending_delete.load(Ordering::Acquire) && remaining == 0 {
                guard.remove(name);
            }
        }

        call_result
    }

    /// `system.listMethods`, callable directly without going through
    /// `execute`'s dispatch-by-name path.
    pub fn list_methods(&self) -> Value {
        let guard = self.inner.lock().unwrap();
        Value::Array(guard.keys().map(|k| Value::String(k.clone())).collect())
    }

    /// `system.methodHelp`, callable directly without going through
    /// `execute`'s dispatch-by-name path.
    pub fn method_help(&self, params: &Value) -> Result<Value> {
        let args = params.as_array()?;
        if args.len() != 1 || !args[0].is_string() {
            return Err(AnyRpcError::new(ErrorKind::InvalidParams, "invalid parameters"));
        }
        let name = args[0].as_str()?;
        let guard = self.inner.lock().unwrap();
        match guard.get(name) {
            Some(entry) => Ok(Value::String(entry.method.help().to_owned())),
            None => Err(AnyRpcError::new(
                ErrorKind::MethodNotFound,
                format!("unknown method name: {name}"),
            )),
        }
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_preregistered_introspection_methods() {
        let registry = MethodRegistry::new();
        let mut result = Value::Null;
        registry.execute(LIST_METHODS, &Value::array(), &mut result).unwrap();
        let names = result.as_array().unwrap();
        assert!(names.iter().any(|v| v.as_str().unwrap() == LIST_METHODS));
        assert!(names.iter().any(|v| v.as_str().unwrap() == METHOD_HELP));
    }

    #[test]
    fn method_help_dispatches_through_execute() {
        let registry = MethodRegistry::new();
        registry.add_function("greet", "says hello", |_, _| Ok(())).unwrap();
        let params = Value::Array(vec![Value::String("greet".into())]);
        let mut result = Value::Null;
        registry.execute(METHOD_HELP, &params, &mut result).unwrap();
        assert_eq!(result, Value::String("says hello".into()));
    }

    #[test]
    fn add_function_and_execute_round_trips() {
        let registry = MethodRegistry::new();
        registry
            .add_function("add", "adds two numbers", |params, result| {
                let args = params.as_array()?;
                *result = Value::Int64(args[0].as_i64()? + args[1].as_i64()?);
                Ok(())
            })
            .unwrap();

        let params = Value::Array(vec![Value::Int32(2), Value::Int32(3)]);
        let mut result = Value::Null;
        registry.execute("add", &params, &mut result).unwrap();
        assert_eq!(result, Value::Int64(5));
    }

    #[test]
    fn redefining_a_function_fails() {
        let registry = MethodRegistry::new();
        registry.add_function("dup", "", |_, _| Ok(())).unwrap();
        let err = registry.add_function("dup", "", |_, _| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FunctionRedefine);
    }

    #[test]
    fn execute_unknown_method_is_method_not_found() {
        let registry = MethodRegistry::new();
        let mut result = Value::Null;
        let err = registry
            .execute("nope", &Value::array(), &mut result)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    }

    #[test]
    fn remove_then_execute_is_not_found() {
        let registry = MethodRegistry::new();
        registry.add_function("bye", "", |_, _| Ok(())).unwrap();
        assert!(registry.remove("bye"));
        let mut result = Value::Null;
        assert_eq!(
            registry
                .execute("bye", &Value::array(), &mut result)
                .unwrap_err()
                .kind(),
            ErrorKind::MethodNotFound
        );
    }

    #[test]
    fn method_help_returns_registered_help_text() {
        let registry = MethodRegistry::new();
        registry
            .add_function("greet", "says hello", |_, _| Ok(()))
            .unwrap();
        let params = Value::Array(vec![Value::String("greet".into())]);
        let help = registry.method_help(&params).unwrap();
        assert_eq!(help, Value::String("says hello".into()));
    }

    #[test]
    fn method_help_unknown_name_is_method_not_found() {
        let registry = MethodRegistry::new();
        let params = Value::Array(vec![Value::String("nope".into())]);
        assert_eq!(
            registry.method_help(&params).unwrap_err().kind(),
            ErrorKind::MethodNotFound
        );
    }

    /// A `Method` that signals `started` then blocks until `release` is
    /// set, so a test can pause the call mid-flight.
    struct Blocking {
        started: Arc<(Mutex<bool>, std::sync::Condvar)>,
        release: Arc<(Mutex<bool>, std::sync::Condvar)>,
    }

    impl Method for Blocking {
        fn execute(&self, _params: &Value, result: &mut Value) -> Result<()> {
            {
                let (lock, cvar) = &*self.started;
                let mut started = lock.lock().unwrap();
                *started = true;
                cvar.notify_all();
            }
            {
                let (lock, cvar) = &*self.release;
                let mut go = lock.lock().unwrap();
                while !*go {
                    go = cvar.wait(go).unwrap();
                }
            }
            *result = Value::Bool(true);
            Ok(())
        }

        fn help(&self) -> &str {
            "blocks until released"
        }
    }

    #[test]
    fn remove_during_execution_defers_physical_removal() {
        use std::sync::Condvar;
        use std::thread;

        let registry = Arc::new(MethodRegistry::new());
        let started = Arc::new((Mutex::new(false), Condvar::new()));
        let release = Arc::new((Mutex::new(false), Condvar::new()));
        registry
            .add_method(
                "slow",
                Blocking { started: started.clone(), release: release.clone() },
            )
            .unwrap();

        let worker_registry = registry.clone();
        let handle = thread::spawn(move || {
            let mut result = Value::Null;
            let outcome = worker_registry.execute("slow", &Value::array(), &mut result);
            (outcome, result)
        });

        {
            let (lock, cvar) = &*started;
            let mut guard = lock.lock().unwrap();
            while !*guard {
                guard = cvar.wait(guard).unwrap();
            }
        }

        // The call is in flight on the worker thread: remove() must not
        // free the method or let it disappear from the registry yet, only
        // mark it pending and report success.
        assert!(registry.remove("slow"));
        let names_while_active = registry.list_methods();
        assert!(names_while_active
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v.as_str().unwrap() == "slow"));

        {
            let (lock, cvar) = &*release;
            let mut go = lock.lock().unwrap();
            *go = true;
            cvar.notify_all();
        }

        let (outcome, result) = handle.join().unwrap();
        assert!(outcome.is_ok());
        assert_eq!(result, Value::Bool(true));

        let names_after = registry.list_methods();
        assert!(!names_after
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v.as_str().unwrap() == "slow"));
    }
}
