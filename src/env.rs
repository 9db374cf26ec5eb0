use std::{cell::RefCell, ffi::OsStr};

use crate::memory::MEMORY_SIZE;

#[derive(Clone, Copy)]
struct Env {
    memory_size: usize,
    trace_enabled: bool,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `SIMPLESCRIPT_*` variables. Unparsable values fall back to the defaults.
pub fn init() {
    let memory_size = match std::env::var("SIMPLESCRIPT_MEMORY_SIZE") {
        Ok(val) => val.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring SIMPLESCRIPT_MEMORY_SIZE={val}, not a number");
            MEMORY_SIZE
        }),
        Err(_) => MEMORY_SIZE,
    };
    let value = Env {
        memory_size,
        trace_enabled: var_is("SIMPLESCRIPT_TRACE", "1"),
    };
    set_env(value);
}

pub fn memory_size() -> usize {
    with_env(|env| env.memory_size)
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
