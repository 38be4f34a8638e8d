//! The recovery boundary around application code.
//!
//! A process-wide panic hook is installed the first time a call runs. While a
//! thread is inside [`guarded`], the hook records the panic's message,
//! location and a backtrace taken on the panicking stack, and skips the
//! previously installed hook; everywhere else it defers to that hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::Once;

/// A panic caught by [`guarded`].
#[derive(Debug)]
pub(crate) struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    /// Captured where the panic was raised, not where it was caught.
    pub backtrace: Backtrace,
}

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let report = PanicReport {
                message: panic_message(info.payload()).to_string(),
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
        }));
    });
}

/// Run `f`, turning a panic into a [`PanicReport`].
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, PanicReport> {
    install_hook();
    LAST_PANIC.with(|slot| slot.borrow_mut().take());

    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

    result.map_err(|payload| {
        LAST_PANIC
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| PanicReport {
                message: panic_message(payload.as_ref()).to_string(),
                location: None,
                backtrace: Backtrace::force_capture(),
            })
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
