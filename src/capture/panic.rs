//! Panic capture
//!
//! A panic unwinds through the handler's spans before anything can look at
//! them, so the span stack has to be copied from inside the panic hook. The
//! hook only does that on threads that are currently polling an instrumented
//! handler (armed by the engine's own enter/exit hooks); everywhere else it
//! just defers to the previously installed hook.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::PanicHookInfo;
use std::sync::Once;

use super::layer::snapshot_span_stack;
use super::{Failure, FailureKind, FailureSite};
use crate::intercept::HandlerHooks;

static INSTALL: Once = Once::new();

thread_local! {
    /// Depth of instrumented polls running on this thread
    static ARMED: Cell<u32> = const { Cell::new(0) };
    /// Most recent panic seen while armed
    static PENDING: RefCell<Option<Failure>> = const { RefCell::new(None) };
}

/// Install the capturing panic hook (idempotent)
///
/// The previous hook keeps running for every panic, so the usual stderr
/// report is unchanged.
pub fn install_panic_hook() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if is_armed() {
                record(info);
            }
            previous(info);
        }));
    });
}

fn record(info: &PanicHookInfo<'_>) {
    let failure = Failure {
        kind: FailureKind::Panic,
        type_name: "panic".to_string(),
        message: payload_message(info.payload()),
        causes: Vec::new(),
        site: info.location().map(|loc| FailureSite {
            file: loc.file().to_string(),
            line: loc.line(),
            column: loc.column(),
        }),
        spans: snapshot_span_stack(),
    };

    // The slot is only borrowed here and in take_pending; a panic raised
    // while one of those holds it is not worth recording.
    PENDING.with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            *slot = Some(failure);
        }
    });
}

/// Extract the message from a panic payload
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn is_armed() -> bool {
    ARMED.with(|armed| armed.get() > 0)
}

fn arm() {
    ARMED.with(|armed| armed.set(armed.get() + 1));
}

fn disarm() {
    ARMED.with(|armed| armed.set(armed.get().saturating_sub(1)));
}

/// Register the arm/disarm pair on `hooks`
///
/// Must be the first hooks registered so that the exit side, which runs in
/// reverse order, disarms after every panel hook has run.
pub fn register_hooks(hooks: &mut HandlerHooks) {
    hooks.on_enter("panic_capture", arm);
    hooks.on_exit("panic_capture", disarm);
}

/// Take the panic recorded on this thread, if any
pub fn take_pending() -> Option<Failure> {
    PENDING.with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
}

/// Drop any stale record left on this thread
pub fn clear_pending() {
    let _ = take_pending();
}
