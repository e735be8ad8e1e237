//! Ownership Box: opaque handles for values the engine holds between calls.
//!
//! A value moved in with [`into_raw`] lives in a heap [`Slot`] tagged with a
//! magic number, a [`BoxKind`] and its concrete type. The engine keeps the
//! raw pointer; every callback recovers the value with [`borrow`] or
//! [`borrow_mut`], and the matching teardown callback releases it with
//! [`consume`], exactly once.
//!
//! Every live slot's address is kept in a process-wide set. Recovery looks
//! the handle up there before dereferencing it, so a released or foreign
//! pointer is rejected without reading freed memory. The tag is checked
//! next. A null pointer, a wrong kind or a wrong type means the bridge
//! itself is broken, so the non-`try` entry points go straight to
//! [`invariant_violation`] instead of returning an error the engine could
//! ignore.
//!
//! Every slot is counted in a shared [`BoxLedger`], which is what lets tests
//! assert that each box is consumed exactly once.

use std::any::{Any, type_name};
use std::collections::BTreeSet;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

const LIVE: u64 = 0x7462_6f78_6c69_7665;

/// Addresses of every slot created by [`into_raw`] and not yet consumed.
static LIVE_SLOTS: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

fn live_slots() -> MutexGuard<'static, BTreeSet<usize>> {
    // The set is only touched by insert/remove/contains, so a panic while
    // it was held cannot leave it half-updated.
    LIVE_SLOTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a box holds; each kind has its own ledger counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    /// Per-module registration data handed to the engine as client data.
    Registration,
    /// A provider behind one table attachment.
    Provider,
    /// A cursor behind one open scan.
    Cursor,
}

impl BoxKind {
    fn index(self) -> usize {
        match self {
            BoxKind::Registration => 0,
            BoxKind::Provider => 1,
            BoxKind::Cursor => 2,
        }
    }
}

impl fmt::Display for BoxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoxKind::Registration => "registration",
            BoxKind::Provider => "provider",
            BoxKind::Cursor => "cursor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    consumed: AtomicUsize,
}

/// Create/consume counters for every box made on one connection.
#[derive(Debug, Default)]
pub struct BoxLedger {
    counters: [Counters; 3],
}

impl BoxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn created(&self, kind: BoxKind) {
        self.counters[kind.index()]
            .created
            .fetch_add(1, Ordering::Relaxed);
    }

    fn consumed(&self, kind: BoxKind) {
        self.counters[kind.index()]
            .consumed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Counters for one kind.
    pub fn count(&self, kind: BoxKind) -> BoxCount {
        let c = &self.counters[kind.index()];
        BoxCount {
            created: c.created.load(Ordering::Relaxed),
            consumed: c.consumed.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of every kind.
    pub fn stats(&self) -> BoxStats {
        BoxStats {
            registrations: self.count(BoxKind::Registration),
            providers: self.count(BoxKind::Provider),
            cursors: self.count(BoxKind::Cursor),
        }
    }
}

/// Create/consume totals for one [`BoxKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxCount {
    pub created: usize,
    pub consumed: usize,
}

impl BoxCount {
    /// Boxes created and not yet consumed.
    pub fn live(&self) -> usize {
        self.created.saturating_sub(self.consumed)
    }
}

/// Point-in-time copy of a [`BoxLedger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxStats {
    pub registrations: BoxCount,
    pub providers: BoxCount,
    pub cursors: BoxCount,
}

impl BoxStats {
    /// Boxes still alive across all kinds.
    pub fn live(&self) -> usize {
        self.registrations.live() + self.providers.live() + self.cursors.live()
    }

    /// `true` when every created box has been consumed exactly once.
    pub fn balanced(&self) -> bool {
        [self.registrations, self.providers, self.cursors]
            .iter()
            .all(|c| c.created == c.consumed)
    }
}

/// A broken handle detected during recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violation {
    Null,
    Released(BoxKind),
    Corrupted,
    KindMismatch { expected: BoxKind, found: BoxKind },
    TypeMismatch { kind: BoxKind, expected: &'static str },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Null => f.write_str("null handle"),
            Violation::Released(kind) => {
                write!(f, "{kind} handle used after release or never issued")
            }
            Violation::Corrupted => f.write_str("handle does not point at a live box"),
            Violation::KindMismatch { expected, found } => {
                write!(f, "expected a {expected} handle, found a {found} handle")
            }
            Violation::TypeMismatch { kind, expected } => {
                write!(f, "{kind} handle does not hold a {expected}")
            }
        }
    }
}

/// Logs a broken bridge invariant and aborts the process.
///
/// Unwinding out of an engine callback is undefined behavior and continuing
/// with a corrupted handle risks memory corruption, so this never returns.
#[cold]
pub(crate) fn invariant_violation(what: impl fmt::Display) -> ! {
    error!(violation = %what, "bridge invariant violated, aborting");
    std::process::abort()
}

struct Slot {
    magic: u64,
    kind: BoxKind,
    ledger: Arc<BoxLedger>,
    value: Box<dyn Any>,
}

/// Moves `value` into a new box and returns its handle.
pub(crate) fn into_raw<T: Any>(value: T, kind: BoxKind, ledger: &Arc<BoxLedger>) -> *mut c_void {
    ledger.created(kind);
    let slot = Box::new(Slot {
        magic: LIVE,
        kind,
        ledger: Arc::clone(ledger),
        value: Box::new(value),
    });
    let handle = Box::into_raw(slot).cast::<c_void>();
    live_slots().insert(handle as usize);
    handle
}

/// # Safety
///
/// If `handle` is a live slot, no other reference to that slot may be in
/// use while the returned one is.
unsafe fn slot<'a>(handle: *mut c_void, kind: BoxKind) -> Result<&'a mut Slot, Violation> {
    if handle.is_null() {
        return Err(Violation::Null);
    }
    if !live_slots().contains(&(handle as usize)) {
        return Err(Violation::Released(kind));
    }
    // SAFETY: the address belongs to a slot that `into_raw` allocated and
    // `try_consume` has not freed.
    let slot = unsafe { &mut *handle.cast::<Slot>() };
    if slot.magic != LIVE {
        return Err(Violation::Corrupted);
    }
    if slot.kind != kind {
        return Err(Violation::KindMismatch {
            expected: kind,
            found: slot.kind,
        });
    }
    Ok(slot)
}

/// Recovers a shared reference without giving up ownership.
///
/// # Safety
///
/// The returned reference must not outlive the box, and no mutable
/// reference from the same handle may be alive.
pub(crate) unsafe fn try_borrow<'a, T: Any>(
    handle: *mut c_void,
    kind: BoxKind,
) -> Result<&'a T, Violation> {
    let slot = unsafe { slot(handle, kind) }?;
    slot.value
        .downcast_ref::<T>()
        .ok_or(Violation::TypeMismatch {
            kind,
            expected: type_name::<T>(),
        })
}

/// Recovers a mutable reference without giving up ownership.
///
/// # Safety
///
/// The returned reference must not outlive the box, and no other reference
/// obtained from the same handle may be alive.
pub(crate) unsafe fn try_borrow_mut<'a, T: Any>(
    handle: *mut c_void,
    kind: BoxKind,
) -> Result<&'a mut T, Violation> {
    let slot = unsafe { slot(handle, kind) }?;
    slot.value
        .downcast_mut::<T>()
        .ok_or(Violation::TypeMismatch {
            kind,
            expected: type_name::<T>(),
        })
}

/// Releases the box and returns the value; the handle is dead afterwards.
///
/// On a type mismatch the box is left untouched.
///
/// # Safety
///
/// No reference obtained from `handle` may outlive this call.
pub(crate) unsafe fn try_consume<T: Any>(handle: *mut c_void, kind: BoxKind) -> Result<T, Violation> {
    let slot = unsafe { slot(handle, kind) }?;
    if !slot.value.is::<T>() {
        return Err(Violation::TypeMismatch {
            kind,
            expected: type_name::<T>(),
        });
    }
    if !live_slots().remove(&(handle as usize)) {
        return Err(Violation::Released(kind));
    }
    // SAFETY: the address was in the live set, which only `into_raw` fills,
    // and removing it makes this the slot's single release.
    let slot = unsafe { Box::from_raw(handle.cast::<Slot>()) };
    slot.ledger.consumed(kind);
    match slot.value.downcast::<T>() {
        Ok(value) => Ok(*value),
        Err(_) => Err(Violation::TypeMismatch {
            kind,
            expected: type_name::<T>(),
        }),
    }
}

/// [`try_borrow`], trapping on a broken handle.
///
/// # Safety
///
/// See [`try_borrow`].
pub(crate) unsafe fn borrow<'a, T: Any>(handle: *mut c_void, kind: BoxKind) -> &'a T {
    match unsafe { try_borrow(handle, kind) } {
        Ok(value) => value,
        Err(violation) => invariant_violation(violation),
    }
}

/// [`try_borrow_mut`], trapping on a broken handle.
///
/// # Safety
///
/// See [`try_borrow_mut`].
pub(crate) unsafe fn borrow_mut<'a, T: Any>(handle: *mut c_void, kind: BoxKind) -> &'a mut T {
    match unsafe { try_borrow_mut(handle, kind) } {
        Ok(value) => value,
        Err(violation) => invariant_violation(violation),
    }
}

/// [`try_consume`], trapping on a broken handle.
///
/// # Safety
///
/// See [`try_consume`].
pub(crate) unsafe fn consume<T: Any>(handle: *mut c_void, kind: BoxKind) -> T {
    match unsafe { try_consume(handle, kind) } {
        Ok(value) => value,
        Err(violation) => invariant_violation(violation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn ledger() -> Arc<BoxLedger> {
        Arc::new(BoxLedger::new())
    }

    #[test]
    fn test_round_trip_counts_once() {
        let ledger = ledger();
        let handle = into_raw(String::from("provider"), BoxKind::Provider, &ledger);
        assert_eq!(ledger.count(BoxKind::Provider).live(), 1);

        let borrowed: &String = unsafe { try_borrow(handle, BoxKind::Provider) }.unwrap();
        assert_eq!(borrowed, "provider");

        let value: String = unsafe { try_consume(handle, BoxKind::Provider) }.unwrap();
        assert_eq!(value, "provider");
        assert_eq!(
            ledger.count(BoxKind::Provider),
            BoxCount {
                created: 1,
                consumed: 1
            }
        );
        assert!(ledger.stats().balanced());
    }

    #[test]
    fn test_borrow_mut_changes_value() {
        let ledger = ledger();
        let handle = into_raw(vec![1i64], BoxKind::Cursor, &ledger);
        unsafe { try_borrow_mut::<Vec<i64>>(handle, BoxKind::Cursor) }
            .unwrap()
            .push(2);
        let value: Vec<i64> = unsafe { try_consume(handle, BoxKind::Cursor) }.unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[test]
    fn test_null_handle_is_rejected() {
        let result = unsafe { try_borrow::<u8>(ptr::null_mut(), BoxKind::Cursor) };
        assert_eq!(result.unwrap_err(), Violation::Null);
    }

    #[test]
    fn test_wrong_type_is_rejected_and_box_survives() {
        let ledger = ledger();
        let handle = into_raw(7u32, BoxKind::Provider, &ledger);

        let err = unsafe { try_borrow::<String>(handle, BoxKind::Provider) }.unwrap_err();
        assert!(matches!(err, Violation::TypeMismatch { .. }));
        let err = unsafe { try_consume::<String>(handle, BoxKind::Provider) }.unwrap_err();
        assert!(matches!(err, Violation::TypeMismatch { .. }));
        assert_eq!(ledger.count(BoxKind::Provider).live(), 1);

        assert_eq!(unsafe { try_consume::<u32>(handle, BoxKind::Provider) }.unwrap(), 7);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let ledger = ledger();
        let handle = into_raw(1u8, BoxKind::Registration, &ledger);
        let err = unsafe { try_borrow::<u8>(handle, BoxKind::Cursor) }.unwrap_err();
        assert_eq!(
            err,
            Violation::KindMismatch {
                expected: BoxKind::Cursor,
                found: BoxKind::Registration
            }
        );
        assert_eq!(
            err.to_string(),
            "expected a cursor handle, found a registration handle"
        );
        unsafe { try_consume::<u8>(handle, BoxKind::Registration) }.unwrap();
    }

    #[test]
    fn test_released_handle_is_rejected_without_dereference() {
        let ledger = ledger();
        let handle = into_raw(String::from("gone"), BoxKind::Cursor, &ledger);
        let value: String = unsafe { try_consume(handle, BoxKind::Cursor) }.unwrap();
        assert_eq!(value, "gone");

        let err = unsafe { try_borrow::<String>(handle, BoxKind::Cursor) }.unwrap_err();
        assert_eq!(err, Violation::Released(BoxKind::Cursor));
        assert_eq!(
            err.to_string(),
            "cursor handle used after release or never issued"
        );
        let err = unsafe { try_borrow_mut::<String>(handle, BoxKind::Cursor) }.unwrap_err();
        assert_eq!(err, Violation::Released(BoxKind::Cursor));
        let err = unsafe { try_consume::<String>(handle, BoxKind::Cursor) }.unwrap_err();
        assert_eq!(err, Violation::Released(BoxKind::Cursor));

        assert_eq!(
            ledger.count(BoxKind::Cursor),
            BoxCount {
                created: 1,
                consumed: 1
            }
        );
    }

    #[test]
    fn test_foreign_pointer_is_rejected() {
        let mut not_a_slot = [0u8; 64];
        let handle = not_a_slot.as_mut_ptr().cast::<c_void>();
        let err = unsafe { try_borrow::<u8>(handle, BoxKind::Provider) }.unwrap_err();
        assert_eq!(err, Violation::Released(BoxKind::Provider));
        let err = unsafe { try_consume::<u8>(handle, BoxKind::Provider) }.unwrap_err();
        assert_eq!(err, Violation::Released(BoxKind::Provider));
    }

    #[test]
    fn test_stats_live_and_balanced() {
        let ledger = ledger();
        let a = into_raw((), BoxKind::Registration, &ledger);
        let b = into_raw((), BoxKind::Cursor, &ledger);
        let stats = ledger.stats();
        assert_eq!(stats.live(), 2);
        assert!(!stats.balanced());

        unsafe { try_consume::<()>(a, BoxKind::Registration) }.unwrap();
        unsafe { try_consume::<()>(b, BoxKind::Cursor) }.unwrap();
        let stats = ledger.stats();
        assert_eq!(stats.live(), 0);
        assert!(stats.balanced());
        assert_eq!(stats.cursors.created, 1);
    }
}
