/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Runtime tracking of handles whose ownership is only known dynamically.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use crate::meta::error::HandleError;
use crate::obj::{HandleKind, OwnershipClass};
use crate::sys;

/// Id of a handle stored in a [`HandleArena`].
///
/// Ids carry the generation of their slot: once the handle is gone and the slot is reused, the old id is stale and
/// never refers to the new occupant.
pub struct HandleId<K: HandleKind> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> HandleId<K> {
    fn erased(self) -> ErasedId {
        ErasedId {
            index: self.index,
            generation: self.generation,
        }
    }
}

// Manual impls: derives would require `K: Copy` etc.
impl<K: HandleKind> Copy for HandleId<K> {}

impl<K: HandleKind> Clone for HandleId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> PartialEq for HandleId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K: HandleKind> Eq for HandleId<K> {}

impl<K: HandleKind> fmt::Debug for HandleId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId<{}>({}v{})", K::NAME, self.index, self.generation)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct ErasedId {
    index: u32,
    generation: u32,
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

struct Live {
    kind: &'static str,
    type_id: TypeId,
    class: OwnershipClass,
    raw: Box<dyn Any>,
    release: unsafe fn(&sys::Binding, &dyn Any, OwnershipClass),
}

struct Slot {
    generation: u32,
    live: Option<Live>,
}

/// Releases the erased handle according to its ownership class.
unsafe fn release_erased<K: HandleKind>(binding: &sys::Binding, raw: &dyn Any, class: OwnershipClass) {
    let Some(&raw) = raw.downcast_ref::<K::Raw>() else {
        return;
    };

    if K::is_null(&raw) {
        return;
    }

    match class {
        OwnershipClass::Owned => K::release(binding, raw),
        OwnershipClass::Shared => K::release_shared(binding, raw),
        OwnershipClass::Borrowed => {}
    }
}

/// Generation-tagged table of raw handles and their ownership class.
///
/// This is the dynamic counterpart of [`Handle`](crate::obj::Handle), for code that only learns at runtime who owns
/// a handle (e.g. handles collected from a batch of engine calls). The same rules apply: an owned handle is either
/// ended (handed over) or released, exactly once; a borrowed handle is never released by the arena.
///
/// Dropping an arena does not release anything. Use [`scope()`](Self::scope) for automatic release.
#[derive(Default)]
pub struct HandleArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `raw` with ownership `class` (_New_).
    pub fn insert<K: HandleKind>(&mut self, raw: K::Raw, class: OwnershipClass) -> HandleId<K> {
        let live = Live {
            kind: K::NAME,
            type_id: TypeId::of::<K>(),
            class,
            raw: Box::new(raw),
            release: release_erased::<K>,
        };

        let (index, generation) = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.live = Some(live);
                (index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| panic!("handle arena is full"));
                self.slots.push(Slot {
                    generation: 0,
                    live: Some(live),
                });
                (index, 0)
            }
        };

        self.live += 1;
        sys::out!("arena: insert {} handle {}v{} ({:?})", K::NAME, index, generation, class);

        HandleId {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Raw bits of a live handle (_Get_). Does not change ownership.
    ///
    /// Returns `None` if the handle is gone or the id is stale.
    pub fn get<K: HandleKind>(&self, id: HandleId<K>) -> Option<K::Raw> {
        let live = self.locate::<K>(id).ok()?;
        live.raw.downcast_ref::<K::Raw>().copied()
    }

    /// Ownership class of a live handle.
    pub fn ownership<K: HandleKind>(&self, id: HandleId<K>) -> Option<OwnershipClass> {
        self.locate::<K>(id).ok().map(|live| live.class)
    }

    /// Ends an owned or shared handle (_End_): untracks it and returns its bits without releasing them.
    ///
    /// The caller is responsible for the handle from now on. Fails on a second call for the same id, and for borrowed
    /// handles, which stay tracked.
    pub fn end<K: HandleKind>(&mut self, id: HandleId<K>) -> Result<K::Raw, HandleError> {
        let live = self.locate::<K>(id)?;
        if live.class == OwnershipClass::Borrowed {
            return Err(HandleError::NotOwned { kind: K::NAME });
        }

        let raw = live
            .raw
            .downcast_ref::<K::Raw>()
            .copied()
            .ok_or(HandleError::KindMismatch {
                expected: K::NAME,
                actual: live.kind,
            })?;

        self.take(id.erased());
        sys::out!("arena: end {} handle {:?}", K::NAME, id);

        Ok(raw)
    }

    /// Releases an owned or shared handle through its kind.
    pub fn try_release<K: HandleKind>(&mut self, binding: &sys::Binding, id: HandleId<K>) -> Result<(), HandleError> {
        let live = self.locate::<K>(id)?;
        if live.class == OwnershipClass::Borrowed {
            return Err(HandleError::NotOwned { kind: K::NAME });
        }

        if let Some(live) = self.take(id.erased()) {
            // SAFETY: the arena held the only claim on the handle; it was removed above, so this runs once.
            unsafe { (live.release)(binding, live.raw.as_ref(), live.class) };
        }
        Ok(())
    }

    /// Releases an owned or shared handle through its kind.
    ///
    /// # Panics
    /// If the handle was already ended or released, or is borrowed.
    #[track_caller]
    pub fn release<K: HandleKind>(&mut self, binding: &sys::Binding, id: HandleId<K>) {
        if let Err(err) = self.try_release(binding, id) {
            panic!("cannot release {id:?}: {err}");
        }
    }

    /// Stops tracking a borrowed handle.
    pub fn forget<K: HandleKind>(&mut self, id: HandleId<K>) -> Result<(), HandleError> {
        let live = self.locate::<K>(id)?;
        if live.class != OwnershipClass::Borrowed {
            return Err(HandleError::MustRelease { kind: K::NAME });
        }

        self.take(id.erased());
        Ok(())
    }

    /// Number of tracked handles, of any ownership class.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Opens a lifetime scope that releases every handle adopted through it when it ends.
    pub fn scope<'a>(&'a mut self, binding: &'a sys::Binding) -> Lifetime<'a> {
        Lifetime {
            arena: self,
            binding,
            adopted: Vec::new(),
        }
    }

    fn locate<K: HandleKind>(&self, id: HandleId<K>) -> Result<&Live, HandleError> {
        let slot = self
            .slots
            .get(id.index as usize)
            .ok_or(HandleError::Stale { kind: K::NAME })?;

        if slot.generation != id.generation {
            return Err(HandleError::Stale { kind: K::NAME });
        }

        let live = slot
            .live
            .as_ref()
            .ok_or(HandleError::AlreadyReleased { kind: K::NAME })?;

        if live.type_id != TypeId::of::<K>() {
            return Err(HandleError::KindMismatch {
                expected: K::NAME,
                actual: live.kind,
            });
        }

        Ok(live)
    }

    fn take(&mut self, id: ErasedId) -> Option<Live> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let live = slot.live.take()?;
        self.free.push(id.index);
        self.live -= 1;
        Some(live)
    }
}

impl fmt::Debug for HandleArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleArena")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Scope that batches handles and releases them together.
///
/// Every handle [adopted](Self::adopt) through the scope is released when the scope [ends](Self::end) or is dropped,
/// in reverse order of adoption: owned handles through their kind's destructor, shared ones by giving up their
/// reference. Borrowed handles are untracked without release. Handles ended individually before are skipped.
pub struct Lifetime<'a> {
    arena: &'a mut HandleArena,
    binding: &'a sys::Binding,
    adopted: Vec<ErasedId>,
}

impl Lifetime<'_> {
    /// Tracks `raw` in the arena and ties it to this scope.
    pub fn adopt<K: HandleKind>(&mut self, raw: K::Raw, class: OwnershipClass) -> HandleId<K> {
        let id = self.arena.insert::<K>(raw, class);
        self.adopted.push(id.erased());
        id
    }

    pub fn get<K: HandleKind>(&self, id: HandleId<K>) -> Option<K::Raw> {
        self.arena.get(id)
    }

    /// Hands over one handle before the scope ends. See [`HandleArena::end()`].
    pub fn end_handle<K: HandleKind>(&mut self, id: HandleId<K>) -> Result<K::Raw, HandleError> {
        self.arena.end(id)
    }

    /// Number of adopted handles that are still tracked.
    pub fn live_count(&self) -> usize {
        let slots = &self.arena.slots;
        self.adopted
            .iter()
            .filter(|id| {
                slots
                    .get(id.index as usize)
                    .is_some_and(|slot| slot.generation == id.generation && slot.live.is_some())
            })
            .count()
    }

    /// Ends the scope, releasing every handle still alive.
    pub fn end(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        while let Some(id) = self.adopted.pop() {
            let Some(live) = self.arena.take(id) else {
                continue;
            };

            sys::out!("lifetime: release {} handle {}v{}", live.kind, id.index, id.generation);

            // SAFETY: `take()` removed the entry, so each adopted handle is released at most once.
            unsafe { (live.release)(self.binding, live.raw.as_ref(), live.class) };
        }
    }
}

impl Drop for Lifetime<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for Lifetime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("adopted", &self.adopted.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::builtin::StringKind;
    use crate::sys::mock;

    thread_local! {
        static RELEASED: RefCell<Vec<(i64, OwnershipClass)>> = const { RefCell::new(Vec::new()) };
    }

    /// Handles that are plain numbers; releases are recorded instead of reaching an engine.
    enum CountedKind {}

    impl HandleKind for CountedKind {
        type Raw = i64;

        const NAME: &'static str = "Counted";

        unsafe fn release(_binding: &sys::Binding, raw: i64) {
            RELEASED.with(|r| r.borrow_mut().push((raw, OwnershipClass::Owned)));
        }

        unsafe fn release_shared(_binding: &sys::Binding, raw: i64) {
            RELEASED.with(|r| r.borrow_mut().push((raw, OwnershipClass::Shared)));
        }

        unsafe fn duplicate_shared(_binding: &sys::Binding, raw: i64) -> i64 {
            raw
        }

        fn is_null(raw: &i64) -> bool {
            *raw == 0
        }
    }

    fn take_released() -> Vec<(i64, OwnershipClass)> {
        RELEASED.with(|r| std::mem::take(&mut *r.borrow_mut()))
    }

    #[test]
    fn second_end_fails() {
        let _session = mock::install();
        let mut arena = HandleArena::new();
        take_released();

        let id = arena.insert::<CountedKind>(7, OwnershipClass::Owned);
        assert_eq!(arena.get(id), Some(7));
        assert_eq!(arena.end(id), Ok(7));
        assert_eq!(arena.end(id), Err(HandleError::AlreadyReleased { kind: "Counted" }));

        assert!(take_released().is_empty());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn borrowed_cannot_be_ended_or_released() {
        let _session = mock::install();
        let binding = sys::binding();
        let mut arena = HandleArena::new();
        take_released();

        let id = arena.insert::<CountedKind>(3, OwnershipClass::Borrowed);
        assert_eq!(arena.end(id), Err(HandleError::NotOwned { kind: "Counted" }));
        assert_eq!(arena.try_release(binding, id), Err(HandleError::NotOwned { kind: "Counted" }));
        assert_eq!(arena.get(id), Some(3));

        assert_eq!(arena.forget(id), Ok(()));
        assert_eq!(arena.get(id), None);
        assert!(take_released().is_empty());
    }

    #[test]
    fn owned_cannot_be_forgotten() {
        let mut arena = HandleArena::new();
        let id = arena.insert::<CountedKind>(4, OwnershipClass::Owned);

        assert_eq!(arena.forget(id), Err(HandleError::MustRelease { kind: "Counted" }));
        assert_eq!(arena.ownership(id), Some(OwnershipClass::Owned));
    }

    #[test]
    fn stale_id_does_not_alias_reused_slot() {
        let mut arena = HandleArena::new();

        let old = arena.insert::<CountedKind>(1, OwnershipClass::Owned);
        assert_eq!(arena.end(old), Ok(1));

        let new = arena.insert::<CountedKind>(2, OwnershipClass::Owned);
        assert_ne!(old, new);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.end(old), Err(HandleError::Stale { kind: "Counted" }));
        assert_eq!(arena.get(new), Some(2));
    }

    #[test]
    #[should_panic(expected = "already ended or released")]
    fn double_release_panics() {
        let _session = mock::install();
        let binding = sys::binding();
        let mut arena = HandleArena::new();

        let id = arena.insert::<CountedKind>(9, OwnershipClass::Owned);
        arena.release(binding, id);
        arena.release(binding, id);
    }

    #[test]
    fn lifetime_releases_all_at_end_and_none_before() {
        let _session = mock::install();
        let binding = sys::binding();
        let mut arena = HandleArena::new();
        take_released();

        let mut scope = arena.scope(binding);
        scope.adopt::<CountedKind>(1, OwnershipClass::Owned);
        scope.adopt::<CountedKind>(2, OwnershipClass::Shared);
        scope.adopt::<CountedKind>(3, OwnershipClass::Borrowed);
        let handed_over = scope.adopt::<CountedKind>(4, OwnershipClass::Owned);
        scope.adopt::<CountedKind>(5, OwnershipClass::Owned);

        assert_eq!(scope.end_handle(handed_over), Ok(4));
        assert_eq!(scope.live_count(), 4);
        assert!(take_released().is_empty());

        scope.end();

        assert_eq!(
            take_released(),
            [
                (5, OwnershipClass::Owned),
                (2, OwnershipClass::Shared),
                (1, OwnershipClass::Owned)
            ]
        );
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn dropped_lifetime_releases_engine_values() {
        let _session = mock::install();
        let binding = sys::binding();
        let before = mock::live_values();
        let double_before = mock::stats().double_destroys;
        let mut arena = HandleArena::new();

        {
            let mut scope = arena.scope(binding);
            for text in ["a", "b", "c"] {
                let raw = sys::new_string(binding.interface(), text);
                scope.adopt::<StringKind>(raw, OwnershipClass::Owned);
            }
            assert_eq!(mock::live_values(), before + 3);
        }

        assert_eq!(mock::live_values(), before);
        assert_eq!(mock::stats().double_destroys, double_before);
    }

    // ------------------------------------------------------------------------------------------------------------------------------------------

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        #[derive(Copy, Clone, Debug)]
        enum Operation {
            Insert(OwnershipClass),
            End(usize),
            Release(usize),
            Forget(usize),
            Get(usize),
        }

        fn arbitrary_class() -> impl Strategy<Value = OwnershipClass> {
            prop_oneof![
                Just(OwnershipClass::Owned),
                Just(OwnershipClass::Borrowed),
                Just(OwnershipClass::Shared),
            ]
        }

        fn arbitrary_op() -> impl Strategy<Value = Operation> {
            prop_oneof![
                arbitrary_class().prop_map(Operation::Insert),
                any::<usize>().prop_map(Operation::End),
                any::<usize>().prop_map(Operation::Release),
                any::<usize>().prop_map(Operation::Forget),
                any::<usize>().prop_map(Operation::Get),
            ]
        }

        proptest! {
            #[test]
            fn owned_handles_end_or_release_exactly_once(operations in prop::collection::vec(arbitrary_op(), 0..80)) {
                let _session = mock::install();
                let binding = sys::binding();
                let mut arena = HandleArena::new();
                take_released();

                let mut issued: Vec<(HandleId<CountedKind>, i64, OwnershipClass)> = Vec::new();
                let mut live: HashMap<i64, OwnershipClass> = HashMap::new();
                let mut ended: Vec<i64> = Vec::new();
                let mut next_raw = 1;

                for op in operations {
                    match op {
                        Operation::Insert(class) => {
                            let id = arena.insert::<CountedKind>(next_raw, class);
                            issued.push((id, next_raw, class));
                            live.insert(next_raw, class);
                            next_raw += 1;
                        }
                        Operation::End(i) if !issued.is_empty() => {
                            let (id, raw, class) = issued[i % issued.len()];
                            let result = arena.end(id);
                            match live.get(&raw) {
                                Some(OwnershipClass::Borrowed) => prop_assert!(result.is_err()),
                                Some(_) => {
                                    prop_assert_eq!(result, Ok(raw));
                                    live.remove(&raw);
                                    ended.push(raw);
                                }
                                None => prop_assert!(result.is_err(), "{:?} {:?} ended twice", id, class),
                            }
                        }
                        Operation::Release(i) if !issued.is_empty() => {
                            let (id, raw, _) = issued[i % issued.len()];
                            let result = arena.try_release(binding, id);
                            match live.get(&raw) {
                                Some(OwnershipClass::Borrowed) | None => prop_assert!(result.is_err()),
                                Some(_) => {
                                    prop_assert!(result.is_ok());
                                    live.remove(&raw);
                                }
                            }
                        }
                        Operation::Forget(i) if !issued.is_empty() => {
                            let (id, raw, _) = issued[i % issued.len()];
                            let result = arena.forget(id);
                            match live.get(&raw) {
                                Some(OwnershipClass::Borrowed) => {
                                    prop_assert!(result.is_ok());
                                    live.remove(&raw);
                                }
                                _ => prop_assert!(result.is_err()),
                            }
                        }
                        Operation::Get(i) if !issued.is_empty() => {
                            let (id, raw, _) = issued[i % issued.len()];
                            prop_assert_eq!(arena.get(id), live.contains_key(&raw).then_some(raw));
                        }
                        _ => {}
                    }

                    prop_assert_eq!(arena.live_count(), live.len());
                }

                let released = take_released();
                for (raw, class) in &released {
                    let original = issued.iter().find(|(_, r, _)| r == raw).map(|(_, _, c)| *c);
                    prop_assert_eq!(original, Some(*class), "borrowed handle {} was released", raw);
                    prop_assert!(!ended.contains(raw), "handle {} was both ended and released", raw);
                    prop_assert_eq!(released.iter().filter(|(r, _)| r == raw).count(), 1);
                }
            }
        }
    }
}
