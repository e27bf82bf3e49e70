#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block
)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;

use core::cell::Cell;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;
use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};

use allocator_api2::alloc::{AllocError, Global, Layout};
use proptest::prelude::*;

use itertools::assert_equal;

use allocated::CountingAllocator;

use super::*;
use crate::INITIAL_MAP_SIZE;

/// 128 bytes, so four fit in a buffer and short deques already span several buffers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Big(u32, [u8; 124]);

impl Big {
    fn new(i: usize) -> Self {
        Big(i as u32, [i as u8; 124])
    }
}

fn bigs(range: core::ops::Range<usize>) -> Vec<Big> {
    range.map(Big::new).collect()
}

/// Walks the map and both cursors and checks the structural invariants of the deque.
fn check_invariants<T>(deque: &AllocatedDeque<T>) {
    let map = deque.map.as_ptr();
    let buffer_len = AllocatedDeque::<T>::BUFFER_LEN;
    unsafe {
        let front_slot = deque.front.node.offset_from(map);
        let back_slot = deque.back.node.offset_from(map);
        assert!(0 <= front_slot, "front slot outside the map");
        assert!(front_slot <= back_slot, "front slot after back slot");
        assert!((back_slot as usize) < deque.map_size, "back slot outside the map");

        for i in 0..deque.map_size {
            let slot = *map.add(i);
            let live = front_slot as usize <= i && i <= back_slot as usize;
            assert_eq!(slot.is_some(), live, "slot {i} ownership is wrong");
        }

        for cursor in [deque.front, deque.back] {
            let buffer = (*cursor.node).map(NonNull::as_ptr);
            assert_eq!(Some(cursor.first), buffer);
            assert_eq!(cursor.last, cursor.first.add(buffer_len));
            assert!(cursor.first <= cursor.cur && cursor.cur < cursor.last);
        }

        let mut walk = deque.front;
        let mut counted = 0;
        while walk != deque.back {
            walk.advance_one();
            counted += 1;
        }
        assert_eq!(counted, deque.len());
    }
}

/// Fails every allocation once its budget of successful allocations is spent.
struct FailingAllocator {
    inner: CountingAllocator<Global>,
    budget: Cell<usize>,
}

impl FailingAllocator {
    fn unlimited() -> Self {
        Self {
            inner: CountingAllocator::default(),
            budget: Cell::new(usize::MAX),
        }
    }

    fn set_budget(&self, budget: usize) {
        self.budget.set(budget);
    }
}

unsafe impl Allocator for FailingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let budget = self.budget.get();
        if budget == 0 {
            return Err(AllocError);
        }
        self.budget.set(budget - 1);
        self.inner.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

/// Runs `op` on a fresh deque of `initial` elements with every possible allocation budget,
/// until it succeeds. Each failure must leave the deque untouched; the success must match
/// `expected` applied to a model. Returns how many budgets failed.
fn check_rollback(
    initial: usize,
    op: impl Fn(&mut AllocatedDeque<Big>, &FailingAllocator) -> DequeResult<()>,
    expected: impl Fn(&mut VecDeque<Big>),
) -> usize {
    let mut failures = 0;
    for budget in 0.. {
        let alloc = FailingAllocator::unlimited();
        let mut deque = AllocatedDeque::from_iter_in(&alloc, bigs(0..initial)).unwrap();
        alloc.set_budget(budget);
        let result = op(&mut deque, &alloc);
        alloc.set_budget(usize::MAX);
        check_invariants(&*deque);

        let done = match result {
            Err(err) => {
                assert!(err.is_alloc_error(), "unexpected error {err}");
                assert_equal(deque.iter(), bigs(0..initial).iter());
                failures += 1;
                false
            }
            Ok(()) => {
                let mut model: VecDeque<Big> = bigs(0..initial).into_iter().collect();
                expected(&mut model);
                assert_equal(deque.iter(), model.iter());
                true
            }
        };

        core::mem::drop(deque);
        assert_eq!(alloc.inner.net_allocations(), 0);
        assert_eq!(alloc.inner.net_bytes_allocated(), 0);
        if done {
            break;
        }
    }
    failures
}

#[test]
fn test_constructor() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let deque = AllocatedDeque::<u32>::new_in(&alloc)?;

    check_invariants(&*deque);
    assert_eq!(deque.len(), 0);
    assert!(deque.is_empty());
    assert_eq!(deque.front(), None);
    assert_eq!(deque.back(), None);
    assert_eq!(deque.get(0), None);
    assert_eq!(deque.at(0), Err(DequeError::OutOfRange { index: 0, len: 0 }));
    assert_equal(deque.iter(), &[] as &[u32]);
    assert_eq!(deque.map_capacity(), INITIAL_MAP_SIZE);
    assert_eq!(deque.map_reallocations(), 0);

    // The map and a single buffer.
    assert_eq!(alloc.n_allocations(), 2);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes_allocated(), 0);
    Ok(())
}

#[test]
fn test_buffer_allocated_on_demand() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = AllocatedDeque::<u32>::new_in(&alloc)?;
    assert_eq!(AllocatedDeque::<u32>::BUFFER_LEN, 128);

    unsafe {
        for i in 0..127 {
            deque.push_back_in(&alloc, i)?;
        }
        assert_eq!(alloc.n_allocations(), 2);

        // The last free position is filled and the next buffer is attached.
        deque.push_back_in(&alloc, 127)?;
        assert_eq!(alloc.n_allocations(), 3);
        check_invariants(&*deque);

        assert_eq!(deque.pop_back_in(&alloc), Some(127));
        assert_eq!(alloc.net_allocations(), 2);
        check_invariants(&*deque);
    }

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_first_map_growth() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = AllocatedDeque::<u32>::new_in(&alloc)?;

    unsafe {
        // The first buffer sits in slot 3 of 8; slots 3..=7 fill before the map must grow.
        for i in 0..639 {
            deque.push_back_in(&alloc, i)?;
        }
        assert_eq!(deque.map_reallocations(), 0);
        assert_eq!(deque.map_capacity(), 8);

        deque.push_back_in(&alloc, 639)?;
        assert_eq!(deque.map_reallocations(), 1);
        assert_eq!(deque.map_capacity(), 18);
    }
    check_invariants(&*deque);
    assert_equal(deque.iter().copied(), 0..640u32);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_push_back_pop_front() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = AllocatedDeque::<Big>::new_in(&alloc)?;

    unsafe {
        for i in 0..100 {
            deque.push_back_in(&alloc, Big::new(i))?;
            assert_eq!(deque.back(), Some(&Big::new(i)));
            assert_eq!(deque.front(), Some(&Big::new(0)));
        }
        check_invariants(&*deque);
        assert_eq!(deque.len(), 100);

        for i in 0..100 {
            assert_eq!(deque.pop_front_in(&alloc), Some(Big::new(i)));
            check_invariants(&*deque);
        }
        assert!(deque.is_empty());
        assert_eq!(deque.pop_front_in(&alloc), None);
        assert_eq!(deque.pop_back_in(&alloc), None);
    }

    // Emptied buffers are released as the front passes them.
    assert_eq!(alloc.net_allocations(), 2);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_push_front_pop_back() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = AllocatedDeque::<Big>::new_in(&alloc)?;

    unsafe {
        for i in 0..100 {
            deque.push_front_in(&alloc, Big::new(i))?;
            assert_eq!(deque.front(), Some(&Big::new(i)));
        }
        check_invariants(&*deque);
        assert_equal(deque.iter(), bigs(0..100).iter().rev());

        for i in 0..100 {
            assert_eq!(deque.pop_back_in(&alloc), Some(Big::new(i)));
            check_invariants(&*deque);
        }
        assert!(deque.is_empty());
    }
    assert_eq!(alloc.net_allocations(), 2);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_emplace_returns_new_element() -> Result<(), Box<dyn Error>> {
    let mut deque: Deque<u32> = Deque::new();
    *deque.emplace_back(1)? += 10;
    *deque.emplace_front(2)? += 20;
    *deque.emplace(1, 3)? += 30;
    assert_equal(deque.iter().copied(), [22u32, 33, 11]);
    Ok(())
}

#[test]
fn test_scenario_emplace_insert_erase() -> Result<(), Box<dyn Error>> {
    let mut deque = Deque::from([1, 2, 3, 4, 5, 6, 7, 8]);

    deque.emplace_front(0)?;
    assert_eq!(deque.front(), Some(&0));
    deque.emplace_back(9)?;
    assert_eq!(deque.back(), Some(&9));

    let pos = (deque.begin() + 1).index();
    deque.insert(pos, -1)?;
    assert_equal(deque.iter().copied(), [0, -1, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(deque.len(), 11);

    assert_eq!(deque.remove(pos), Some(-1));
    assert_equal(deque.iter().copied(), 0..10);
    assert_eq!(deque.len(), 10);
    check_invariants(deque.raw());
    Ok(())
}

#[test]
fn test_scenario_bulk_insert() -> Result<(), Box<dyn Error>> {
    let mut deque: Deque<i32> = (1..=8).collect();

    let end = deque.end().index();
    deque.insert_iter(end, [9, 10, 11])?;
    assert_equal(deque.iter().copied(), 1..=11);
    assert_eq!(deque.len(), 11);

    let begin = deque.begin().index();
    deque.insert_n(begin, 3, 0)?;
    assert_equal(deque.iter().copied(), [0, 0, 0].into_iter().chain(1..=11));
    assert_eq!(deque.len(), 14);
    check_invariants(deque.raw());
    Ok(())
}

#[test]
fn test_round_trip() {
    let list = [5, 3, 8, 1, 9, 2, 7];
    let deque = Deque::from(list);
    assert_equal(deque.iter().copied(), list);
    assert_equal(deque.iter().rev().copied(), list.iter().rev().copied());

    let wide: Deque<Big> = bigs(0..37).into_iter().collect();
    assert_equal(wide.iter(), bigs(0..37).iter());
    assert_equal(wide.iter().rev(), bigs(0..37).iter().rev());
    assert_equal(wide.into_iter().rev(), bigs(0..37).into_iter().rev());
}

#[test]
fn test_random_access_consistency() -> Result<(), Box<dyn Error>> {
    let mut deque: Deque<Big> = Deque::new();
    for i in 0..30 {
        deque.push_back(Big::new(100 + i))?;
        deque.push_front(Big::new(i))?;
    }

    let begin = deque.begin();
    for i in 0..deque.len() {
        let through_cursor = (begin + i as isize).get();
        assert_eq!(through_cursor, Some(&deque[i]));
        assert_eq!(deque.at(i)?, &deque[i]);
        assert_eq!(deque.get(i), Some(&deque[i]));
    }
    assert_eq!(deque.end() - deque.begin(), deque.len() as isize);
    assert_eq!(
        deque.at(60),
        Err(DequeError::OutOfRange { index: 60, len: 60 })
    );
    Ok(())
}

#[test]
fn test_insert_erase_inverse_at_every_position() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let original = bigs(0..21);
    let mut deque = Deque::try_from_iter_in(&alloc, original.iter().cloned())?;

    for index in 0..=original.len() {
        deque.insert(index, Big::new(999))?;
        check_invariants(deque.raw());
        assert_eq!(deque[index], Big::new(999));
        assert_eq!(deque.len(), original.len() + 1);

        assert_eq!(deque.remove(index), Some(Big::new(999)));
        check_invariants(deque.raw());
        assert_equal(deque.iter(), original.iter());
    }

    for index in 0..=original.len() {
        deque.insert_n(index, 9, Big::new(999))?;
        check_invariants(deque.raw());
        deque.erase(index..index + 9)?;
        check_invariants(deque.raw());
        assert_equal(deque.iter(), original.iter());
    }

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_insert_out_of_range() -> Result<(), Box<dyn Error>> {
    let mut deque = Deque::from([1, 2, 3]);
    assert_eq!(
        deque.insert(4, 0),
        Err(DequeError::OutOfRange { index: 4, len: 3 })
    );
    assert!(deque.insert_n(5, 2, 0).is_err());
    assert!(deque.erase(2..5).is_err());
    #[allow(clippy::reversed_empty_ranges)]
    let reversed = deque.erase(2..1);
    assert!(reversed.is_err());
    assert_eq!(deque.remove(3), None);
    assert_equal(deque.iter().copied(), [1, 2, 3]);

    deque.insert_n(1, 0, 7)?;
    deque.erase(1..1)?;
    assert_equal(deque.iter().copied(), [1, 2, 3]);
    Ok(())
}

#[test]
fn test_erase_ranges() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = Deque::try_from_iter_in(&alloc, bigs(0..40))?;

    deque.erase(2..5)?;
    deque.erase(30..)?;
    deque.erase(..=1)?;
    check_invariants(deque.raw());
    let expected: Vec<Big> = (5..33).map(Big::new).collect();
    assert_equal(deque.iter(), expected.iter());

    deque.erase(..)?;
    assert!(deque.is_empty());
    check_invariants(deque.raw());

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_amortized_growth() -> Result<(), Box<dyn Error>> {
    let mut deque: Deque<u64> = Deque::new();
    for i in 0..100_000 {
        deque.push_back(i)?;
    }
    assert_eq!(deque.len(), 100_000);
    assert!(deque.map_reallocations() >= 1);
    assert!(
        deque.map_reallocations() <= 20,
        "{} map reallocations for 100000 pushes",
        deque.map_reallocations()
    );

    let mut both: Deque<u64> = Deque::new();
    for i in 0..100_000 {
        if i % 2 == 0 {
            both.push_back(i)?;
        } else {
            both.push_front(i)?;
        }
    }
    assert!(both.map_reallocations() <= 40);
    check_invariants(both.raw());
    Ok(())
}

#[test]
fn test_recentre_instead_of_grow() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = AllocatedDeque::<Big>::new_in(&alloc)?;

    unsafe {
        // Walk a short deque towards the back of the map; the live run stays small, so the
        // map is recentred in place rather than enlarged.
        for i in 0..1000 {
            deque.push_back_in(&alloc, Big::new(i))?;
            if deque.len() > 4 {
                deque.pop_front_in(&alloc);
            }
            check_invariants(&*deque);
        }
    }
    assert_eq!(deque.map_capacity(), INITIAL_MAP_SIZE);
    assert!(deque.map_reallocations() > 0);
    assert_equal(deque.iter(), bigs(996..1000).iter());

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_swap() -> Result<(), Box<dyn Error>> {
    let mut a: Deque<Big> = bigs(0..10).into_iter().collect();
    let mut b: Deque<Big> = bigs(50..53).into_iter().collect();
    let a_front: *const Big = &a[0];

    a.swap(&mut b);
    assert_eq!(a.len(), 3);
    assert_eq!(b.len(), 10);
    assert!(core::ptr::eq(&b[0], a_front));

    a.push_back(Big::new(99))?;
    a[0] = Big::new(77);
    assert_equal(b.iter(), bigs(0..10).iter());
    assert_equal(
        a.iter().map(|big| big.0),
        [77u32, 51, 52, 99],
    );
    Ok(())
}

#[test]
fn test_clear_keeps_one_buffer() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = Deque::try_from_iter_in(&alloc, bigs(0..50))?;
    deque.clear();
    assert!(deque.is_empty());
    check_invariants(deque.raw());
    assert_eq!(alloc.net_allocations(), 2);

    deque.push_front(Big::new(1))?;
    deque.push_back(Big::new(2))?;
    assert_eq!(deque.len(), 2);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_resize_and_truncate() -> Result<(), Box<dyn Error>> {
    let mut deque = Deque::from([1, 2, 3]);
    deque.resize(6, 9)?;
    assert_equal(deque.iter().copied(), [1, 2, 3, 9, 9, 9]);

    deque.resize(2, 0)?;
    assert_equal(deque.iter().copied(), [1, 2]);

    let mut next = 10;
    deque.resize_with(5, || {
        next += 1;
        next
    })?;
    assert_equal(deque.iter().copied(), [1, 2, 11, 12, 13]);

    deque.truncate(10);
    assert_eq!(deque.len(), 5);
    deque.truncate(1);
    assert_equal(deque.iter().copied(), [1]);
    check_invariants(deque.raw());
    Ok(())
}

#[test]
fn test_constructors() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    {
        let filled = Deque::from_elem_in(&alloc, 10, Big::new(4))?;
        assert_equal(filled.iter(), vec![Big::new(4); 10].iter());
        check_invariants(filled.raw());

        let defaulted = Deque::<u32, _>::with_default_in(&alloc, 300)?;
        assert_eq!(defaulted.len(), 300);
        assert!(defaulted.iter().all(|v| *v == 0));
        check_invariants(defaulted.raw());

        // A lower size hint of zero falls back to pushing.
        let filtered = Deque::try_from_iter_in(&alloc, (0..100).filter(|v| v % 3 == 0))?;
        assert_equal(filtered.iter().copied(), (0..100).step_by(3));
        check_invariants(filtered.raw());

        let copy = filtered.try_clone()?;
        assert_eq!(copy, filtered);
        check_invariants(copy.raw());

        let empty = Deque::from_elem_in(&alloc, 0, 1u8)?;
        assert!(empty.is_empty());
        check_invariants(empty.raw());
    }
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(Deque::from_elem(3, 'x').len(), 3);
    assert_eq!(Deque::<u8>::with_default(2)[1], 0);
    Ok(())
}

#[test]
fn test_clone_from() {
    let source: Deque<Big> = bigs(0..20).into_iter().collect();

    let mut shorter: Deque<Big> = bigs(100..103).into_iter().collect();
    shorter.clone_from(&source);
    assert_eq!(shorter, source);
    check_invariants(shorter.raw());

    let mut longer: Deque<Big> = bigs(100..150).into_iter().collect();
    longer.clone_from(&source);
    assert_eq!(longer, source);
    check_invariants(longer.raw());
}

#[test]
fn test_assign_shrinks_and_grows() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    {
        let mut deque = Deque::try_from_iter_in(&alloc, bigs(0..50))?;
        deque.assign(3, Big::new(9))?;
        check_invariants(deque.raw());
        assert_equal(deque.iter(), [Big::new(9), Big::new(9), Big::new(9)].iter());
        // The map and the one buffer holding the three survivors.
        assert_eq!(alloc.net_allocations(), 2);

        deque.assign(30, Big::new(7))?;
        check_invariants(deque.raw());
        assert_eq!(deque.len(), 30);
        assert!(deque.iter().all(|elem| *elem == Big::new(7)));

        deque.assign(0, Big::new(1))?;
        assert!(deque.is_empty());
        check_invariants(deque.raw());
    }
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_assign_iter_shrinks_and_grows() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    {
        let mut deque = Deque::try_from_iter_in(&alloc, bigs(0..50))?;
        deque.push_front(Big::new(99))?;

        deque.assign_iter(bigs(200..207))?;
        check_invariants(deque.raw());
        assert_equal(deque.iter(), bigs(200..207).iter());

        // Not exact-size: the tail beyond the current length is appended one by one.
        deque.assign_iter((300..340).map(Big::new).filter(|_| true))?;
        check_invariants(deque.raw());
        assert_equal(deque.iter(), bigs(300..340).iter());

        deque.assign_iter(core::iter::empty())?;
        assert!(deque.is_empty());
        check_invariants(deque.raw());
    }
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_assign_rolls_back_at_every_step() {
    let failures = check_rollback(
        5,
        |deque, alloc| unsafe { deque.assign_in(alloc, 60, Big::new(9)) },
        |model| {
            model.clear();
            model.resize(60, Big::new(9));
        },
    );
    assert!(failures >= 10);
}

#[test]
fn test_comparisons() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let a = Deque::from([1, 2, 3]);
    let b = Deque::try_from_iter_in(&alloc, [1, 2, 3])?;
    assert_eq!(a, b);
    assert!(a != Deque::from([1, 2]));
    assert!(Deque::from([1, 2]) < a);
    assert!(Deque::from([1, 3]) > a);

    let hash = |deque: &Deque<i32>| {
        let mut hasher = DefaultHasher::new();
        deque.hash(&mut hasher);
        hasher.finish()
    };
    assert_eq!(hash(&a), hash(&Deque::from([1, 2, 3])));
    assert_eq!(std::format!("{a:?}"), "[1, 2, 3]");
    Ok(())
}

#[test]
fn test_iterators() {
    let mut deque: Deque<Big> = bigs(0..50).into_iter().collect();

    let mut iter = deque.iter();
    assert_eq!(iter.len(), 50);
    assert_eq!(iter.nth(10), Some(&Big::new(10)));
    assert_eq!(iter.nth_back(10), Some(&Big::new(39)));
    assert_eq!(iter.len(), 28);
    assert_eq!(iter.next_back(), Some(&Big::new(38)));
    assert_eq!(iter.nth(100), None);
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next_back(), None);

    for big in deque.iter_mut().skip(45) {
        big.0 += 1000;
    }
    assert_eq!(deque[49].0, 1049);
    assert_eq!(deque.iter().last(), Some(&deque[49]));
    assert_eq!(deque.iter().count(), 50);

    let mut owned = deque.into_iter();
    assert_eq!(owned.next(), Some(Big::new(0)));
    assert_eq!(owned.next_back().map(|big| big.0), Some(1049));
    assert_eq!(owned.len(), 48);
}

#[test]
fn test_partially_consumed_into_iter_frees_everything() {
    let alloc = CountingAllocator::default();
    let deque = Deque::try_from_iter_in(&alloc, bigs(0..30)).unwrap();
    let mut iter = deque.into_iter();
    iter.nth(5);
    core::mem::drop(iter);
    assert_eq!(alloc.net_allocations(), 0);
}

#[test]
fn test_cursors() {
    let mut deque: Deque<Big> = bigs(0..20).into_iter().collect();

    let mut cursor = deque.begin();
    cursor.move_prev();
    assert_eq!(cursor, deque.begin());
    for i in 0..20 {
        assert_eq!(cursor.index(), i);
        assert_eq!(cursor.get(), Some(&Big::new(i)));
        cursor.move_next();
    }
    assert!(cursor.is_end());
    cursor.move_next();
    assert_eq!(cursor, deque.end());
    assert_eq!(cursor.get(), None);

    let mid = deque.cursor_at(7).unwrap();
    assert!(deque.begin() < mid && mid < deque.end());
    assert_eq!(mid.peek(-3), Some(&Big::new(4)));
    assert_eq!(mid.peek(13), None);
    assert!(mid.offset(-8).is_none());
    assert!(mid.offset(14).is_none());
    assert_eq!((mid - 7), deque.begin());
    assert_eq!(deque.cursor_at(20), Some(deque.end()));
    assert!(deque.cursor_at(21).is_none());

    let mut cursor = deque.cursor_mut_at(3).unwrap();
    cursor.get_mut().unwrap().0 = 300;
    assert!(cursor.seek(10));
    assert_eq!(cursor.index(), 13);
    assert!(!cursor.seek(-14));
    cursor.move_prev();
    assert_eq!(cursor.as_cursor().get(), Some(&Big::new(12)));
    assert_eq!(deque[3].0, 300);
}

#[test]
#[should_panic(expected = "cursor moved out of range")]
fn test_cursor_add_out_of_range_panics() {
    let deque = Deque::from([1, 2, 3]);
    let _ = deque.begin() + 4;
}

#[test]
#[should_panic(expected = "index out of bounds")]
fn test_index_out_of_range_panics() {
    let deque = Deque::from([1, 2, 3]);
    let _ = deque[3];
}

#[test]
fn test_one_element_per_buffer() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut deque = Deque::<[u8; 1024], _>::new_in(&alloc)?;
    assert_eq!(AllocatedDeque::<[u8; 1024]>::BUFFER_LEN, 1);

    for i in 0..20u8 {
        deque.push_back([i; 1024])?;
        deque.push_front([100 + i; 1024])?;
    }
    deque.insert(20, [255; 1024])?;
    check_invariants(deque.raw());
    assert_eq!(deque[20][0], 255);
    assert_eq!(deque[0][0], 119);
    assert_eq!(deque[40][0], 19);

    assert_eq!(deque.remove(20).map(|b| b[0]), Some(255));
    deque.erase(5..35)?;
    check_invariants(deque.raw());
    assert_eq!(deque.len(), 10);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_push_failure_leaves_deque_unchanged() -> Result<(), Box<dyn Error>> {
    let alloc = FailingAllocator::unlimited();
    let mut deque = AllocatedDeque::<Big>::new_in(&alloc)?;

    unsafe {
        for i in 0..3 {
            deque.push_back_in(&alloc, Big::new(i))?;
        }
        alloc.set_budget(0);
        let err = deque.push_back_in(&alloc, Big::new(3)).unwrap_err();
        assert!(matches!(err, DequeError::AllocFailed { .. }));
        check_invariants(&*deque);
        assert_equal(deque.iter(), bigs(0..3).iter());

        let err = deque.push_front_in(&alloc, Big::new(9)).unwrap_err();
        assert!(err.is_alloc_error());
        check_invariants(&*deque);
        assert_equal(deque.iter(), bigs(0..3).iter());

        alloc.set_budget(usize::MAX);
        deque.push_back_in(&alloc, Big::new(3))?;
    }
    assert_equal(deque.iter(), bigs(0..4).iter());

    core::mem::drop(deque);
    assert_eq!(alloc.inner.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_construction_rolls_back_at_every_step() {
    for budget in 0..20 {
        let alloc = FailingAllocator::unlimited();
        alloc.set_budget(budget);
        let result = AllocatedDeque::from_elem_in(&alloc, 30, Big::new(1));
        // 30 elements of a 4-element buffer take the map plus 8 buffers.
        assert_eq!(result.is_ok(), budget >= 9);
        if let Ok(deque) = result {
            check_invariants(&*deque);
            assert_eq!(deque.len(), 30);
        }
        assert_eq!(alloc.inner.net_allocations(), 0);
    }
}

#[test]
fn test_bulk_insert_rolls_back_at_every_step() {
    let failures = check_rollback(
        20,
        |deque, alloc| unsafe { deque.insert_n_in(alloc, 3, 40, Big::new(7)) },
        |model| {
            for _ in 0..40 {
                model.insert(3, Big::new(7));
            }
        },
    );
    assert!(failures >= 10);

    let failures = check_rollback(
        20,
        |deque, alloc| unsafe { deque.insert_iter_in(alloc, 17, bigs(500..530)) },
        |model| {
            for (offset, big) in bigs(500..530).into_iter().enumerate() {
                model.insert(17 + offset, big);
            }
        },
    );
    assert!(failures >= 7);
}

#[test]
fn test_growth_rolls_back_at_every_step() {
    // Both batches need a larger map and 50 buffers; a failure of any of them is undone.
    let failures = check_rollback(
        2,
        |deque, alloc| unsafe { deque.insert_iter_in(alloc, 0, bigs(1000..1200)) },
        |model| {
            for (offset, big) in bigs(1000..1200).into_iter().enumerate() {
                model.insert(offset, big);
            }
        },
    );
    assert!(failures >= 50);

    let failures = check_rollback(
        2,
        |deque, alloc| unsafe { deque.insert_n_in(alloc, 2, 200, Big::new(5)) },
        |model| model.extend(core::iter::repeat(Big::new(5)).take(200)),
    );
    assert!(failures >= 50);
}

#[test]
fn test_resize_rolls_back_at_every_step() {
    let failures = check_rollback(
        5,
        |deque, alloc| unsafe { deque.resize_with_in(alloc, 60, || Big::new(42)) },
        |model| model.resize(60, Big::new(42)),
    );
    assert!(failures >= 10);
}

/// Counts live instances and panics once its clone budget runs out.
#[derive(Debug)]
struct Tracked {
    value: u32,
    live: Rc<Cell<isize>>,
    clones_left: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(value: u32, live: &Rc<Cell<isize>>, clones_left: &Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self {
            value,
            live: live.clone(),
            clones_left: clones_left.clone(),
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        let left = self.clones_left.get();
        if left == 0 {
            panic!("clone budget exhausted");
        }
        self.clones_left.set(left - 1);
        Self::new(self.value, &self.live, &self.clones_left)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

#[test]
fn test_panicking_clone_rolls_back() {
    let alloc = CountingAllocator::default();
    let live = Rc::new(Cell::new(0));
    let clones_left = Rc::new(Cell::new(0));
    let mut deque =
        Deque::try_from_iter_in(&alloc, (0..100).map(|i| Tracked::new(i, &live, &clones_left)))
            .unwrap();
    let allocations = alloc.net_allocations();

    for index in [10, 80, 0, 100] {
        clones_left.set(20);
        let value = Tracked::new(7, &live, &clones_left);
        let result = catch_unwind(AssertUnwindSafe(|| deque.insert_n(index, 50, value)));
        assert!(result.is_err());

        check_invariants(deque.raw());
        assert_equal(deque.iter().map(|t| t.value), 0..100u32);
        assert_eq!(live.get(), 100);
        assert_eq!(alloc.net_allocations(), allocations);
    }

    clones_left.set(usize::MAX);
    deque.insert_n(50, 50, Tracked::new(7, &live, &clones_left)).unwrap();
    assert_eq!(live.get(), 150);
    core::mem::drop(deque);
    assert_eq!(live.get(), 0);
    assert_eq!(alloc.net_allocations(), 0);
}

#[test]
fn test_short_iterator_rolls_back() {
    /// Reports more elements than it yields.
    struct Liar(core::ops::Range<u32>);

    impl Iterator for Liar {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.0.next()
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            let len = self.0.len() + 5;
            (len, Some(len))
        }
    }

    impl ExactSizeIterator for Liar {}

    let alloc = CountingAllocator::default();
    let mut deque = Deque::try_from_iter_in(&alloc, 0..300u32).unwrap();
    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_iter(200, Liar(0..200))));
    assert!(result.is_err());
    check_invariants(deque.raw());
    assert_equal(deque.iter().copied(), 0..300u32);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
}

struct PanicOnDrop {
    value: u32,
    armed: bool,
}

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        if self.armed {
            panic!("drop failed");
        }
    }
}

#[test]
fn test_panicking_drop_during_erase_keeps_structure() {
    let alloc = CountingAllocator::default();
    let elements = (0..40).map(|value| PanicOnDrop {
        value,
        armed: value == 12,
    });
    let mut deque = Deque::try_from_iter_in(&alloc, elements).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| deque.erase(10..20)));
    assert!(result.is_err());

    check_invariants(deque.raw());
    assert_equal(deque.iter().map(|e| e.value), (0..10u32).chain(20..40));

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
}

/// 128 bytes, so a few dozen span many buffers.
struct BigPanicOnDrop(PanicOnDrop, #[allow(dead_code)] [u8; 120]);

fn big_panic_on_drop(value: u32, armed: bool) -> BigPanicOnDrop {
    BigPanicOnDrop(PanicOnDrop { value, armed }, [0; 120])
}

#[test]
fn test_panicking_drop_during_truncate_releases_buffers() {
    let alloc = CountingAllocator::default();
    let elements = (0..40).map(|value| big_panic_on_drop(value, value == 20));
    let mut deque = Deque::try_from_iter_in(&alloc, elements).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| deque.truncate(2)));
    assert!(result.is_err());

    check_invariants(deque.raw());
    assert_equal(deque.iter().map(|e| e.0.value), 0..2u32);
    // The map and the one buffer still in use.
    assert_eq!(alloc.net_allocations(), 2);

    // Grow far enough to reuse the slots the truncation emptied and to move the map.
    let reallocations = deque.map_reallocations();
    for value in 0..2000 {
        deque.push_back(big_panic_on_drop(value, false)).unwrap();
    }
    assert!(deque.map_reallocations() > reallocations);
    check_invariants(deque.raw());
    assert_eq!(deque.len(), 2002);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
}

#[test]
fn test_panicking_drop_during_clear_drops_the_rest() {
    let alloc = CountingAllocator::default();
    let live = Rc::new(Cell::new(0));
    let clones_left = Rc::new(Cell::new(0));
    let mut deque = Deque::try_from_iter_in(
        &alloc,
        (0..40).map(|i| (Tracked::new(i, &live, &clones_left), big_panic_on_drop(i, i == 5))),
    )
    .unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| deque.clear()));
    assert!(result.is_err());

    check_invariants(deque.raw());
    assert!(deque.is_empty());
    assert_eq!(live.get(), 0);

    core::mem::drop(deque);
    assert_eq!(alloc.net_allocations(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    PushBack(u32),
    PushFront(u32),
    PopBack,
    PopFront,
    Insert(usize, u32),
    Remove(usize),
    InsertN(usize, usize, u32),
    Erase(usize, usize),
    Truncate(usize),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::PushBack),
        4 => any::<u32>().prop_map(Op::PushFront),
        2 => Just(Op::PopBack),
        2 => Just(Op::PopFront),
        2 => (any::<usize>(), any::<u32>()).prop_map(|(i, v)| Op::Insert(i, v)),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => (any::<usize>(), 0..12usize, any::<u32>()).prop_map(|(i, n, v)| Op::InsertN(i, n, v)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Erase(a, b)),
        1 => any::<usize>().prop_map(Op::Truncate),
        1 => Just(Op::Clear),
    ]
}

fn big(value: u32) -> Big {
    Big(value, [value as u8; 124])
}

proptest! {
    #[test]
    fn test_matches_vecdeque(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let alloc = CountingAllocator::default();
        let mut deque = Deque::new_in(&alloc)?;
        let mut model: VecDeque<Big> = VecDeque::new();

        for op in ops {
            let len = model.len();
            match op {
                Op::PushBack(v) => {
                    deque.push_back(big(v))?;
                    model.push_back(big(v));
                }
                Op::PushFront(v) => {
                    deque.push_front(big(v))?;
                    model.push_front(big(v));
                }
                Op::PopBack => {
                    prop_assert_eq!(deque.pop_back(), model.pop_back());
                }
                Op::PopFront => {
                    prop_assert_eq!(deque.pop_front(), model.pop_front());
                }
                Op::Insert(i, v) => {
                    let index = i % (len + 1);
                    deque.insert(index, big(v))?;
                    model.insert(index, big(v));
                }
                Op::Remove(i) => {
                    let index = i % (len + 1);
                    prop_assert_eq!(deque.remove(index), model.remove(index));
                }
                Op::InsertN(i, n, v) => {
                    let index = i % (len + 1);
                    deque.insert_n(index, n, big(v))?;
                    for _ in 0..n {
                        model.insert(index, big(v));
                    }
                }
                Op::Erase(a, b) => {
                    let start = a % (len + 1);
                    let end = start + b % (len - start + 1);
                    deque.erase(start..end)?;
                    model.drain(start..end);
                }
                Op::Truncate(n) => {
                    let n = n % (len + 1);
                    deque.truncate(n);
                    model.truncate(n);
                }
                Op::Clear => {
                    deque.clear();
                    model.clear();
                }
            }

            check_invariants(deque.raw());
            prop_assert_eq!(deque.len(), model.len());
            prop_assert_eq!(deque.front(), model.front());
            prop_assert_eq!(deque.back(), model.back());
            assert_equal(deque.iter(), model.iter());
            assert_equal(deque.iter().rev(), model.iter().rev());
        }

        core::mem::drop(deque);
        prop_assert_eq!(alloc.net_allocations(), 0);
        prop_assert_eq!(alloc.net_bytes_allocated(), 0);
    }
}
