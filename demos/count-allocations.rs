use rand::Rng;

use allocated::CountingAllocator;

use allocated_deque::{AllocatedDeque, DequeError};

/// Prints `run,len,allocations,bytes,map_capacity,map_reallocations` after every operation of a
/// random push/pop workload, as CSV.
fn main() -> Result<(), DequeError> {
    println!("run,len,n_allocations,n_bytes_allocated,map_capacity,map_reallocations");

    for run in 0..10 {
        let alloc = CountingAllocator::default();
        let mut deque = AllocatedDeque::<u64>::new_in(&alloc)?;

        let mut rng = rand::thread_rng();

        for _ in 0..10_000 {
            let value: u64 = rng.gen();

            // Biased towards growth so the map has to grow as well as recentre.
            match rng.gen_range(0..10) {
                0..=3 => unsafe { deque.push_back_in(&alloc, value)? },
                4..=6 => unsafe { deque.push_front_in(&alloc, value)? },
                7 | 8 => {
                    unsafe { deque.pop_front_in(&alloc) };
                }
                _ => {
                    unsafe { deque.pop_back_in(&alloc) };
                }
            }

            println!(
                "{},{},{},{},{},{}",
                run,
                deque.len(),
                alloc.n_allocations(),
                alloc.n_bytes_allocated(),
                deque.map_capacity(),
                deque.map_reallocations()
            );
        }

        std::mem::drop(deque);

        assert_eq!(alloc.net_allocations(), 0);
    }

    Ok(())
}
