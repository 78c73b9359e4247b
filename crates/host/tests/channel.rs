use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use host::SimClock;
use kernel::frontend::HOST_CALL_WORDS;
use kernel::{Frontend, HostCallBuffer, HostTransport};

/// Fails the test if two requests are ever in the buffer at once, or if a
/// request's words do not all belong to the same caller.
#[derive(Default)]
struct Checker {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    torn: AtomicUsize,
    seen: Mutex<Vec<u64>>,
}

impl HostTransport for Checker {
    fn notify(&self, buf: &mut HostCallBuffer) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let n = buf.read(0);
        for _ in 0..50 {
            std::hint::spin_loop();
        }
        for slot in 1..HOST_CALL_WORDS {
            if buf.read(slot) != n * 100 + slot as u64 {
                self.torn.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.seen.lock().unwrap().push(n);
        buf.write(0, n * 2);

        self.busy.store(false, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_calls_never_share_the_buffer() {
    const THREADS: u64 = 8;
    const CALLS: u64 = 200;

    let frontend = Frontend::new(Checker::default(), SimClock::new());
    std::thread::scope(|s| {
        for t in 1..=THREADS {
            let frontend = &frontend;
            s.spawn(move || {
                for i in 0..CALLS {
                    let n = t * 1000 + i;
                    let args: [u64; 7] = std::array::from_fn(|k| n * 100 + k as u64 + 1);
                    assert_eq!(frontend.call(n, args), (n * 2) as i64);
                }
            });
        }
    });

    let checker = frontend.transport();
    assert_eq!(checker.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(checker.torn.load(Ordering::SeqCst), 0);
    assert_eq!(checker.seen.lock().unwrap().len() as u64, THREADS * CALLS);
    assert_eq!(frontend.stats().calls, THREADS * CALLS);
}

#[test]
fn short_argument_lists_are_zero_padded() {
    struct Last(Mutex<[u64; HOST_CALL_WORDS]>);
    impl HostTransport for Last {
        fn notify(&self, buf: &mut HostCallBuffer) {
            let mut words = [0; HOST_CALL_WORDS];
            for (slot, w) in words.iter_mut().enumerate() {
                *w = buf.read(slot);
            }
            *self.0.lock().unwrap() = words;
            buf.write(0, 0);
        }
    }

    let frontend = Frontend::new(Last(Mutex::new([0; HOST_CALL_WORDS])), SimClock::new());
    // Stale words from a full call must not leak into the next one.
    frontend.call(9, [1, 2, 3, 4, 5, 6, 7]);
    frontend.call(10, [42]);
    assert_eq!(
        *frontend.transport().0.lock().unwrap(),
        [10, 42, 0, 0, 0, 0, 0, 0]
    );
}
