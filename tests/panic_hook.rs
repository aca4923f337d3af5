//! Отдельный тестовый бинарник: panic hook глобален для процесса.

#[cfg(test)]
mod tests {
    use starpool::{
        dispatch_failsafe,
        dispatch_outcomes,
        errors::InvocationError,
        pool::PoolConfig,
    };
    use std::{
        backtrace::BacktraceStatus,
        panic,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[inline(never)]
    fn explode_on_two(x: u32) -> Result<u32, String> {
        if x == 2 {
            panic!("item {x} exploded");
        }
        Ok(x)
    }

    fn numbers(n: u32) -> Vec<(u32,)> {
        (0..n).map(|i| (i,)).collect()
    }

    #[test]
    fn test_worker_panics_stay_out_of_the_panic_hook() {
        println!("\n=== TEST: Паники воркеров и panic hook ===");
        panic::set_hook(Box::new(|_| {
            HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
        }));

        let config = PoolConfig::default().with_workers(2).with_verbose(false);
        let out = dispatch_failsafe(explode_on_two, numbers(5), &config).unwrap();
        assert_eq!(out, vec![0, 1, 3, 4]);
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 0);

        let outcomes = dispatch_outcomes(explode_on_two, numbers(5), &config).unwrap();
        let failure = outcomes[2].as_ref().unwrap_err();
        assert!(matches!(&failure.error, InvocationError::Panicked(msg) if msg == "item 2 exploded"));
        assert_eq!(failure.backtrace.status(), BacktraceStatus::Captured);
        let trace = failure.backtrace.to_string();
        assert!(trace.contains("explode_on_two"), "{trace}");
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 0);
        println!("  ✓ hook не вызван, backtrace указывает на место паники");

        // Паника вне воркера по-прежнему доходит до hook.
        let caught = panic::catch_unwind(|| explode_on_two(2));
        assert!(caught.is_err());
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);

        let _ = panic::take_hook();
    }
}
