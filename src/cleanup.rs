use std::sync::Once;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::{ForkResult, fork, getpgrp, setsid};

/// Signal-escalation plan run by the watchdog after it detaches. Each step
/// waits, then signals the whole original process group:
///   grace wait, SIGTERM - let well-behaved children exit
///   SIGHUP             - shells and other processes that ignore SIGTERM
///   SIGKILL            - unconditional, final step
pub const ESCALATION: &[(Duration, Signal)] = &[
    (Duration::from_millis(50), Signal::SIGTERM),
    (Duration::from_millis(150), Signal::SIGHUP),
    (Duration::from_millis(150), Signal::SIGKILL),
];

/// Registers the watchdog exactly once, at process start. A second call is a
/// no-op, so a normal run can never fork twice at exit.
pub fn install() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| unsafe {
        libc::atexit(watchdog_atexit);
    });
}

/// Walks the escalation plan. Delivery errors are swallowed: by the later
/// steps the group is usually already empty, and ESRCH there is the expected
/// outcome, not a fault.
pub fn escalate<S, K>(plan: &[(Duration, Signal)], mut sleep: S, mut kill: K)
where
    S: FnMut(Duration),
    K: FnMut(Signal) -> nix::Result<()>,
{
    for (delay, signal) in plan {
        sleep(*delay);
        let _ = kill(*signal);
    }
}

extern "C" fn watchdog_atexit() {
    let group = getpgrp();
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            // New session, or the sweep would take the watchdog down with it
            let _ = setsid();
            escalate(ESCALATION, thread::sleep, |signal| {
                killpg(group, signal)
            });
            // Bypass atexit handlers in the child
            unsafe { libc::_exit(0) }
        }
        // Parent keeps exiting on its own; if the fork failed the group is
        // left to the OS
        Ok(ForkResult::Parent { .. }) | Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use std::cell::RefCell;

    #[test]
    fn test_escalation_order_and_intervals() {
        assert_eq!(
            ESCALATION
                .iter()
                .map(|(_, s)| *s)
                .collect::<Vec<_>>(),
            vec![Signal::SIGTERM, Signal::SIGHUP, Signal::SIGKILL]
        );
        assert_eq!(ESCALATION[0].0, Duration::from_millis(50));
        assert_eq!(ESCALATION[1].0, Duration::from_millis(150));
        assert_eq!(ESCALATION[2].0, Duration::from_millis(150));
    }

    #[test]
    fn test_escalate_waits_before_each_signal_and_swallows_errors() {
        let trace: RefCell<Vec<String>> = RefCell::new(Vec::new());
        escalate(
            ESCALATION,
            |d| trace.borrow_mut().push(format!("sleep {}ms", d.as_millis())),
            |s| {
                trace.borrow_mut().push(format!("kill {s}"));
                // Group already gone; must not abort the walk
                Err(Errno::ESRCH)
            },
        );
        assert_eq!(
            *trace.borrow(),
            vec![
                "sleep 50ms",
                "kill SIGTERM",
                "sleep 150ms",
                "kill SIGHUP",
                "sleep 150ms",
                "kill SIGKILL",
            ]
        );
    }
}
