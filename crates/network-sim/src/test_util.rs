use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

static NAME_SEQ: AtomicU32 = AtomicU32::new(0);

/// True when namespaces can be created: `ip` is installed and `sudo` works
/// without a password.
pub fn check_privileges() -> bool {
    let ip_works = Command::new("ip")
        .args(["netns", "list"])
        .output()
        .is_ok_and(|o| o.status.success());

    ip_works
        && Command::new("sudo")
            .args(["-n", "true"])
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Longest prefix kept by [`unique_ns_name`].
const NAME_PREFIX_MAX: usize = 6;

/// A namespace name unique across parallel tests. The prefix is cut to a
/// few bytes so the process id and sequence number always survive.
pub fn unique_ns_name(prefix: &str) -> String {
    let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() % 0xffff;
    let prefix: String = prefix.chars().take(NAME_PREFIX_MAX).collect();
    format!("{prefix}_{pid:x}_{seq}")
}
