//! Production panic hook for capturing panics before process termination.
//!
//! Installs a global panic hook that:
//! - Logs panic info to stderr (for container logs)
//! - Captures file:line:column location
//! - Optionally reports to Sentry (behind feature flag)
//! - Calls the original hook for default behavior
//!
//! Installed first thing in `coord-agent`'s `main()`, before the async
//! runtime starts, so a panic anywhere in the MCP server, HTTP status
//! surface, or CLI subcommands is logged the same way.

use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag to track if panic hook has been installed (for idempotency)
static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Initialize the global panic hook.
///
/// This should be called once at program startup, before the async runtime
/// is initialized. Multiple calls are safe - only the first call installs
/// the hook.
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     init_panic_hook();
///     // ... rest of main
/// }
/// ```
pub(crate) fn init_panic_hook() {
    // Idempotency check - only install once
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let original_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        // Format panic message
        let message = format_panic_message(panic_info);

        // Log to stderr for container logs
        eprintln!("{}", message);

        // Optional Sentry integration
        #[cfg(feature = "sentry")]
        {
            sentry::capture_message(&message, sentry::Level::Fatal);
        }

        // Call original hook for default behavior (backtrace, etc.)
        original_hook(panic_info);
    }));
}

/// Format a panic message with location information.
///
/// Returns a structured message including:
/// - The panic payload (message or type)
/// - File, line, and column if available
fn format_panic_message(panic_info: &PanicHookInfo<'_>) -> String {
    let mut message = String::from("PANIC: ");

    // Get the panic payload
    if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        message.push_str(s);
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        message.push_str(s);
    } else {
        message.push_str("Unknown panic payload");
    }

    // Add location if available
    if let Some(location) = panic_info.location() {
        message.push_str(&format!(
            "\n  at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ));
    }

    message
}

/// Reset the hook installation flag (for testing only).
#[cfg(test)]
pub fn reset_hook_flag() {
    HOOK_INSTALLED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    #[test]
    fn test_hook_installed_flag_starts_false() {
        reset_hook_flag();
        assert!(!HOOK_INSTALLED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_init_panic_hook_sets_flag() {
        reset_hook_flag();
        init_panic_hook();
        assert!(HOOK_INSTALLED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_init_panic_hook_idempotent() {
        reset_hook_flag();
        init_panic_hook();
        let first_state = HOOK_INSTALLED.load(Ordering::SeqCst);

        init_panic_hook();
        let second_state = HOOK_INSTALLED.load(Ordering::SeqCst);

        assert!(first_state);
        assert_eq!(first_state, second_state);
    }

    #[test]
    fn test_init_panic_hook_multiple_calls_safe() {
        reset_hook_flag();
        for _ in 0..10 {
            init_panic_hook();
        }
        assert!(HOOK_INSTALLED.load(Ordering::SeqCst));
    }

    /// Serializes every test below that swaps the *global* panic hook.
    /// `panic::set_hook`/`take_hook` are process-wide, and `cargo test`
    /// runs tests on multiple threads by default, so two of these
    /// running concurrently would stomp on each other's hook.
    fn hook_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    /// Installs a capturing hook, triggers a real panic through it (caught
    /// by `catch_unwind` so the test process survives), restores the
    /// previous hook, and returns what `format_panic_message` actually
    /// produced for that panic.
    fn capture_panic_message<F>(f: F) -> String
    where
        F: FnOnce() + std::panic::UnwindSafe,
    {
        use std::sync::Arc;

        let _guard = hook_lock().lock().unwrap();
        let captured: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let captured_for_hook = Arc::clone(&captured);

        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            *captured_for_hook.lock().unwrap() = format_panic_message(info);
        }));

        let result = panic::catch_unwind(f);
        panic::set_hook(previous);

        assert!(result.is_err(), "test closure was expected to panic");
        captured.lock().unwrap().clone()
    }

    #[test]
    fn test_format_panic_message_str_payload() {
        let message = capture_panic_message(|| panic!("test panic message"));
        assert!(message.starts_with("PANIC: test panic message"));
    }

    #[test]
    fn test_format_panic_message_string_payload() {
        let message = capture_panic_message(|| panic::panic_any(String::from("owned panic message")));
        assert!(message.starts_with("PANIC: owned panic message"));
    }

    #[test]
    fn test_format_panic_message_includes_real_location() {
        let message = capture_panic_message(|| panic!("where did this happen"));
        assert!(message.contains("panic_hook.rs"));
        assert!(message.contains("\n  at "));
    }

    #[test]
    fn test_format_panic_message_unicode_payload() {
        let message = capture_panic_message(|| panic!("パニック: 日本語メッセージ 🚨"));
        assert!(message.contains("日本語"));
        assert!(message.contains("🚨"));
    }

    #[test]
    fn test_format_panic_message_empty_payload() {
        let message = capture_panic_message(|| panic!());
        assert!(message.starts_with("PANIC: "));
    }

    #[test]
    fn test_format_panic_message_newlines_preserved() {
        let message = capture_panic_message(|| panic!("first line\nsecond line\nthird line"));
        assert!(message.contains("first line\nsecond line\nthird line"));
    }

    #[test]
    fn test_format_panic_message_long_payload() {
        let long = "x".repeat(10_000);
        let message = capture_panic_message(move || panic!("{long}"));
        assert!(message.len() > 10_000);
    }

    #[test]
    fn test_format_panic_message_special_chars_preserved() {
        let message = capture_panic_message(|| panic!("unexpected token '<' at line 1, column 5"));
        assert!(message.contains('<'));
        assert!(!message.contains('>'));
    }
}
