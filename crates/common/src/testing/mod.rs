//! Testing utilities and helpers
//!
//! - **[`time`]**: [`FrozenClock`], a manually advanced clock
//! - [`init_test_tracing`]: installs a fmt subscriber for test binaries
//!
//! ## Usage
//!
//! ```rust
//! use tollgate_common::testing::{init_test_tracing, FrozenClock};
//!
//! init_test_tracing();
//! let clock = FrozenClock::new();
//! clock.advance_secs(5);
//! ```

pub mod time;

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use time::FrozenClock;

static TRACING: Once = Once::new();

/// Install a global fmt subscriber writing through the test harness.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything, and a subscriber installed
/// elsewhere is left in place.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
