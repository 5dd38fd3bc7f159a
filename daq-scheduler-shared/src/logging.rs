//! Tracing setup.
//!
//! Each binary calls [`init_tracing`] once at startup; library code only
//! ever calls `tracing::info!`/`debug!`/etc. against whatever subscriber the
//! binary installed; there is no ambient global logger constructed lazily
//! by a library module.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global tracing subscriber reading its filter from `RUST_LOG`,
/// defaulting to `info` when unset. `verbose`/`very_verbose` raise the
/// default floor for this crate's own targets without needing `RUST_LOG`
/// set in the environment.
pub fn init_tracing(verbose: bool, very_verbose: bool) {
    let default_directive = if very_verbose {
        "daq_scheduler_core=trace,daq_scheduler_shared=trace,info"
    } else if verbose {
        "daq_scheduler_core=debug,daq_scheduler_shared=debug,info"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if std::env::var_os("DAQ_SCHED_LOG_JSON").is_some() {
        subscriber.json().try_init().ok();
    } else {
        subscriber.try_init().ok();
    }
}
