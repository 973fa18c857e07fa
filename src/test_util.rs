use log::LevelFilter;

/// Installs the capture-friendly test logger. First caller wins, later
/// calls are no-ops.
pub(crate) fn init_log() {
    let _ = env_logger::Builder::new()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}
