/// Initializes tracing output for tests.
///
/// - `init_test_tracing!()` logs at DEBUG
/// - `init_test_tracing!(INFO)` logs at the given level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        $crate::init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}
