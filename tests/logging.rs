//! Target silencing over the installed global subscriber.

use implicitron_trainer::test_utils::get_path_manager;
use implicitron_trainer::{init_structured_logging, ScopedLogging, TestEnvironment};
use tracing::Level;

#[test]
fn silencing_path_manager_leaves_other_targets_alone() {
    std::env::set_var("IMPLICITRON_LOG", "info");
    init_structured_logging();

    assert!(tracing::enabled!(target: "implicitron_trainer::experiment", Level::INFO));
    assert!(!tracing::enabled!(target: "implicitron_trainer::experiment", Level::DEBUG));
    assert!(tracing::enabled!(target: "implicitron_trainer::path_manager", Level::INFO));

    {
        let mut logging = ScopedLogging::new();
        get_path_manager(&TestEnvironment::default(), &mut logging, true).unwrap();

        assert!(!tracing::enabled!(target: "implicitron_trainer::path_manager", Level::INFO));
        assert!(!tracing::enabled!(target: "implicitron_trainer::path_manager::remote", Level::WARN));
        assert!(tracing::enabled!(target: "implicitron_trainer::experiment", Level::INFO));
        assert!(!tracing::enabled!(target: "implicitron_trainer::experiment", Level::DEBUG));
        assert!(logging
            .filter_directives()
            .ends_with("implicitron_trainer::path_manager=off"));
    }

    // the previous filter is back once the scope is gone
    assert!(tracing::enabled!(target: "implicitron_trainer::path_manager", Level::INFO));
    assert!(!tracing::enabled!(target: "implicitron_trainer::experiment", Level::DEBUG));
}
