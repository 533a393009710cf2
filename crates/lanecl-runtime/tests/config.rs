use lanecl_runtime::config::{
    GlobalConfig, execution::ExecutionLogLevel, planning::PlanningLogLevel,
};
use serial_test::serial;

fn with_env<R>(vars: &[(&str, &str)], func: impl FnOnce() -> R) -> R {
    // Environment mutation is only sound while no other test reads it, hence `#[serial]`.
    for (key, value) in vars {
        unsafe { std::env::set_var(key, value) };
    }
    let result = func();
    for (key, _) in vars {
        unsafe { std::env::remove_var(key) };
    }
    result
}

#[test]
#[serial]
fn platform_facts_come_from_the_environment() {
    let config = with_env(
        &[
            ("LANECL_LANE_COUNT", "12"),
            ("LANECL_SCRATCH_BYTES", "65536"),
            ("LANECL_BUFFER_DEPTH", "3"),
        ],
        || GlobalConfig::default().override_from_env(),
    );

    assert_eq!(config.platform.lane_count, Some(12));
    assert_eq!(config.platform.scratch_budget_bytes, Some(65536));
    assert_eq!(config.execution.buffer_depth(), 3);
}

#[test]
#[serial]
fn malformed_numbers_are_ignored() {
    let config = with_env(&[("LANECL_LANE_COUNT", "many")], || {
        GlobalConfig::default().override_from_env()
    });

    assert_eq!(config.platform.lane_count, None);
}

#[test]
#[serial]
fn debug_log_enables_every_logger() {
    let config = with_env(&[("LANECL_DEBUG_LOG", "stderr")], || {
        GlobalConfig::default().override_from_env()
    });

    assert_eq!(config.planning.logger.level, PlanningLogLevel::Full);
    assert_eq!(config.execution.logger.level, ExecutionLogLevel::Full);
    assert!(config.planning.logger.stderr);
    assert!(config.execution.logger.stderr);
}

#[test]
#[serial]
fn debug_log_can_disable_logging() {
    let config = with_env(&[("LANECL_DEBUG_LOG", "0")], || {
        GlobalConfig::default().override_from_env()
    });

    assert_eq!(config.planning.logger.level, PlanningLogLevel::Disabled);
    assert_eq!(config.execution.logger.level, ExecutionLogLevel::Disabled);
}

#[test]
#[serial]
fn buffer_depth_is_clamped() {
    let config = with_env(&[("LANECL_BUFFER_DEPTH", "64")], || {
        GlobalConfig::default().override_from_env()
    });

    assert_eq!(config.execution.buffer_depth(), 8);
}
