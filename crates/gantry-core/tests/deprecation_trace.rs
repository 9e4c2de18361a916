//! deprecation trace のプロセス全体フラグ
//!
//! フラグはプロセスで 1 つなので、このファイルのテストはすべて直列に流す。

mod common;

use rstest::rstest;
use serial_test::serial;

use common::Host;
use gantry_core::app::is_trace_logging_enabled;
use gantry_core::domain::{BuildParameters, ShowStacktrace};

#[rstest]
#[case::never(ShowStacktrace::Never, false)]
#[case::on_error(ShowStacktrace::OnError, false)]
#[case::always(ShowStacktrace::Always, true)]
#[case::always_full(ShowStacktrace::AlwaysFull, true)]
#[serial(trace_toggle)]
fn building_an_invocation_sets_the_trace_toggle(
    #[case] show: ShowStacktrace,
    #[case] expected: bool,
) {
    let host = Host::new();

    host.top_level(BuildParameters::default().with_show_stacktrace(show))
        .unwrap();

    assert_eq!(is_trace_logging_enabled(), expected);
}

#[test]
#[serial(trace_toggle)]
fn deprecation_messages_carry_a_trace_only_when_enabled() {
    let host = Host::new();

    let traced = host
        .top_level(BuildParameters::default().with_show_stacktrace(ShowStacktrace::Always))
        .unwrap();
    let logger = traced.deprecation_logger().unwrap();
    logger.nag_user_of("Old API", "Use the new one.");
    assert!(logger.messages()[0].starts_with("Old API has been deprecated. Use the new one.\n"));
    traced.stop().unwrap();

    let plain = host
        .top_level(BuildParameters::default().with_show_stacktrace(ShowStacktrace::OnError))
        .unwrap();
    let logger = plain.deprecation_logger().unwrap();
    logger.nag_user_of("Old API", "Use the new one.");
    assert_eq!(logger.messages(), vec!["Old API has been deprecated. Use the new one."]);
}
