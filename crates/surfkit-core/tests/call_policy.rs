//! Intercepted-call tests: focus before interactive methods, call-scoped
//! timeout overrides, exception handlers and call records.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{DriverCall, MockDriver};

use surfkit_core::config::SurfkitConfig;
use surfkit_core::diagnostics::{CallOutcome, MemorySink};
use surfkit_core::driver::SurfaceKind;
use surfkit_core::error::{CoreError, Result};
use surfkit_core::part::{Part, UiDescription};
use surfkit_core::policy::{
    ExceptionHandler, MethodSpec, Rethrow, RetryThenCapture, SuppressWithDefault,
};
use surfkit_core::resolver::PartArgs;
use surfkit_core::session::{Session, SessionEvent};

const SUBMIT: MethodSpec = MethodSpec::interactive("submit");
const READ: MethodSpec = MethodSpec::passive("read");
const SLOW_SEARCH: MethodSpec = MethodSpec::interactive("search").with_timeout(Duration::from_secs(1));

common::description!(Form);

macro_rules! handled_description {
    ($name:ident, $handler:expr) => {
        struct $name {
            part: Part,
        }

        impl UiDescription for $name {
            fn construct(part: Part) -> Result<Self> {
                Ok(Self { part })
            }

            fn exception_handler() -> Option<Arc<dyn ExceptionHandler>> {
                Some(Arc::new($handler))
            }
        }
    };
}

handled_description!(Lenient, SuppressWithDefault);
handled_description!(Strict, Rethrow);
handled_description!(Flaky, RetryThenCapture { attempts: 10 });
handled_description!(RetryOnce, RetryThenCapture { attempts: 1 });

fn session_with(driver: &Arc<MockDriver>, config: SurfkitConfig) -> (Session, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let session = common::builder(driver, SurfaceKind::Window)
        .config(config)
        .sink(sink.clone())
        .build();
    (session, sink)
}

fn driver() -> Arc<MockDriver> {
    Arc::new(
        MockDriver::new()
            .with_window("w1", "Login", "https://example.test/login")
            .with_screenshot(b"\x89PNG-fake"),
    )
}

fn interaction_error() -> CoreError {
    CoreError::Interaction("button missing".to_string())
}

#[tokio::test]
async fn test_default_handler_captures_and_rethrows() {
    common::init_tracing();
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    let result: Result<()> = form
        .part
        .invoke(&SUBMIT, |_ctx| async { Err(interaction_error()) })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), interaction_error().to_string());

    let artifacts = sink.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].type_name, "Form");
    assert_eq!(artifacts[0].method, "submit");
    assert!(artifacts[0].error.contains("button missing"));
    assert_eq!(artifacts[0].screenshot_png().unwrap(), b"\x89PNG-fake".to_vec());

    let log = session.call_log().await;
    assert_eq!(log.len(), 1);
    assert!(matches!(log[0].outcome, CallOutcome::Failure(_)));
}

#[tokio::test]
async fn test_no_screenshot_when_disabled() {
    let driver = driver();
    let config = SurfkitConfig {
        screenshot_on_failure: false,
        ..common::test_config()
    };
    let (session, sink) = session_with(&driver, config);
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    let _ = form
        .part
        .invoke(&READ, |_ctx| async { Err::<(), _>(interaction_error()) })
        .await;

    assert_eq!(sink.artifacts().len(), 1);
    assert!(sink.artifacts()[0].screenshot.is_none());
    assert!(!driver.calls().contains(&DriverCall::Screenshot));
}

#[tokio::test]
async fn test_suppressing_handler_returns_default() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<Lenient>(PartArgs::new()).await.unwrap();

    let count: u32 = page
        .part
        .invoke(&READ, |_ctx| async { Err(interaction_error()) })
        .await
        .unwrap();

    assert_eq!(count, 0);
    assert!(sink.artifacts().is_empty());
    let log = session.call_log().await;
    assert!(matches!(log[0].outcome, CallOutcome::Suppressed(_)));
}

#[tokio::test]
async fn test_children_inherit_the_nearest_handler() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<Lenient>(PartArgs::new()).await.unwrap();
    let form = page.part.get_part::<Form>(PartArgs::new()).await.unwrap();

    let text: String = form
        .part
        .invoke(&READ, |_ctx| async { Err(interaction_error()) })
        .await
        .unwrap();
    assert!(text.is_empty());
}

#[tokio::test]
async fn test_new_root_from_a_child_request_uses_the_default_handler() {
    let driver = Arc::new(
        MockDriver::new()
            .with_window("w1", "Login", "https://example.test/login")
            .with_window("w2", "Popup", "https://example.test/popup"),
    );
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<Lenient>(PartArgs::new()).await.unwrap();
    let popup = page.part.get_part::<Form>(PartArgs::new().index(1)).await.unwrap();
    assert!(popup.part.parent().unwrap().is_none());

    let result: Result<u32> = popup
        .part
        .invoke(&READ, |_ctx| async { Err(interaction_error()) })
        .await;

    assert!(matches!(result, Err(CoreError::Interaction(_))));
    assert_eq!(sink.artifacts().len(), 1);
    assert_eq!(sink.artifacts()[0].type_name, "Form");
}

#[tokio::test]
async fn test_type_handler_overrides_inherited_one() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<Lenient>(PartArgs::new()).await.unwrap();
    let strict = page.part.get_part::<Strict>(PartArgs::new()).await.unwrap();

    let result: Result<u32> = strict
        .part
        .invoke(&READ, |_ctx| async { Err(interaction_error()) })
        .await;

    assert!(matches!(result, Err(CoreError::Interaction(_))));
    assert!(sink.artifacts().is_empty());
}

#[tokio::test]
async fn test_retries_are_bounded_by_config() {
    let driver = driver();
    let config = SurfkitConfig {
        max_retries: 2,
        ..common::test_config()
    };
    let (session, sink) = session_with(&driver, config);
    let page = session.get_part::<Flaky>(PartArgs::new()).await.unwrap();
    let runs = AtomicU32::new(0);

    let result: Result<()> = page
        .part
        .invoke(&READ, |_ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(interaction_error()) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    let log = session.call_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].attempts, 3);
    // The handler still gets to capture once the session bound cuts it short.
    assert_eq!(sink.artifacts().len(), 1);
}

#[tokio::test]
async fn test_handler_retry_budget_above_session_bound_still_captures() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<Flaky>(PartArgs::new()).await.unwrap();
    let runs = AtomicU32::new(0);

    let result: Result<()> = page
        .part
        .invoke(&SUBMIT, |_ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(interaction_error()) }
        })
        .await;

    assert!(matches!(result, Err(CoreError::Interaction(_))));
    assert_eq!(runs.load(Ordering::SeqCst), common::test_config().max_retries + 1);
    let artifacts = sink.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].type_name, "Flaky");
    assert_eq!(artifacts[0].method, "submit");
}

#[tokio::test]
async fn test_retry_then_success_returns_value() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<RetryOnce>(PartArgs::new()).await.unwrap();
    let runs = AtomicU32::new(0);

    let value = page
        .part
        .invoke(&SUBMIT, |ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            async move {
                if ctx.attempt() == 1 {
                    Err(interaction_error())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(sink.artifacts().is_empty());
    assert_eq!(session.call_log().await[0].attempts, 2);
}

#[tokio::test]
async fn test_exhausted_retries_capture_a_diagnostic() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let page = session.get_part::<RetryOnce>(PartArgs::new()).await.unwrap();

    let result: Result<()> = page
        .part
        .invoke(&READ, |_ctx| async { Err(interaction_error()) })
        .await;

    assert!(result.is_err());
    assert_eq!(sink.artifacts().len(), 1);
}

#[tokio::test]
async fn test_timeout_override_is_scoped_to_the_call() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    let seen = form
        .part
        .invoke(&SLOW_SEARCH, |ctx| async move {
            ctx.driver().implicit_wait().await.map_err(CoreError::from)
        })
        .await
        .unwrap();

    assert_eq!(seen, Duration::from_secs(1));
    assert_eq!(driver.current_implicit_wait(), Duration::from_secs(5));
    let waits: Vec<DriverCall> = driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, DriverCall::SetImplicitWait(_)))
        .collect();
    assert_eq!(
        waits,
        vec![
            DriverCall::SetImplicitWait(Duration::from_secs(1)),
            DriverCall::SetImplicitWait(Duration::from_secs(5)),
        ]
    );
}

#[tokio::test]
async fn test_timeout_override_is_restored_after_failure() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    let result: Result<()> = form
        .part
        .invoke(&SLOW_SEARCH, |_ctx| async { Err(interaction_error()) })
        .await;

    assert!(result.is_err());
    assert_eq!(driver.current_implicit_wait(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_only_interactive_methods_switch_focus() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    driver.clear_calls();
    form.part.invoke(&READ, |_ctx| async { Ok(()) }).await.unwrap();
    assert!(!driver.calls().iter().any(|c| matches!(c, DriverCall::Switch(_))));

    form.part.invoke(&SUBMIT, |_ctx| async { Ok(()) }).await.unwrap();
    assert_eq!(driver.focus_calls(), vec![DriverCall::Switch("w1".to_string())]);
}

#[tokio::test]
async fn test_focus_failure_goes_through_the_handler() {
    let driver = driver();
    let (session, sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();
    let runs = AtomicU32::new(0);

    driver.vanish("w1");
    let result: Result<()> = form
        .part
        .invoke(&SUBMIT, |_ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(CoreError::StaleHandle { .. })));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(sink.artifacts().len(), 1);
}

#[tokio::test]
async fn test_success_hooks_never_alter_the_result() {
    let driver = driver();
    let config = SurfkitConfig {
        screenshot_on_success: true,
        ..common::test_config()
    };
    let (session, _sink) = session_with(&driver, config);
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();
    let mut rx = session.subscribe();

    let value = form
        .part
        .invoke(&READ, |_ctx| async { Ok("Welcome back".to_string()) })
        .await
        .unwrap();

    assert_eq!(value, "Welcome back");
    let log = session.call_log().await;
    assert!(log[0].outcome.is_success());
    assert!(log[0].screenshot.is_some());

    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::CallCompleted(record) = event {
            assert_eq!(record.method, "read");
            completed = true;
        }
    }
    assert!(completed);
}

#[tokio::test]
async fn test_body_can_reach_the_concrete_driver() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();

    let found = form
        .part
        .invoke(&READ, |ctx| async move {
            let mock = ctx.driver_as::<MockDriver>().is_some();
            let other = ctx.driver_as::<String>().is_some();
            Ok(mock && !other && ctx.handle().id().as_str() == "w1")
        })
        .await
        .unwrap();

    assert!(found);
}

#[tokio::test]
async fn test_destroyed_node_cannot_be_invoked() {
    let driver = driver();
    let (session, _sink) = session_with(&driver, common::test_config());
    let form = session.get_part::<Form>(PartArgs::new()).await.unwrap();
    form.part.destroy().await.unwrap();

    let result: Result<()> = form.part.invoke(&READ, |_ctx| async { Ok(()) }).await;
    assert!(matches!(result, Err(CoreError::NodeDestroyed(_))));
}
