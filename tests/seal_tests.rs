mod common;

use std::time::Duration;

use common::*;
use serde_json::json;
use work_tree::prelude::*;

fn user_workflow() -> Workflow<String> {
    Workflow::named("users")
        .serial(Step::new("validate", |ctx: Context<String>| async move {
            Ok(!ctx.data().is_empty())
        }))
        .unwrap()
        .serial(Step::new("fetchUser", |ctx: Context<String>| async move {
            if ctx.result_as::<bool>("validate") != Some(true) {
                anyhow::bail!("Invalid user ID");
            }
            Ok(json!({ "id": ctx.data().clone(), "name": "John Doe" }))
        }))
        .unwrap()
}

fn traced(trace: &Trace) -> SealOptions<String> {
    let trace = trace.clone();
    SealOptions::new().execute(move |ctx: Context<String>, next| {
        let trace = trace.clone();
        async move {
            trace.push("before");
            let result = next.execute(ctx).await;
            trace.push("after");
            result
        }
    })
}

#[tokio::test]
async fn test_sealing_keeps_name_and_behavior() {
    let workflow = user_workflow();
    assert!(!workflow.is_sealed());

    let sealed = workflow.seal();
    assert!(sealed.is_sealed());
    assert_eq!(sealed.name(), "users");
    assert!(!sealed.has_custom_execute());

    let result = sealed.run("user-123".to_string()).await;
    assert!(result.is_completed());
    assert_eq!(result.result("fetchUser").unwrap()["name"], "John Doe");
}

#[tokio::test]
async fn test_run_and_execute_both_use_custom_executor() {
    let trace = Trace::new();
    let sealed = user_workflow().seal_with(traced(&trace));

    let ran = sealed.run("user-123".to_string()).await;
    assert!(ran.is_completed());
    assert_eq!(trace.entries(), vec!["before", "after"]);

    let executed = sealed.execute(Context::new("user-456".to_string())).await;
    assert!(executed.is_completed());
    assert_eq!(trace.entries(), vec!["before", "after", "before", "after"]);
    assert_eq!(executed.result("fetchUser").unwrap()["id"], "user-456");
}

#[tokio::test]
async fn test_custom_executor_sees_failures() {
    let trace = Trace::new();
    let sealed = user_workflow().seal_with(traced(&trace));

    let result = sealed.run(String::new()).await;

    assert!(result.is_failed());
    assert_eq!(trace.entries(), vec!["before", "after"]);
    assert_eq!(
        result.error.as_ref().unwrap().to_string(),
        "Work 'fetchUser' failed: Invalid user ID"
    );
}

#[tokio::test]
async fn test_custom_executor_can_short_circuit() {
    let calls = Calls::new();
    let sealed = Workflow::new()
        .serial(counted_step("expensive", &calls, json!(1)))
        .unwrap()
        .seal_with(SealOptions::new().execute(|ctx: Context<bool>, next| async move {
            if *ctx.data() {
                return next.execute(ctx).await;
            }
            RunResult {
                status: WorkflowStatus::Completed,
                context: ctx,
                total_duration: Duration::ZERO,
                error: None,
                started_at: chrono::Utc::now(),
            }
        }));

    let skipped = sealed.run(false).await;
    assert!(skipped.is_completed());
    assert!(skipped.work_results().is_empty());
    assert_eq!(calls.count(), 0);

    let ran = sealed.run(true).await;
    assert!(ran.is_completed());
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn test_panicking_custom_executor_fails_the_run() {
    let sealed = user_workflow().seal_with(SealOptions::new().execute(
        |ctx: Context<String>, next| async move {
            if ctx.data() == "boom" {
                panic!("executor boom");
            }
            next.execute(ctx).await
        },
    ));

    let result = sealed.run("boom".to_string()).await;

    assert!(result.is_failed());
    assert!(result.get("users").unwrap().is_failed());
    match result.error {
        Some(WorkError::Panicked { work, message }) => {
            assert_eq!(work, "users");
            assert_eq!(message, "executor boom");
        }
        other => panic!("expected a panic error, got {:?}", other),
    }

    let outer = Workflow::named("signup")
        .serial(sealed)
        .unwrap()
        .serial(value_step("welcome", json!("sent")))
        .unwrap();
    let nested = outer.run("boom".to_string()).await;

    assert!(nested.is_failed());
    assert!(nested.get("users").unwrap().is_failed());
    assert!(nested.get("welcome").is_none());
}

#[tokio::test]
async fn test_sealed_workflow_nests_with_its_executor() {
    let trace = Trace::new();
    let sealed = user_workflow().seal_with(traced(&trace));

    let outer = Workflow::named("signup")
        .serial(value_step("start", json!("ok")))
        .unwrap()
        .serial(sealed)
        .unwrap();

    let result = outer.run("user-9".to_string()).await;

    assert!(result.is_completed());
    assert_eq!(trace.entries(), vec!["before", "after"]);
    let users = result.get("users").unwrap();
    assert!(users.is_completed());
    assert_eq!(names(&users.children), vec!["validate", "fetchUser"]);
    assert_eq!(names(result.work_results()), vec!["start", "users", "signup"]);
}

#[tokio::test]
async fn test_sealed_tree_keeps_its_gate() {
    let calls = Calls::new();
    let sealed = Tree::new("gated")
        .should_run(|ctx: &Context<bool>| *ctx.data())
        .serial(counted_step("work", &calls, json!(1)))
        .unwrap()
        .seal();

    let result = sealed.run(false).await;

    assert!(result.is_completed());
    assert!(result.get("gated").unwrap().is_skipped());
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn test_sealed_runs_are_independent() {
    let sealed = user_workflow().seal();
    let copy = sealed.clone();

    let (a, b) = tokio::join!(sealed.run("a".to_string()), copy.run("b".to_string()));

    assert_eq!(a.result("fetchUser").unwrap()["id"], "a");
    assert_eq!(b.result("fetchUser").unwrap()["id"], "b");
    assert_eq!(a.work_results().len(), 3);
    assert_eq!(b.work_results().len(), 3);
}
